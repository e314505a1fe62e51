#![deny(rust_2018_idioms)]
#![feature(proc_macro_hygiene, decl_macro)]
#![recursion_limit = "256"]

// BUG https://github.com/sgrif/pq-sys/issues/25
#[allow(unused_extern_crates)]
extern crate openssl;

#[macro_use]
extern crate diesel;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate rocket;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate serde_json;
#[cfg(test)]
#[macro_use]
extern crate maplit;

#[macro_use]
mod macros;

mod analytics;
mod auth;
mod config;
mod directory;
mod domain;
mod error;
mod feedback;
mod moods;
mod reactions;
mod server;
mod session;
mod setup;
mod status;
mod store;
mod updates;
mod utils;

use chrono::Local;

use crate::auth::{AzureAd, IdentityProvider};
use crate::config::{DirectoryBackend, CONFIG};
use crate::directory::{Directory, GraphDirectory, StaticDirectory};
use crate::error::PortalResult;
use crate::server::Portal;
use crate::setup::SETUP;
use crate::store::pg::{init_pool, PgStore};

fn main() {
    use std::io::Write;

    // init environment variables and logging
    dotenv::dotenv().ok();

    env_logger::Builder::new()
        .format(|buf, rec| {
            writeln!(
                buf,
                "[{} {}:{} {}] {}",
                rec.level(),
                rec.module_path().unwrap_or("<unnamed>"),
                rec.line().unwrap_or(0),
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                rec.args()
            )
        })
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    debug!("Logging initialized.");
    if !CONFIG.check() {
        error!("Configuration failed validation.");
        std::process::exit(1);
    }

    // we want to panic early if portal.toml is broken
    info!(
        "parsed departments: {:?}",
        SETUP.departments().collect::<Vec<_>>()
    );

    let portal = ok_or!(build_portal(), why => {
        error!("Unable to start the portal: {}", why);
        std::process::exit(1);
    });

    server::serve(portal);
}

fn build_portal() -> PortalResult<Portal> {
    let pool = init_pool(&CONFIG.db_url, CONFIG.db_pool_size)?;
    let _ = pool.get()?;
    let store = PgStore::new(pool);

    let directory: Box<dyn Directory> = match (CONFIG.directory_backend, CONFIG.sso.as_ref()) {
        (DirectoryBackend::Graph, Some(sso)) => {
            info!("Using Microsoft Graph as the staff directory.");
            Box::new(GraphDirectory::new(sso.clone())?)
        }
        _ => {
            info!("Using the staff directory from portal.toml.");
            Box::new(StaticDirectory::from_setup(&SETUP))
        }
    };

    let identity: Option<Box<dyn IdentityProvider>> = match CONFIG.sso {
        Some(ref sso) => {
            let azure = AzureAd::new(sso.clone(), &CONFIG.public_base_url)?;
            Some(Box::new(azure) as Box<dyn IdentityProvider>)
        }
        None => None,
    };

    Ok(Portal {
        feedback: Box::new(store.clone()),
        moods: Box::new(store),
        directory,
        identity,
        local_admins: CONFIG.local_admins.clone(),
        session_ttl_hours: CONFIG.session_ttl_hours,
    })
}
