use std::collections::BTreeMap;
use std::env;

use crate::setup::{parse_local_admins, LocalAdmin};

pub const SESSION_COOKIE: &str = "auth-session";
pub const STATE_COOKIE: &str = "auth_state";
pub const NONCE_COOKIE: &str = "auth_nonce";

// auth_state/auth_nonce only need to outlive one round trip to the provider
pub const AUTH_COOKIE_MINUTES: i64 = 15;

const DB_URL: &str = "DATABASE_URL";
const DB_POOL_SIZE: &str = "DATABASE_POOL_SIZE";
const SESSION_TTL_HOURS: &str = "SESSION_TTL_HOURS";
const PUBLIC_BASE_URL: &str = "PUBLIC_BASE_URL";
const AZURE_AD_TENANT_ID: &str = "AZURE_AD_TENANT_ID";
const AZURE_AD_CLIENT_ID: &str = "AZURE_AD_CLIENT_ID";
const AZURE_AD_CLIENT_SECRET: &str = "AZURE_AD_CLIENT_SECRET";
const DIRECTORY_BACKEND: &str = "DIRECTORY_BACKEND";
const LOCAL_ADMINS: &str = "LOCAL_ADMINS";

lazy_static! {
    pub static ref CONFIG: Config = {
        match init() {
            Ok(c) => {
                info!("Configuration parsed from environment variables.");
                c
            }
            Err(missing) => {
                error!("Unable to load environment variables {:?}", missing);
                panic!("Unable to load environment variables {:?}", missing);
            }
        }
    };
}

#[derive(Debug)]
pub struct Config {
    pub db_url: String,
    pub db_pool_size: u32,
    pub session_ttl_hours: i64,
    pub public_base_url: String,
    pub directory_backend: DirectoryBackend,
    pub sso: Option<SsoConfig>,
    pub local_admins: Vec<LocalAdmin>,
}

/// Azure AD (or any v2.0-style OpenID Connect) application registration.
#[derive(Clone, Debug)]
pub struct SsoConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl SsoConfig {
    pub fn authorize_endpoint(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/authorize",
            self.tenant_id
        )
    }

    pub fn token_endpoint(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.tenant_id
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DirectoryBackend {
    Graph,
    Static,
}

impl Config {
    pub fn check(&self) -> bool {
        !self.db_url.is_empty() && self.db_pool_size > 0 && self.session_ttl_hours > 0
    }
}

// required values are reported all at once, optional ones fall back to defaults
pub fn init() -> Result<Config, Vec<&'static str>> {
    let mut vars: BTreeMap<&'static str, Result<String, _>> = BTreeMap::new();
    let keys = vec![DB_URL];

    for var in keys {
        vars.insert(var, env::var(var));
    }

    let all_found = vars.iter().all(|(_, v)| v.is_ok());
    if !all_found {
        return Err(vars
            .iter()
            .filter(|&(_, v)| v.is_err())
            .map(|(&k, _)| k)
            .collect());
    }

    let db_url = match vars.remove(DB_URL) {
        Some(Ok(url)) => url,
        _ => return Err(vec![DB_URL]),
    };

    let db_pool_size = parse_or(DB_POOL_SIZE, 20);
    let session_ttl_hours = parse_or(SESSION_TTL_HOURS, 24);
    let public_base_url = env::var(PUBLIC_BASE_URL)
        .unwrap_or_else(|_| String::from("http://localhost:8000"))
        .trim_end_matches('/')
        .to_string();

    let sso = match (env::var(AZURE_AD_CLIENT_ID), env::var(AZURE_AD_CLIENT_SECRET)) {
        (Ok(client_id), Ok(client_secret)) => Some(SsoConfig {
            tenant_id: env::var(AZURE_AD_TENANT_ID).unwrap_or_else(|_| "common".to_string()),
            client_id,
            client_secret,
        }),
        _ => {
            warn!("Azure AD client id/secret not set, single sign-on is disabled.");
            None
        }
    };

    let directory_backend = match env::var(DIRECTORY_BACKEND).as_ref().map(|s| s.as_str()) {
        Ok("graph") if sso.is_some() => DirectoryBackend::Graph,
        Ok("graph") => {
            warn!("{}=graph needs Azure AD credentials, using the static directory", DIRECTORY_BACKEND);
            DirectoryBackend::Static
        }
        _ => DirectoryBackend::Static,
    };

    // username:email:sha256hex, comma separated
    let local_admins = match env::var(LOCAL_ADMINS) {
        Ok(admins) => match parse_local_admins(&admins) {
            Ok(admins) => admins,
            Err(why) => {
                error!("{} is malformed: {}", LOCAL_ADMINS, why);
                return Err(vec![LOCAL_ADMINS]);
            }
        },
        Err(_) => Vec::new(),
    };
    if local_admins.is_empty() {
        info!("No local admin accounts configured.");
    }

    Ok(Config {
        db_url,
        db_pool_size,
        session_ttl_hours,
        public_base_url,
        directory_backend,
        sso,
        local_admins,
    })
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key).map(|v| v.parse::<T>()) {
        Ok(Ok(value)) => value,
        Ok(Err(_)) => {
            warn!("{} is not a valid value, using the default", key);
            default
        }
        Err(_) => default,
    }
}
