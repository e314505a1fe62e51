use std::convert::From;
use std::fmt;

use diesel::r2d2::PoolError;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, status, Responder};
use rocket_contrib::json::Json;
use rocket_contrib::templates::handlebars::RenderError;

pub type PortalResult<T> = std::result::Result<T, PortalError>;

#[derive(Debug)]
pub enum PortalError {
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Validation(Vec<String>),
    Directory(String),
    Identity(String),
    Reqwest(reqwest::Error),
    Serde(serde_json::error::Error),
    R2d2(PoolError),
    DieselError(diesel::result::Error),
    Template(RenderError),
    Misc(Option<String>),
}

impl PortalError {
    pub fn not_found(what: &str, id: i32) -> Self {
        PortalError::NotFound(format!("{} {} not found", what, id))
    }

    pub fn status(&self) -> Status {
        match self {
            PortalError::NotFound(_) => Status::NotFound,
            PortalError::Unauthorized(_) => Status::Unauthorized,
            PortalError::Forbidden(_) => Status::Forbidden,
            PortalError::Validation(_) => Status::UnprocessableEntity,
            PortalError::Directory(_) | PortalError::Identity(_) | PortalError::Reqwest(_) => {
                Status::BadGateway
            }
            _ => Status::InternalServerError,
        }
    }

    /// Failures of a collaborator rather than of the request itself.
    pub fn is_upstream(&self) -> bool {
        match self {
            PortalError::NotFound(_)
            | PortalError::Unauthorized(_)
            | PortalError::Forbidden(_)
            | PortalError::Validation(_) => false,
            _ => true,
        }
    }
}

impl fmt::Display for PortalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortalError::NotFound(what) => write!(f, "{}", what),
            PortalError::Unauthorized(why) => write!(f, "unauthorized: {}", why),
            PortalError::Forbidden(why) => write!(f, "forbidden: {}", why),
            PortalError::Validation(problems) => {
                write!(f, "validation failed: {}", problems.join("; "))
            }
            PortalError::Directory(why) => write!(f, "directory error: {}", why),
            PortalError::Identity(why) => write!(f, "identity provider error: {}", why),
            PortalError::Reqwest(e) => write!(f, "http client error: {}", e),
            PortalError::Serde(e) => write!(f, "json error: {}", e),
            PortalError::R2d2(e) => write!(f, "connection pool error: {}", e),
            PortalError::DieselError(e) => write!(f, "database error: {}", e),
            PortalError::Template(e) => write!(f, "template error: {}", e),
            PortalError::Misc(Some(why)) => write!(f, "{}", why),
            PortalError::Misc(None) => write!(f, "miscellaneous error"),
        }
    }
}

impl From<reqwest::Error> for PortalError {
    fn from(e: reqwest::Error) -> Self {
        PortalError::Reqwest(e)
    }
}

impl From<serde_json::error::Error> for PortalError {
    fn from(e: serde_json::error::Error) -> Self {
        PortalError::Serde(e)
    }
}

impl From<PoolError> for PortalError {
    fn from(e: PoolError) -> Self {
        PortalError::R2d2(e)
    }
}

impl From<diesel::result::Error> for PortalError {
    fn from(e: diesel::result::Error) -> Self {
        PortalError::DieselError(e)
    }
}

impl From<RenderError> for PortalError {
    fn from(e: RenderError) -> Self {
        PortalError::Template(e)
    }
}

impl<'r> Responder<'r> for PortalError {
    fn respond_to(self, req: &Request<'_>) -> response::Result<'r> {
        let code = self.status();
        if self.is_upstream() {
            error!("{} {} failed: {}", req.method(), req.uri(), self);
        } else {
            debug!("{} {} rejected: {}", req.method(), req.uri(), self);
        }

        let body = match self {
            PortalError::Validation(problems) => json!({
                "error": "validation failed",
                "details": problems,
            }),
            // don't leak store or client internals to callers
            ref e if e.is_upstream() => json!({ "error": code.reason }),
            e => json!({ "error": e.to_string() }),
        };

        status::Custom(code, Json(body)).respond_to(req)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn taxonomy_maps_to_statuses() {
        assert_eq!(PortalError::not_found("feedback", 7).status(), Status::NotFound);
        assert_eq!(
            PortalError::Unauthorized("x".into()).status(),
            Status::Unauthorized
        );
        assert_eq!(
            PortalError::Validation(vec![]).status(),
            Status::UnprocessableEntity
        );
        assert_eq!(
            PortalError::Directory("down".into()).status(),
            Status::BadGateway
        );
        assert_eq!(PortalError::Misc(None).status(), Status::InternalServerError);
    }

    #[test]
    fn only_collaborator_failures_are_upstream() {
        assert!(!PortalError::Forbidden("admins only".into()).is_upstream());
        assert!(!PortalError::Validation(vec!["title".into()]).is_upstream());
        assert!(PortalError::DieselError(diesel::result::Error::NotFound).is_upstream());
        assert!(PortalError::Directory("timeout".into()).is_upstream());
    }

    #[test]
    fn not_found_message_names_the_record() {
        assert_eq!(
            PortalError::not_found("mood entry", 12).to_string(),
            "mood entry 12 not found"
        );
    }
}
