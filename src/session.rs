//! The signed-in actor, carried in an encrypted cookie.

use chrono::{DateTime, Duration, Utc};
use rocket::http::{Cookie, Cookies, SameSite};
use rocket::request::{self, FromRequest, Request};
use rocket::Outcome;

use crate::config::SESSION_COOKIE;
use crate::error::{PortalError, PortalResult};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Role {
    // older cookies and the local admin accounts spell these differently
    #[serde(alias = "Md")]
    Admin,
    #[serde(alias = "User")]
    Staff,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(rename = "personnelType")]
    pub role: Role,
    pub department: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: String,
        username: String,
        email: String,
        role: Role,
        department: Option<String>,
        now: DateTime<Utc>,
        ttl_hours: i64,
    ) -> Self {
        Session {
            id,
            username,
            email,
            role,
            department,
            expires_at: now + Duration::hours(ttl_hours),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn save(&self, cookies: &mut Cookies<'_>) -> PortalResult<()> {
        let value = serde_json::to_string(self)?;
        let cookie = Cookie::build(SESSION_COOKIE, value)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(!cfg!(debug_assertions))
            .finish();
        cookies.add_private(cookie);
        debug!("saved session for {} ({:?})", self.id, self.role);
        Ok(())
    }

    pub fn destroy(cookies: &mut Cookies<'_>) {
        cookies.remove_private(Cookie::named(SESSION_COOKIE));
    }

    /// Read the session from the jar, dropping it if it has expired or can't
    /// be decoded.
    pub fn from_cookies(cookies: &mut Cookies<'_>, now: DateTime<Utc>) -> Option<Session> {
        let cookie = cookies.get_private(SESSION_COOKIE)?;

        let session = match serde_json::from_str::<Session>(cookie.value()) {
            Ok(session) => session,
            Err(why) => {
                warn!("discarding unreadable session cookie: {}", why);
                Session::destroy(cookies);
                return None;
            }
        };

        if session.is_expired(now) {
            info!("session for {} expired, destroying", session.id);
            Session::destroy(cookies);
            return None;
        }

        Some(session)
    }
}

impl<'a, 'r> FromRequest<'a, 'r> for Session {
    type Error = ();

    fn from_request(request: &'a Request<'r>) -> request::Outcome<Session, ()> {
        let mut cookies = request.cookies();
        match Session::from_cookies(&mut cookies, Utc::now()) {
            Some(session) => Outcome::Success(session),
            None => Outcome::Forward(()),
        }
    }
}

pub fn require(session: Option<Session>) -> PortalResult<Session> {
    session.ok_or_else(|| PortalError::Unauthorized("sign in first".to_string()))
}

pub fn require_admin(session: Option<Session>) -> PortalResult<Session> {
    let session = require(session)?;
    if !session.is_admin() {
        throw!(PortalError::Forbidden("admins only".to_string()));
    }
    Ok(session)
}
