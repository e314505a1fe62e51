//! Sign-in: the OpenID Connect authorization-code round trip against Azure
//! AD, and the local admin accounts from `portal.toml`.

use std::fmt;
use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone, Utc};
use openssl::base64;
use openssl::rand::rand_bytes;
use reqwest::blocking::Client;
use url::Url;

use crate::config::SsoConfig;
use crate::directory::Directory;
use crate::error::{PortalError, PortalResult};
use crate::session::{Role, Session};
use crate::setup::{LocalAdmin, PortalSetup};
use crate::utils::decode_json;

const SCOPES: &str = "openid profile email";
const CALLBACK_PATH: &str = "/api/auth/callback";

pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser to sign in.
    fn authorize_url(&self, state: &str, nonce: &str) -> PortalResult<String>;

    /// Trade an authorization code for the raw ID token.
    fn redeem(&self, code: &str) -> PortalResult<String>;
}

pub struct AzureAd {
    sso: SsoConfig,
    redirect_uri: String,
    client: Client,
}

impl AzureAd {
    pub fn new(sso: SsoConfig, public_base_url: &str) -> PortalResult<Self> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(10))
            .build()?;

        Ok(AzureAd {
            sso,
            redirect_uri: format!("{}{}", public_base_url.trim_end_matches('/'), CALLBACK_PATH),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl IdentityProvider for AzureAd {
    fn authorize_url(&self, state: &str, nonce: &str) -> PortalResult<String> {
        let url = Url::parse_with_params(
            &self.sso.authorize_endpoint(),
            &[
                ("client_id", self.sso.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_mode", "form_post"),
                ("scope", SCOPES),
                ("state", state),
                ("nonce", nonce),
            ],
        )
        .map_err(|e| PortalError::Identity(e.to_string()))?;

        Ok(url.to_string())
    }

    fn redeem(&self, code: &str) -> PortalResult<String> {
        let res = self
            .client
            .post(&self.sso.token_endpoint())
            .form(&[
                ("client_id", self.sso.client_id.as_str()),
                ("client_secret", self.sso.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("scope", SCOPES),
            ])
            .send()?;

        let status = res.status();
        let body = res.bytes()?;
        let token: TokenResponse = decode_json("token", &body).map_err(PortalError::Identity)?;

        match token {
            TokenResponse {
                id_token: Some(id_token),
                error: None,
                ..
            } if status.is_success() => Ok(id_token),
            TokenResponse {
                error,
                error_description,
                ..
            } => Err(PortalError::Identity(format!(
                "token endpoint answered {}: {}",
                status,
                error_description
                    .or(error)
                    .unwrap_or_else(|| "no id token".to_string())
            ))),
        }
    }
}

/// 128 random bits, hex encoded.
pub fn random_token() -> PortalResult<String> {
    let mut bytes = [0u8; 16];
    rand_bytes(&mut bytes).map_err(|e| PortalError::Misc(Some(e.to_string())))?;
    Ok(hex::encode(bytes))
}

//==============================================================================
// ID tokens
//==============================================================================

#[derive(Clone, Debug, Deserialize)]
pub struct IdClaims {
    pub sub: String,
    pub oid: Option<String>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub email: Option<String>,
    pub preferred_username: Option<String>,
    pub nonce: Option<String>,
    pub exp: Option<i64>,
}

impl IdClaims {
    /// The directory object id when the provider sends one.
    pub fn actor_id(&self) -> &str {
        self.oid.as_ref().unwrap_or(&self.sub)
    }

    pub fn email(&self) -> Option<&str> {
        self.email
            .as_ref()
            .or_else(|| self.preferred_username.as_ref())
            .map(|s| s.as_str())
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }
}

/// Read the claims out of an ID token.
///
/// The signature isn't checked: the token only ever comes straight from the
/// token endpoint over TLS.
pub fn decode_id_token(token: &str) -> Result<IdClaims, String> {
    let payload = match token.split('.').collect::<Vec<_>>().as_slice() {
        [_header, payload, _signature] => payload.to_string(),
        parts => return Err(format!("expected 3 token segments, found {}", parts.len())),
    };

    // base64url without padding -> standard base64
    let mut standard = payload.replace('-', "+").replace('_', "/");
    while standard.len() % 4 != 0 {
        standard.push('=');
    }

    let bytes = base64::decode_block(&standard).map_err(|e| e.to_string())?;
    decode_json("id token", &bytes)
}

//==============================================================================
// Completing a sign-in
//==============================================================================

#[derive(Debug)]
pub enum LoginFailure {
    SsoDisabled,
    Provider(String),
    InvalidState,
    TokenExchange(PortalError),
    InvalidIdToken(String),
}

impl LoginFailure {
    /// Short code shown to the user as `/?error=<code>`.
    pub fn code(&self) -> &'static str {
        match self {
            LoginFailure::SsoDisabled => "missing_client_id",
            LoginFailure::Provider(_) => "azure_ad_error",
            LoginFailure::InvalidState => "invalid_state",
            LoginFailure::TokenExchange(_) => "token_exchange_failed",
            LoginFailure::InvalidIdToken(_) => "invalid_id_token",
        }
    }
}

impl fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginFailure::SsoDisabled => write!(f, "single sign-on isn't configured"),
            LoginFailure::Provider(why) => write!(f, "provider error: {}", why),
            LoginFailure::InvalidState => write!(f, "state mismatch"),
            LoginFailure::TokenExchange(e) => write!(f, "token exchange failed: {}", e),
            LoginFailure::InvalidIdToken(why) => write!(f, "unusable id token: {}", why),
        }
    }
}

/// What the provider posted back to the callback.
#[derive(Clone, Debug, Default)]
pub struct Callback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Values remembered in cookies when the round trip started.
#[derive(Clone, Debug, Default)]
pub struct Pending {
    pub state: Option<String>,
    pub nonce: Option<String>,
}

pub struct SignIn<'a> {
    pub provider: Option<&'a dyn IdentityProvider>,
    pub directory: &'a dyn Directory,
    pub setup: &'a PortalSetup,
    pub session_ttl_hours: i64,
}

impl<'a> SignIn<'a> {
    pub fn complete(
        &self,
        callback: Callback,
        pending: Pending,
        now: DateTime<Utc>,
    ) -> Result<Session, LoginFailure> {
        let provider = match self.provider {
            Some(provider) => provider,
            None => return Err(LoginFailure::SsoDisabled),
        };

        if let Some(error) = callback.error {
            return Err(LoginFailure::Provider(
                callback.error_description.unwrap_or(error),
            ));
        }

        match (callback.state.as_ref(), pending.state.as_ref()) {
            (Some(got), Some(expected)) if got == expected => (),
            _ => return Err(LoginFailure::InvalidState),
        }

        let code = match callback.code {
            Some(code) => code,
            None => return Err(LoginFailure::Provider("no authorization code".to_string())),
        };

        let id_token = provider.redeem(&code).map_err(LoginFailure::TokenExchange)?;
        let claims = decode_id_token(&id_token).map_err(LoginFailure::InvalidIdToken)?;

        match (claims.nonce.as_ref(), pending.nonce.as_ref()) {
            (Some(got), Some(expected)) if got == expected => (),
            (_, None) => return Err(LoginFailure::InvalidIdToken("no pending nonce".to_string())),
            _ => return Err(LoginFailure::InvalidIdToken("nonce mismatch".to_string())),
        }
        if claims.expires_at().map(|exp| exp < now).unwrap_or(false) {
            return Err(LoginFailure::InvalidIdToken("token expired".to_string()));
        }

        Ok(self.session_for(&claims, now))
    }

    fn session_for(&self, claims: &IdClaims, now: DateTime<Utc>) -> Session {
        let email = claims.email().unwrap_or("").to_string();
        let role = if self.setup.is_whitelisted_admin(&email) {
            Role::Admin
        } else {
            Role::Staff
        };

        // the directory only adds the department, sign-in works without it
        let department = match self.directory.lookup(claims.actor_id()) {
            Ok(entry) => entry.and_then(|e| e.department),
            Err(why) => {
                warn!("couldn't look up {} in the directory: {}", claims.actor_id(), why);
                None
            }
        };

        let username = claims
            .given_name
            .clone()
            .or_else(|| claims.name.clone())
            .unwrap_or_else(|| email.clone());

        info!("{} signed in via SSO as {:?}", claims.actor_id(), role);
        Session::new(
            claims.actor_id().to_string(),
            username,
            email,
            role,
            department,
            now,
            self.session_ttl_hours,
        )
    }
}

/// Username/password sign-in for the local admin accounts.
pub fn local_login(
    admins: &[LocalAdmin],
    username: &str,
    password: &str,
    now: DateTime<Utc>,
    session_ttl_hours: i64,
) -> PortalResult<Session> {
    let admin = match admins.iter().find(|a| a.username == username) {
        Some(admin) if admin.verify_password(password) => admin,
        _ => {
            warn!("failed local login for {:?}", username);
            throw!(PortalError::Unauthorized("invalid username or password".to_string()));
        }
    };

    info!("local admin {} signed in", admin.id);
    Ok(Session::new(
        admin.id.clone(),
        admin.username.clone(),
        admin.email.clone(),
        Role::Admin,
        None,
        now,
        session_ttl_hours,
    ))
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::Mutex;

    use super::*;
    use crate::directory::test::staff_directory;
    use crate::setup::{parse_local_admins, SETUP};

    /// Signs everything in as whoever `claims` describes, echoing the last
    /// nonce it was handed unless `claims` carries its own.
    pub(crate) struct FakeProvider {
        pub claims: serde_json::Value,
        pub last_nonce: Mutex<Option<String>>,
    }

    impl FakeProvider {
        pub(crate) fn new(claims: serde_json::Value) -> Self {
            FakeProvider {
                claims,
                last_nonce: Mutex::new(None),
            }
        }
    }

    pub(crate) fn unsigned_token(claims: &serde_json::Value) -> String {
        let payload = base64::encode_block(claims.to_string().as_bytes())
            .trim_end_matches('=')
            .replace('+', "-")
            .replace('/', "_");
        format!("eyJhbGciOiJub25lIn0.{}.", payload)
    }

    impl IdentityProvider for FakeProvider {
        fn authorize_url(&self, state: &str, nonce: &str) -> PortalResult<String> {
            *self.last_nonce.lock().unwrap() = Some(nonce.to_string());
            Ok(format!("https://idp.example/authorize?state={}&nonce={}", state, nonce))
        }

        fn redeem(&self, code: &str) -> PortalResult<String> {
            if code == "bad-code" {
                throw!(PortalError::Identity("invalid_grant".to_string()));
            }

            let mut claims = self.claims.clone();
            if claims.get("nonce").is_none() {
                if let Some(ref nonce) = *self.last_nonce.lock().unwrap() {
                    claims["nonce"] = json!(nonce);
                }
            }
            Ok(unsigned_token(&claims))
        }
    }

    fn sign_in<'a>(provider: &'a FakeProvider, directory: &'a dyn Directory) -> SignIn<'a> {
        SignIn {
            provider: Some(provider as &dyn IdentityProvider),
            directory,
            setup: &SETUP,
            session_ttl_hours: 24,
        }
    }

    fn callback(state: &str) -> Callback {
        Callback {
            code: Some("abc".to_string()),
            state: Some(state.to_string()),
            ..Callback::default()
        }
    }

    fn pending(state: &str, nonce: &str) -> Pending {
        Pending {
            state: Some(state.to_string()),
            nonce: Some(nonce.to_string()),
        }
    }

    #[test]
    fn authorize_url_carries_the_flow_parameters() {
        let azure = AzureAd::new(
            SsoConfig {
                tenant_id: "contoso".to_string(),
                client_id: "client-1".to_string(),
                client_secret: "secret".to_string(),
            },
            "https://portal.example/",
        )
        .unwrap();

        let url = Url::parse(&azure.authorize_url("s1", "n1").unwrap()).unwrap();
        let params = url.query_pairs().into_owned().collect::<std::collections::HashMap<_, _>>();

        assert_eq!(url.host_str(), Some("login.microsoftonline.com"));
        assert_eq!(params["response_mode"], "form_post");
        assert_eq!(params["scope"], "openid profile email");
        assert_eq!(params["redirect_uri"], "https://portal.example/api/auth/callback");
        assert_eq!(params["state"], "s1");
        assert_eq!(params["nonce"], "n1");
        assert!(!params.contains_key("client_secret"));
    }

    #[test]
    fn random_tokens_differ() {
        let a = random_token().unwrap();
        let b = random_token().unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn id_token_claims_decode() {
        // "?" and ">" produce the url-safe alphabet's '_' and '-'
        let claims = json!({"sub": "s", "oid": "o", "name": "Ada >>> ???", "nonce": "n"});
        let decoded = decode_id_token(&unsigned_token(&claims)).unwrap();

        assert_eq!(decoded.actor_id(), "o");
        assert_eq!(decoded.name.as_ref().unwrap(), "Ada >>> ???");
        assert_eq!(decoded.email(), None);

        assert!(decode_id_token("not-a-jwt").is_err());
        assert!(decode_id_token("a.%%%.c").is_err());
    }

    #[test]
    fn staff_sign_in() {
        let provider = FakeProvider::new(json!({
            "sub": "sub-1", "oid": "grace", "given_name": "Grace",
            "preferred_username": "grace@example.org", "nonce": "n1"
        }));
        let dir = staff_directory();

        let session = sign_in(&provider, &dir)
            .complete(callback("s1"), pending("s1", "n1"), Utc::now())
            .unwrap();

        assert_eq!(session.id, "grace");
        assert_eq!(session.username, "Grace");
        assert_eq!(session.email, "grace@example.org");
        assert_eq!(session.role, Role::Staff);
        assert_eq!(session.department.as_ref().unwrap(), "Finance");
    }

    #[test]
    fn whitelisted_email_gets_admin() {
        let provider =
            FakeProvider::new(json!({"sub": "x", "email": "PAYOTA@nssfug.org", "nonce": "n1"}));
        let dir = staff_directory();

        let session = sign_in(&provider, &dir)
            .complete(callback("s1"), pending("s1", "n1"), Utc::now())
            .unwrap();
        assert!(session.is_admin());
        assert_eq!(session.id, "x");
    }

    #[test]
    fn round_trip_checks() {
        let provider = FakeProvider::new(json!({"sub": "x", "nonce": "n1", "exp": 1}));
        let dir = staff_directory();
        let flow = sign_in(&provider, &dir);
        let code = |r: Result<Session, LoginFailure>| r.map(|_| ()).unwrap_err().code();

        assert_eq!(
            code(flow.complete(callback("s1"), pending("other", "n1"), Utc::now())),
            "invalid_state"
        );
        assert_eq!(
            code(flow.complete(callback("s1"), Pending::default(), Utc::now())),
            "invalid_state"
        );
        assert_eq!(
            code(flow.complete(
                Callback {
                    error: Some("access_denied".to_string()),
                    ..callback("s1")
                },
                pending("s1", "n1"),
                Utc::now()
            )),
            "azure_ad_error"
        );
        assert_eq!(
            code(flow.complete(
                Callback {
                    code: Some("bad-code".to_string()),
                    ..callback("s1")
                },
                pending("s1", "n1"),
                Utc::now()
            )),
            "token_exchange_failed"
        );
        assert_eq!(
            code(flow.complete(callback("s1"), pending("s1", "other"), Utc::now())),
            "invalid_id_token"
        );
        // a lost or expired nonce cookie doesn't skip the check
        assert_eq!(
            code(flow.complete(
                callback("s1"),
                Pending {
                    state: Some("s1".to_string()),
                    nonce: None,
                },
                Utc::now()
            )),
            "invalid_id_token"
        );
        // exp = 1 is long gone
        assert_eq!(
            code(flow.complete(callback("s1"), pending("s1", "n1"), Utc::now())),
            "invalid_id_token"
        );

        let disabled = SignIn {
            provider: None,
            ..flow
        };
        assert_eq!(
            code(disabled.complete(callback("s1"), pending("s1", "n1"), Utc::now())),
            "missing_client_id"
        );
    }

    pub(crate) fn local_admins() -> Vec<LocalAdmin> {
        // sha256("hunter2")
        parse_local_admins(
            "Admin:admin@example.org:f52fbd32b2b3b86ff88ef6c490628285f482af15ddcb29541f94bcf526a3f6c7",
        )
        .unwrap()
    }

    #[test]
    fn local_admin_login() {
        let now = Utc::now();
        let admins = local_admins();
        let session = local_login(&admins, "Admin", "hunter2", now, 24).unwrap();
        assert!(session.is_admin());
        assert_eq!(session.id, "admin");

        match local_login(&admins, "Admin", "wrong", now, 24) {
            Err(PortalError::Unauthorized(_)) => (),
            other => panic!("expected unauthorized, got {:?}", other),
        }
        assert!(local_login(&admins, "nobody", "hunter2", now, 24).is_err());
        assert!(local_login(&[], "Admin", "hunter2", now, 24).is_err());
    }
}
