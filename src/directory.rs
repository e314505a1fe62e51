//! The staff directory: who can be assigned feedback, and what we know about
//! them.

use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use url::Url;

use crate::config::SsoConfig;
use crate::error::{PortalError, PortalResult};
use crate::setup::PortalSetup;
use crate::utils::decode_json;

pub const MAX_PAGE_SIZE: usize = 100;

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const GRAPH_SELECT: &str = "id,displayName,mail,userPrincipalName,department";

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub department: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DirectoryPage {
    pub entries: Vec<DirectoryEntry>,
    /// Opaque cursor for the following page, if there is one.
    pub next: Option<String>,
}

pub trait Directory: Send + Sync {
    fn lookup(&self, actor_id: &str) -> PortalResult<Option<DirectoryEntry>>;

    fn list(&self, cursor: Option<&str>, page_size: usize) -> PortalResult<DirectoryPage>;
}

fn clamp_page_size(page_size: usize) -> usize {
    page_size.max(1).min(MAX_PAGE_SIZE)
}

//==============================================================================
// portal.toml
//==============================================================================

pub struct StaticDirectory {
    entries: Vec<DirectoryEntry>,
}

impl StaticDirectory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        StaticDirectory { entries }
    }

    pub fn from_setup(setup: &PortalSetup) -> Self {
        let entries = setup
            .staff()
            .iter()
            .map(|member| DirectoryEntry {
                id: member.id.clone(),
                name: member.name.clone(),
                email: Some(member.email.clone()),
                department: member.department.clone(),
            })
            .collect();

        StaticDirectory::new(entries)
    }
}

impl Directory for StaticDirectory {
    fn lookup(&self, actor_id: &str) -> PortalResult<Option<DirectoryEntry>> {
        Ok(self.entries.iter().find(|e| e.id == actor_id).cloned())
    }

    fn list(&self, cursor: Option<&str>, page_size: usize) -> PortalResult<DirectoryPage> {
        // the cursor is just an offset here
        let offset = match cursor {
            Some(c) => ok_or!(c.parse::<usize>(), {
                throw!(PortalError::Validation(vec![format!("invalid cursor {:?}", c)]))
            }),
            None => 0,
        };
        let end = offset
            .saturating_add(clamp_page_size(page_size))
            .min(self.entries.len());
        let entries = self.entries.get(offset..end).unwrap_or(&[]).to_vec();
        let next = if end < self.entries.len() {
            Some(end.to_string())
        } else {
            None
        };

        Ok(DirectoryPage { entries, next })
    }
}

//==============================================================================
// Microsoft Graph
//==============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    display_name: Option<String>,
    mail: Option<String>,
    user_principal_name: Option<String>,
    department: Option<String>,
}

impl From<GraphUser> for DirectoryEntry {
    fn from(user: GraphUser) -> Self {
        let email = user.mail.or(user.user_principal_name);
        DirectoryEntry {
            name: user
                .display_name
                .or_else(|| email.clone())
                .unwrap_or_else(|| user.id.clone()),
            id: user.id,
            email,
            department: user.department,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphUserPage {
    value: Vec<GraphUser>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct GraphDirectory {
    sso: SsoConfig,
    client: Client,
    token: Mutex<Option<AccessToken>>,
}

impl GraphDirectory {
    pub fn new(sso: SsoConfig) -> PortalResult<Self> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(10))
            .build()?;

        Ok(GraphDirectory {
            sso,
            client,
            token: Mutex::new(None),
        })
    }

    /// An app-only token, reused until a minute before it expires.
    fn access_token(&self) -> PortalResult<String> {
        let mut cached = match self.token.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Utc::now();

        if let Some(ref token) = *cached {
            if token.expires_at - Duration::minutes(1) > now {
                return Ok(token.value.clone());
            }
        }

        debug!("requesting a new Graph access token");
        let res = self
            .client
            .post(&self.sso.token_endpoint())
            .form(&[
                ("client_id", self.sso.client_id.as_str()),
                ("client_secret", self.sso.client_secret.as_str()),
                ("scope", GRAPH_SCOPE),
                ("grant_type", "client_credentials"),
            ])
            .send()?;

        let status = res.status();
        let body = res.bytes()?;
        if !status.is_success() {
            throw!(PortalError::Directory(format!(
                "token endpoint answered {}: {}",
                status,
                String::from_utf8_lossy(&body)
            )));
        }

        let token: TokenResponse = decode_json("token", &body).map_err(PortalError::Directory)?;
        let value = token.access_token.clone();
        *cached = Some(AccessToken {
            value: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        });

        Ok(value)
    }

    fn get(&self, url: &str) -> PortalResult<(StatusCode, Vec<u8>)> {
        let token = self.access_token()?;
        let res = self.client.get(url).bearer_auth(token).send()?;
        let status = res.status();
        let body = res.bytes()?.to_vec();
        Ok((status, body))
    }

    fn users_url(&self, actor_id: Option<&str>, page_size: usize) -> PortalResult<Url> {
        let mut url = Url::parse(&format!("{}/users", GRAPH_BASE))
            .map_err(|e| PortalError::Misc(Some(e.to_string())))?;

        if let Some(id) = actor_id {
            url.path_segments_mut()
                .map_err(|_| PortalError::Misc(Some("graph url can't be a base".to_string())))?
                .push(id);
        } else {
            url.query_pairs_mut()
                .append_pair("$top", &page_size.to_string());
        }
        url.query_pairs_mut().append_pair("$select", GRAPH_SELECT);

        Ok(url)
    }
}

impl Directory for GraphDirectory {
    fn lookup(&self, actor_id: &str) -> PortalResult<Option<DirectoryEntry>> {
        let url = self.users_url(Some(actor_id), 1)?;
        let (status, body) = self.get(url.as_str())?;

        match status {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let user: GraphUser = decode_json("user", &body).map_err(PortalError::Directory)?;
                Ok(Some(user.into()))
            }
            s => Err(PortalError::Directory(format!("user lookup answered {}", s))),
        }
    }

    fn list(&self, cursor: Option<&str>, page_size: usize) -> PortalResult<DirectoryPage> {
        let url = match cursor {
            // only ever follow links back to Graph, the bearer token goes along
            Some(next) if next.starts_with(GRAPH_BASE) => next.to_string(),
            Some(next) => throw!(PortalError::Validation(vec![format!(
                "invalid cursor {:?}",
                next
            )])),
            None => self.users_url(None, clamp_page_size(page_size))?.to_string(),
        };

        let (status, body) = self.get(&url)?;
        if !status.is_success() {
            throw!(PortalError::Directory(format!("user listing answered {}", status)));
        }

        let page: GraphUserPage = decode_json("user page", &body).map_err(PortalError::Directory)?;
        Ok(DirectoryPage {
            entries: page.value.into_iter().map(DirectoryEntry::from).collect(),
            next: page.next_link,
        })
    }
}
