use std::collections::BTreeSet;

use openssl::memcmp;
use openssl::sha::sha256;

//==============================================================================
// Public API
//==============================================================================

lazy_static! {
    pub static ref SETUP: PortalSetup = read_portal_cfg_validated();
}

#[derive(Debug, Deserialize)]
pub struct PortalSetup {
    departments: Vec<String>,
    #[serde(default)]
    admin_emails: Vec<String>,
    #[serde(default)]
    staff: Vec<StaffMember>,
}

impl PortalSetup {
    /// Departments in the order they should be offered.
    pub fn departments(&self) -> impl Iterator<Item = &str> {
        self.departments.iter().map(|d| d.as_str())
    }

    pub fn is_department(&self, name: &str) -> bool {
        self.departments.iter().any(|d| d == name)
    }

    /// Is this SSO address on the admin whitelist? Case-insensitive.
    pub fn is_whitelisted_admin(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|e| e.to_lowercase() == email)
    }

    pub fn staff(&self) -> &[StaffMember] {
        &self.staff
    }
}

/// A username/password account, configured through `LOCAL_ADMINS`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalAdmin {
    pub id: String,
    pub username: String,
    pub email: String,
    password_sha256: String,
}

impl LocalAdmin {
    pub fn verify_password(&self, password: &str) -> bool {
        let expected = match hex::decode(&self.password_sha256) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let actual = sha256(password.as_bytes());

        // memcmp::eq panics on length mismatch
        expected.len() == actual.len() && memcmp::eq(&expected, &actual)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    pub email: String,
    pub department: Option<String>,
}

/// Parse `username:email:sha256hex` entries separated by commas.
///
/// The session id of each account is its lowercased username.
pub fn parse_local_admins(input: &str) -> Result<Vec<LocalAdmin>, String> {
    let mut admins: Vec<LocalAdmin> = Vec::new();

    for entry in input.split(',').map(|e| e.trim()).filter(|e| !e.is_empty()) {
        let parts = entry.split(':').map(|p| p.trim()).collect::<Vec<_>>();
        let (username, email, digest) = match parts.as_slice() {
            [username, email, digest] if !username.is_empty() => (*username, *email, *digest),
            _ => return Err(format!("expected username:email:sha256, got {:?}", entry)),
        };

        if digest.len() != 64 || hex::decode(digest).is_err() {
            return Err(format!(
                "local admin {} needs a hex encoded sha256 password digest",
                username
            ));
        }
        if admins.iter().any(|a| a.username == username) {
            return Err(format!("local admin {} is listed twice", username));
        }

        admins.push(LocalAdmin {
            id: username.to_lowercase(),
            username: username.to_string(),
            email: email.to_string(),
            password_sha256: digest.to_lowercase(),
        });
    }

    Ok(admins)
}

//==============================================================================
// Implementation details
//==============================================================================

/// Read the validated `portal.toml` configuration file.
fn read_portal_cfg_validated() -> PortalSetup {
    let cfg = read_portal_cfg();
    cfg.validate().expect("portal.toml failed validation");
    cfg
}

/// Read the unprocessed `portal.toml` configuration file.
fn read_portal_cfg() -> PortalSetup {
    read_portal_cfg_from(include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/portal.toml"
    )))
}

fn read_portal_cfg_from(input: &str) -> PortalSetup {
    toml::from_str(input).expect("couldn't parse portal.toml!")
}

impl PortalSetup {
    fn validate(&self) -> Result<(), String> {
        if self.departments.is_empty() {
            return Err("at least one department is required".to_string());
        }

        let mut seen = BTreeSet::new();
        for department in &self.departments {
            if department.trim().is_empty() {
                return Err("department names can't be blank".to_string());
            }
            if !seen.insert(department.as_str()) {
                return Err(format!("department {:?} is listed twice", department));
            }
        }

        let mut ids = BTreeSet::new();
        for member in &self.staff {
            if !ids.insert(member.id.as_str()) {
                return Err(format!("staff id {} is listed twice", member.id));
            }
        }

        Ok(())
    }
}

//==============================================================================
// Tests
//==============================================================================
