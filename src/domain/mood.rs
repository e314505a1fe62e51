use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::schema::mood_entry;
use crate::error::PortalError;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Good,
    Fair,
    Bad,
}

const MOOD_REPR_GOOD: &str = "good";
const MOOD_REPR_FAIR: &str = "fair";
const MOOD_REPR_BAD: &str = "bad";

impl Mood {
    pub fn repr(self) -> &'static str {
        match self {
            Mood::Good => MOOD_REPR_GOOD,
            Mood::Fair => MOOD_REPR_FAIR,
            Mood::Bad => MOOD_REPR_BAD,
        }
    }

    /// Ordinal weight used for mood scores.
    pub fn weight(self) -> f64 {
        match self {
            Mood::Good => 1.0,
            Mood::Fair => 0.5,
            Mood::Bad => 0.0,
        }
    }
}

impl FromStr for Mood {
    type Err = PortalError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        Ok(match string {
            MOOD_REPR_GOOD => Mood::Good,
            MOOD_REPR_FAIR => Mood::Fair,
            MOOD_REPR_BAD => Mood::Bad,
            _ => throw!(PortalError::Validation(vec![format!(
                "mood must be one of good, fair, bad (got {:?})",
                string
            )])),
        })
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.repr())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    pub id: i32,
    pub mood: Mood,
    #[serde(rename = "userId")]
    pub submitted_by: String,
    pub department: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewMoodEntry {
    pub mood: Mood,
    pub submitted_by: String,
    pub department: String,
    pub created_at: DateTime<Utc>,
}

#[derive(AsChangeset, Clone, Debug, Identifiable, Queryable)]
#[table_name = "mood_entry"]
pub struct MoodRow {
    pub id: i32,
    pub mood: String,
    pub submitted_by: String,
    pub department: String,
    pub created_at: DateTime<Utc>,
}

impl MoodRow {
    pub fn into_entry(self) -> Result<MoodEntry, PortalError> {
        Ok(MoodEntry {
            id: self.id,
            mood: self.mood.parse()?,
            submitted_by: self.submitted_by,
            department: self.department,
            created_at: self.created_at,
        })
    }
}

impl<'a> From<&'a MoodEntry> for MoodRow {
    fn from(entry: &'a MoodEntry) -> Self {
        MoodRow {
            id: entry.id,
            mood: entry.mood.repr().to_string(),
            submitted_by: entry.submitted_by.clone(),
            department: entry.department.clone(),
            created_at: entry.created_at,
        }
    }
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "mood_entry"]
pub struct NewMoodRow<'a> {
    pub mood: &'a str,
    pub submitted_by: &'a str,
    pub department: &'a str,
    pub created_at: DateTime<Utc>,
}

impl<'a> From<&'a NewMoodEntry> for NewMoodRow<'a> {
    fn from(new: &'a NewMoodEntry) -> Self {
        NewMoodRow {
            mood: new.mood.repr(),
            submitted_by: &new.submitted_by,
            department: &new.department,
            created_at: new.created_at,
        }
    }
}
