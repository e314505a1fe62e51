use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::schema::{feedback, feedback_comment};
use crate::error::PortalError;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum FeedbackStatus {
    Open,
    Pending,
    Resolved,
    Overdue,
}

const STATUS_REPR_OPEN: &str = "Open";
const STATUS_REPR_PENDING: &str = "Pending";
const STATUS_REPR_RESOLVED: &str = "Resolved";
const STATUS_REPR_OVERDUE: &str = "Overdue";

impl FeedbackStatus {
    pub const ALL: [FeedbackStatus; 4] = [
        FeedbackStatus::Open,
        FeedbackStatus::Pending,
        FeedbackStatus::Resolved,
        FeedbackStatus::Overdue,
    ];

    pub fn repr(self) -> &'static str {
        match self {
            FeedbackStatus::Open => STATUS_REPR_OPEN,
            FeedbackStatus::Pending => STATUS_REPR_PENDING,
            FeedbackStatus::Resolved => STATUS_REPR_RESOLVED,
            FeedbackStatus::Overdue => STATUS_REPR_OVERDUE,
        }
    }
}

impl FromStr for FeedbackStatus {
    type Err = PortalError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        Ok(match string {
            STATUS_REPR_OPEN => FeedbackStatus::Open,
            STATUS_REPR_PENDING => FeedbackStatus::Pending,
            STATUS_REPR_RESOLVED => FeedbackStatus::Resolved,
            STATUS_REPR_OVERDUE => FeedbackStatus::Overdue,
            _ => throw!(PortalError::Misc(Some(format!(
                "unknown feedback status {:?}",
                string
            )))),
        })
    }
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.repr())
    }
}

/// The window during which a piece of feedback is considered active.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validity {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub user_id: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub id: i32,
    pub title: String,
    pub department: String,
    pub concern: String,
    pub possible_solution: Option<String>,
    pub submitted_by: Option<String>,
    pub assigned_to: Option<String>,
    pub status: FeedbackStatus,
    pub likes: Vec<String>,
    pub dislikes: Vec<String>,
    pub comments: Vec<Comment>,
    pub approved: bool,
    pub validity: Validity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn is_assignee(&self, actor_id: &str) -> bool {
        self.assigned_to.as_ref().map(|a| a == actor_id).unwrap_or(false)
    }

    pub fn is_submitter(&self, actor_id: &str) -> bool {
        self.submitted_by.as_ref().map(|s| s == actor_id).unwrap_or(false)
    }
}

/// A validated submission, ready to be stored.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewFeedback {
    pub title: String,
    pub department: String,
    pub concern: String,
    pub possible_solution: Option<String>,
    pub submitted_by: Option<String>,
    pub validity: Validity,
    pub created_at: DateTime<Utc>,
}

//==============================================================================
// Rows
//==============================================================================

#[derive(AsChangeset, Clone, Debug, Identifiable, Queryable)]
#[table_name = "feedback"]
#[changeset_options(treat_none_as_null = "true")]
pub struct FeedbackRow {
    pub id: i32,
    pub title: String,
    pub department: String,
    pub concern: String,
    pub possible_solution: Option<String>,
    pub submitted_by: Option<String>,
    pub assigned_to: Option<String>,
    pub status: String,
    pub likes: Vec<String>,
    pub dislikes: Vec<String>,
    pub approved: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedbackRow {
    pub fn into_record(self, comments: Vec<Comment>) -> Result<FeedbackRecord, PortalError> {
        Ok(FeedbackRecord {
            id: self.id,
            title: self.title,
            department: self.department,
            concern: self.concern,
            possible_solution: self.possible_solution,
            submitted_by: self.submitted_by,
            assigned_to: self.assigned_to,
            status: self.status.parse()?,
            likes: self.likes,
            dislikes: self.dislikes,
            comments,
            approved: self.approved,
            validity: Validity {
                start_date: self.valid_from,
                end_date: self.valid_until,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl<'a> From<&'a FeedbackRecord> for FeedbackRow {
    fn from(record: &'a FeedbackRecord) -> Self {
        FeedbackRow {
            id: record.id,
            title: record.title.clone(),
            department: record.department.clone(),
            concern: record.concern.clone(),
            possible_solution: record.possible_solution.clone(),
            submitted_by: record.submitted_by.clone(),
            assigned_to: record.assigned_to.clone(),
            status: record.status.repr().to_string(),
            likes: record.likes.clone(),
            dislikes: record.dislikes.clone(),
            approved: record.approved,
            valid_from: record.validity.start_date,
            valid_until: record.validity.end_date,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "feedback"]
pub struct NewFeedbackRow<'a> {
    pub title: &'a str,
    pub department: &'a str,
    pub concern: &'a str,
    pub possible_solution: Option<&'a str>,
    pub submitted_by: Option<&'a str>,
    pub status: &'a str,
    pub approved: bool,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a NewFeedback> for NewFeedbackRow<'a> {
    fn from(new: &'a NewFeedback) -> Self {
        NewFeedbackRow {
            title: &new.title,
            department: &new.department,
            concern: &new.concern,
            possible_solution: new.possible_solution.as_ref().map(|s| s.as_str()),
            submitted_by: new.submitted_by.as_ref().map(|s| s.as_str()),
            status: FeedbackStatus::Open.repr(),
            approved: false,
            valid_from: new.validity.start_date,
            valid_until: new.validity.end_date,
            created_at: new.created_at,
            updated_at: new.created_at,
        }
    }
}

#[derive(Clone, Debug, Queryable)]
pub struct CommentRow {
    pub id: i32,
    pub fk_feedback: i32,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            user_id: row.author,
            comment: row.body,
            created_at: row.created_at,
        }
    }
}

#[derive(Clone, Debug, Insertable)]
#[table_name = "feedback_comment"]
pub struct NewCommentRow<'a> {
    pub fk_feedback: i32,
    pub author: &'a str,
    pub body: &'a str,
    pub created_at: DateTime<Utc>,
}
