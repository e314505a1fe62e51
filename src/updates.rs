//! The mutations a caller may request on a piece of feedback.
//!
//! Requests arrive as JSON tagged by `action`, e.g.
//! `{"action": "assign", "assignedTo": "<id>"}` or
//! `{"action": "patch", "fields": {"title": "..."}}`. Anything that doesn't
//! match one of these shapes is rejected before it gets near a record.

use chrono::{DateTime, Utc};

use crate::directory::Directory;
use crate::domain::feedback::{Comment, FeedbackRecord, FeedbackStatus, Validity};
use crate::error::{PortalError, PortalResult};
use crate::feedback::field_problems;
use crate::reactions::{toggle_reaction, Reaction};
use crate::session::Session;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum FeedbackUpdate {
    Like,
    Dislike,
    Comment {
        comment: String,
    },
    Approve,
    Assign {
        #[serde(rename = "assignedTo")]
        assigned_to: String,
    },
    Resolve,
    Patch {
        fields: FieldPatch,
    },
}

/// The only fields a submitter or admin may overwrite directly.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldPatch {
    pub title: Option<String>,
    pub department: Option<String>,
    pub concern: Option<String>,
    pub possible_solution: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl FeedbackUpdate {
    pub fn name(&self) -> &'static str {
        match self {
            FeedbackUpdate::Like => "like",
            FeedbackUpdate::Dislike => "dislike",
            FeedbackUpdate::Comment { .. } => "comment",
            FeedbackUpdate::Approve => "approve",
            FeedbackUpdate::Assign { .. } => "assign",
            FeedbackUpdate::Resolve => "resolve",
            FeedbackUpdate::Patch { .. } => "patch",
        }
    }

    /// Apply the update to `record` on behalf of `actor`.
    ///
    /// On error the record is left exactly as it was.
    pub fn apply(
        self,
        record: &mut FeedbackRecord,
        actor: &Session,
        directory: &dyn Directory,
        now: DateTime<Utc>,
    ) -> PortalResult<()> {
        match self {
            FeedbackUpdate::Like => toggle_reaction(record, &actor.id, Reaction::Like),
            FeedbackUpdate::Dislike => toggle_reaction(record, &actor.id, Reaction::Dislike),

            FeedbackUpdate::Comment { comment } => {
                let text = comment.trim();
                if text.is_empty() {
                    throw!(PortalError::Validation(vec![
                        "comment can't be blank".to_string()
                    ]));
                }
                record.comments.push(Comment {
                    user_id: actor.id.clone(),
                    comment: text.to_string(),
                    created_at: now,
                });
            }

            FeedbackUpdate::Approve => {
                admin_only(actor, "approve feedback")?;
                record.approved = true;
            }

            FeedbackUpdate::Assign { assigned_to } => {
                admin_only(actor, "assign feedback")?;
                if directory.lookup(&assigned_to)?.is_none() {
                    throw!(PortalError::NotFound(format!(
                        "user {} not found in the directory",
                        assigned_to
                    )));
                }
                record.assigned_to = Some(assigned_to);
                record.status = FeedbackStatus::Pending;
            }

            FeedbackUpdate::Resolve => {
                if !record.is_assignee(&actor.id) {
                    throw!(PortalError::Unauthorized(
                        "only the assignee can resolve this feedback".to_string()
                    ));
                }
                record.status = FeedbackStatus::Resolved;
            }

            FeedbackUpdate::Patch { fields } => {
                if !(actor.is_admin() || record.is_submitter(&actor.id)) {
                    throw!(PortalError::Forbidden(
                        "only admins and the submitter can edit feedback".to_string()
                    ));
                }
                fields.apply_to(record, now)?;
            }
        }

        record.updated_at = now;
        Ok(())
    }
}

fn admin_only(actor: &Session, what: &str) -> PortalResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(PortalError::Forbidden(format!("only admins can {}", what)))
    }
}

impl FieldPatch {
    fn is_empty(&self) -> bool {
        *self == FieldPatch::default()
    }

    /// Validate the patched record as a whole, then write it.
    fn apply_to(self, record: &mut FeedbackRecord, now: DateTime<Utc>) -> PortalResult<()> {
        if self.is_empty() {
            throw!(PortalError::Validation(vec!["nothing to change".to_string()]));
        }

        let title = self.title.unwrap_or_else(|| record.title.clone());
        let department = self.department.unwrap_or_else(|| record.department.clone());
        let concern = self.concern.unwrap_or_else(|| record.concern.clone());
        let possible_solution = match self.possible_solution {
            // an empty solution clears it
            Some(ref s) if s.trim().is_empty() => None,
            Some(s) => Some(s),
            None => record.possible_solution.clone(),
        };
        let validity = Validity {
            start_date: self.valid_from.unwrap_or(record.validity.start_date),
            end_date: self.valid_until.unwrap_or(record.validity.end_date),
        };

        let problems = field_problems(
            &title,
            &department,
            &concern,
            possible_solution.as_ref().map(|s| s.as_str()),
            &validity,
        );
        if !problems.is_empty() {
            throw!(PortalError::Validation(problems));
        }

        record.title = title.trim().to_string();
        record.department = department;
        record.concern = concern.trim().to_string();
        record.possible_solution = possible_solution.map(|s| s.trim().to_string());
        record.validity = validity;

        // a window pushed back into the future reopens overdue feedback
        if record.status == FeedbackStatus::Overdue && now <= record.validity.end_date {
            record.status = if record.assigned_to.is_some() {
                FeedbackStatus::Pending
            } else {
                FeedbackStatus::Open
            };
        }
        Ok(())
    }
}
