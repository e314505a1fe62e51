//! Submitting, listing and triaging feedback.

use chrono::{DateTime, Utc};

use crate::directory::Directory;
use crate::domain::feedback::{FeedbackRecord, FeedbackStatus, NewFeedback, Validity};
use crate::error::{PortalError, PortalResult};
use crate::session::Session;
use crate::setup::SETUP;
use crate::status::refresh_statuses;
use crate::store::{FeedbackStore, SortOrder};
use crate::updates::FeedbackUpdate;

const MIN_TITLE_CHARS: usize = 5;
const MIN_TEXT_CHARS: usize = 10;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSubmission {
    pub title: String,
    pub department: String,
    pub concern: String,
    #[serde(default)]
    pub possible_solution: Option<String>,
    pub validity: Validity,
    /// Leave the submitter off the stored record.
    #[serde(default)]
    pub anonymous: bool,
}

impl FeedbackSubmission {
    pub fn validate(self, actor: &Session, now: DateTime<Utc>) -> PortalResult<NewFeedback> {
        let possible_solution = self
            .possible_solution
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let problems = field_problems(
            &self.title,
            &self.department,
            &self.concern,
            possible_solution.as_ref().map(|s| s.as_str()),
            &self.validity,
        );
        if !problems.is_empty() {
            throw!(PortalError::Validation(problems));
        }

        Ok(NewFeedback {
            title: self.title.trim().to_string(),
            department: self.department,
            concern: self.concern.trim().to_string(),
            possible_solution,
            submitted_by: if self.anonymous {
                None
            } else {
                Some(actor.id.clone())
            },
            validity: self.validity,
            created_at: now,
        })
    }
}

/// Every problem with a set of feedback fields, in field order.
pub(crate) fn field_problems(
    title: &str,
    department: &str,
    concern: &str,
    possible_solution: Option<&str>,
    validity: &Validity,
) -> Vec<String> {
    let mut problems = Vec::new();

    if title.trim().chars().count() < MIN_TITLE_CHARS {
        problems.push(format!("title must be at least {} characters", MIN_TITLE_CHARS));
    }
    if !SETUP.is_department(department) {
        problems.push(format!("unknown department {:?}", department));
    }
    if concern.trim().chars().count() < MIN_TEXT_CHARS {
        problems.push(format!("concern must be at least {} characters", MIN_TEXT_CHARS));
    }
    if let Some(solution) = possible_solution {
        if solution.trim().chars().count() < MIN_TEXT_CHARS {
            problems.push(format!(
                "possible solution must be at least {} characters",
                MIN_TEXT_CHARS
            ));
        }
    }
    if validity.end_date <= validity.start_date {
        problems.push("validity must end after it starts".to_string());
    }

    problems
}

/// All feedback, newest first, with overdue statuses brought up to date.
pub fn list_feedback(
    store: &dyn FeedbackStore,
    status: Option<FeedbackStatus>,
    now: DateTime<Utc>,
) -> PortalResult<Vec<FeedbackRecord>> {
    let records = store.find_all(SortOrder::NewestFirst)?;
    let mut records = refresh_statuses(store, records, now)?;

    if let Some(status) = status {
        records.retain(|r| r.status == status);
    }

    Ok(records)
}

pub fn submit_feedback(
    store: &dyn FeedbackStore,
    actor: &Session,
    submission: FeedbackSubmission,
    now: DateTime<Utc>,
) -> PortalResult<FeedbackRecord> {
    let new = submission.validate(actor, now)?;
    let record = store.create(&new)?;
    info!(
        "feedback {} submitted to {} ({})",
        record.id,
        record.department,
        if record.submitted_by.is_some() {
            "signed"
        } else {
            "anonymous"
        }
    );
    Ok(record)
}

pub fn get_feedback(
    store: &dyn FeedbackStore,
    id: i32,
    now: DateTime<Utc>,
) -> PortalResult<FeedbackRecord> {
    let record = match store.find_by_id(id)? {
        Some(record) => record,
        None => throw!(PortalError::not_found("feedback", id)),
    };

    let mut refreshed = refresh_statuses(store, vec![record], now)?;
    refreshed
        .pop()
        .ok_or_else(|| PortalError::not_found("feedback", id))
}

pub fn update_feedback(
    store: &dyn FeedbackStore,
    directory: &dyn Directory,
    actor: &Session,
    id: i32,
    update: FeedbackUpdate,
    now: DateTime<Utc>,
) -> PortalResult<FeedbackRecord> {
    let mut record = get_feedback(store, id, now)?;
    let action = update.name();

    update.apply(&mut record, actor, directory, now)?;
    store.update(&record)?;

    debug!("{} applied {} to feedback {}", actor.id, action, id);
    Ok(record)
}

pub fn delete_feedback(store: &dyn FeedbackStore, actor: &Session, id: i32) -> PortalResult<()> {
    if !actor.is_admin() {
        throw!(PortalError::Forbidden("only admins can delete feedback".to_string()));
    }

    if !store.delete(id)? {
        throw!(PortalError::not_found("feedback", id));
    }

    info!("feedback {} deleted by {}", id, actor.id);
    Ok(())
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;
    use crate::directory::test::staff_directory;
    use crate::session::test::{admin, staff};
    use crate::status::test::record;
    use crate::store::memory::MemoryStore;

    fn submission(now: DateTime<Utc>) -> FeedbackSubmission {
        FeedbackSubmission {
            title: "Broken lift".to_string(),
            department: "Finance".to_string(),
            concern: "The lift on floor 3 has been stuck for a week".to_string(),
            possible_solution: None,
            validity: Validity {
                start_date: now,
                end_date: now + Duration::days(14),
            },
            anonymous: false,
        }
    }

    #[test]
    fn every_violation_is_reported() {
        let now = Utc::now();
        let bad = FeedbackSubmission {
            title: "Lift".to_string(),
            department: "Catering".to_string(),
            concern: "Stuck".to_string(),
            possible_solution: Some("Fix".to_string()),
            validity: Validity {
                start_date: now,
                end_date: now,
            },
            anonymous: false,
        };

        match bad.validate(&staff("ada"), now) {
            Err(PortalError::Validation(problems)) => assert_eq!(problems.len(), 5),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn blank_solution_is_dropped() {
        let now = Utc::now();
        let new = FeedbackSubmission {
            possible_solution: Some("   ".to_string()),
            ..submission(now)
        }
        .validate(&staff("ada"), now)
        .unwrap();

        assert_eq!(new.possible_solution, None);
        assert_eq!(new.submitted_by.as_ref().unwrap(), "ada");
    }

    #[test]
    fn anonymous_submission_has_no_submitter() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let created = submit_feedback(
            &store,
            &staff("ada"),
            FeedbackSubmission {
                anonymous: true,
                ..submission(now)
            },
            now,
        )
        .unwrap();

        assert_eq!(created.submitted_by, None);
        assert_eq!(created.status, FeedbackStatus::Open);
        assert!(!created.approved);
    }

    #[test]
    fn listing_refreshes_and_filters() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut late = record(1, FeedbackStatus::Open, now - Duration::days(1));
        late.created_at = now - Duration::days(20);
        let mut fresh = record(2, FeedbackStatus::Open, now + Duration::days(1));
        fresh.created_at = now - Duration::days(2);
        store.seed_feedback(late);
        store.seed_feedback(fresh);

        let all = list_feedback(&store, None, now).unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(all[1].status, FeedbackStatus::Overdue);

        let overdue = list_feedback(&store, Some(FeedbackStatus::Overdue), now).unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, 1);

        // the overdue status was persisted on the first listing only
        assert_eq!(store.feedback_updates().len(), 1);
    }

    #[test]
    fn missing_feedback_is_not_found() {
        let store = MemoryStore::new();
        match get_feedback(&store, 42, Utc::now()) {
            Err(PortalError::NotFound(_)) => (),
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn update_is_saved() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.seed_feedback(record(1, FeedbackStatus::Open, now + Duration::days(3)));

        let updated = update_feedback(
            &store,
            &staff_directory(),
            &admin("root"),
            1,
            FeedbackUpdate::Assign {
                assigned_to: "grace".to_string(),
            },
            now,
        )
        .unwrap();

        assert_eq!(updated.status, FeedbackStatus::Pending);
        let saved = store.feedback_updates();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].assigned_to.as_ref().unwrap(), "grace");
    }

    #[test]
    fn rejected_update_saves_nothing() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.seed_feedback(record(1, FeedbackStatus::Open, now + Duration::days(3)));

        assert!(update_feedback(
            &store,
            &staff_directory(),
            &staff("ada"),
            1,
            FeedbackUpdate::Approve,
            now,
        )
        .is_err());
        assert!(store.feedback_updates().is_empty());
    }

    #[test]
    fn delete_is_admin_only() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.seed_feedback(record(1, FeedbackStatus::Open, now));

        assert!(delete_feedback(&store, &staff("staff-1"), 1).is_err());
        delete_feedback(&store, &admin("root"), 1).unwrap();

        match delete_feedback(&store, &admin("root"), 1) {
            Err(PortalError::NotFound(_)) => (),
            other => panic!("expected not found, got {:?}", other),
        }
    }
}
