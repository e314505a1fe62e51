//! Overdue derivation for feedback.
//!
//! A piece of feedback is Overdue once its validity window has ended, unless
//! it has already been resolved. The stored status is otherwise left alone:
//! Open/Pending/Resolved only change through explicit updates.

use chrono::{DateTime, Utc};

use crate::domain::feedback::{FeedbackRecord, FeedbackStatus};
use crate::error::PortalResult;
use crate::store::FeedbackStore;

pub fn derive_status(record: &FeedbackRecord, now: DateTime<Utc>) -> FeedbackStatus {
    if record.status != FeedbackStatus::Resolved && now > record.validity.end_date {
        FeedbackStatus::Overdue
    } else {
        record.status
    }
}

/// Recompute every record's status and save the ones that changed.
///
/// This is a plain read-modify-write: two requests refreshing the same
/// record at once may interleave their saves. A failed save is returned to
/// the caller as-is.
pub fn refresh_statuses(
    store: &dyn FeedbackStore,
    records: Vec<FeedbackRecord>,
    now: DateTime<Utc>,
) -> PortalResult<Vec<FeedbackRecord>> {
    let mut refreshed = Vec::with_capacity(records.len());

    for mut record in records {
        let derived = derive_status(&record, now);
        if derived != record.status {
            info!(
                "feedback {} moved from {} to {} (validity ended {})",
                record.id, record.status, derived, record.validity.end_date
            );
            record.status = derived;
            record.updated_at = now;
            store.update(&record)?;
        }
        refreshed.push(record);
    }

    Ok(refreshed)
}

#[cfg(test)]
pub(crate) mod test {
    use chrono::Duration;

    use super::*;
    use crate::domain::feedback::Validity;
    use crate::store::memory::MemoryStore;

    pub(crate) fn record(id: i32, status: FeedbackStatus, ends: DateTime<Utc>) -> FeedbackRecord {
        FeedbackRecord {
            id,
            title: format!("Feedback #{}", id),
            department: "Finance".to_string(),
            concern: "Printers on the second floor keep jamming".to_string(),
            possible_solution: None,
            submitted_by: Some("staff-1".to_string()),
            assigned_to: None,
            status,
            likes: Vec::new(),
            dislikes: Vec::new(),
            comments: Vec::new(),
            approved: false,
            validity: Validity {
                start_date: ends - Duration::days(14),
                end_date: ends,
            },
            created_at: ends - Duration::days(14),
            updated_at: ends - Duration::days(14),
        }
    }

    macro_rules! derive_case {
        ($test: ident, $status: expr, $ends_in_hours: expr, $expected: expr) => {
            #[test]
            fn $test() {
                let now = Utc::now();
                let r = record(1, $status, now + Duration::hours($ends_in_hours));
                assert_eq!(derive_status(&r, now), $expected);
            }
        };
    }

    derive_case!(open_past_end_is_overdue, FeedbackStatus::Open, -1, FeedbackStatus::Overdue);
    derive_case!(pending_past_end_is_overdue, FeedbackStatus::Pending, -48, FeedbackStatus::Overdue);
    derive_case!(resolved_never_overdue, FeedbackStatus::Resolved, -48, FeedbackStatus::Resolved);
    derive_case!(open_within_window_unchanged, FeedbackStatus::Open, 1, FeedbackStatus::Open);
    derive_case!(pending_within_window_unchanged, FeedbackStatus::Pending, 3, FeedbackStatus::Pending);
    derive_case!(overdue_stays_overdue, FeedbackStatus::Overdue, -3, FeedbackStatus::Overdue);

    #[test]
    fn end_instant_itself_is_not_overdue() {
        let now = Utc::now();
        let r = record(1, FeedbackStatus::Open, now);
        assert_eq!(derive_status(&r, now), FeedbackStatus::Open);
    }

    #[test]
    fn derivation_is_idempotent() {
        let now = Utc::now();
        for status in FeedbackStatus::ALL.iter() {
            for hours in &[-30i64, 0, 30] {
                let mut r = record(1, *status, now + Duration::hours(*hours));
                r.status = derive_status(&r, now);
                let once = r.status;
                assert_eq!(derive_status(&r, now), once);
            }
        }
    }

    #[test]
    fn expired_open_record_is_saved_once() {
        let now = Utc::now();
        let store = MemoryStore::new();
        store.seed_feedback(record(1, FeedbackStatus::Open, now - Duration::days(1)));
        store.seed_feedback(record(2, FeedbackStatus::Open, now + Duration::days(1)));
        store.seed_feedback(record(3, FeedbackStatus::Resolved, now - Duration::days(1)));

        let records = FeedbackStore::find_all(&store, crate::store::SortOrder::OldestFirst).unwrap();
        let refreshed = refresh_statuses(&store, records, now).unwrap();

        let statuses = refreshed.iter().map(|r| r.status).collect::<Vec<_>>();
        assert_eq!(
            statuses,
            vec![FeedbackStatus::Overdue, FeedbackStatus::Open, FeedbackStatus::Resolved]
        );

        let updates = store.feedback_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, 1);
        assert_eq!(updates[0].status, FeedbackStatus::Overdue);

        // a second pass has nothing left to save
        refresh_statuses(&store, refreshed, now).unwrap();
        assert_eq!(store.feedback_updates().len(), 1);
    }

    #[test]
    fn failed_save_surfaces() {
        let now = Utc::now();
        let store = MemoryStore::new();
        store.seed_feedback(record(1, FeedbackStatus::Pending, now - Duration::hours(2)));
        store.fail_updates();

        let records = FeedbackStore::find_all(&store, crate::store::SortOrder::OldestFirst).unwrap();
        assert!(refresh_statuses(&store, records, now).is_err());
    }
}
