//! Persistence collaborators for feedback and mood entries.
//!
//! Both stores behave like document collections: records are created,
//! fetched, saved whole and deleted by id. Nothing here serializes
//! concurrent writers; a save simply overwrites what was there.

use chrono::{DateTime, Utc};

use crate::domain::feedback::{FeedbackRecord, NewFeedback};
use crate::domain::mood::{MoodEntry, NewMoodEntry};
use crate::error::PortalResult;

#[cfg(test)]
pub mod memory;
pub mod pg;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortOrder {
    NewestFirst,
    OldestFirst,
}

pub trait FeedbackStore: Send + Sync {
    fn create(&self, new: &NewFeedback) -> PortalResult<FeedbackRecord>;

    fn find_by_id(&self, id: i32) -> PortalResult<Option<FeedbackRecord>>;

    fn find_all(&self, order: SortOrder) -> PortalResult<Vec<FeedbackRecord>>;

    /// Save the whole record, comments included. Unknown ids are `NotFound`.
    fn update(&self, record: &FeedbackRecord) -> PortalResult<()>;

    /// Returns whether a record was removed.
    fn delete(&self, id: i32) -> PortalResult<bool>;
}

pub trait MoodStore: Send + Sync {
    fn create(&self, new: &NewMoodEntry) -> PortalResult<MoodEntry>;

    fn find_by_id(&self, id: i32) -> PortalResult<Option<MoodEntry>>;

    fn find_all(&self, order: SortOrder) -> PortalResult<Vec<MoodEntry>>;

    /// Entries created at or after `since`, newest first.
    fn find_since(&self, since: DateTime<Utc>) -> PortalResult<Vec<MoodEntry>>;

    /// The most recent entry by `actor` created at or after `since`.
    fn find_for_actor_since(
        &self,
        actor: &str,
        since: DateTime<Utc>,
    ) -> PortalResult<Option<MoodEntry>>;

    fn update(&self, entry: &MoodEntry) -> PortalResult<()>;

    fn delete(&self, id: i32) -> PortalResult<bool>;
}
