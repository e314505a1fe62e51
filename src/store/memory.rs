//! In-process stand-in for the database, used by the tests.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{FeedbackStore, MoodStore, SortOrder};
use crate::domain::feedback::{FeedbackRecord, FeedbackStatus, NewFeedback};
use crate::domain::mood::{MoodEntry, NewMoodEntry};
use crate::error::{PortalError, PortalResult};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    feedback: Vec<FeedbackRecord>,
    moods: Vec<MoodEntry>,
    next_id: i32,
    feedback_updates: Vec<FeedbackRecord>,
    mood_updates: usize,
    fail_updates: bool,
}

impl Inner {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed record as-is, keeping its id.
    pub fn seed_feedback(&self, record: FeedbackRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id = inner.next_id.max(record.id);
        inner.feedback.push(record);
    }

    pub fn seed_mood(&self, entry: MoodEntry) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id = inner.next_id.max(entry.id);
        inner.moods.push(entry);
    }

    /// Every record passed to `FeedbackStore::update`, in call order.
    pub fn feedback_updates(&self) -> Vec<FeedbackRecord> {
        self.inner.lock().unwrap().feedback_updates.clone()
    }

    pub fn mood_updates(&self) -> usize {
        self.inner.lock().unwrap().mood_updates
    }

    pub fn fail_updates(&self) {
        self.inner.lock().unwrap().fail_updates = true;
    }
}

fn sorted<T, F>(mut items: Vec<T>, order: SortOrder, created_at: F) -> Vec<T>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    match order {
        SortOrder::NewestFirst => items.sort_by(|a, b| created_at(b).cmp(&created_at(a))),
        SortOrder::OldestFirst => items.sort_by_key(|i| created_at(i)),
    }
    items
}

impl FeedbackStore for MemoryStore {
    fn create(&self, new: &NewFeedback) -> PortalResult<FeedbackRecord> {
        let mut inner = self.inner.lock().unwrap();
        let record = FeedbackRecord {
            id: inner.next_id(),
            title: new.title.clone(),
            department: new.department.clone(),
            concern: new.concern.clone(),
            possible_solution: new.possible_solution.clone(),
            submitted_by: new.submitted_by.clone(),
            assigned_to: None,
            status: FeedbackStatus::Open,
            likes: Vec::new(),
            dislikes: Vec::new(),
            comments: Vec::new(),
            approved: false,
            validity: new.validity.clone(),
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        inner.feedback.push(record.clone());
        Ok(record)
    }

    fn find_by_id(&self, id: i32) -> PortalResult<Option<FeedbackRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.feedback.iter().find(|r| r.id == id).cloned())
    }

    fn find_all(&self, order: SortOrder) -> PortalResult<Vec<FeedbackRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(sorted(inner.feedback.clone(), order, |r| r.created_at))
    }

    fn update(&self, record: &FeedbackRecord) -> PortalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.feedback_updates.push(record.clone());

        if inner.fail_updates {
            throw!(PortalError::Misc(Some("store unavailable".to_string())));
        }

        match inner.feedback.iter_mut().find(|r| r.id == record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(PortalError::not_found("feedback", record.id)),
        }
    }

    fn delete(&self, id: i32) -> PortalResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.feedback.len();
        inner.feedback.retain(|r| r.id != id);
        Ok(inner.feedback.len() < before)
    }
}

impl MoodStore for MemoryStore {
    fn create(&self, new: &NewMoodEntry) -> PortalResult<MoodEntry> {
        let mut inner = self.inner.lock().unwrap();
        let entry = MoodEntry {
            id: inner.next_id(),
            mood: new.mood,
            submitted_by: new.submitted_by.clone(),
            department: new.department.clone(),
            created_at: new.created_at,
        };
        inner.moods.push(entry.clone());
        Ok(entry)
    }

    fn find_by_id(&self, id: i32) -> PortalResult<Option<MoodEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.moods.iter().find(|m| m.id == id).cloned())
    }

    fn find_all(&self, order: SortOrder) -> PortalResult<Vec<MoodEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(sorted(inner.moods.clone(), order, |m| m.created_at))
    }

    fn find_since(&self, since: DateTime<Utc>) -> PortalResult<Vec<MoodEntry>> {
        let all = MoodStore::find_all(self, SortOrder::NewestFirst)?;
        Ok(all.into_iter().filter(|m| m.created_at >= since).collect())
    }

    fn find_for_actor_since(
        &self,
        actor: &str,
        since: DateTime<Utc>,
    ) -> PortalResult<Option<MoodEntry>> {
        Ok(self
            .find_since(since)?
            .into_iter()
            .find(|m| m.submitted_by == actor))
    }

    fn update(&self, entry: &MoodEntry) -> PortalResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.mood_updates += 1;

        if inner.fail_updates {
            throw!(PortalError::Misc(Some("store unavailable".to_string())));
        }

        match inner.moods.iter_mut().find(|m| m.id == entry.id) {
            Some(stored) => {
                *stored = entry.clone();
                Ok(())
            }
            None => Err(PortalError::not_found("mood entry", entry.id)),
        }
    }

    fn delete(&self, id: i32) -> PortalResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.moods.len();
        inner.moods.retain(|m| m.id != id);
        Ok(inner.moods.len() < before)
    }
}
