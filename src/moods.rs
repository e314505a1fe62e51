//! Daily mood check-ins.

use chrono::{DateTime, Duration, Utc};

use crate::analytics::{aggregate_moods, MoodReport};
use crate::domain::mood::{Mood, MoodEntry, NewMoodEntry};
use crate::error::{PortalError, PortalResult};
use crate::session::Session;
use crate::store::{MoodStore, SortOrder};
use crate::utils::start_of_day;

#[derive(Clone, Debug, Deserialize)]
pub struct MoodSubmission {
    pub mood: Mood,
    /// Falls back to the department on the caller's session.
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MoodChange {
    pub mood: Mood,
}

/// The caller's entry for the current local day, if they've made one.
pub fn todays_mood(
    store: &dyn MoodStore,
    actor: &Session,
    now: DateTime<Utc>,
) -> PortalResult<Option<MoodEntry>> {
    store.find_for_actor_since(&actor.id, start_of_day(now))
}

/// Everybody's entries for the current local day, newest first.
pub fn moods_today(store: &dyn MoodStore, now: DateTime<Utc>) -> PortalResult<Vec<MoodEntry>> {
    store.find_since(start_of_day(now))
}

pub fn record_mood(
    store: &dyn MoodStore,
    actor: &Session,
    submission: MoodSubmission,
    now: DateTime<Utc>,
) -> PortalResult<MoodEntry> {
    let department = submission
        .department
        .or_else(|| actor.department.clone())
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    let department = match department {
        Some(department) => department,
        None => throw!(PortalError::Validation(vec![
            "department is required".to_string()
        ])),
    };

    if let Some(existing) = todays_mood(store, actor, now)? {
        throw!(PortalError::Validation(vec![format!(
            "a mood was already recorded today (entry {})",
            existing.id
        )]));
    }

    let entry = store.create(&NewMoodEntry {
        mood: submission.mood,
        submitted_by: actor.id.clone(),
        department,
        created_at: now,
    })?;
    debug!("{} recorded a {} mood for {}", actor.id, entry.mood, entry.department);
    Ok(entry)
}

pub fn get_mood(store: &dyn MoodStore, id: i32) -> PortalResult<MoodEntry> {
    store
        .find_by_id(id)?
        .ok_or_else(|| PortalError::not_found("mood entry", id))
}

/// Only the submitter or an admin may touch an existing entry.
fn check_owner(entry: &MoodEntry, actor: &Session) -> PortalResult<()> {
    if actor.is_admin() || entry.submitted_by == actor.id {
        Ok(())
    } else {
        Err(PortalError::Forbidden(
            "mood entries can only be changed by their owner".to_string(),
        ))
    }
}

pub fn change_mood(
    store: &dyn MoodStore,
    actor: &Session,
    id: i32,
    change: MoodChange,
) -> PortalResult<MoodEntry> {
    let mut entry = get_mood(store, id)?;
    check_owner(&entry, actor)?;

    entry.mood = change.mood;
    store.update(&entry)?;
    Ok(entry)
}

pub fn delete_mood(store: &dyn MoodStore, actor: &Session, id: i32) -> PortalResult<()> {
    let entry = get_mood(store, id)?;
    check_owner(&entry, actor)?;

    if !store.delete(id)? {
        throw!(PortalError::not_found("mood entry", id));
    }
    Ok(())
}

/// Aggregate the last `days` days of entries, or every entry when `days` is
/// `None`.
pub fn mood_report(
    store: &dyn MoodStore,
    days: Option<u32>,
    now: DateTime<Utc>,
) -> PortalResult<MoodReport> {
    let entries = match days {
        Some(0) => throw!(PortalError::Validation(vec![
            "days must be at least 1".to_string()
        ])),
        Some(days) => match now.checked_sub_signed(Duration::days(i64::from(days))) {
            Some(since) => store.find_since(since)?,
            None => throw!(PortalError::Validation(vec![format!(
                "days is out of range (got {})",
                days
            )])),
        },
        None => store.find_all(SortOrder::OldestFirst)?,
    };

    Ok(aggregate_moods(&entries))
}
