use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};

use super::{FeedbackStore, MoodStore, SortOrder};
use crate::domain::feedback::{
    Comment, CommentRow, FeedbackRecord, FeedbackRow, NewCommentRow, NewFeedback, NewFeedbackRow,
};
use crate::domain::mood::{MoodEntry, MoodRow, NewMoodEntry, NewMoodRow};
use crate::error::{PortalError, PortalResult};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
type DbConn = PooledConnection<ConnectionManager<PgConnection>>;

pub fn init_pool(db_url: &str, size: u32) -> PortalResult<DbPool> {
    info!("Initializing database connection pool.");

    let manager = ConnectionManager::<PgConnection>::new(db_url);

    match Pool::builder().max_size(size).build(manager) {
        Ok(p) => {
            info!("DB connection pool established.");
            Ok(p)
        }
        Err(why) => {
            error!("Failed to establish DB connection pool: {}", why);
            Err(why.into())
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        PgStore { pool }
    }

    fn conn(&self) -> PortalResult<DbConn> {
        Ok(self.pool.get()?)
    }
}

fn comments_by_feedback(
    conn: &PgConnection,
    ids: Vec<i32>,
) -> PortalResult<BTreeMap<i32, Vec<Comment>>> {
    use crate::domain::schema::feedback_comment;

    let rows = feedback_comment::table
        .filter(feedback_comment::fk_feedback.eq_any(ids))
        .order(feedback_comment::id.asc())
        .load::<CommentRow>(conn)?;

    let mut grouped = BTreeMap::new();
    for row in rows {
        grouped
            .entry(row.fk_feedback)
            .or_insert_with(Vec::new)
            .push(Comment::from(row));
    }

    Ok(grouped)
}

impl FeedbackStore for PgStore {
    fn create(&self, new: &NewFeedback) -> PortalResult<FeedbackRecord> {
        use crate::domain::schema::feedback;
        let conn = &*self.conn()?;

        let row = diesel::insert_into(feedback::table)
            .values(&NewFeedbackRow::from(new))
            .get_result::<FeedbackRow>(conn)?;

        row.into_record(Vec::new())
    }

    fn find_by_id(&self, id: i32) -> PortalResult<Option<FeedbackRecord>> {
        use crate::domain::schema::feedback;
        let conn = &*self.conn()?;

        let row = match feedback::table
            .find(id)
            .first::<FeedbackRow>(conn)
            .optional()?
        {
            Some(row) => row,
            None => return Ok(None),
        };

        let mut comments = comments_by_feedback(conn, vec![id])?;
        let comments = comments.remove(&id).unwrap_or_default();

        Ok(Some(row.into_record(comments)?))
    }

    fn find_all(&self, order: SortOrder) -> PortalResult<Vec<FeedbackRecord>> {
        use crate::domain::schema::feedback;
        let conn = &*self.conn()?;

        let rows = match order {
            SortOrder::NewestFirst => feedback::table
                .order(feedback::created_at.desc())
                .load::<FeedbackRow>(conn)?,
            SortOrder::OldestFirst => feedback::table
                .order(feedback::created_at.asc())
                .load::<FeedbackRow>(conn)?,
        };

        let mut comments = comments_by_feedback(conn, rows.iter().map(|r| r.id).collect())?;

        rows.into_iter()
            .map(|row| {
                let thread = comments.remove(&row.id).unwrap_or_default();
                row.into_record(thread)
            })
            .collect()
    }

    fn update(&self, record: &FeedbackRecord) -> PortalResult<()> {
        use crate::domain::schema::{feedback, feedback_comment};
        let conn = &*self.conn()?;

        conn.transaction::<_, PortalError, _>(|| {
            let row = FeedbackRow::from(record);
            let updated = diesel::update(feedback::table.find(record.id))
                .set(&row)
                .execute(conn)?;

            if updated == 0 {
                throw!(PortalError::not_found("feedback", record.id));
            }

            // comments are part of the document, rewrite them wholesale
            diesel::delete(
                feedback_comment::table.filter(feedback_comment::fk_feedback.eq(record.id)),
            )
            .execute(conn)?;

            let thread = record
                .comments
                .iter()
                .map(|c| NewCommentRow {
                    fk_feedback: record.id,
                    author: &c.user_id,
                    body: &c.comment,
                    created_at: c.created_at,
                })
                .collect::<Vec<_>>();

            if !thread.is_empty() {
                diesel::insert_into(feedback_comment::table)
                    .values(&thread)
                    .execute(conn)?;
            }

            Ok(())
        })
    }

    fn delete(&self, id: i32) -> PortalResult<bool> {
        use crate::domain::schema::feedback;
        let conn = &*self.conn()?;

        // comments go with it (ON DELETE CASCADE)
        let deleted = diesel::delete(feedback::table.find(id)).execute(conn)?;
        Ok(deleted > 0)
    }
}

impl MoodStore for PgStore {
    fn create(&self, new: &NewMoodEntry) -> PortalResult<MoodEntry> {
        use crate::domain::schema::mood_entry;
        let conn = &*self.conn()?;

        diesel::insert_into(mood_entry::table)
            .values(&NewMoodRow::from(new))
            .get_result::<MoodRow>(conn)?
            .into_entry()
    }

    fn find_by_id(&self, id: i32) -> PortalResult<Option<MoodEntry>> {
        use crate::domain::schema::mood_entry;
        let conn = &*self.conn()?;

        mood_entry::table
            .find(id)
            .first::<MoodRow>(conn)
            .optional()?
            .map(MoodRow::into_entry)
            .transpose()
    }

    fn find_all(&self, order: SortOrder) -> PortalResult<Vec<MoodEntry>> {
        use crate::domain::schema::mood_entry;
        let conn = &*self.conn()?;

        let rows = match order {
            SortOrder::NewestFirst => mood_entry::table
                .order(mood_entry::created_at.desc())
                .load::<MoodRow>(conn)?,
            SortOrder::OldestFirst => mood_entry::table
                .order(mood_entry::created_at.asc())
                .load::<MoodRow>(conn)?,
        };

        rows.into_iter().map(MoodRow::into_entry).collect()
    }

    fn find_since(&self, since: DateTime<Utc>) -> PortalResult<Vec<MoodEntry>> {
        use crate::domain::schema::mood_entry;
        let conn = &*self.conn()?;

        mood_entry::table
            .filter(mood_entry::created_at.ge(since))
            .order(mood_entry::created_at.desc())
            .load::<MoodRow>(conn)?
            .into_iter()
            .map(MoodRow::into_entry)
            .collect()
    }

    fn find_for_actor_since(
        &self,
        actor: &str,
        since: DateTime<Utc>,
    ) -> PortalResult<Option<MoodEntry>> {
        use crate::domain::schema::mood_entry;
        let conn = &*self.conn()?;

        mood_entry::table
            .filter(mood_entry::submitted_by.eq(actor))
            .filter(mood_entry::created_at.ge(since))
            .order(mood_entry::created_at.desc())
            .first::<MoodRow>(conn)
            .optional()?
            .map(MoodRow::into_entry)
            .transpose()
    }

    fn update(&self, entry: &MoodEntry) -> PortalResult<()> {
        use crate::domain::schema::mood_entry;
        let conn = &*self.conn()?;

        let row = MoodRow::from(entry);
        let updated = diesel::update(mood_entry::table.find(entry.id))
            .set(&row)
            .execute(conn)?;

        if updated == 0 {
            throw!(PortalError::not_found("mood entry", entry.id));
        }
        Ok(())
    }

    fn delete(&self, id: i32) -> PortalResult<bool> {
        use crate::domain::schema::mood_entry;
        let conn = &*self.conn()?;

        let deleted = diesel::delete(mood_entry::table.find(id)).execute(conn)?;
        Ok(deleted > 0)
    }
}
