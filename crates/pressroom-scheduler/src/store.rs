//! Persistence boundary for scheduled items.
//!
//! The engine only ever talks to the [`ScheduleStore`] trait; the SQLite
//! implementation below wraps its `Connection` in an `Arc<Mutex<_>>` so the
//! polling loop and application-side handlers can share one store. The mutex
//! also makes each read-modify-write (fetch due item, transition, save)
//! serialize against concurrent savers within the process.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use pressroom_core::PublishTarget;
use rusqlite::Connection;

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::types::{ErrorRecord, ScheduledItem};

/// Column list shared by every SELECT so row parsing stays in one place.
const COLUMNS: &str = "id, blog_post_id, social_post_id, scheduled_time, frequency, status,
    next_execution, last_executed_at, execution_count, max_executions,
    retry_count, max_retries, last_error, error_history, metadata, created_at";

/// Operations the engine requires from persistence.
pub trait ScheduleStore: Send + Sync {
    /// Upsert. New items must have a `scheduled_time` strictly in the future;
    /// updates to existing rows carry no such restriction (a retry's
    /// `next_execution` is routinely in the near past by dispatch time).
    fn save(&self, item: &ScheduledItem) -> Result<()>;

    /// Remove an item. Errors with `ItemNotFound` when no row is deleted.
    fn delete(&self, id: &str) -> Result<()>;

    fn get_by_id(&self, id: &str) -> Result<ScheduledItem>;

    fn get_all(&self) -> Result<Vec<ScheduledItem>>;

    /// All items currently in `pending` status.
    fn get_pending(&self) -> Result<Vec<ScheduledItem>>;

    /// All pending items due at `now`: `next_execution <= now`, or
    /// `next_execution` never computed and `scheduled_time <= now`.
    /// Ordered by `scheduled_time` for deterministic output.
    fn get_due_items(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledItem>>;

    /// All schedules referencing the given blog post, for content-deletion
    /// and cancellation flows.
    fn get_by_blog_post(&self, blog_post_id: &str) -> Result<Vec<ScheduledItem>>;

    fn get_by_social_post(&self, social_post_id: &str) -> Result<Vec<ScheduledItem>>;
}

/// SQLite-backed store. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct SqliteScheduleStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteScheduleStore {
    /// Wrap a connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn query_items(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ScheduledItem>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {COLUMNS} FROM scheduled_items {where_clause}");
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params, row_to_raw)?;
        rows.map(|r| raw_to_item(r?)).collect()
    }
}

impl ScheduleStore for SqliteScheduleStore {
    fn save(&self, item: &ScheduledItem) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let exists = conn
            .prepare_cached("SELECT 1 FROM scheduled_items WHERE id = ?1")?
            .exists([&item.id])?;
        if !exists && item.scheduled_time <= Utc::now() {
            return Err(SchedulerError::Validation(
                "scheduled time must be in the future".into(),
            ));
        }

        let (blog_id, social_id) = item.target.as_refs();
        let error_history = serde_json::to_string(&item.error_history)?;
        let metadata = serde_json::to_string(&item.metadata)?;

        conn.prepare_cached(&format!(
            "INSERT OR REPLACE INTO scheduled_items ({COLUMNS})
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)"
        ))?
        .execute(rusqlite::params![
            item.id,
            blog_id,
            social_id,
            item.scheduled_time.to_rfc3339(),
            item.frequency.to_string(),
            item.status.to_string(),
            item.next_execution.map(|t| t.to_rfc3339()),
            item.last_executed_at.map(|t| t.to_rfc3339()),
            item.execution_count,
            item.max_executions,
            item.retry_count,
            item.max_retries,
            item.last_error,
            error_history,
            metadata,
            item.created_at.to_rfc3339(),
        ])?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM scheduled_items WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::ItemNotFound { id: id.to_string() });
        }
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<ScheduledItem> {
        self.query_items("WHERE id = ?1", &[&id])?
            .into_iter()
            .next()
            .ok_or_else(|| SchedulerError::ItemNotFound { id: id.to_string() })
    }

    fn get_all(&self) -> Result<Vec<ScheduledItem>> {
        self.query_items("ORDER BY created_at", &[])
    }

    fn get_pending(&self) -> Result<Vec<ScheduledItem>> {
        self.query_items("WHERE status = 'pending' ORDER BY scheduled_time", &[])
    }

    fn get_due_items(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledItem>> {
        let now_str = now.to_rfc3339();
        self.query_items(
            "WHERE status = 'pending'
               AND ((next_execution IS NOT NULL AND next_execution <= ?1)
                 OR (next_execution IS NULL AND scheduled_time <= ?1))
             ORDER BY scheduled_time",
            &[&now_str],
        )
    }

    fn get_by_blog_post(&self, blog_post_id: &str) -> Result<Vec<ScheduledItem>> {
        self.query_items(
            "WHERE blog_post_id = ?1 ORDER BY scheduled_time",
            &[&blog_post_id],
        )
    }

    fn get_by_social_post(&self, social_post_id: &str) -> Result<Vec<ScheduledItem>> {
        self.query_items(
            "WHERE social_post_id = ?1 ORDER BY scheduled_time",
            &[&social_post_id],
        )
    }
}

/// Raw column tuple pulled out of a row before any parsing.
type RawRow = (
    String,         // id
    Option<String>, // blog_post_id
    Option<String>, // social_post_id
    String,         // scheduled_time
    String,         // frequency
    String,         // status
    Option<String>, // next_execution
    Option<String>, // last_executed_at
    u32,            // execution_count
    Option<u32>,    // max_executions
    u32,            // retry_count
    u32,            // max_retries
    Option<String>, // last_error
    String,         // error_history JSON
    String,         // metadata JSON
    String,         // created_at
);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
        row.get(15)?,
    ))
}

fn raw_to_item(raw: RawRow) -> Result<ScheduledItem> {
    let (
        id,
        blog_post_id,
        social_post_id,
        scheduled_time,
        frequency,
        status,
        next_execution,
        last_executed_at,
        execution_count,
        max_executions,
        retry_count,
        max_retries,
        last_error,
        error_history,
        metadata,
        created_at,
    ) = raw;

    let target = PublishTarget::from_refs(blog_post_id, social_post_id)
        .map_err(|e| SchedulerError::CorruptRow(format!("item {id}: {e}")))?;
    let error_history: Vec<ErrorRecord> = serde_json::from_str(&error_history)?;
    let metadata: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&metadata)?;

    Ok(ScheduledItem {
        target,
        scheduled_time: parse_ts(&id, &scheduled_time)?,
        frequency: frequency.parse()?,
        status: status.parse()?,
        next_execution: next_execution.map(|t| parse_ts(&id, &t)).transpose()?,
        last_executed_at: last_executed_at.map(|t| parse_ts(&id, &t)).transpose()?,
        execution_count,
        max_executions,
        retry_count,
        max_retries,
        last_error,
        error_history,
        metadata,
        created_at: parse_ts(&id, &created_at)?,
        id,
    })
}

fn parse_ts(id: &str, s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SchedulerError::CorruptRow(format!("item {id}: bad timestamp {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScheduleFrequency;
    use chrono::Duration;

    fn store() -> SqliteScheduleStore {
        SqliteScheduleStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn future_item(offset: Duration) -> ScheduledItem {
        ScheduledItem::new(Utc::now() + offset, Some("blog-1".into()), None).unwrap()
    }

    #[test]
    fn save_rejects_past_scheduled_time_for_new_items() {
        let store = store();
        let item = ScheduledItem::new(
            Utc::now() - Duration::minutes(1),
            Some("blog-1".into()),
            None,
        )
        .unwrap();
        assert!(matches!(
            store.save(&item),
            Err(SchedulerError::Validation(_))
        ));
    }

    #[test]
    fn save_allows_past_due_state_on_existing_items() {
        let store = store();
        let mut item = future_item(Duration::hours(1));
        store.save(&item).unwrap();

        // After a failure the recomputed next_execution may be in the past by
        // the time the row is written back; updates must not re-validate.
        item.mark_failed(Utc::now() - Duration::hours(2), "publish failed")
            .unwrap();
        store.save(&item).unwrap();

        let loaded = store.get_by_id(&item.id).unwrap();
        assert_eq!(loaded.retry_count, 1);
        assert_eq!(loaded.last_error.as_deref(), Some("publish failed"));
        assert_eq!(loaded.error_history.len(), 1);
    }

    #[test]
    fn round_trips_all_fields() {
        let store = store();
        let mut metadata = serde_json::Map::new();
        metadata.insert("campaign".into(), serde_json::json!("spring-launch"));
        let item = future_item(Duration::hours(2))
            .with_frequency(ScheduleFrequency::Weekly)
            .with_max_executions(4)
            .with_max_retries(2)
            .with_metadata(metadata.clone());
        store.save(&item).unwrap();

        let loaded = store.get_by_id(&item.id).unwrap();
        assert_eq!(loaded.id, item.id);
        assert_eq!(loaded.target, item.target);
        assert_eq!(loaded.frequency, ScheduleFrequency::Weekly);
        assert_eq!(loaded.max_executions, Some(4));
        assert_eq!(loaded.max_retries, 2);
        assert_eq!(loaded.metadata, metadata);
        assert_eq!(loaded.scheduled_time, item.scheduled_time);
        assert_eq!(loaded.next_execution, item.next_execution);
    }

    #[test]
    fn get_due_items_respects_both_clauses_and_ordering() {
        let store = store();

        let later = future_item(Duration::hours(2));
        let sooner = future_item(Duration::hours(1));
        let far = future_item(Duration::days(30));
        store.save(&later).unwrap();
        store.save(&sooner).unwrap();
        store.save(&far).unwrap();

        assert!(store.get_due_items(Utc::now()).unwrap().is_empty());

        let due = store.get_due_items(Utc::now() + Duration::hours(3)).unwrap();
        let ids: Vec<_> = due.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![sooner.id.as_str(), later.id.as_str()]);

        // The NULL next_execution clause falls back to scheduled_time.
        let mut blank = future_item(Duration::hours(1));
        blank.next_execution = None;
        store.save(&blank).unwrap();
        let due = store.get_due_items(Utc::now() + Duration::hours(3)).unwrap();
        assert!(due.iter().any(|i| i.id == blank.id));
    }

    #[test]
    fn terminal_items_are_never_due() {
        let store = store();
        let mut item = future_item(Duration::hours(1));
        store.save(&item).unwrap();
        item.cancel().unwrap();
        store.save(&item).unwrap();

        assert!(store
            .get_due_items(Utc::now() + Duration::days(1))
            .unwrap()
            .is_empty());
        assert!(store.get_pending().unwrap().is_empty());
    }

    #[test]
    fn lookup_by_target() {
        let store = store();
        let blog = future_item(Duration::hours(1));
        let social =
            ScheduledItem::new(Utc::now() + Duration::hours(1), None, Some("soc-9".into()))
                .unwrap();
        store.save(&blog).unwrap();
        store.save(&social).unwrap();

        let hits = store.get_by_blog_post("blog-1").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, blog.id);

        let hits = store.get_by_social_post("soc-9").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, social.id);

        assert!(store.get_by_blog_post("nope").unwrap().is_empty());
    }

    #[test]
    fn delete_missing_item_errors() {
        let store = store();
        assert!(matches!(
            store.delete("no-such-id"),
            Err(SchedulerError::ItemNotFound { .. })
        ));

        let item = future_item(Duration::hours(1));
        store.save(&item).unwrap();
        store.delete(&item.id).unwrap();
        assert!(matches!(
            store.get_by_id(&item.id),
            Err(SchedulerError::ItemNotFound { .. })
        ));
    }
}
