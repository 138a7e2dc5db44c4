use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduling schema in `conn`.
///
/// Creates the `scheduled_items` table (idempotent) and an index on
/// `next_execution` so the due-item poll stays efficient with thousands of
/// rows. Exactly one of the two foreign-key columns is populated per row,
/// enforced by a CHECK constraint mirroring the in-memory tagged union.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS scheduled_items (
            id               TEXT    NOT NULL PRIMARY KEY,
            blog_post_id     TEXT,
            social_post_id   TEXT,
            scheduled_time   TEXT    NOT NULL,   -- ISO-8601, immutable anchor
            frequency        TEXT    NOT NULL DEFAULT 'once',
            status           TEXT    NOT NULL DEFAULT 'pending',
            next_execution   TEXT,               -- ISO-8601 or NULL
            last_executed_at TEXT,               -- ISO-8601 or NULL
            execution_count  INTEGER NOT NULL DEFAULT 0,
            max_executions   INTEGER,            -- NULL means uncapped
            retry_count      INTEGER NOT NULL DEFAULT 0,
            max_retries      INTEGER NOT NULL DEFAULT 3,
            last_error       TEXT,
            error_history    TEXT    NOT NULL DEFAULT '[]', -- JSON array
            metadata         TEXT    NOT NULL DEFAULT '{}', -- JSON object
            created_at       TEXT    NOT NULL,
            CHECK ((blog_post_id IS NULL) <> (social_post_id IS NULL))
        ) STRICT;

        -- Efficient polling: WHERE status='pending' AND next_execution <= ?
        CREATE INDEX IF NOT EXISTS idx_scheduled_items_next_execution
            ON scheduled_items (next_execution);
        CREATE INDEX IF NOT EXISTS idx_scheduled_items_blog_post
            ON scheduled_items (blog_post_id);
        CREATE INDEX IF NOT EXISTS idx_scheduled_items_social_post
            ON scheduled_items (social_post_id);
        ",
    )?;
    Ok(())
}
