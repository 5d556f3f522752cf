use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `work_entries` table (idempotent) and an index on
/// `next_eligible` so the due-scan stays efficient as entries accumulate.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS work_entries (
            name            TEXT    NOT NULL PRIMARY KEY,
            every_secs      INTEGER NOT NULL,
            constraints     TEXT    NOT NULL,   -- JSON-encoded ConstraintSet
            policy          TEXT    NOT NULL,
            next_eligible   TEXT    NOT NULL,   -- RFC 3339, fixed precision
            last_result     TEXT    NOT NULL DEFAULT 'never_run',
            running         INTEGER NOT NULL DEFAULT 0,
            generation      INTEGER NOT NULL DEFAULT 1,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            run_count       INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL
        ) STRICT;

        -- Efficient due-scan: SELECT … WHERE next_eligible <= ? ORDER BY next_eligible
        CREATE INDEX IF NOT EXISTS idx_work_entries_next_eligible
            ON work_entries (next_eligible);
        ",
    )?;
    Ok(())
}
