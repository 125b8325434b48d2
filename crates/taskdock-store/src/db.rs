use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id            INTEGER NOT NULL PRIMARY KEY,
            name          TEXT    NOT NULL DEFAULT '',
            shell         TEXT    NOT NULL,
            cron          TEXT    NOT NULL,
            active        INTEGER NOT NULL DEFAULT 1,   -- <= 0 means disabled
            config        TEXT,                         -- JSON-encoded advanced options
            kind          INTEGER NOT NULL DEFAULT 0,   -- partition key for sort
            sort          INTEGER NOT NULL DEFAULT 0,   -- dense rank within kind
            bind          TEXT    NOT NULL DEFAULT '',  -- #tag# marker field
            last_runtime  TEXT,                         -- ISO-8601 or NULL
            last_run_use  REAL                          -- seconds or NULL
        ) STRICT;

        -- Rank queries and the reorder shift scan by (kind, sort).
        CREATE INDEX IF NOT EXISTS idx_jobs_kind_sort ON jobs (kind, sort);

        CREATE TABLE IF NOT EXISTS triggers (
            id        TEXT NOT NULL PRIMARY KEY,  -- 'T_<job id>' for managed triggers
            cron      TEXT NOT NULL,
            callback  TEXT NOT NULL DEFAULT ''
        ) STRICT;
        ",
    )?;
    Ok(())
}
