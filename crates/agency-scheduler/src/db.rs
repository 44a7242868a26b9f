use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// `job_locks` holds one lease row per job name while a run is in flight;
/// `job_runs` is the append-only history of every firing, skipped ones included.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS job_locks (
            job_name    TEXT NOT NULL PRIMARY KEY,
            holder      TEXT NOT NULL,
            acquired_at TEXT NOT NULL,
            expires_at  TEXT NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS job_runs (
            id            TEXT NOT NULL PRIMARY KEY,
            job_name      TEXT NOT NULL,
            holder        TEXT NOT NULL,
            status        TEXT NOT NULL,
            scheduled_for TEXT NOT NULL,
            started_at    TEXT NOT NULL,
            finished_at   TEXT NOT NULL,
            detail        TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_job_runs_job ON job_runs (job_name, started_at);
        ",
    )?;
    Ok(())
}
