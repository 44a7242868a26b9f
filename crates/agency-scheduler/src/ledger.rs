use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::types::{JobRun, RunStatus};

/// SQLite-backed lease locks and run history.
///
/// Lock rows are shared by every worker instance pointed at the same database,
/// so only one of them executes a given job at a time. A lease that outlives
/// its TTL (crashed holder) can be taken over.
#[derive(Clone)]
pub struct JobLedger {
    conn: Arc<Mutex<Connection>>,
}

impl JobLedger {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SchedulerError::Poisoned)
    }

    /// Take the lease for `job` unless another holder has an unexpired one.
    /// Returns true when `holder` now owns the lock.
    pub fn try_acquire(
        &self,
        job: &str,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let expires = now + ttl;
        let n = conn.execute(
            "INSERT INTO job_locks (job_name, holder, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (job_name) DO UPDATE
               SET holder = excluded.holder,
                   acquired_at = excluded.acquired_at,
                   expires_at = excluded.expires_at
             WHERE job_locks.expires_at <= excluded.acquired_at",
            params![job, holder, ts(now), ts(expires)],
        )?;
        Ok(n == 1)
    }

    /// Drop the lease if `holder` still owns it.
    pub fn release(&self, job: &str, holder: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM job_locks WHERE job_name = ?1 AND holder = ?2",
            params![job, holder],
        )?;
        Ok(())
    }

    /// Current lock holder, if any (expired leases included).
    pub fn lock_holder(&self, job: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT holder FROM job_locks WHERE job_name = ?1")?;
        let mut rows = stmt.query_map([job], |row| row.get::<_, String>(0))?;
        Ok(rows.next().transpose()?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_run(
        &self,
        job: &str,
        holder: &str,
        status: RunStatus,
        scheduled_for: DateTime<Utc>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        detail: Option<&str>,
    ) -> Result<String> {
        let conn = self.conn()?;
        let id = Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO job_runs
             (id, job_name, holder, status, scheduled_for, started_at, finished_at, detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                job,
                holder,
                status.to_string(),
                ts(scheduled_for),
                ts(started_at),
                ts(finished_at),
                detail,
            ],
        )?;
        Ok(id)
    }

    /// Most recent runs of `job`, newest first.
    pub fn list_runs(&self, job: &str, limit: usize) -> Result<Vec<JobRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, job_name, holder, status, scheduled_for, started_at, finished_at, detail
             FROM job_runs WHERE job_name = ?1
             ORDER BY started_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![job, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut runs = Vec::with_capacity(rows.len());
        for (id, job_name, holder, status, scheduled_for, started_at, finished_at, detail) in rows {
            runs.push(JobRun {
                id,
                job_name,
                holder,
                status: status.parse().map_err(SchedulerError::Corrupt)?,
                scheduled_for: parse_ts(&scheduled_for)?,
                started_at: parse_ts(&started_at)?,
                finished_at: parse_ts(&finished_at)?,
                detail,
            });
        }
        Ok(runs)
    }
}

/// Fixed-width UTC timestamps so lexical comparison in SQL is chronological.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SchedulerError::Corrupt(format!("bad timestamp {s}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 5, 0, 0).unwrap()
    }

    #[test]
    fn lock_is_exclusive_until_expiry() {
        let ledger = JobLedger::open_in_memory().unwrap();
        let ttl = Duration::minutes(10);
        assert!(ledger.try_acquire("digest", "a", t0(), ttl).unwrap());
        assert!(!ledger.try_acquire("digest", "b", t0() + Duration::minutes(5), ttl).unwrap());
        assert_eq!(ledger.lock_holder("digest").unwrap().as_deref(), Some("a"));

        // Expired lease is taken over.
        assert!(ledger.try_acquire("digest", "b", t0() + Duration::minutes(10), ttl).unwrap());
        assert_eq!(ledger.lock_holder("digest").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn release_only_by_holder() {
        let ledger = JobLedger::open_in_memory().unwrap();
        let ttl = Duration::minutes(10);
        assert!(ledger.try_acquire("renewals", "a", t0(), ttl).unwrap());
        ledger.release("renewals", "b").unwrap();
        assert!(ledger.lock_holder("renewals").unwrap().is_some());
        ledger.release("renewals", "a").unwrap();
        assert!(ledger.lock_holder("renewals").unwrap().is_none());
        assert!(ledger.try_acquire("renewals", "b", t0(), ttl).unwrap());
    }

    #[test]
    fn runs_are_listed_newest_first() {
        let ledger = JobLedger::open_in_memory().unwrap();
        for (i, status) in [RunStatus::Completed, RunStatus::Failed].into_iter().enumerate() {
            let at = t0() + Duration::days(i as i64);
            ledger
                .record_run("expenses", "a", status, at, at, at, None)
                .unwrap();
        }
        let runs = ledger.list_runs("expenses", 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[1].status, RunStatus::Completed);
        assert!(ledger.list_runs("other", 10).unwrap().is_empty());
    }
}
