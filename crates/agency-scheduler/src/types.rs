use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Counters a job handler returns for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Entities looked at (policies, budgets, expenses, users, …).
    pub examined: u32,
    /// Entities that produced a side effect (task created, budget renewed, mail sent, …).
    pub changed: u32,
    /// Entities whose processing failed and was skipped.
    pub failed: u32,
}

impl JobReport {
    pub fn merge(&mut self, other: JobReport) {
        self.examined += other.examined;
        self.changed += other.changed;
        self.failed += other.failed;
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "examined={} changed={} failed={}",
            self.examined, self.changed, self.failed
        )
    }
}

/// Passed to a handler on every invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    /// Registered trigger name.
    pub job: String,
    /// The cron instant this run stands for (equal to `started_at` for manual runs).
    pub scheduled_for: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    /// True when fired through `run_now` instead of the clock.
    pub manual: bool,
}

impl JobContext {
    /// Business date of the firing in `tz`.
    pub fn today(&self, tz: Tz) -> NaiveDate {
        self.scheduled_for.with_timezone(&tz).date_naive()
    }
}

/// Outcome of one firing, persisted in `job_runs.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Handler returned Ok.
    Completed,
    /// Handler returned Err or panicked.
    Failed,
    /// The previous run of the same trigger was still executing.
    SkippedRunning,
    /// Another instance holds the job lock.
    SkippedLocked,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::SkippedRunning => "skipped_running",
            RunStatus::SkippedLocked => "skipped_locked",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "skipped_running" => Ok(RunStatus::SkippedRunning),
            "skipped_locked" => Ok(RunStatus::SkippedLocked),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// What `run_now` / a tick reports back for one firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub report: Option<JobReport>,
    /// Error text for failed runs.
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn skipped(status: RunStatus) -> Self {
        Self {
            status,
            report: None,
            error: None,
        }
    }
}

/// A persisted `job_runs` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: String,
    pub job_name: String,
    pub holder: String,
    pub status: RunStatus,
    pub scheduled_for: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// JSON-encoded `JobReport` for completed runs, error text for failed ones.
    pub detail: Option<String>,
}

/// Read-only view of a registered trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub name: String,
    pub expression: String,
    pub timezone: String,
    pub next_fire: Option<DateTime<Utc>>,
}
