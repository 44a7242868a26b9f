use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The cron expression or timezone could not be parsed.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// No trigger with the given name is registered.
    #[error("Job not found: {name}")]
    JobNotFound { name: String },

    /// A trigger with the same name is already registered.
    #[error("Job already registered: {name}")]
    DuplicateJob { name: String },

    /// A persisted row could not be decoded.
    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),

    /// The ledger connection mutex was poisoned by a panicking holder.
    #[error("Ledger lock poisoned")]
    Poisoned,
}

impl From<SchedulerError> for agency_core::AgencyError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::InvalidSchedule(msg) => agency_core::AgencyError::Schedule(msg),
            SchedulerError::JobNotFound { name } => agency_core::AgencyError::not_found("Job", name),
            other => agency_core::AgencyError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
