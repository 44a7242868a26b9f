use agency_core::AgencyError;
use thiserror::Error;

/// Store-layer errors. Converted into `AgencyError` at the trait boundary so
/// jobs never see rusqlite types.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection mutex poisoned")]
    Poisoned,

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),
}

impl StoreError {
    /// True for UNIQUE / CHECK constraint failures.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl From<StoreError> for AgencyError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Metadata(e) => AgencyError::Serialization(e),
            StoreError::Overflow(what) => AgencyError::Internal(format!("arithmetic overflow: {what}")),
            other => AgencyError::Database(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
