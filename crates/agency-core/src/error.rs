use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgencyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Database error: {0}")]
    Database(String),

    /// A write lost a race with a concurrent writer (unique index or cursor check).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Mail delivery error: {0}")]
    Mail(String),

    #[error("Invalid schedule: {0}")]
    Schedule(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgencyError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        AgencyError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short error code string used in job run records and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            AgencyError::Config(_) => "CONFIG_ERROR",
            AgencyError::NotFound { .. } => "NOT_FOUND",
            AgencyError::Database(_) => "DATABASE_ERROR",
            AgencyError::Conflict(_) => "CONFLICT",
            AgencyError::Mail(_) => "MAIL_ERROR",
            AgencyError::Schedule(_) => "SCHEDULE_ERROR",
            AgencyError::Serialization(_) => "SERIALIZATION_ERROR",
            AgencyError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AgencyError>;
