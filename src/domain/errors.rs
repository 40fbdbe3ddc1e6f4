//! Domain errors for the autopilot decision pipeline.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the decision pipeline.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Proposal not found: {0}")]
    ProposalNotFound(Uuid),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Assessment for proposal {proposal_id} is missing or stale (expected revision {expected_revision})")]
    StaleAssessment { proposal_id: Uuid, expected_revision: u32 },

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Version control error: {0}")]
    VersionControl(String),

    #[error("{operation} timed out after {seconds}s")]
    CollaboratorTimeout { operation: String, seconds: u64 },

    #[error("Metrics error: {0}")]
    Metrics(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
