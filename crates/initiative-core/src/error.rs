//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An encounter stream has no events.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// A participant id is not registered on the encounter.
    #[error("participant not found: {0}")]
    ParticipantNotFound(Uuid),

    /// Sentinel or participant identity creation failed.
    #[error("creation failed: {0}")]
    CreationFailed(String),

    /// A transition was requested from a state that does not allow it.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A durable write failed; the transition was not applied.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// Any other collaborator failure.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
