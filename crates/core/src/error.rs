use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure reported by a storage port implementation.
///
/// Ports never report domain outcomes through this type (a sold-out listing
/// or an already-scanned ticket is a normal return value); only
/// infrastructure problems end up here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The datastore could not be reached or refused the operation.
    #[error("Datastore unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete within its budget.
    #[error("Datastore operation timed out after {0} ms")]
    Timeout(u64),

    /// A uniqueness or conditional-write constraint rejected the write.
    #[error("Datastore conflict: {0}")]
    Conflict(String),

    /// Stored data violates an invariant (unknown status string, etc).
    #[error("Data integrity violation: {0}")]
    Integrity(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
