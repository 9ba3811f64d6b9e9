use thiserror::Error;
use uuid::Uuid;

/// Failure taxonomy for ingestion, matching and ledger operations.
///
/// A receipt that merely fails to clear the matching threshold is not an
/// error; it is reported as a pending outcome by the caller.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input rejected at the boundary; nothing was stored.
    #[error("validation: {0}")]
    Validation(String),

    /// The operation was already performed (repeat external id, or a
    /// receipt inside the duplicate window of an existing one).
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// The target credit or receipt already carries a match link; the
    /// exclusive 1:1 invariant forbids a second link.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no such {entity}: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// Underlying storage failure, passed through with its context.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
