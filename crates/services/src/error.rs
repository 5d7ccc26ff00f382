//! Service-level error model.

use thiserror::Error;

use orgiam_core::{DomainError, ErrorKind};

/// Result type returned by repository implementations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result type returned by the domain services.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Persistence failure reported by a repository.
///
/// These are infrastructure errors as opposed to domain errors; the services
/// pass them through unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The stored version differs from the expected one.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// Another aggregate already owns a unique key (scoped code, username...).
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Error returned by every domain service operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    /// Taxonomy of the failure.
    ///
    /// Repository conflicts map to [`ErrorKind::Conflict`] and duplicates to
    /// [`ErrorKind::Uniqueness`]; storage failures and aggregated domain
    /// errors have no single kind.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ServiceError::Domain(e) => e.kind(),
            ServiceError::Repository(RepositoryError::Conflict(_)) => Some(ErrorKind::Conflict),
            ServiceError::Repository(RepositoryError::Duplicate(_)) => Some(ErrorKind::Uniqueness),
            ServiceError::Repository(RepositoryError::Storage(_)) => None,
        }
    }

    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        match self {
            ServiceError::Domain(e) => e.has_kind(kind),
            other => other.kind() == Some(kind),
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            ServiceError::Repository(_) => None,
        }
    }
}
