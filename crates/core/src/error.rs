//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (malformed code, username, email, password, token...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A code or name already exists in the relevant scope.
    #[error("already exists: {0}")]
    Uniqueness(String),

    /// A tree invariant would be violated (self-parent, foreign parent, cycle...).
    #[error("hierarchy violation: {0}")]
    Hierarchy(String),

    /// A configured limit would be exceeded.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// An invalid status transition or membership precondition.
    #[error("invalid state: {0}")]
    State(String),

    /// A referenced aggregate, parent or target does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Several violations reported together by a validation pipeline.
    #[error("{}", join_messages(.0))]
    Multiple(Vec<DomainError>),
}

fn join_messages(errors: &[DomainError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error taxonomy, independent of the message carried by each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Format,
    Uniqueness,
    Hierarchy,
    Capacity,
    State,
    NotFound,
    InvalidId,
    Conflict,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn uniqueness(msg: impl Into<String>) -> Self {
        Self::Uniqueness(msg.into())
    }

    pub fn hierarchy(msg: impl Into<String>) -> Self {
        Self::Hierarchy(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::Capacity(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Taxonomy of a single error. `None` for [`DomainError::Multiple`].
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Validation(_) => Some(ErrorKind::Format),
            Self::Uniqueness(_) => Some(ErrorKind::Uniqueness),
            Self::Hierarchy(_) => Some(ErrorKind::Hierarchy),
            Self::Capacity(_) => Some(ErrorKind::Capacity),
            Self::State(_) => Some(ErrorKind::State),
            Self::NotFound(_) => Some(ErrorKind::NotFound),
            Self::InvalidId(_) => Some(ErrorKind::InvalidId),
            Self::Conflict(_) => Some(ErrorKind::Conflict),
            Self::Multiple(_) => None,
        }
    }

    /// Whether this error (or any error it aggregates) is of `kind`.
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        match self {
            Self::Multiple(errors) => errors.iter().any(|e| e.has_kind(kind)),
            other => other.kind() == Some(kind),
        }
    }

    /// Flattened view of the individual violations.
    pub fn violations(&self) -> Vec<&DomainError> {
        match self {
            Self::Multiple(errors) => errors.iter().flat_map(|e| e.violations()).collect(),
            other => vec![other],
        }
    }
}

/// Collects every violation of a validation pipeline instead of failing fast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Violations(Vec<DomainError>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: DomainError) {
        match error {
            DomainError::Multiple(errors) => self.0.extend(errors),
            other => self.0.push(other),
        }
    }

    /// Records the error of `result` (if any) and hands back the success value.
    pub fn check<T>(&mut self, result: DomainResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.push(e);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `Ok(())` when nothing was collected, the lone error when exactly one was,
    /// [`DomainError::Multiple`] otherwise.
    pub fn finish(mut self) -> DomainResult<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(DomainError::Multiple(self.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_violations_finish_ok() {
        assert_eq!(Violations::new().finish(), Ok(()));
    }

    #[test]
    fn single_violation_is_returned_unwrapped() {
        let mut v = Violations::new();
        v.push(DomainError::uniqueness("code taken"));
        let err = v.finish().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Uniqueness));
    }

    #[test]
    fn several_violations_are_reported_together() {
        let mut v = Violations::new();
        v.push(DomainError::validation("bad code"));
        assert_eq!(v.check::<()>(Err(DomainError::hierarchy("parent inactive"))), None);
        assert_eq!(v.check(Ok(7)), Some(7));

        let err = v.finish().unwrap_err();
        assert!(err.has_kind(ErrorKind::Format));
        assert!(err.has_kind(ErrorKind::Hierarchy));
        assert!(!err.has_kind(ErrorKind::Capacity));
        assert_eq!(err.violations().len(), 2);

        let msg = err.to_string();
        assert!(msg.contains("bad code"));
        assert!(msg.contains("parent inactive"));
    }

    #[test]
    fn nested_multiple_is_flattened_on_push() {
        let mut v = Violations::new();
        v.push(DomainError::Multiple(vec![
            DomainError::validation("a"),
            DomainError::validation("b"),
        ]));
        assert_eq!(v.len(), 2);
    }
}
