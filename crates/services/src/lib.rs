//! `orgiam-services`: cross-aggregate orchestration.
//!
//! The aggregates enforce everything they can see on their own; these services
//! add what needs repository round-trips: scoped uniqueness, parent existence,
//! cycle detection on moves and membership across two aggregates.
//!
//! Every mutating operation returns the saved aggregate with its pending events
//! still attached; the caller publishes and then drains them.

pub mod department_service;
pub mod error;
pub mod hasher;
pub mod organization_service;
pub mod repository;
pub mod role_service;
pub mod user_service;

pub use department_service::{CreateDepartment, DepartmentDomainService, UpdateDepartment};
pub use error::{RepositoryError, RepositoryResult, ServiceError, ServiceResult};
pub use hasher::PasswordHasher;
pub use organization_service::{CreateOrganization, OrganizationDomainService, UpdateOrganization};
pub use repository::{
    DepartmentRepository, OrganizationRepository, RoleRepository, UserRepository,
    collect_descendants,
};
pub use role_service::{CloneRole, CreateRole, RoleDomainService, UpdateRole};
pub use user_service::{RegisterUser, UserDomainService};

use orgiam_core::{AggregateRoot, DomainError, ExpectedVersion, Violations};

/// An aggregate loaded for modification together with the version it was
/// loaded at, so the write can be checked against concurrent changes.
#[derive(Debug)]
pub(crate) struct Tracked<A> {
    pub(crate) aggregate: A,
    pub(crate) expected: ExpectedVersion,
}

impl<A: AggregateRoot> Tracked<A> {
    pub(crate) fn new(aggregate: A) -> Self {
        let expected = ExpectedVersion::Exact(aggregate.version());
        Self { aggregate, expected }
    }
}

/// Trimmed value, or a `Validation` violation when it is blank.
pub(crate) fn required<'a>(violations: &mut Violations, field: &str, value: &'a str) -> Option<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        violations.push(DomainError::validation(format!("{field} is required")));
        None
    } else {
        Some(value)
    }
}

/// End of a validation pipeline: every collected violation is reported at once.
pub(crate) fn finish(violations: Violations, operation: &str) -> Result<(), DomainError> {
    violations.finish().inspect_err(|err| {
        tracing::warn!(operation, violations = err.violations().len(), error = %err, "validation rejected");
    })
}

/// Saves the parents of a move and then the moved node.
///
/// When any save fails, the parent saves that already went through are undone
/// with `revert`, newest first, and the failure is returned. The node is saved
/// last, so a failed move never leaves it pointing at a parent that does not
/// list it.
pub(crate) fn save_move<A: AggregateRoot>(
    node: &Tracked<A>,
    parents: Vec<Tracked<A>>,
    save: impl Fn(&A, ExpectedVersion) -> RepositoryResult<()>,
    revert: impl Fn(&mut A) -> Result<(), DomainError>,
) -> ServiceResult<()> {
    let mut saved = Vec::with_capacity(parents.len());
    let mut result = Ok(());
    for parent in parents {
        result = save(&parent.aggregate, parent.expected);
        if result.is_err() {
            break;
        }
        saved.push(parent.aggregate);
    }
    if result.is_ok() {
        result = save(&node.aggregate, node.expected);
    }
    let Err(err) = result else {
        return Ok(());
    };

    for mut parent in saved.into_iter().rev() {
        let expected = ExpectedVersion::Exact(parent.version());
        let reverted = revert(&mut parent)
            .map_err(ServiceError::from)
            .and_then(|()| save(&parent, expected).map_err(ServiceError::from));
        if let Err(revert_err) = reverted {
            tracing::error!(error = %revert_err, cause = %err, "could not revert parent after a failed move");
        }
    }
    Err(err.into())
}

/// Name comparison used for uniqueness: trimmed and case-insensitive.
pub fn names_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgiam_core::ErrorKind;

    #[test]
    fn blank_fields_are_reported() {
        let mut violations = Violations::new();
        assert_eq!(required(&mut violations, "name", "  Sales "), Some("Sales"));
        assert_eq!(required(&mut violations, "code", "   "), None);
        assert_eq!(required(&mut violations, "name", ""), None);
        let err = finish(violations, "test").unwrap_err();
        assert!(matches!(err, DomainError::Multiple(ref v) if v.len() == 2));
        assert!(err.has_kind(ErrorKind::Format));
    }

    #[test]
    fn names_compare_case_insensitively() {
        assert!(names_match("Engineering", " engineering "));
        assert!(!names_match("Engineering", "Engineers"));
    }
}
