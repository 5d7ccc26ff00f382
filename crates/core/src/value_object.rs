//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their (normalized) value. The
/// scalar wrappers of this workspace (codes, usernames, emails, tokens) are all
/// self-validating: the only way to obtain one is through a constructor that
/// enforces every format rule, so holding a value is proof that it is valid.
///
/// ```ignore
/// let a = OrganizationCode::new("org001")?;
/// let b = OrganizationCode::new("ORG001")?;
/// assert_eq!(a, b); // normalized before comparison
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
