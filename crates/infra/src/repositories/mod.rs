//! In-memory repositories backing the domain services.
//!
//! Each repository enforces optimistic versioning and the unique keys of its
//! aggregate family on save, so a racing create loses with `Duplicate` even
//! when both callers passed their own uniqueness checks.

mod department;
mod organization;
mod role;
mod store;
mod user;

pub use department::InMemoryDepartmentRepository;
pub use organization::InMemoryOrganizationRepository;
pub use role::InMemoryRoleRepository;
pub use user::InMemoryUserRepository;
