//! Infrastructure layer: in-memory repositories and adapters for the domain
//! services.

pub mod hasher;
pub mod repositories;

#[cfg(test)]
mod integration_tests;

pub use hasher::PlaceholderHasher;
pub use repositories::{
    InMemoryDepartmentRepository, InMemoryOrganizationRepository, InMemoryRoleRepository,
    InMemoryUserRepository,
};
