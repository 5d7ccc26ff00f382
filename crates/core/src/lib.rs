//! `orgiam-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error taxonomy, the shared status machine, code format
//! rules, capacity helpers and policy configuration.

pub mod aggregate;
pub mod code;
pub mod config;
pub mod entity;
pub mod error;
pub mod id;
pub mod limits;
pub mod status;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use code::{CaseStyle, CodeRules};
pub use config::{LockoutPolicy, PolicyConfig};
pub use entity::{Entity, Hierarchical};
pub use error::{DomainError, DomainResult, ErrorKind, Violations};
pub use id::{AggregateId, DepartmentId, OrganizationId, PermissionId, RoleId, TenantId, UserId};
pub use limits::LimitWarning;
pub use status::EntityStatus;
pub use value_object::ValueObject;
