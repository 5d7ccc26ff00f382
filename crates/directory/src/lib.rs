//! `orgiam-directory`: the tenant / organization / department structure.
//!
//! Codes and entities are plain state holders; the aggregates own the
//! membership, capacity and status invariants and record an event for every
//! change.

pub mod codes;
pub mod department;
pub mod department_aggregate;
pub mod organization;
pub mod organization_aggregate;
pub mod tenant;

pub use codes::{DepartmentCode, OrganizationCode, TenantCode};
pub use department::Department;
pub use department_aggregate::{
    DepartmentAggregate, DepartmentEvent, DepartmentLimits, DepartmentSettings,
    DepartmentSettingsPatch, DepartmentStatistics, DepartmentStatisticsUpdate,
};
pub use organization::{Organization, OrganizationType};
pub use organization_aggregate::{
    OrganizationAggregate, OrganizationEvent, OrganizationLimits, OrganizationSettings,
    OrganizationSettingsPatch, OrganizationStatistics, OrganizationStatisticsUpdate,
};
pub use tenant::{Tenant, TenantStatus};
