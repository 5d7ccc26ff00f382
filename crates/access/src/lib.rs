//! `orgiam-access`: roles, permissions and the role aggregate.
//!
//! A role holds a map of resource rights and a member set; a permission is a
//! named `resource:action:scope` grant that can be expanded into those rights.

pub mod codes;
pub mod permission;
pub mod role;
pub mod role_aggregate;

pub use codes::{PermissionCode, RoleCode};
pub use permission::{Permission, PermissionAction, PermissionType};
pub use role::{AccessRight, ResourcePermissions, Role, RolePermissions, RoleScope, RoleType};
pub use role_aggregate::{
    RoleAggregate, RoleEvent, RoleLimits, RoleSettings, RoleSettingsPatch, RoleStatistics,
    RoleStatisticsUpdate,
};
