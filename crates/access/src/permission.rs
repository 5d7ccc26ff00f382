//! Permission entity: a named `resource:action:scope` grant.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgiam_core::limits::{ensure_capacity, ensure_limit_covers};
use orgiam_core::{
    DomainError, DomainResult, Entity, EntityStatus, OrganizationId, PermissionId, RoleId, UserId,
};

use crate::role::{AccessRight, RoleScope, non_empty_name};
use crate::PermissionCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionType {
    System,
    #[default]
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionAction {
    Read,
    Write,
    Delete,
    Execute,
    /// Every right on the resource.
    Manage,
    Other,
}

impl PermissionAction {
    /// Classify the action part of a permission code (`*` counts as MANAGE).
    pub fn from_code(code: &PermissionCode) -> Self {
        match code.action() {
            "read" => PermissionAction::Read,
            "write" => PermissionAction::Write,
            "delete" => PermissionAction::Delete,
            "execute" => PermissionAction::Execute,
            "manage" | "*" => PermissionAction::Manage,
            _ => PermissionAction::Other,
        }
    }

    /// Rights on the resource this action stands for. Empty for OTHER.
    pub fn rights(self) -> Vec<AccessRight> {
        match self {
            PermissionAction::Read => vec![AccessRight::Read],
            PermissionAction::Write => vec![AccessRight::Write],
            PermissionAction::Delete => vec![AccessRight::Delete],
            PermissionAction::Execute => vec![AccessRight::Execute],
            PermissionAction::Manage => AccessRight::ALL.to_vec(),
            PermissionAction::Other => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    id: PermissionId,
    organization_id: OrganizationId,
    code: PermissionCode,
    name: String,
    description: Option<String>,
    permission_type: PermissionType,
    scope: RoleScope,
    action: PermissionAction,
    status: EntityStatus,
    role_ids: BTreeSet<RoleId>,
    user_ids: BTreeSet<UserId>,
    max_roles: u64,
    max_users: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Permission {
    pub const DEFAULT_MAX_ROLES: u64 = 100;
    pub const DEFAULT_MAX_USERS: u64 = 1_000;

    pub fn new(
        id: PermissionId,
        organization_id: OrganizationId,
        code: PermissionCode,
        name: &str,
        permission_type: PermissionType,
        scope: RoleScope,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let action = PermissionAction::from_code(&code);
        Ok(Self {
            id,
            organization_id,
            code,
            name: non_empty_name(name)?,
            description: None,
            permission_type,
            scope,
            action,
            status: EntityStatus::Active,
            role_ids: BTreeSet::new(),
            user_ids: BTreeSet::new(),
            max_roles: Self::DEFAULT_MAX_ROLES,
            max_users: Self::DEFAULT_MAX_USERS,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    pub fn code(&self) -> &PermissionCode {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn permission_type(&self) -> PermissionType {
        self.permission_type
    }

    pub fn scope(&self) -> RoleScope {
        self.scope
    }

    pub fn action(&self) -> PermissionAction {
        self.action
    }

    pub fn status(&self) -> EntityStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn role_ids(&self) -> &BTreeSet<RoleId> {
        &self.role_ids
    }

    pub fn user_ids(&self) -> &BTreeSet<UserId> {
        &self.user_ids
    }

    pub fn max_roles(&self) -> u64 {
        self.max_roles
    }

    pub fn max_users(&self) -> u64 {
        self.max_users
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition_to(EntityStatus::Active, now)
    }

    pub fn suspend(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition_to(EntityStatus::Suspended, now)
    }

    pub fn disable(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition_to(EntityStatus::Disabled, now)
    }

    pub fn transition_to(&mut self, target: EntityStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if target == EntityStatus::Disabled && self.permission_type == PermissionType::System {
            return Err(DomainError::state(format!(
                "system permission {} cannot be disabled",
                self.code
            )));
        }
        self.status = self.status.transition_to(target, "permission")?;
        self.touch(now);
        Ok(())
    }

    pub fn update_name(&mut self, name: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.name = non_empty_name(name)?;
        self.touch(now);
        Ok(())
    }

    pub fn update_description(&mut self, description: Option<&str>, now: DateTime<Utc>) {
        self.description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        self.touch(now);
    }

    /// Whether holding this permission grants `other`.
    pub fn implies(&self, other: &PermissionCode) -> bool {
        self.is_active() && self.code.implies(other)
    }

    pub fn update_limits(&mut self, max_roles: u64, max_users: u64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_limit_covers("roles", max_roles, self.role_ids.len() as u64)?;
        ensure_limit_covers("users", max_users, self.user_ids.len() as u64)?;
        self.max_roles = max_roles;
        self.max_users = max_users;
        self.touch(now);
        Ok(())
    }

    fn ensure_assignable(&self) -> DomainResult<()> {
        if !self.is_active() {
            return Err(DomainError::state(format!(
                "permission {} is {} and cannot be assigned",
                self.code, self.status
            )));
        }
        Ok(())
    }

    /// Idempotent; fails only when a new assignment would exceed `max_roles`.
    pub fn assign_to_role(&mut self, role_id: RoleId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.role_ids.contains(&role_id) {
            return Ok(());
        }
        self.ensure_assignable()?;
        ensure_capacity("roles", true, self.role_ids.len() as u64, self.max_roles)?;
        self.role_ids.insert(role_id);
        self.touch(now);
        Ok(())
    }

    pub fn remove_from_role(&mut self, role_id: RoleId, now: DateTime<Utc>) {
        if self.role_ids.remove(&role_id) {
            self.touch(now);
        }
    }

    /// Idempotent; fails only when a new assignment would exceed `max_users`.
    pub fn assign_to_user(&mut self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.user_ids.contains(&user_id) {
            return Ok(());
        }
        self.ensure_assignable()?;
        ensure_capacity("users", true, self.user_ids.len() as u64, self.max_users)?;
        self.user_ids.insert(user_id);
        self.touch(now);
        Ok(())
    }

    pub fn remove_from_user(&mut self, user_id: UserId, now: DateTime<Utc>) {
        if self.user_ids.remove(&user_id) {
            self.touch(now);
        }
    }
}

impl Entity for Permission {
    type Id = PermissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
