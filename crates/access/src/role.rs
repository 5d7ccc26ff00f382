//! Role entity and its resource permission map.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgiam_core::{
    DomainError, DomainResult, Entity, EntityStatus, Hierarchical, OrganizationId, RoleId, UserId,
};

use crate::RoleCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleType {
    /// Built-in role; cannot be disabled or retyped.
    System,
    #[default]
    Custom,
    Functional,
    Business,
    Project,
    Temporary,
}

impl core::fmt::Display for RoleType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            RoleType::System => "SYSTEM",
            RoleType::Custom => "CUSTOM",
            RoleType::Functional => "FUNCTIONAL",
            RoleType::Business => "BUSINESS",
            RoleType::Project => "PROJECT",
            RoleType::Temporary => "TEMPORARY",
        };
        f.write_str(s)
    }
}

/// Where a role (or permission) applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleScope {
    Global,
    #[default]
    Organization,
    Department,
    Project,
    User,
}

/// One of the four rights a role can hold on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessRight {
    Read,
    Write,
    Delete,
    Execute,
}

impl AccessRight {
    pub const ALL: [AccessRight; 4] = [
        AccessRight::Read,
        AccessRight::Write,
        AccessRight::Delete,
        AccessRight::Execute,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePermissions {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    pub execute: bool,
}

impl ResourcePermissions {
    pub fn allows(&self, right: AccessRight) -> bool {
        match right {
            AccessRight::Read => self.read,
            AccessRight::Write => self.write,
            AccessRight::Delete => self.delete,
            AccessRight::Execute => self.execute,
        }
    }

    fn set(&mut self, right: AccessRight, value: bool) {
        match right {
            AccessRight::Read => self.read = value,
            AccessRight::Write => self.write = value,
            AccessRight::Delete => self.delete = value,
            AccessRight::Execute => self.execute = value,
        }
    }

    pub fn count(&self) -> usize {
        AccessRight::ALL.iter().filter(|r| self.allows(**r)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Resource name → rights. Resources without any right are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RolePermissions(BTreeMap<String, ResourcePermissions>);

impl RolePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the right was already held.
    pub fn grant(&mut self, resource: &str, right: AccessRight) -> bool {
        let entry = self.0.entry(resource.to_string()).or_default();
        let was = entry.allows(right);
        entry.set(right, true);
        !was
    }

    /// Returns `false` when the right was not held.
    pub fn revoke(&mut self, resource: &str, right: AccessRight) -> bool {
        let Some(entry) = self.0.get_mut(resource) else {
            return false;
        };
        let was = entry.allows(right);
        entry.set(right, false);
        if entry.is_empty() {
            self.0.remove(resource);
        }
        was
    }

    pub fn allows(&self, resource: &str, right: AccessRight) -> bool {
        self.0.get(resource).is_some_and(|p| p.allows(right))
    }

    pub fn get(&self, resource: &str) -> Option<&ResourcePermissions> {
        self.0.get(resource)
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of (resource, right) pairs held.
    pub fn count(&self) -> usize {
        self.0.values().map(ResourcePermissions::count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Role entity.
///
/// # Invariants
/// - `parent_id != Some(id)`.
/// - A SYSTEM role is never DISABLED and never changes type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    organization_id: OrganizationId,
    code: RoleCode,
    name: String,
    description: Option<String>,
    role_type: RoleType,
    scope: RoleScope,
    status: EntityStatus,
    parent_id: Option<RoleId>,
    permissions: RolePermissions,
    members: BTreeSet<UserId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(
        id: RoleId,
        organization_id: OrganizationId,
        code: RoleCode,
        name: &str,
        role_type: RoleType,
        scope: RoleScope,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            organization_id,
            code,
            name: non_empty_name(name)?,
            description: None,
            role_type,
            scope,
            status: EntityStatus::Active,
            parent_id: None,
            permissions: RolePermissions::new(),
            members: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    pub fn code(&self) -> &RoleCode {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn role_type(&self) -> RoleType {
        self.role_type
    }

    pub fn is_system(&self) -> bool {
        self.role_type == RoleType::System
    }

    pub fn scope(&self) -> RoleScope {
        self.scope
    }

    pub fn status(&self) -> EntityStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn permissions(&self) -> &RolePermissions {
        &self.permissions
    }

    pub fn members(&self) -> &BTreeSet<UserId> {
        &self.members
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
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
        if target == EntityStatus::Disabled && self.is_system() {
            return Err(DomainError::state(format!(
                "system role {} cannot be disabled",
                self.code
            )));
        }
        self.status = self.status.transition_to(target, "role")?;
        self.touch(now);
        Ok(())
    }

    pub fn change_type(&mut self, role_type: RoleType, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_system() && role_type != RoleType::System {
            return Err(DomainError::state(format!(
                "system role {} cannot change its type",
                self.code
            )));
        }
        self.role_type = role_type;
        self.touch(now);
        Ok(())
    }

    pub fn change_scope(&mut self, scope: RoleScope, now: DateTime<Utc>) {
        self.scope = scope;
        self.touch(now);
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

    pub fn set_parent(&mut self, parent_id: Option<RoleId>, now: DateTime<Utc>) -> DomainResult<()> {
        if parent_id == Some(self.id) {
            return Err(DomainError::hierarchy("a role cannot be its own parent"));
        }
        self.parent_id = parent_id;
        self.touch(now);
        Ok(())
    }

    pub fn grant(&mut self, resource: &str, right: AccessRight, now: DateTime<Utc>) -> bool {
        let granted = self.permissions.grant(resource, right);
        if granted {
            self.touch(now);
        }
        granted
    }

    pub fn revoke(&mut self, resource: &str, right: AccessRight, now: DateTime<Utc>) -> bool {
        let revoked = self.permissions.revoke(resource, right);
        if revoked {
            self.touch(now);
        }
        revoked
    }

    pub fn has_permission(&self, resource: &str, right: AccessRight) -> bool {
        self.permissions.allows(resource, right)
    }

    pub fn add_member(&mut self, user_id: UserId, now: DateTime<Utc>) {
        if self.members.insert(user_id) {
            self.touch(now);
        }
    }

    pub fn remove_member(&mut self, user_id: UserId, now: DateTime<Utc>) {
        if self.members.remove(&user_id) {
            self.touch(now);
        }
    }

    pub fn has_member(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }

    /// Copy with a new identity: same organization, scope, description and
    /// permissions, no members, no parent. Clones of SYSTEM roles are CUSTOM.
    pub fn duplicate(&self, id: RoleId, code: RoleCode, name: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        let role_type = if self.is_system() {
            RoleType::Custom
        } else {
            self.role_type
        };
        let mut copy = Self::new(id, self.organization_id, code, name, role_type, self.scope, now)?;
        copy.description = self.description.clone();
        copy.permissions = self.permissions.clone();
        Ok(copy)
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Hierarchical for Role {
    fn parent_id(&self) -> Option<&Self::Id> {
        self.parent_id.as_ref()
    }
}

pub(crate) fn non_empty_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(name.to_string())
}
