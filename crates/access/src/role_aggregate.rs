//! Role aggregate: role entity, members, sub-roles, permissions and limits.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgiam_core::limits::{ensure_capacity, ensure_limit_covers, limit_warnings, non_negative};
use orgiam_core::{
    AggregateRoot, DomainError, DomainResult, Entity, EntityStatus, Hierarchical, LimitWarning,
    OrganizationId, PolicyConfig, RoleId, UserId,
};
use orgiam_events::{DomainEvent, EventBuffer, EventPayload, RecordsEvents};

use crate::permission::Permission;
use crate::role::{AccessRight, Role, RoleScope, RoleType};
use crate::RoleCode;

// ─────────────────────────────────────────────────────────────────────────────
// Settings, limits, statistics
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSettings {
    /// Members may hand this role on to others.
    pub allow_delegation: bool,
    pub allow_member_addition: bool,
    pub allow_sub_roles: bool,
    /// Sub-roles inherit this role's permissions.
    pub inherit_permissions: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            allow_delegation: false,
            allow_member_addition: true,
            allow_sub_roles: true,
            inherit_permissions: true,
            expires_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleLimits {
    pub max_members: u64,
    pub max_sub_roles: u64,
    pub max_permissions: u64,
}

impl Default for RoleLimits {
    fn default() -> Self {
        Self {
            max_members: 500,
            max_sub_roles: 20,
            max_permissions: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleStatistics {
    pub member_count: u64,
    pub active_member_count: u64,
    pub sub_role_count: u64,
    /// Granted (resource, right) pairs.
    pub permission_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// Partial settings update. `expires_at: Some(None)` clears the expiry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleSettingsPatch {
    pub allow_delegation: Option<bool>,
    pub allow_member_addition: Option<bool>,
    pub allow_sub_roles: Option<bool>,
    pub inherit_permissions: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub max_members: Option<u64>,
    pub max_sub_roles: Option<u64>,
    pub max_permissions: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleStatisticsUpdate {
    pub active_member_count: Option<i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoleEvent {
    Created {
        organization_id: OrganizationId,
        code: String,
        name: String,
        role_type: RoleType,
        cloned_from: Option<RoleId>,
    },
    Renamed {
        from: String,
        to: String,
    },
    DescriptionUpdated {
        description: Option<String>,
    },
    TypeChanged {
        from: RoleType,
        to: RoleType,
    },
    ScopeChanged {
        from: RoleScope,
        to: RoleScope,
    },
    ParentChanged {
        from: Option<RoleId>,
        to: Option<RoleId>,
    },
    StatusChanged {
        from: EntityStatus,
        to: EntityStatus,
        reason: Option<String>,
    },
    MemberAdded {
        user_id: UserId,
    },
    MemberRemoved {
        user_id: UserId,
    },
    SubRoleAdded {
        role_id: RoleId,
    },
    SubRoleRemoved {
        role_id: RoleId,
    },
    PermissionGranted {
        resource: String,
        right: AccessRight,
    },
    PermissionRevoked {
        resource: String,
        right: AccessRight,
    },
    SettingsUpdated {
        settings: RoleSettings,
        limits: RoleLimits,
    },
    StatisticsUpdated {
        statistics: RoleStatistics,
    },
    LimitsWarning {
        warnings: Vec<LimitWarning>,
    },
}

impl EventPayload for RoleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RoleEvent::Created { .. } => "access.role.created",
            RoleEvent::Renamed { .. } => "access.role.renamed",
            RoleEvent::DescriptionUpdated { .. } => "access.role.description_updated",
            RoleEvent::TypeChanged { .. } => "access.role.type_changed",
            RoleEvent::ScopeChanged { .. } => "access.role.scope_changed",
            RoleEvent::ParentChanged { .. } => "access.role.parent_changed",
            RoleEvent::StatusChanged { .. } => "access.role.status_changed",
            RoleEvent::MemberAdded { .. } => "access.role.member_added",
            RoleEvent::MemberRemoved { .. } => "access.role.member_removed",
            RoleEvent::SubRoleAdded { .. } => "access.role.sub_role_added",
            RoleEvent::SubRoleRemoved { .. } => "access.role.sub_role_removed",
            RoleEvent::PermissionGranted { .. } => "access.role.permission_granted",
            RoleEvent::PermissionRevoked { .. } => "access.role.permission_revoked",
            RoleEvent::SettingsUpdated { .. } => "access.role.settings_updated",
            RoleEvent::StatisticsUpdated { .. } => "access.role.statistics_updated",
            RoleEvent::LimitsWarning { .. } => "access.role.limits_warning",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Aggregate root: Role.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleAggregate {
    role: Role,
    settings: RoleSettings,
    limits: RoleLimits,
    statistics: RoleStatistics,
    sub_roles: BTreeSet<RoleId>,
    warning_ratio: f64,
    version: u64,
    events: EventBuffer<RoleEvent>,
}

impl RoleAggregate {
    pub fn create(role: Role, now: DateTime<Utc>) -> Self {
        Self::create_inner(role, None, now)
    }

    fn create_inner(role: Role, cloned_from: Option<RoleId>, now: DateTime<Utc>) -> Self {
        let statistics = RoleStatistics {
            member_count: role.members().len() as u64,
            active_member_count: 0,
            sub_role_count: 0,
            permission_count: role.permissions().count() as u64,
            last_updated: now,
        };
        let mut aggregate = Self {
            role,
            settings: RoleSettings::default(),
            limits: RoleLimits::default(),
            statistics,
            sub_roles: BTreeSet::new(),
            warning_ratio: PolicyConfig::DEFAULT_LIMIT_WARNING_RATIO,
            version: 0,
            events: EventBuffer::new(),
        };
        let payload = RoleEvent::Created {
            organization_id: aggregate.role.organization_id(),
            code: aggregate.role.code().to_string(),
            name: aggregate.role.name().to_string(),
            role_type: aggregate.role.role_type(),
            cloned_from,
        };
        aggregate.record(now, payload);
        aggregate
    }

    pub fn with_policy(mut self, config: &PolicyConfig) -> Self {
        self.warning_ratio = config.limit_warning_ratio;
        self
    }

    /// New role with a fresh identity carrying a structural copy of this role's
    /// permissions, settings and limits. Members and sub-roles are not copied.
    pub fn clone_as(&self, id: RoleId, code: RoleCode, name: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        let role = self.role.duplicate(id, code, name, now)?;
        let mut copy = Self::create_inner(role, Some(*self.role.id()), now);
        copy.settings = self.settings;
        copy.limits = self.limits;
        copy.warning_ratio = self.warning_ratio;
        Ok(copy)
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn settings(&self) -> &RoleSettings {
        &self.settings
    }

    pub fn limits(&self) -> &RoleLimits {
        &self.limits
    }

    pub fn statistics(&self) -> &RoleStatistics {
        &self.statistics
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.role.organization_id()
    }

    pub fn parent_id(&self) -> Option<RoleId> {
        self.role.parent_id().copied()
    }

    pub fn status(&self) -> EntityStatus {
        self.role.status()
    }

    pub fn is_active(&self) -> bool {
        self.role.is_active()
    }

    pub fn is_system(&self) -> bool {
        self.role.is_system()
    }

    pub fn members(&self) -> Vec<UserId> {
        self.role.members().iter().copied().collect()
    }

    pub fn sub_roles(&self) -> &BTreeSet<RoleId> {
        &self.sub_roles
    }

    pub fn has_member(&self, user_id: UserId) -> bool {
        self.role.has_member(user_id)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.settings.expires_at.is_some_and(|at| at <= now)
    }

    /// Active and not expired.
    pub fn is_assignable(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && !self.is_expired(now)
    }

    /// Not SYSTEM, no members, no sub-roles.
    pub fn can_be_deleted(&self) -> bool {
        !self.is_system() && self.role.members().is_empty() && self.sub_roles.is_empty()
    }

    fn record(&mut self, now: DateTime<Utc>, payload: RoleEvent) {
        self.version += 1;
        self.statistics.last_updated = now;
        let id = *self.role.id();
        self.events.record(id, now, payload);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Details & hierarchy
    // ─────────────────────────────────────────────────────────────────────────

    pub fn update_name(&mut self, name: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let from = self.role.name().to_string();
        self.role.update_name(name, now)?;
        let to = self.role.name().to_string();
        self.record(now, RoleEvent::Renamed { from, to });
        Ok(())
    }

    pub fn update_description(&mut self, description: Option<&str>, now: DateTime<Utc>) {
        self.role.update_description(description, now);
        let description = self.role.description().map(str::to_string);
        self.record(now, RoleEvent::DescriptionUpdated { description });
    }

    pub fn change_type(&mut self, role_type: RoleType, now: DateTime<Utc>) -> DomainResult<()> {
        let from = self.role.role_type();
        if from == role_type {
            return Err(DomainError::state(format!("role is already {role_type}")));
        }
        self.role.change_type(role_type, now)?;
        self.record(now, RoleEvent::TypeChanged { from, to: role_type });
        Ok(())
    }

    pub fn change_scope(&mut self, scope: RoleScope, now: DateTime<Utc>) -> DomainResult<()> {
        let from = self.role.scope();
        if from == scope {
            return Err(DomainError::state("role already has this scope"));
        }
        self.role.change_scope(scope, now);
        self.record(now, RoleEvent::ScopeChanged { from, to: scope });
        Ok(())
    }

    pub fn set_parent(&mut self, parent_id: Option<RoleId>, now: DateTime<Utc>) -> DomainResult<()> {
        let from = self.parent_id();
        if from == parent_id {
            return Err(DomainError::state("role already has this parent"));
        }
        self.role.set_parent(parent_id, now)?;
        self.record(now, RoleEvent::ParentChanged { from, to: parent_id });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────────────────

    pub fn change_status(
        &mut self,
        target: EntityStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let from = self.role.status();
        if from == target {
            return Err(DomainError::state(format!("role is already {target}")));
        }
        if from == EntityStatus::Disabled && target == EntityStatus::Active {
            self.validate_activation_from_disabled()?;
        }
        self.role.transition_to(target, now)?;
        self.record(
            now,
            RoleEvent::StatusChanged {
                from,
                to: target,
                reason: reason.map(str::to_string),
            },
        );
        Ok(())
    }

    /// Extension point for re-activating a disabled role. Always allowed today.
    fn validate_activation_from_disabled(&self) -> DomainResult<()> {
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Members & sub-roles
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_member(&mut self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.role.has_member(user_id) {
            return Err(DomainError::state(format!("user {user_id} already has role {}", self.role.code())));
        }
        if !self.is_assignable(now) {
            return Err(DomainError::state(format!(
                "role {} is {}{} and cannot be assigned",
                self.role.code(),
                self.role.status(),
                if self.is_expired(now) { " (expired)" } else { "" }
            )));
        }
        ensure_capacity(
            "members",
            self.settings.allow_member_addition,
            self.statistics.member_count,
            self.limits.max_members,
        )?;
        self.role.add_member(user_id, now);
        self.statistics.member_count = self.role.members().len() as u64;
        self.record(now, RoleEvent::MemberAdded { user_id });
        Ok(())
    }

    pub fn remove_member(&mut self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.role.has_member(user_id) {
            return Err(DomainError::state(format!(
                "user {user_id} is not assigned role {}",
                self.role.code()
            )));
        }
        self.role.remove_member(user_id, now);
        self.statistics.member_count = self.role.members().len() as u64;
        self.statistics.active_member_count =
            self.statistics.active_member_count.min(self.statistics.member_count);
        self.record(now, RoleEvent::MemberRemoved { user_id });
        Ok(())
    }

    pub fn add_sub_role(&mut self, role_id: RoleId, now: DateTime<Utc>) -> DomainResult<()> {
        if role_id == *self.role.id() {
            return Err(DomainError::hierarchy("a role cannot be its own sub-role"));
        }
        if self.sub_roles.contains(&role_id) {
            return Err(DomainError::state(format!("role {role_id} is already a sub-role")));
        }
        ensure_capacity(
            "sub-roles",
            self.settings.allow_sub_roles,
            self.statistics.sub_role_count,
            self.limits.max_sub_roles,
        )?;
        self.sub_roles.insert(role_id);
        self.statistics.sub_role_count = self.sub_roles.len() as u64;
        self.record(now, RoleEvent::SubRoleAdded { role_id });
        Ok(())
    }

    pub fn remove_sub_role(&mut self, role_id: RoleId, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.sub_roles.remove(&role_id) {
            return Err(DomainError::state(format!("role {role_id} is not a sub-role")));
        }
        self.statistics.sub_role_count = self.sub_roles.len() as u64;
        self.record(now, RoleEvent::SubRoleRemoved { role_id });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn grant_permission(&mut self, resource: &str, right: AccessRight, now: DateTime<Utc>) -> DomainResult<()> {
        let resource = resource.trim().to_ascii_lowercase();
        if resource.is_empty() {
            return Err(DomainError::validation("resource cannot be empty"));
        }
        if self.role.has_permission(&resource, right) {
            return Err(DomainError::state(format!(
                "role {} already holds {right:?} on {resource}",
                self.role.code()
            )));
        }
        ensure_capacity(
            "permissions",
            true,
            self.statistics.permission_count,
            self.limits.max_permissions,
        )?;
        self.role.grant(&resource, right, now);
        self.statistics.permission_count = self.role.permissions().count() as u64;
        self.record(now, RoleEvent::PermissionGranted { resource, right });
        Ok(())
    }

    pub fn revoke_permission(&mut self, resource: &str, right: AccessRight, now: DateTime<Utc>) -> DomainResult<()> {
        let resource = resource.trim().to_ascii_lowercase();
        if !self.role.revoke(&resource, right, now) {
            return Err(DomainError::state(format!(
                "role {} does not hold {right:?} on {resource}",
                self.role.code()
            )));
        }
        self.statistics.permission_count = self.role.permissions().count() as u64;
        self.record(now, RoleEvent::PermissionRevoked { resource, right });
        Ok(())
    }

    /// Grant every right a [`Permission`] stands for on its resource.
    ///
    /// Rights already held are skipped; returns how many were newly granted.
    pub fn grant_from(&mut self, permission: &Permission, now: DateTime<Utc>) -> DomainResult<usize> {
        if !permission.is_active() {
            return Err(DomainError::state(format!(
                "permission {} is {} and cannot be granted",
                permission.code(),
                permission.status()
            )));
        }
        if permission.organization_id() != self.organization_id() {
            return Err(DomainError::hierarchy(format!(
                "permission {} belongs to another organization",
                permission.code()
            )));
        }
        let rights = permission.action().rights();
        if rights.is_empty() {
            return Err(DomainError::validation(format!(
                "permission {} does not map to a resource right",
                permission.code()
            )));
        }

        let resource = permission.code().resource();
        let missing: Vec<AccessRight> = rights
            .into_iter()
            .filter(|r| !self.role.has_permission(resource, *r))
            .collect();
        let needed = missing.len() as u64;
        if needed > 0 && self.statistics.permission_count + needed > self.limits.max_permissions {
            return Err(DomainError::capacity(format!(
                "cannot add more permissions: {needed} needed, {} of {} in use",
                self.statistics.permission_count, self.limits.max_permissions
            )));
        }

        for right in &missing {
            self.grant_permission(resource, *right, now)?;
        }
        Ok(missing.len())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Settings & statistics
    // ─────────────────────────────────────────────────────────────────────────

    pub fn update_settings(&mut self, patch: RoleSettingsPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let stats = self.statistics;
        let guards = [
            ("members", patch.max_members, stats.member_count),
            ("sub-roles", patch.max_sub_roles, stats.sub_role_count),
            ("permissions", patch.max_permissions, stats.permission_count),
        ];
        for (resource, new_max, current) in guards {
            if let Some(new_max) = new_max {
                ensure_limit_covers(resource, new_max, current)?;
            }
        }
        if patch.allow_delegation == Some(true) && self.is_system() {
            return Err(DomainError::state("system roles cannot be delegated"));
        }

        let s = &mut self.settings;
        s.allow_delegation = patch.allow_delegation.unwrap_or(s.allow_delegation);
        s.allow_member_addition = patch.allow_member_addition.unwrap_or(s.allow_member_addition);
        s.allow_sub_roles = patch.allow_sub_roles.unwrap_or(s.allow_sub_roles);
        s.inherit_permissions = patch.inherit_permissions.unwrap_or(s.inherit_permissions);
        if let Some(expires_at) = patch.expires_at {
            s.expires_at = expires_at;
        }

        let l = &mut self.limits;
        l.max_members = patch.max_members.unwrap_or(l.max_members);
        l.max_sub_roles = patch.max_sub_roles.unwrap_or(l.max_sub_roles);
        l.max_permissions = patch.max_permissions.unwrap_or(l.max_permissions);

        self.record(
            now,
            RoleEvent::SettingsUpdated {
                settings: self.settings,
                limits: self.limits,
            },
        );
        Ok(())
    }

    pub fn update_statistics(&mut self, update: RoleStatisticsUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(active) = update.active_member_count {
            let active = non_negative("active_member_count", active)?;
            if active > self.statistics.member_count {
                return Err(DomainError::validation(format!(
                    "active_member_count ({active}) cannot exceed member_count ({})",
                    self.statistics.member_count
                )));
            }
            self.statistics.active_member_count = active;
        }
        self.record(
            now,
            RoleEvent::StatisticsUpdated {
                statistics: self.statistics,
            },
        );
        self.check_limits(now);
        Ok(())
    }

    pub fn check_limits(&mut self, now: DateTime<Utc>) -> Vec<LimitWarning> {
        let stats = self.statistics;
        let limits = self.limits;
        let warnings = limit_warnings(
            &[
                ("members", stats.member_count, limits.max_members),
                ("sub-roles", stats.sub_role_count, limits.max_sub_roles),
                ("permissions", stats.permission_count, limits.max_permissions),
            ],
            self.warning_ratio,
        );
        if !warnings.is_empty() {
            tracing::warn!(
                role_id = %self.role.id(),
                count = warnings.len(),
                "role is approaching its limits"
            );
            self.record(
                now,
                RoleEvent::LimitsWarning {
                    warnings: warnings.clone(),
                },
            );
        }
        warnings
    }
}

impl AggregateRoot for RoleAggregate {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        self.role.id()
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl RecordsEvents for RoleAggregate {
    type Payload = RoleEvent;

    fn pending_events(&self) -> &[DomainEvent<RoleEvent>] {
        self.events.pending()
    }

    fn drain_events(&mut self) -> Vec<DomainEvent<RoleEvent>> {
        self.events.drain()
    }
}
