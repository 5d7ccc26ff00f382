//! Department aggregate: department entity, manager, role assignments and limits.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgiam_core::limits::{ensure_capacity, ensure_limit_covers, limit_warnings, non_negative};
use orgiam_core::{
    AggregateRoot, DepartmentId, DomainError, DomainResult, Entity, EntityStatus, Hierarchical,
    LimitWarning, OrganizationId, PolicyConfig, RoleId, UserId,
};
use orgiam_events::{DomainEvent, EventBuffer, EventPayload, RecordsEvents};

use crate::department::Department;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentSettings {
    pub allow_member_addition: bool,
    pub allow_sub_departments: bool,
    pub allow_role_assignment: bool,
}

impl Default for DepartmentSettings {
    fn default() -> Self {
        Self {
            allow_member_addition: true,
            allow_sub_departments: true,
            allow_role_assignment: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentLimits {
    pub max_members: u64,
    pub max_sub_departments: u64,
    pub max_roles: u64,
}

impl Default for DepartmentLimits {
    fn default() -> Self {
        Self {
            max_members: 200,
            max_sub_departments: 20,
            max_roles: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentStatistics {
    pub member_count: u64,
    pub active_member_count: u64,
    pub sub_department_count: u64,
    pub role_count: u64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepartmentSettingsPatch {
    pub allow_member_addition: Option<bool>,
    pub allow_sub_departments: Option<bool>,
    pub allow_role_assignment: Option<bool>,
    pub max_members: Option<u64>,
    pub max_sub_departments: Option<u64>,
    pub max_roles: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepartmentStatisticsUpdate {
    pub active_member_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DepartmentEvent {
    Created {
        organization_id: OrganizationId,
        code: String,
        name: String,
        parent_id: Option<DepartmentId>,
    },
    Renamed {
        from: String,
        to: String,
    },
    DescriptionUpdated {
        description: Option<String>,
    },
    ParentChanged {
        from: Option<DepartmentId>,
        to: Option<DepartmentId>,
    },
    StatusChanged {
        from: EntityStatus,
        to: EntityStatus,
        reason: Option<String>,
    },
    ManagerAssigned {
        manager_id: UserId,
    },
    ManagerRemoved {
        manager_id: UserId,
    },
    MemberAdded {
        user_id: UserId,
    },
    MemberRemoved {
        user_id: UserId,
    },
    SubDepartmentAdded {
        child_id: DepartmentId,
    },
    SubDepartmentRemoved {
        child_id: DepartmentId,
    },
    RoleAssigned {
        role_id: RoleId,
    },
    RoleRemoved {
        role_id: RoleId,
    },
    SettingsUpdated {
        settings: DepartmentSettings,
        limits: DepartmentLimits,
    },
    StatisticsUpdated {
        statistics: DepartmentStatistics,
    },
    LimitsWarning {
        warnings: Vec<LimitWarning>,
    },
}

impl EventPayload for DepartmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DepartmentEvent::Created { .. } => "directory.department.created",
            DepartmentEvent::Renamed { .. } => "directory.department.renamed",
            DepartmentEvent::DescriptionUpdated { .. } => "directory.department.description_updated",
            DepartmentEvent::ParentChanged { .. } => "directory.department.parent_changed",
            DepartmentEvent::StatusChanged { .. } => "directory.department.status_changed",
            DepartmentEvent::ManagerAssigned { .. } => "directory.department.manager_assigned",
            DepartmentEvent::ManagerRemoved { .. } => "directory.department.manager_removed",
            DepartmentEvent::MemberAdded { .. } => "directory.department.member_added",
            DepartmentEvent::MemberRemoved { .. } => "directory.department.member_removed",
            DepartmentEvent::SubDepartmentAdded { .. } => "directory.department.sub_department_added",
            DepartmentEvent::SubDepartmentRemoved { .. } => {
                "directory.department.sub_department_removed"
            }
            DepartmentEvent::RoleAssigned { .. } => "directory.department.role_assigned",
            DepartmentEvent::RoleRemoved { .. } => "directory.department.role_removed",
            DepartmentEvent::SettingsUpdated { .. } => "directory.department.settings_updated",
            DepartmentEvent::StatisticsUpdated { .. } => "directory.department.statistics_updated",
            DepartmentEvent::LimitsWarning { .. } => "directory.department.limits_warning",
        }
    }
}

/// Aggregate root: Department.
#[derive(Debug, Clone, PartialEq)]
pub struct DepartmentAggregate {
    department: Department,
    settings: DepartmentSettings,
    limits: DepartmentLimits,
    statistics: DepartmentStatistics,
    roles: BTreeSet<RoleId>,
    warning_ratio: f64,
    version: u64,
    events: EventBuffer<DepartmentEvent>,
}

impl DepartmentAggregate {
    pub fn create(department: Department, now: DateTime<Utc>) -> Self {
        let statistics = DepartmentStatistics {
            member_count: department.members().len() as u64,
            active_member_count: 0,
            sub_department_count: department.children().len() as u64,
            role_count: 0,
            last_updated: now,
        };
        let mut aggregate = Self {
            department,
            settings: DepartmentSettings::default(),
            limits: DepartmentLimits::default(),
            statistics,
            roles: BTreeSet::new(),
            warning_ratio: PolicyConfig::DEFAULT_LIMIT_WARNING_RATIO,
            version: 0,
            events: EventBuffer::new(),
        };
        let payload = DepartmentEvent::Created {
            organization_id: aggregate.department.organization_id(),
            code: aggregate.department.code().to_string(),
            name: aggregate.department.name().to_string(),
            parent_id: aggregate.department.parent_id().copied(),
        };
        aggregate.record(now, payload);
        aggregate
    }

    pub fn with_policy(mut self, config: &PolicyConfig) -> Self {
        self.warning_ratio = config.limit_warning_ratio;
        self
    }

    pub fn department(&self) -> &Department {
        &self.department
    }

    pub fn settings(&self) -> &DepartmentSettings {
        &self.settings
    }

    pub fn limits(&self) -> &DepartmentLimits {
        &self.limits
    }

    pub fn statistics(&self) -> &DepartmentStatistics {
        &self.statistics
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.department.organization_id()
    }

    pub fn parent_id(&self) -> Option<DepartmentId> {
        self.department.parent_id().copied()
    }

    pub fn status(&self) -> EntityStatus {
        self.department.status()
    }

    pub fn is_active(&self) -> bool {
        self.department.is_active()
    }

    pub fn manager_id(&self) -> Option<UserId> {
        self.department.manager_id()
    }

    pub fn members(&self) -> Vec<UserId> {
        self.department.members().iter().copied().collect()
    }

    pub fn children(&self) -> Vec<DepartmentId> {
        self.department.children().iter().copied().collect()
    }

    pub fn roles(&self) -> &BTreeSet<RoleId> {
        &self.roles
    }

    pub fn has_member(&self, user_id: UserId) -> bool {
        self.department.has_member(user_id)
    }

    pub fn can_be_deleted(&self) -> bool {
        self.department.children().is_empty() && self.department.members().is_empty()
    }

    fn record(&mut self, now: DateTime<Utc>, payload: DepartmentEvent) {
        self.version += 1;
        self.statistics.last_updated = now;
        let id = *self.department.id();
        self.events.record(id, now, payload);
    }

    pub fn update_name(&mut self, name: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let from = self.department.name().to_string();
        self.department.update_name(name, now)?;
        let to = self.department.name().to_string();
        self.record(now, DepartmentEvent::Renamed { from, to });
        Ok(())
    }

    pub fn update_description(&mut self, description: Option<&str>, now: DateTime<Utc>) {
        self.department.update_description(description, now);
        let description = self.department.description().map(str::to_string);
        self.record(now, DepartmentEvent::DescriptionUpdated { description });
    }

    pub fn set_parent(&mut self, parent_id: Option<DepartmentId>, now: DateTime<Utc>) -> DomainResult<()> {
        let from = self.parent_id();
        if from == parent_id {
            return Err(DomainError::state("department already has this parent"));
        }
        self.department.set_parent(parent_id, now)?;
        self.record(now, DepartmentEvent::ParentChanged { from, to: parent_id });
        Ok(())
    }

    pub fn change_status(
        &mut self,
        target: EntityStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let from = self.department.status();
        if from == target {
            return Err(DomainError::state(format!("department is already {target}")));
        }
        if from == EntityStatus::Disabled && target == EntityStatus::Active {
            self.validate_activation_from_disabled()?;
        }
        self.department.transition_to(target, now)?;
        self.record(
            now,
            DepartmentEvent::StatusChanged {
                from,
                to: target,
                reason: reason.map(str::to_string),
            },
        );
        Ok(())
    }

    /// Extension point for re-activating a disabled department. Always allowed today.
    fn validate_activation_from_disabled(&self) -> DomainResult<()> {
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Manager & members
    // ─────────────────────────────────────────────────────────────────────────

    /// The manager must already be a member.
    pub fn assign_manager(&mut self, manager_id: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.department.has_member(manager_id) {
            return Err(DomainError::state(format!(
                "user {manager_id} must be a member before becoming manager"
            )));
        }
        if self.department.manager_id() == Some(manager_id) {
            return Err(DomainError::state(format!("user {manager_id} is already the manager")));
        }
        self.department.set_manager(Some(manager_id), now);
        self.record(now, DepartmentEvent::ManagerAssigned { manager_id });
        Ok(())
    }

    pub fn remove_manager(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        let Some(manager_id) = self.department.manager_id() else {
            return Err(DomainError::state("department has no manager"));
        };
        self.department.set_manager(None, now);
        self.record(now, DepartmentEvent::ManagerRemoved { manager_id });
        Ok(())
    }

    pub fn add_member(&mut self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.department.has_member(user_id) {
            return Err(DomainError::state(format!("user {user_id} is already a member")));
        }
        ensure_capacity(
            "members",
            self.settings.allow_member_addition,
            self.statistics.member_count,
            self.limits.max_members,
        )?;
        self.department.add_member(user_id, now);
        self.statistics.member_count = self.department.members().len() as u64;
        self.record(now, DepartmentEvent::MemberAdded { user_id });
        Ok(())
    }

    /// The current manager cannot be removed as a member.
    pub fn remove_member(&mut self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.department.has_member(user_id) {
            return Err(DomainError::state(format!("user {user_id} is not a member")));
        }
        if self.department.manager_id() == Some(user_id) {
            return Err(DomainError::state(
                "cannot remove the department manager; remove the manager first",
            ));
        }
        self.department.remove_member(user_id, now);
        self.statistics.member_count = self.department.members().len() as u64;
        self.statistics.active_member_count =
            self.statistics.active_member_count.min(self.statistics.member_count);
        self.record(now, DepartmentEvent::MemberRemoved { user_id });
        Ok(())
    }

    pub fn add_sub_department(&mut self, child_id: DepartmentId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.department.has_child(child_id) {
            return Err(DomainError::state(format!(
                "department {child_id} is already a sub-department"
            )));
        }
        ensure_capacity(
            "sub-departments",
            self.settings.allow_sub_departments,
            self.statistics.sub_department_count,
            self.limits.max_sub_departments,
        )?;
        self.department.add_child(child_id, now)?;
        self.statistics.sub_department_count = self.department.children().len() as u64;
        self.record(now, DepartmentEvent::SubDepartmentAdded { child_id });
        Ok(())
    }

    pub fn remove_sub_department(&mut self, child_id: DepartmentId, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.department.has_child(child_id) {
            return Err(DomainError::state(format!(
                "department {child_id} is not a sub-department"
            )));
        }
        self.department.remove_child(child_id, now);
        self.statistics.sub_department_count = self.department.children().len() as u64;
        self.record(now, DepartmentEvent::SubDepartmentRemoved { child_id });
        Ok(())
    }

    pub fn assign_role(&mut self, role_id: RoleId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.roles.contains(&role_id) {
            return Err(DomainError::state(format!("role {role_id} is already assigned")));
        }
        ensure_capacity(
            "roles",
            self.settings.allow_role_assignment,
            self.statistics.role_count,
            self.limits.max_roles,
        )?;
        self.roles.insert(role_id);
        self.statistics.role_count = self.roles.len() as u64;
        self.record(now, DepartmentEvent::RoleAssigned { role_id });
        Ok(())
    }

    pub fn remove_role(&mut self, role_id: RoleId, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.roles.remove(&role_id) {
            return Err(DomainError::state(format!("role {role_id} is not assigned")));
        }
        self.statistics.role_count = self.roles.len() as u64;
        self.record(now, DepartmentEvent::RoleRemoved { role_id });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Settings & statistics
    // ─────────────────────────────────────────────────────────────────────────

    pub fn update_settings(&mut self, patch: DepartmentSettingsPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let stats = self.statistics;
        let guards = [
            ("members", patch.max_members, stats.member_count),
            ("sub-departments", patch.max_sub_departments, stats.sub_department_count),
            ("roles", patch.max_roles, stats.role_count),
        ];
        for (resource, new_max, current) in guards {
            if let Some(new_max) = new_max {
                ensure_limit_covers(resource, new_max, current)?;
            }
        }

        let s = &mut self.settings;
        s.allow_member_addition = patch.allow_member_addition.unwrap_or(s.allow_member_addition);
        s.allow_sub_departments = patch.allow_sub_departments.unwrap_or(s.allow_sub_departments);
        s.allow_role_assignment = patch.allow_role_assignment.unwrap_or(s.allow_role_assignment);

        let l = &mut self.limits;
        l.max_members = patch.max_members.unwrap_or(l.max_members);
        l.max_sub_departments = patch.max_sub_departments.unwrap_or(l.max_sub_departments);
        l.max_roles = patch.max_roles.unwrap_or(l.max_roles);

        self.record(
            now,
            DepartmentEvent::SettingsUpdated {
                settings: self.settings,
                limits: self.limits,
            },
        );
        Ok(())
    }

    pub fn update_statistics(&mut self, update: DepartmentStatisticsUpdate, now: DateTime<Utc>) -> DomainResult<()> {
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
            DepartmentEvent::StatisticsUpdated {
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
                ("sub-departments", stats.sub_department_count, limits.max_sub_departments),
                ("roles", stats.role_count, limits.max_roles),
            ],
            self.warning_ratio,
        );
        if !warnings.is_empty() {
            tracing::warn!(
                department_id = %self.department.id(),
                count = warnings.len(),
                "department is approaching its limits"
            );
            self.record(
                now,
                DepartmentEvent::LimitsWarning {
                    warnings: warnings.clone(),
                },
            );
        }
        warnings
    }
}

impl AggregateRoot for DepartmentAggregate {
    type Id = DepartmentId;

    fn id(&self) -> &Self::Id {
        self.department.id()
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl RecordsEvents for DepartmentAggregate {
    type Payload = DepartmentEvent;

    fn pending_events(&self) -> &[DomainEvent<DepartmentEvent>] {
        self.events.pending()
    }

    fn drain_events(&mut self) -> Vec<DomainEvent<DepartmentEvent>> {
        self.events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgiam_core::ErrorKind;
    use orgiam_events::Event;
    use proptest::prelude::*;

    use crate::DepartmentCode;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn aggregate() -> DepartmentAggregate {
        let dept = Department::new(
            DepartmentId::new(),
            OrganizationId::new(),
            DepartmentCode::new("ENG").unwrap(),
            "Engineering",
            t0(),
        )
        .unwrap();
        let mut agg = DepartmentAggregate::create(dept, t0());
        agg.drain_events();
        agg
    }

    #[test]
    fn manager_must_be_member_and_cannot_be_removed() {
        let mut agg = aggregate();
        let user = UserId::new();
        assert!(agg.assign_manager(user, t0()).is_err());
        agg.add_member(user, t0()).unwrap();
        agg.assign_manager(user, t0()).unwrap();
        assert_eq!(agg.manager_id(), Some(user));
        assert!(agg.remove_member(user, t0()).is_err());
        agg.remove_manager(t0()).unwrap();
        agg.remove_member(user, t0()).unwrap();
        assert!(agg.remove_manager(t0()).is_err());

        let types: Vec<_> = agg.drain_events().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                "directory.department.member_added",
                "directory.department.manager_assigned",
                "directory.department.manager_removed",
                "directory.department.member_removed",
            ]
        );
    }

    #[test]
    fn sub_department_rules() {
        let mut agg = aggregate();
        let own_id = *agg.id();
        assert_eq!(
            agg.add_sub_department(own_id, t0()).unwrap_err().kind(),
            Some(ErrorKind::Hierarchy)
        );
        let child = DepartmentId::new();
        agg.add_sub_department(child, t0()).unwrap();
        assert!(agg.add_sub_department(child, t0()).is_err());
        assert!(!agg.can_be_deleted());
        agg.remove_sub_department(child, t0()).unwrap();
        assert!(agg.can_be_deleted());
    }

    #[test]
    fn active_members_cannot_exceed_members() {
        let mut agg = aggregate();
        agg.add_member(UserId::new(), t0()).unwrap();
        assert!(
            agg.update_statistics(DepartmentStatisticsUpdate { active_member_count: Some(2) }, t0())
                .is_err()
        );
        assert!(
            agg.update_statistics(DepartmentStatisticsUpdate { active_member_count: Some(-1) }, t0())
                .is_err()
        );
        agg.update_statistics(DepartmentStatisticsUpdate { active_member_count: Some(1) }, t0())
            .unwrap();
        assert_eq!(agg.statistics().active_member_count, 1);
    }

    #[test]
    fn status_changes_are_recorded() {
        let mut agg = aggregate();
        agg.change_status(EntityStatus::Suspended, Some("reorg"), t0()).unwrap();
        assert!(agg.change_status(EntityStatus::Suspended, None, t0()).is_err());
        let events = agg.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "directory.department.status_changed");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: after `max_members` adds the next one fails and the count holds.
        #[test]
        fn member_capacity_is_enforced(max in 1u64..30) {
            let mut agg = aggregate();
            agg.update_settings(
                DepartmentSettingsPatch { max_members: Some(max), ..Default::default() },
                t0(),
            )
            .unwrap();
            for _ in 0..max {
                agg.add_member(UserId::new(), t0()).unwrap();
            }
            let err = agg.add_member(UserId::new(), t0()).unwrap_err();
            prop_assert_eq!(err.kind(), Some(ErrorKind::Capacity));
            prop_assert_eq!(agg.statistics().member_count, max);
        }
    }
}
