//! Organization aggregate: the organization entity plus its department and
//! role registries, settings, limits and statistics.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgiam_core::limits::{ensure_capacity, ensure_limit_covers, limit_warnings, non_negative};
use orgiam_core::{
    AggregateRoot, DepartmentId, DomainError, DomainResult, Entity, EntityStatus, Hierarchical,
    LimitWarning, OrganizationId, PolicyConfig, RoleId, TenantId, UserId,
};
use orgiam_events::{DomainEvent, EventBuffer, EventPayload, RecordsEvents};

use crate::organization::{Organization, OrganizationType};

// ─────────────────────────────────────────────────────────────────────────────
// Settings, limits, statistics
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSettings {
    pub allow_member_addition: bool,
    pub allow_department_creation: bool,
    pub allow_role_creation: bool,
    pub allow_sub_organizations: bool,
    pub allow_project_creation: bool,
}

impl Default for OrganizationSettings {
    fn default() -> Self {
        Self {
            allow_member_addition: true,
            allow_department_creation: true,
            allow_role_creation: true,
            allow_sub_organizations: true,
            allow_project_creation: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationLimits {
    pub max_users: u64,
    pub max_departments: u64,
    pub max_roles: u64,
    pub max_projects: u64,
    pub max_sub_organizations: u64,
}

impl Default for OrganizationLimits {
    fn default() -> Self {
        Self {
            max_users: 1_000,
            max_departments: 100,
            max_roles: 100,
            max_projects: 100,
            max_sub_organizations: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationStatistics {
    pub user_count: u64,
    pub active_user_count: u64,
    pub department_count: u64,
    pub role_count: u64,
    pub project_count: u64,
    pub sub_organization_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// Partial settings update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrganizationSettingsPatch {
    pub allow_member_addition: Option<bool>,
    pub allow_department_creation: Option<bool>,
    pub allow_role_creation: Option<bool>,
    pub allow_sub_organizations: Option<bool>,
    pub allow_project_creation: Option<bool>,
    pub max_users: Option<u64>,
    pub max_departments: Option<u64>,
    pub max_roles: Option<u64>,
    pub max_projects: Option<u64>,
    pub max_sub_organizations: Option<u64>,
}

/// Counters maintained outside this aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrganizationStatisticsUpdate {
    pub active_user_count: Option<i64>,
    pub project_count: Option<i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrganizationEvent {
    Created {
        tenant_id: TenantId,
        code: String,
        name: String,
        parent_id: Option<OrganizationId>,
    },
    Renamed {
        from: String,
        to: String,
    },
    DetailsUpdated {
        description: Option<String>,
        org_type: OrganizationType,
    },
    ParentChanged {
        from: Option<OrganizationId>,
        to: Option<OrganizationId>,
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
    DepartmentAdded {
        department_id: DepartmentId,
    },
    DepartmentRemoved {
        department_id: DepartmentId,
    },
    RoleAdded {
        role_id: RoleId,
    },
    RoleRemoved {
        role_id: RoleId,
    },
    SubOrganizationAdded {
        child_id: OrganizationId,
    },
    SubOrganizationRemoved {
        child_id: OrganizationId,
    },
    ProjectAdded {
        project_count: u64,
    },
    ProjectRemoved {
        project_count: u64,
    },
    SettingsUpdated {
        settings: OrganizationSettings,
        limits: OrganizationLimits,
    },
    StatisticsUpdated {
        statistics: OrganizationStatistics,
    },
    LimitsWarning {
        warnings: Vec<LimitWarning>,
    },
}

impl EventPayload for OrganizationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrganizationEvent::Created { .. } => "directory.organization.created",
            OrganizationEvent::Renamed { .. } => "directory.organization.renamed",
            OrganizationEvent::DetailsUpdated { .. } => "directory.organization.details_updated",
            OrganizationEvent::ParentChanged { .. } => "directory.organization.parent_changed",
            OrganizationEvent::StatusChanged { .. } => "directory.organization.status_changed",
            OrganizationEvent::MemberAdded { .. } => "directory.organization.member_added",
            OrganizationEvent::MemberRemoved { .. } => "directory.organization.member_removed",
            OrganizationEvent::DepartmentAdded { .. } => "directory.organization.department_added",
            OrganizationEvent::DepartmentRemoved { .. } => "directory.organization.department_removed",
            OrganizationEvent::RoleAdded { .. } => "directory.organization.role_added",
            OrganizationEvent::RoleRemoved { .. } => "directory.organization.role_removed",
            OrganizationEvent::SubOrganizationAdded { .. } => {
                "directory.organization.sub_organization_added"
            }
            OrganizationEvent::SubOrganizationRemoved { .. } => {
                "directory.organization.sub_organization_removed"
            }
            OrganizationEvent::ProjectAdded { .. } => "directory.organization.project_added",
            OrganizationEvent::ProjectRemoved { .. } => "directory.organization.project_removed",
            OrganizationEvent::SettingsUpdated { .. } => "directory.organization.settings_updated",
            OrganizationEvent::StatisticsUpdated { .. } => "directory.organization.statistics_updated",
            OrganizationEvent::LimitsWarning { .. } => "directory.organization.limits_warning",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Aggregate root: Organization.
///
/// The aggregate owns capacity and membership invariants; tree-wide checks
/// (descendants, code uniqueness) belong to the domain service.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationAggregate {
    organization: Organization,
    settings: OrganizationSettings,
    limits: OrganizationLimits,
    statistics: OrganizationStatistics,
    departments: BTreeSet<DepartmentId>,
    roles: BTreeSet<RoleId>,
    warning_ratio: f64,
    version: u64,
    events: EventBuffer<OrganizationEvent>,
}

impl OrganizationAggregate {
    /// Wrap a freshly created organization and record `Created`.
    pub fn create(organization: Organization, now: DateTime<Utc>) -> Self {
        let statistics = OrganizationStatistics {
            user_count: organization.members().len() as u64,
            active_user_count: 0,
            department_count: 0,
            role_count: 0,
            project_count: 0,
            sub_organization_count: organization.children().len() as u64,
            last_updated: now,
        };
        let mut aggregate = Self {
            organization,
            settings: OrganizationSettings::default(),
            limits: OrganizationLimits::default(),
            statistics,
            departments: BTreeSet::new(),
            roles: BTreeSet::new(),
            warning_ratio: PolicyConfig::DEFAULT_LIMIT_WARNING_RATIO,
            version: 0,
            events: EventBuffer::new(),
        };
        let payload = OrganizationEvent::Created {
            tenant_id: aggregate.organization.tenant_id(),
            code: aggregate.organization.code().to_string(),
            name: aggregate.organization.name().to_string(),
            parent_id: aggregate.organization.parent_id().copied(),
        };
        aggregate.record(now, payload);
        aggregate
    }

    pub fn with_policy(mut self, config: &PolicyConfig) -> Self {
        self.warning_ratio = config.limit_warning_ratio;
        self
    }

    pub fn organization(&self) -> &Organization {
        &self.organization
    }

    pub fn settings(&self) -> &OrganizationSettings {
        &self.settings
    }

    pub fn limits(&self) -> &OrganizationLimits {
        &self.limits
    }

    pub fn statistics(&self) -> &OrganizationStatistics {
        &self.statistics
    }

    pub fn tenant_id(&self) -> TenantId {
        self.organization.tenant_id()
    }

    pub fn parent_id(&self) -> Option<OrganizationId> {
        self.organization.parent_id().copied()
    }

    pub fn status(&self) -> EntityStatus {
        self.organization.status()
    }

    pub fn is_active(&self) -> bool {
        self.organization.is_active()
    }

    pub fn members(&self) -> Vec<UserId> {
        self.organization.members().iter().copied().collect()
    }

    pub fn children(&self) -> Vec<OrganizationId> {
        self.organization.children().iter().copied().collect()
    }

    pub fn departments(&self) -> &BTreeSet<DepartmentId> {
        &self.departments
    }

    pub fn roles(&self) -> &BTreeSet<RoleId> {
        &self.roles
    }

    pub fn has_member(&self, user_id: UserId) -> bool {
        self.organization.has_member(user_id)
    }

    /// No sub-organizations, members or departments left.
    pub fn can_be_deleted(&self) -> bool {
        self.organization.children().is_empty()
            && self.organization.members().is_empty()
            && self.departments.is_empty()
    }

    fn record(&mut self, now: DateTime<Utc>, payload: OrganizationEvent) {
        self.version += 1;
        self.statistics.last_updated = now;
        let id = *self.organization.id();
        self.events.record(id, now, payload);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Details & hierarchy
    // ─────────────────────────────────────────────────────────────────────────

    pub fn update_name(&mut self, name: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let from = self.organization.name().to_string();
        self.organization.update_name(name, now)?;
        let to = self.organization.name().to_string();
        self.record(now, OrganizationEvent::Renamed { from, to });
        Ok(())
    }

    pub fn update_details(
        &mut self,
        description: Option<&str>,
        org_type: OrganizationType,
        now: DateTime<Utc>,
    ) {
        self.organization.update_description(description, now);
        self.organization.change_type(org_type, now);
        self.record(
            now,
            OrganizationEvent::DetailsUpdated {
                description: self.organization.description().map(str::to_string),
                org_type,
            },
        );
    }

    /// Re-parent. Only the self-parent rule is checked here.
    pub fn set_parent(&mut self, parent_id: Option<OrganizationId>, now: DateTime<Utc>) -> DomainResult<()> {
        let from = self.parent_id();
        if from == parent_id {
            return Err(DomainError::state("organization already has this parent"));
        }
        self.organization.set_parent(parent_id, now)?;
        self.record(now, OrganizationEvent::ParentChanged { from, to: parent_id });
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
        let from = self.organization.status();
        if from == target {
            return Err(DomainError::state(format!("organization is already {target}")));
        }
        if from == EntityStatus::Disabled && target == EntityStatus::Active {
            self.validate_activation_from_disabled()?;
        }
        self.organization.transition_to(target, now)?;
        self.record(
            now,
            OrganizationEvent::StatusChanged {
                from,
                to: target,
                reason: reason.map(str::to_string),
            },
        );
        Ok(())
    }

    /// Extension point for re-activating a disabled organization. Always allowed today.
    fn validate_activation_from_disabled(&self) -> DomainResult<()> {
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Memberships
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_member(&mut self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.organization.has_member(user_id) {
            return Err(DomainError::state(format!("user {user_id} is already a member")));
        }
        ensure_capacity(
            "users",
            self.settings.allow_member_addition,
            self.statistics.user_count,
            self.limits.max_users,
        )?;
        self.organization.add_member(user_id, now);
        self.statistics.user_count = self.organization.members().len() as u64;
        self.record(now, OrganizationEvent::MemberAdded { user_id });
        Ok(())
    }

    pub fn remove_member(&mut self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.organization.has_member(user_id) {
            return Err(DomainError::state(format!("user {user_id} is not a member")));
        }
        self.organization.remove_member(user_id, now);
        self.statistics.user_count = self.organization.members().len() as u64;
        self.statistics.active_user_count =
            self.statistics.active_user_count.min(self.statistics.user_count);
        self.record(now, OrganizationEvent::MemberRemoved { user_id });
        Ok(())
    }

    pub fn add_department(&mut self, department_id: DepartmentId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.departments.contains(&department_id) {
            return Err(DomainError::state(format!(
                "department {department_id} already exists in the organization"
            )));
        }
        ensure_capacity(
            "departments",
            self.settings.allow_department_creation,
            self.statistics.department_count,
            self.limits.max_departments,
        )?;
        self.departments.insert(department_id);
        self.statistics.department_count = self.departments.len() as u64;
        self.record(now, OrganizationEvent::DepartmentAdded { department_id });
        Ok(())
    }

    pub fn remove_department(&mut self, department_id: DepartmentId, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.departments.remove(&department_id) {
            return Err(DomainError::state(format!(
                "department {department_id} not found in the organization"
            )));
        }
        self.statistics.department_count = self.departments.len() as u64;
        self.record(now, OrganizationEvent::DepartmentRemoved { department_id });
        Ok(())
    }

    pub fn add_role(&mut self, role_id: RoleId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.roles.contains(&role_id) {
            return Err(DomainError::state(format!("role {role_id} already exists in the organization")));
        }
        ensure_capacity(
            "roles",
            self.settings.allow_role_creation,
            self.statistics.role_count,
            self.limits.max_roles,
        )?;
        self.roles.insert(role_id);
        self.statistics.role_count = self.roles.len() as u64;
        self.record(now, OrganizationEvent::RoleAdded { role_id });
        Ok(())
    }

    pub fn remove_role(&mut self, role_id: RoleId, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.roles.remove(&role_id) {
            return Err(DomainError::state(format!("role {role_id} not found in the organization")));
        }
        self.statistics.role_count = self.roles.len() as u64;
        self.record(now, OrganizationEvent::RoleRemoved { role_id });
        Ok(())
    }

    pub fn add_sub_organization(&mut self, child_id: OrganizationId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.organization.has_child(child_id) {
            return Err(DomainError::state(format!(
                "organization {child_id} is already a sub-organization"
            )));
        }
        ensure_capacity(
            "sub-organizations",
            self.settings.allow_sub_organizations,
            self.statistics.sub_organization_count,
            self.limits.max_sub_organizations,
        )?;
        self.organization.add_child(child_id, now)?;
        self.statistics.sub_organization_count = self.organization.children().len() as u64;
        self.record(now, OrganizationEvent::SubOrganizationAdded { child_id });
        Ok(())
    }

    pub fn remove_sub_organization(&mut self, child_id: OrganizationId, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.organization.has_child(child_id) {
            return Err(DomainError::state(format!(
                "organization {child_id} is not a sub-organization"
            )));
        }
        self.organization.remove_child(child_id, now);
        self.statistics.sub_organization_count = self.organization.children().len() as u64;
        self.record(now, OrganizationEvent::SubOrganizationRemoved { child_id });
        Ok(())
    }

    pub fn add_project(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_capacity(
            "projects",
            self.settings.allow_project_creation,
            self.statistics.project_count,
            self.limits.max_projects,
        )?;
        self.statistics.project_count += 1;
        let project_count = self.statistics.project_count;
        self.record(now, OrganizationEvent::ProjectAdded { project_count });
        Ok(())
    }

    pub fn remove_project(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.statistics.project_count == 0 {
            return Err(DomainError::state("organization has no projects"));
        }
        self.statistics.project_count -= 1;
        let project_count = self.statistics.project_count;
        self.record(now, OrganizationEvent::ProjectRemoved { project_count });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Settings & statistics
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply `patch`. No limit may drop below its live count.
    pub fn update_settings(&mut self, patch: OrganizationSettingsPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let stats = self.statistics;
        let guards = [
            ("users", patch.max_users, stats.user_count),
            ("departments", patch.max_departments, stats.department_count),
            ("roles", patch.max_roles, stats.role_count),
            ("projects", patch.max_projects, stats.project_count),
            ("sub-organizations", patch.max_sub_organizations, stats.sub_organization_count),
        ];
        for (resource, new_max, current) in guards {
            if let Some(new_max) = new_max {
                ensure_limit_covers(resource, new_max, current)?;
            }
        }

        let s = &mut self.settings;
        s.allow_member_addition = patch.allow_member_addition.unwrap_or(s.allow_member_addition);
        s.allow_department_creation = patch
            .allow_department_creation
            .unwrap_or(s.allow_department_creation);
        s.allow_role_creation = patch.allow_role_creation.unwrap_or(s.allow_role_creation);
        s.allow_sub_organizations = patch
            .allow_sub_organizations
            .unwrap_or(s.allow_sub_organizations);
        s.allow_project_creation = patch.allow_project_creation.unwrap_or(s.allow_project_creation);

        let l = &mut self.limits;
        l.max_users = patch.max_users.unwrap_or(l.max_users);
        l.max_departments = patch.max_departments.unwrap_or(l.max_departments);
        l.max_roles = patch.max_roles.unwrap_or(l.max_roles);
        l.max_projects = patch.max_projects.unwrap_or(l.max_projects);
        l.max_sub_organizations = patch.max_sub_organizations.unwrap_or(l.max_sub_organizations);

        self.record(
            now,
            OrganizationEvent::SettingsUpdated {
                settings: self.settings,
                limits: self.limits,
            },
        );
        Ok(())
    }

    /// Apply externally tracked counters, then run [`Self::check_limits`].
    pub fn update_statistics(&mut self, update: OrganizationStatisticsUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let active_user_count = update
            .active_user_count
            .map(|v| non_negative("active_user_count", v))
            .transpose()?;
        let project_count = update
            .project_count
            .map(|v| non_negative("project_count", v))
            .transpose()?;

        if let Some(active) = active_user_count {
            if active > self.statistics.user_count {
                return Err(DomainError::validation(format!(
                    "active_user_count ({active}) cannot exceed user_count ({})",
                    self.statistics.user_count
                )));
            }
            self.statistics.active_user_count = active;
        }
        if let Some(projects) = project_count {
            self.statistics.project_count = projects;
        }

        self.record(
            now,
            OrganizationEvent::StatisticsUpdated {
                statistics: self.statistics,
            },
        );
        self.check_limits(now);
        Ok(())
    }

    /// Record one `LimitsWarning` listing every counter at or above the warning ratio.
    pub fn check_limits(&mut self, now: DateTime<Utc>) -> Vec<LimitWarning> {
        let stats = self.statistics;
        let limits = self.limits;
        let warnings = limit_warnings(
            &[
                ("users", stats.user_count, limits.max_users),
                ("departments", stats.department_count, limits.max_departments),
                ("roles", stats.role_count, limits.max_roles),
                ("projects", stats.project_count, limits.max_projects),
                ("sub-organizations", stats.sub_organization_count, limits.max_sub_organizations),
            ],
            self.warning_ratio,
        );
        if !warnings.is_empty() {
            tracing::warn!(
                organization_id = %self.organization.id(),
                count = warnings.len(),
                "organization is approaching its limits"
            );
            self.record(
                now,
                OrganizationEvent::LimitsWarning {
                    warnings: warnings.clone(),
                },
            );
        }
        warnings
    }
}

impl AggregateRoot for OrganizationAggregate {
    type Id = OrganizationId;

    fn id(&self) -> &Self::Id {
        self.organization.id()
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl RecordsEvents for OrganizationAggregate {
    type Payload = OrganizationEvent;

    fn pending_events(&self) -> &[DomainEvent<OrganizationEvent>] {
        self.events.pending()
    }

    fn drain_events(&mut self) -> Vec<DomainEvent<OrganizationEvent>> {
        self.events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgiam_core::ErrorKind;
    use orgiam_events::Event;
    use proptest::prelude::*;

    use crate::OrganizationCode;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn aggregate() -> OrganizationAggregate {
        let org = Organization::new(
            OrganizationId::new(),
            TenantId::new(),
            OrganizationCode::new("ACME").unwrap(),
            "Acme",
            OrganizationType::Company,
            t0(),
        )
        .unwrap();
        let mut agg = OrganizationAggregate::create(org, t0());
        agg.drain_events();
        agg
    }

    fn with_max_users(max: u64) -> OrganizationAggregate {
        let mut agg = aggregate();
        agg.update_settings(
            OrganizationSettingsPatch {
                max_users: Some(max),
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
        agg.drain_events();
        agg
    }

    #[test]
    fn create_records_created_event() {
        let org = Organization::new(
            OrganizationId::new(),
            TenantId::new(),
            OrganizationCode::new("ACME").unwrap(),
            "Acme",
            OrganizationType::Company,
            t0(),
        )
        .unwrap();
        let mut agg = OrganizationAggregate::create(org, t0());
        assert_eq!(agg.version(), 1);
        let events = agg.drain_events();
        assert_eq!(events[0].event_type(), "directory.organization.created");
        assert!(agg.pending_events().is_empty());
    }

    #[test]
    fn add_member_emits_event_and_rejects_duplicates() {
        let mut agg = aggregate();
        let user = UserId::new();
        agg.add_member(user, t0()).unwrap();
        let err = agg.add_member(user, t0()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));
        assert!(err.to_string().contains("already"));

        let events = agg.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "directory.organization.member_added");
        assert_eq!(agg.statistics().user_count, 1);
    }

    #[test]
    fn remove_absent_member_is_a_state_error() {
        let mut agg = aggregate();
        let err = agg.remove_member(UserId::new(), t0()).unwrap_err();
        assert!(err.to_string().contains("not a member"));
    }

    #[test]
    fn disabled_settings_block_additions() {
        let mut agg = aggregate();
        agg.update_settings(
            OrganizationSettingsPatch {
                allow_department_creation: Some(false),
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
        let err = agg.add_department(DepartmentId::new(), t0()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Capacity));
        assert!(err.to_string().contains("cannot add more departments"));
    }

    #[test]
    fn shrinking_limit_below_usage_fails() {
        let mut agg = aggregate();
        for _ in 0..3 {
            agg.add_member(UserId::new(), t0()).unwrap();
        }
        let err = agg
            .update_settings(
                OrganizationSettingsPatch {
                    max_users: Some(2),
                    ..Default::default()
                },
                t0(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Capacity));
        assert_eq!(agg.limits().max_users, 1_000);
        agg.update_settings(
            OrganizationSettingsPatch {
                max_users: Some(3),
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
    }

    #[test]
    fn change_status_rejects_noop_and_allows_reactivation() {
        let mut agg = aggregate();
        assert!(agg.change_status(EntityStatus::Active, None, t0()).is_err());
        agg.change_status(EntityStatus::Disabled, Some("merged"), t0()).unwrap();
        assert!(agg.change_status(EntityStatus::Suspended, None, t0()).is_err());
        agg.change_status(EntityStatus::Active, None, t0()).unwrap();
        assert!(agg.is_active());
    }

    #[test]
    fn self_parent_is_a_hierarchy_error() {
        let mut agg = aggregate();
        let own_id = *agg.id();
        let err = agg.set_parent(Some(own_id), t0()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Hierarchy));
        let err = agg.add_sub_organization(own_id, t0()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Hierarchy));
    }

    #[test]
    fn negative_statistics_are_rejected() {
        let mut agg = aggregate();
        let version = agg.version();
        let err = agg
            .update_statistics(
                OrganizationStatisticsUpdate {
                    project_count: Some(-3),
                    ..Default::default()
                },
                t0(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Format));
        assert_eq!(agg.version(), version);
    }

    #[test]
    fn statistics_update_emits_single_limits_warning() {
        let mut agg = with_max_users(10);
        for _ in 0..9 {
            agg.add_member(UserId::new(), t0()).unwrap();
        }
        agg.drain_events();
        agg.update_statistics(
            OrganizationStatisticsUpdate {
                project_count: Some(95),
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
        let events = agg.drain_events();
        let warnings: Vec<_> = events
            .iter()
            .filter_map(|e| match e.payload() {
                OrganizationEvent::LimitsWarning { warnings } => Some(warnings.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(warnings.len(), 1);
        let resources: Vec<_> = warnings[0].iter().map(|w| w.resource.as_str()).collect();
        assert_eq!(resources, vec!["users", "projects"]);
    }

    #[test]
    fn deletable_only_when_empty() {
        let mut agg = aggregate();
        assert!(agg.can_be_deleted());
        let dept = DepartmentId::new();
        agg.add_department(dept, t0()).unwrap();
        assert!(!agg.can_be_deleted());
        agg.remove_department(dept, t0()).unwrap();
        assert!(agg.can_be_deleted());
    }

    #[test]
    fn projects_are_counted() {
        let mut agg = aggregate();
        assert!(agg.remove_project(t0()).is_err());
        agg.add_project(t0()).unwrap();
        agg.add_project(t0()).unwrap();
        agg.remove_project(t0()).unwrap();
        assert_eq!(agg.statistics().project_count, 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: after `max_users` successful adds the next one fails with Capacity.
        #[test]
        fn member_capacity_is_enforced(max in 1u64..40) {
            let mut agg = with_max_users(max);
            for _ in 0..max {
                agg.add_member(UserId::new(), t0()).unwrap();
            }
            let err = agg.add_member(UserId::new(), t0()).unwrap_err();
            prop_assert_eq!(err.kind(), Some(ErrorKind::Capacity));
            prop_assert_eq!(agg.statistics().user_count, max);
            prop_assert_eq!(agg.members().len() as u64, max);
        }

        /// Property: a limit can never be set below the live count.
        #[test]
        fn limit_shrink_guard(current in 1u64..30) {
            let mut agg = aggregate();
            for _ in 0..current {
                agg.add_member(UserId::new(), t0()).unwrap();
            }
            let shrink = OrganizationSettingsPatch { max_users: Some(current - 1), ..Default::default() };
            prop_assert!(agg.update_settings(shrink, t0()).is_err());
            let exact = OrganizationSettingsPatch { max_users: Some(current), ..Default::default() };
            prop_assert!(agg.update_settings(exact, t0()).is_ok());
        }
    }
}
