//! Role orchestration: creation, cloning, hierarchy and permission grants.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use orgiam_access::{
    AccessRight, Permission, Role, RoleAggregate, RoleCode, RoleScope, RoleType,
};
use orgiam_core::{
    AggregateRoot, DomainError, EntityStatus, ExpectedVersion, OrganizationId, PolicyConfig, RoleId,
    Violations,
};
use orgiam_directory::OrganizationAggregate;

use crate::error::ServiceResult;
use crate::repository::{OrganizationRepository, RoleRepository};
use crate::{Tracked, finish, required, save_move};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRole {
    pub organization_id: OrganizationId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub role_type: RoleType,
    pub scope: RoleScope,
    pub parent_id: Option<RoleId>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub description: Option<String>,
    pub role_type: Option<RoleType>,
    pub scope: Option<RoleScope>,
    pub parent_id: Option<Option<RoleId>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRole {
    pub source_id: RoleId,
    pub code: String,
    pub name: String,
}

struct Reparent {
    target: Option<RoleId>,
    old_parent: Option<Tracked<RoleAggregate>>,
    new_parent: Option<Tracked<RoleAggregate>>,
}

pub struct RoleDomainService {
    roles: Arc<dyn RoleRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    policy: PolicyConfig,
}

impl RoleDomainService {
    pub fn new(
        roles: Arc<dyn RoleRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            roles,
            organizations,
            policy,
        }
    }

    pub fn get(&self, id: RoleId) -> ServiceResult<RoleAggregate> {
        self.roles
            .find_by_id(id)?
            .ok_or_else(|| DomainError::not_found(format!("role {id} does not exist")).into())
    }

    /// Validate and persist a new role, registering it on its organization
    /// (role capacity) and on its parent role.
    pub fn create_role(&self, cmd: CreateRole, now: DateTime<Utc>) -> ServiceResult<RoleAggregate> {
        tracing::debug!(organization_id = %cmd.organization_id, code = %cmd.code, "creating role");
        let mut violations = Violations::new();

        let code = required(&mut violations, "role code", &cmd.code)
            .and_then(|raw| violations.check(RoleCode::new(raw)));
        let name = required(&mut violations, "role name", &cmd.name);
        self.check_unique(code.as_ref(), name, cmd.organization_id, None, &mut violations)?;
        let organization = self.check_organization(cmd.organization_id, &mut violations)?;
        let parent = match cmd.parent_id {
            Some(parent_id) => self.check_parent(parent_id, cmd.organization_id, &mut violations)?,
            None => None,
        };

        finish(violations, "create_role")?;
        let (Some(code), Some(name), Some(organization)) = (code, name, organization) else {
            return Err(DomainError::validation("role code, name and organization are required").into());
        };

        let id = RoleId::new();
        let mut role = Role::new(id, cmd.organization_id, code, name, cmd.role_type, cmd.scope, now)?;
        role.update_description(cmd.description.as_deref(), now);
        role.set_parent(cmd.parent_id, now)?;
        let aggregate = RoleAggregate::create(role, now).with_policy(&self.policy);

        let mut organization = Tracked::new(organization);
        organization.aggregate.add_role(id, now)?;
        let mut parent = parent.map(Tracked::new);
        if let Some(parent) = parent.as_mut() {
            parent.aggregate.add_sub_role(id, now)?;
        }

        self.roles.save(&aggregate, ExpectedVersion::Exact(0))?;
        let registered = self
            .organizations
            .save(&organization.aggregate, organization.expected)
            .and_then(|()| match &parent {
                Some(parent) => self.roles.save(&parent.aggregate, parent.expected),
                None => Ok(()),
            });
        if let Err(err) = registered {
            self.roles.delete(id)?;
            return Err(err.into());
        }

        tracing::info!(
            role_id = %id,
            organization_id = %cmd.organization_id,
            code = %aggregate.role().code(),
            role_type = %aggregate.role().role_type(),
            "role created"
        );
        Ok(aggregate)
    }

    pub fn update_role(&self, id: RoleId, cmd: UpdateRole, now: DateTime<Utc>) -> ServiceResult<RoleAggregate> {
        tracing::debug!(role_id = %id, "updating role");
        let mut tracked = Tracked::new(self.get(id)?);
        let organization_id = tracked.aggregate.organization_id();
        let mut violations = Violations::new();

        let new_name = cmd
            .name
            .as_deref()
            .and_then(|raw| required(&mut violations, "role name", raw))
            .filter(|name| *name != tracked.aggregate.role().name());
        self.check_unique(None, new_name, organization_id, Some(id), &mut violations)?;

        if let Some(role_type) = cmd.role_type {
            if tracked.aggregate.is_system() && role_type != RoleType::System {
                violations.push(DomainError::state(format!(
                    "system role {} cannot change its type",
                    tracked.aggregate.role().code()
                )));
            }
        }

        let reparent = match cmd.parent_id {
            Some(target) if target != tracked.aggregate.parent_id() => {
                Some(self.plan_reparent(&tracked.aggregate, target, &mut violations)?)
            }
            _ => None,
        };

        finish(violations, "update_role")?;

        let aggregate = &mut tracked.aggregate;
        if let Some(name) = new_name {
            aggregate.update_name(name, now)?;
        }
        if let Some(description) = cmd.description.as_deref() {
            aggregate.update_description(Some(description), now);
        }
        if let Some(role_type) = cmd.role_type.filter(|t| *t != aggregate.role().role_type()) {
            aggregate.change_type(role_type, now)?;
        }
        if let Some(scope) = cmd.scope.filter(|s| *s != aggregate.role().scope()) {
            aggregate.change_scope(scope, now)?;
        }

        match reparent {
            Some(plan) => self.commit_reparent(tracked, plan, now),
            None => {
                self.roles.save(&tracked.aggregate, tracked.expected)?;
                tracing::info!(role_id = %id, "role updated");
                Ok(tracked.aggregate)
            }
        }
    }

    pub fn move_role(&self, id: RoleId, new_parent: Option<RoleId>, now: DateTime<Utc>) -> ServiceResult<RoleAggregate> {
        tracing::debug!(role_id = %id, new_parent = ?new_parent, "moving role");
        let tracked = Tracked::new(self.get(id)?);
        if tracked.aggregate.parent_id() == new_parent {
            return Err(DomainError::state("role already has this parent").into());
        }

        let mut violations = Violations::new();
        let plan = self.plan_reparent(&tracked.aggregate, new_parent, &mut violations)?;
        finish(violations, "move_role")?;
        self.commit_reparent(tracked, plan, now)
    }

    /// SYSTEM roles can never be disabled.
    pub fn change_status(
        &self,
        id: RoleId,
        target: EntityStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServiceResult<RoleAggregate> {
        tracing::debug!(role_id = %id, target = %target, "changing role status");
        let mut tracked = Tracked::new(self.get(id)?);
        if target == EntityStatus::Disabled && tracked.aggregate.is_system() {
            tracing::warn!(role_id = %id, "refusing to disable a system role");
            return Err(DomainError::state(format!(
                "system role {} cannot be disabled",
                tracked.aggregate.role().code()
            ))
            .into());
        }
        let from = tracked.aggregate.status();
        tracked.aggregate.change_status(target, reason, now)?;
        self.roles.save(&tracked.aggregate, tracked.expected)?;
        tracing::info!(role_id = %id, from = %from, to = %target, "role status changed");
        Ok(tracked.aggregate)
    }

    /// Copy a role under a new code and name within the same organization.
    ///
    /// Only the validation gate lives here; the copy itself is made by the
    /// repository. The clone is registered on the organization.
    pub fn clone_role(&self, cmd: CloneRole, now: DateTime<Utc>) -> ServiceResult<RoleAggregate> {
        tracing::debug!(source_id = %cmd.source_id, code = %cmd.code, "cloning role");
        let source = self.get(cmd.source_id)?;
        let organization_id = source.organization_id();
        let mut violations = Violations::new();

        let code = required(&mut violations, "role code", &cmd.code)
            .and_then(|raw| violations.check(RoleCode::new(raw)));
        let name = required(&mut violations, "role name", &cmd.name);
        self.check_unique(code.as_ref(), name, organization_id, None, &mut violations)?;
        let organization = self.check_organization(organization_id, &mut violations)?;

        finish(violations, "clone_role")?;
        let (Some(code), Some(name), Some(organization)) = (code, name, organization) else {
            return Err(DomainError::validation("role code, name and organization are required").into());
        };

        let new_id = RoleId::new();
        let mut organization = Tracked::new(organization);
        organization.aggregate.add_role(new_id, now)?;

        let Some(clone) = self.roles.clone_role(cmd.source_id, new_id, &code, name, now)? else {
            return Err(DomainError::not_found(format!("role {} does not exist", cmd.source_id)).into());
        };
        if let Err(err) = self.organizations.save(&organization.aggregate, organization.expected) {
            self.roles.delete(new_id)?;
            return Err(err.into());
        }

        tracing::info!(role_id = %new_id, source_id = %cmd.source_id, code = %code, "role cloned");
        Ok(clone)
    }

    /// Delete a non-SYSTEM role without members or sub-roles, detaching it
    /// from its parent and its organization.
    pub fn delete_role(&self, id: RoleId, now: DateTime<Utc>) -> ServiceResult<()> {
        tracing::debug!(role_id = %id, "deleting role");
        let aggregate = self.get(id)?;
        if !aggregate.can_be_deleted() {
            return Err(DomainError::state(format!(
                "role {} is a system role or still has members or sub-roles",
                aggregate.role().code()
            ))
            .into());
        }

        if let Some(parent_id) = aggregate.parent_id() {
            if let Some(parent) = self.roles.find_by_id(parent_id)? {
                let mut parent = Tracked::new(parent);
                if parent.aggregate.sub_roles().contains(&id) {
                    parent.aggregate.remove_sub_role(id, now)?;
                    self.roles.save(&parent.aggregate, parent.expected)?;
                }
            }
        }
        if let Some(organization) = self.organizations.find_by_id(aggregate.organization_id())? {
            let mut organization = Tracked::new(organization);
            if organization.aggregate.roles().contains(&id) {
                organization.aggregate.remove_role(id, now)?;
                self.organizations.save(&organization.aggregate, organization.expected)?;
            }
        }
        self.roles.delete(id)?;
        tracing::info!(role_id = %id, "role deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn grant_permission(
        &self,
        id: RoleId,
        resource: &str,
        right: AccessRight,
        now: DateTime<Utc>,
    ) -> ServiceResult<RoleAggregate> {
        tracing::debug!(role_id = %id, resource, right = ?right, "granting permission");
        let mut tracked = Tracked::new(self.get(id)?);
        tracked.aggregate.grant_permission(resource, right, now)?;
        self.roles.save(&tracked.aggregate, tracked.expected)?;
        Ok(tracked.aggregate)
    }

    pub fn revoke_permission(
        &self,
        id: RoleId,
        resource: &str,
        right: AccessRight,
        now: DateTime<Utc>,
    ) -> ServiceResult<RoleAggregate> {
        tracing::debug!(role_id = %id, resource, right = ?right, "revoking permission");
        let mut tracked = Tracked::new(self.get(id)?);
        tracked.aggregate.revoke_permission(resource, right, now)?;
        self.roles.save(&tracked.aggregate, tracked.expected)?;
        Ok(tracked.aggregate)
    }

    /// Grant every right a named permission stands for.
    pub fn grant_named_permission(
        &self,
        id: RoleId,
        permission: &Permission,
        now: DateTime<Utc>,
    ) -> ServiceResult<RoleAggregate> {
        tracing::debug!(role_id = %id, permission = %permission.code(), "granting named permission");
        let mut tracked = Tracked::new(self.get(id)?);
        let granted = tracked.aggregate.grant_from(permission, now)?;
        if granted > 0 {
            self.roles.save(&tracked.aggregate, tracked.expected)?;
        }
        Ok(tracked.aggregate)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline steps
    // ─────────────────────────────────────────────────────────────────────────

    /// Code and name uniqueness within the organization, ignoring `except`.
    fn check_unique(
        &self,
        code: Option<&RoleCode>,
        name: Option<&str>,
        organization_id: OrganizationId,
        except: Option<RoleId>,
        violations: &mut Violations,
    ) -> ServiceResult<()> {
        let is_other = |role: &RoleAggregate| Some(*role.id()) != except;
        if let Some(code) = code {
            if self.roles.find_by_code(code, organization_id)?.is_some_and(|r| is_other(&r)) {
                violations.push(DomainError::uniqueness(format!(
                    "role code {code} already exists in this organization"
                )));
            }
        }
        if let Some(name) = name {
            if self.roles.find_by_name(name, organization_id)?.is_some_and(|r| is_other(&r)) {
                violations.push(DomainError::uniqueness(format!(
                    "role name '{name}' already exists in this organization"
                )));
            }
        }
        Ok(())
    }

    fn check_organization(
        &self,
        organization_id: OrganizationId,
        violations: &mut Violations,
    ) -> ServiceResult<Option<OrganizationAggregate>> {
        let Some(organization) = self.organizations.find_by_id(organization_id)? else {
            violations.push(DomainError::not_found(format!(
                "organization {organization_id} does not exist"
            )));
            return Ok(None);
        };
        if !organization.is_active() {
            violations.push(DomainError::state(format!(
                "organization {organization_id} is {}",
                organization.status()
            )));
        }
        Ok(Some(organization))
    }

    fn check_parent(
        &self,
        parent_id: RoleId,
        organization_id: OrganizationId,
        violations: &mut Violations,
    ) -> ServiceResult<Option<RoleAggregate>> {
        let Some(parent) = self.roles.find_by_id(parent_id)? else {
            violations.push(DomainError::not_found(format!("parent role {parent_id} does not exist")));
            return Ok(None);
        };
        if !parent.is_active() {
            violations.push(DomainError::hierarchy(format!(
                "parent role {parent_id} is {}",
                parent.status()
            )));
        }
        if parent.organization_id() != organization_id {
            violations.push(DomainError::hierarchy(format!(
                "parent role {parent_id} belongs to another organization"
            )));
        }
        Ok(Some(parent))
    }

    fn plan_reparent(
        &self,
        aggregate: &RoleAggregate,
        target: Option<RoleId>,
        violations: &mut Violations,
    ) -> ServiceResult<Reparent> {
        let id = *aggregate.id();
        let mut new_parent = None;

        if let Some(target_id) = target {
            if target_id == id {
                violations.push(DomainError::hierarchy("a role cannot be its own parent"));
            } else {
                new_parent = self.check_parent(target_id, aggregate.organization_id(), violations)?;
                if self.roles.get_descendants(id)?.iter().any(|d| *d.id() == target_id) {
                    violations.push(DomainError::hierarchy(format!(
                        "cannot move role {id} under its own descendant {target_id}"
                    )));
                }
            }
        }

        let old_parent = match aggregate.parent_id() {
            Some(parent_id) => self.roles.find_by_id(parent_id)?,
            None => None,
        };

        Ok(Reparent {
            target,
            old_parent: old_parent.map(Tracked::new),
            new_parent: new_parent.map(Tracked::new),
        })
    }

    fn commit_reparent(
        &self,
        mut tracked: Tracked<RoleAggregate>,
        plan: Reparent,
        now: DateTime<Utc>,
    ) -> ServiceResult<RoleAggregate> {
        let id = *tracked.aggregate.id();
        let from = tracked.aggregate.parent_id();

        let mut parents = Vec::with_capacity(2);
        if let Some(mut new_parent) = plan.new_parent {
            new_parent.aggregate.add_sub_role(id, now)?;
            parents.push(new_parent);
        }
        if let Some(mut old_parent) = plan.old_parent {
            if old_parent.aggregate.sub_roles().contains(&id) {
                old_parent.aggregate.remove_sub_role(id, now)?;
                parents.push(old_parent);
            }
        }
        tracked.aggregate.set_parent(plan.target, now)?;

        save_move(
            &tracked,
            parents,
            |aggregate, expected| self.roles.save(aggregate, expected),
            |parent| {
                if Some(*parent.id()) == plan.target {
                    parent.remove_sub_role(id, now)
                } else {
                    parent.add_sub_role(id, now)
                }
            },
        )?;

        tracing::info!(role_id = %id, from = ?from, to = ?plan.target, "role moved");
        Ok(tracked.aggregate)
    }
}
