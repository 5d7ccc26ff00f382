//! Department tree orchestration inside an organization.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use orgiam_core::{
    AggregateRoot, DepartmentId, DomainError, EntityStatus, ExpectedVersion, OrganizationId,
    PolicyConfig, UserId, Violations,
};
use orgiam_directory::{Department, DepartmentAggregate, DepartmentCode, OrganizationAggregate};

use crate::error::ServiceResult;
use crate::repository::{DepartmentRepository, OrganizationRepository};
use crate::{Tracked, finish, required, save_move};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDepartment {
    pub organization_id: OrganizationId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<DepartmentId>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateDepartment {
    pub name: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` makes the department a root of its organization.
    pub parent_id: Option<Option<DepartmentId>>,
}

struct Reparent {
    target: Option<DepartmentId>,
    old_parent: Option<Tracked<DepartmentAggregate>>,
    new_parent: Option<Tracked<DepartmentAggregate>>,
}

pub struct DepartmentDomainService {
    departments: Arc<dyn DepartmentRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    policy: PolicyConfig,
}

impl DepartmentDomainService {
    pub fn new(
        departments: Arc<dyn DepartmentRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            departments,
            organizations,
            policy,
        }
    }

    pub fn get(&self, id: DepartmentId) -> ServiceResult<DepartmentAggregate> {
        self.departments
            .find_by_id(id)?
            .ok_or_else(|| DomainError::not_found(format!("department {id} does not exist")).into())
    }

    /// Validate and persist a new department, registering it on its
    /// organization (department capacity) and on its parent department.
    pub fn create_department(&self, cmd: CreateDepartment, now: DateTime<Utc>) -> ServiceResult<DepartmentAggregate> {
        tracing::debug!(organization_id = %cmd.organization_id, code = %cmd.code, "creating department");
        let mut violations = Violations::new();

        let code = required(&mut violations, "department code", &cmd.code)
            .and_then(|raw| violations.check(DepartmentCode::new(raw)));
        let name = required(&mut violations, "department name", &cmd.name);

        if let Some(code) = &code {
            if self.departments.find_by_code(code, cmd.organization_id)?.is_some() {
                violations.push(DomainError::uniqueness(format!(
                    "department code {code} already exists in this organization"
                )));
            }
        }
        if let Some(name) = name {
            if self.departments.find_by_name(name, cmd.organization_id)?.is_some() {
                violations.push(DomainError::uniqueness(format!(
                    "department name '{name}' already exists in this organization"
                )));
            }
        }
        let organization = self.check_organization(cmd.organization_id, &mut violations)?;
        let parent = match cmd.parent_id {
            Some(parent_id) => self.check_parent(parent_id, cmd.organization_id, &mut violations)?,
            None => None,
        };

        finish(violations, "create_department")?;
        let (Some(code), Some(name), Some(organization)) = (code, name, organization) else {
            return Err(DomainError::validation("department code, name and organization are required").into());
        };

        let id = DepartmentId::new();
        let mut department = Department::new(id, cmd.organization_id, code, name, now)?;
        department.update_description(cmd.description.as_deref(), now);
        department.set_parent(cmd.parent_id, now)?;
        let aggregate = DepartmentAggregate::create(department, now).with_policy(&self.policy);

        let mut organization = Tracked::new(organization);
        organization.aggregate.add_department(id, now)?;
        let mut parent = parent.map(Tracked::new);
        if let Some(parent) = parent.as_mut() {
            parent.aggregate.add_sub_department(id, now)?;
        }

        self.departments.save(&aggregate, ExpectedVersion::Exact(0))?;
        let registered = self
            .organizations
            .save(&organization.aggregate, organization.expected)
            .and_then(|()| match &parent {
                Some(parent) => self.departments.save(&parent.aggregate, parent.expected),
                None => Ok(()),
            });
        if let Err(err) = registered {
            self.departments.delete(id)?;
            return Err(err.into());
        }

        tracing::info!(
            department_id = %id,
            organization_id = %cmd.organization_id,
            code = %aggregate.department().code(),
            "department created"
        );
        Ok(aggregate)
    }

    pub fn update_department(
        &self,
        id: DepartmentId,
        cmd: UpdateDepartment,
        now: DateTime<Utc>,
    ) -> ServiceResult<DepartmentAggregate> {
        tracing::debug!(department_id = %id, "updating department");
        let mut tracked = Tracked::new(self.get(id)?);
        let organization_id = tracked.aggregate.organization_id();
        let mut violations = Violations::new();

        let new_name = cmd
            .name
            .as_deref()
            .and_then(|raw| required(&mut violations, "department name", raw))
            .filter(|name| *name != tracked.aggregate.department().name());
        if let Some(name) = new_name {
            if let Some(existing) = self.departments.find_by_name(name, organization_id)? {
                if *existing.id() != id {
                    violations.push(DomainError::uniqueness(format!(
                        "department name '{name}' already exists in this organization"
                    )));
                }
            }
        }

        let reparent = match cmd.parent_id {
            Some(target) if target != tracked.aggregate.parent_id() => {
                Some(self.plan_reparent(&tracked.aggregate, target, &mut violations)?)
            }
            _ => None,
        };

        finish(violations, "update_department")?;

        if let Some(name) = new_name {
            tracked.aggregate.update_name(name, now)?;
        }
        if let Some(description) = cmd.description.as_deref() {
            tracked.aggregate.update_description(Some(description), now);
        }

        match reparent {
            Some(plan) => self.commit_reparent(tracked, plan, now),
            None => {
                self.departments.save(&tracked.aggregate, tracked.expected)?;
                tracing::info!(department_id = %id, "department updated");
                Ok(tracked.aggregate)
            }
        }
    }

    /// Re-parent within the same organization; rejects moves into the subtree.
    pub fn move_department(
        &self,
        id: DepartmentId,
        new_parent: Option<DepartmentId>,
        now: DateTime<Utc>,
    ) -> ServiceResult<DepartmentAggregate> {
        tracing::debug!(department_id = %id, new_parent = ?new_parent, "moving department");
        let tracked = Tracked::new(self.get(id)?);
        if tracked.aggregate.parent_id() == new_parent {
            return Err(DomainError::state("department already has this parent").into());
        }

        let mut violations = Violations::new();
        let plan = self.plan_reparent(&tracked.aggregate, new_parent, &mut violations)?;
        finish(violations, "move_department")?;
        self.commit_reparent(tracked, plan, now)
    }

    pub fn change_status(
        &self,
        id: DepartmentId,
        target: EntityStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServiceResult<DepartmentAggregate> {
        tracing::debug!(department_id = %id, target = %target, "changing department status");
        let mut tracked = Tracked::new(self.get(id)?);
        let from = tracked.aggregate.status();
        tracked.aggregate.change_status(target, reason, now)?;
        self.departments.save(&tracked.aggregate, tracked.expected)?;
        tracing::info!(department_id = %id, from = %from, to = %target, "department status changed");
        Ok(tracked.aggregate)
    }

    /// The manager must already be a member of the department.
    pub fn assign_manager(&self, id: DepartmentId, manager_id: UserId, now: DateTime<Utc>) -> ServiceResult<DepartmentAggregate> {
        tracing::debug!(department_id = %id, manager_id = %manager_id, "assigning department manager");
        let mut tracked = Tracked::new(self.get(id)?);
        tracked.aggregate.assign_manager(manager_id, now)?;
        self.departments.save(&tracked.aggregate, tracked.expected)?;
        Ok(tracked.aggregate)
    }

    pub fn remove_manager(&self, id: DepartmentId, now: DateTime<Utc>) -> ServiceResult<DepartmentAggregate> {
        let mut tracked = Tracked::new(self.get(id)?);
        tracked.aggregate.remove_manager(now)?;
        self.departments.save(&tracked.aggregate, tracked.expected)?;
        Ok(tracked.aggregate)
    }

    /// Delete a department without sub-departments or members, detaching it
    /// from its parent and its organization.
    pub fn delete_department(&self, id: DepartmentId, now: DateTime<Utc>) -> ServiceResult<()> {
        tracing::debug!(department_id = %id, "deleting department");
        let aggregate = self.get(id)?;
        if !aggregate.can_be_deleted() {
            return Err(DomainError::state(format!(
                "department {id} still has sub-departments or members"
            ))
            .into());
        }

        if let Some(parent_id) = aggregate.parent_id() {
            if let Some(parent) = self.departments.find_by_id(parent_id)? {
                let mut parent = Tracked::new(parent);
                if parent.aggregate.children().contains(&id) {
                    parent.aggregate.remove_sub_department(id, now)?;
                    self.departments.save(&parent.aggregate, parent.expected)?;
                }
            }
        }
        if let Some(organization) = self.organizations.find_by_id(aggregate.organization_id())? {
            let mut organization = Tracked::new(organization);
            if organization.aggregate.departments().contains(&id) {
                organization.aggregate.remove_department(id, now)?;
                self.organizations.save(&organization.aggregate, organization.expected)?;
            }
        }
        self.departments.delete(id)?;
        tracing::info!(department_id = %id, "department deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline steps
    // ─────────────────────────────────────────────────────────────────────────

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
        parent_id: DepartmentId,
        organization_id: OrganizationId,
        violations: &mut Violations,
    ) -> ServiceResult<Option<DepartmentAggregate>> {
        let Some(parent) = self.departments.find_by_id(parent_id)? else {
            violations.push(DomainError::not_found(format!(
                "parent department {parent_id} does not exist"
            )));
            return Ok(None);
        };
        if !parent.is_active() {
            violations.push(DomainError::hierarchy(format!(
                "parent department {parent_id} is {}",
                parent.status()
            )));
        }
        if parent.organization_id() != organization_id {
            violations.push(DomainError::hierarchy(format!(
                "parent department {parent_id} belongs to another organization"
            )));
        }
        Ok(Some(parent))
    }

    fn plan_reparent(
        &self,
        aggregate: &DepartmentAggregate,
        target: Option<DepartmentId>,
        violations: &mut Violations,
    ) -> ServiceResult<Reparent> {
        let id = *aggregate.id();
        let mut new_parent = None;

        if let Some(target_id) = target {
            if target_id == id {
                violations.push(DomainError::hierarchy("a department cannot be its own parent"));
            } else {
                new_parent = self.check_parent(target_id, aggregate.organization_id(), violations)?;
                if self.departments.get_descendants(id)?.iter().any(|d| *d.id() == target_id) {
                    violations.push(DomainError::hierarchy(format!(
                        "cannot move department {id} under its own descendant {target_id}"
                    )));
                }
            }
        }

        let old_parent = match aggregate.parent_id() {
            Some(parent_id) => self.departments.find_by_id(parent_id)?,
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
        mut tracked: Tracked<DepartmentAggregate>,
        plan: Reparent,
        now: DateTime<Utc>,
    ) -> ServiceResult<DepartmentAggregate> {
        let id = *tracked.aggregate.id();
        let from = tracked.aggregate.parent_id();

        let mut parents = Vec::with_capacity(2);
        if let Some(mut new_parent) = plan.new_parent {
            new_parent.aggregate.add_sub_department(id, now)?;
            parents.push(new_parent);
        }
        if let Some(mut old_parent) = plan.old_parent {
            if old_parent.aggregate.children().contains(&id) {
                old_parent.aggregate.remove_sub_department(id, now)?;
                parents.push(old_parent);
            }
        }
        tracked.aggregate.set_parent(plan.target, now)?;

        save_move(
            &tracked,
            parents,
            |aggregate, expected| self.departments.save(aggregate, expected),
            |parent| {
                if Some(*parent.id()) == plan.target {
                    parent.remove_sub_department(id, now)
                } else {
                    parent.add_sub_department(id, now)
                }
            },
        )?;

        tracing::info!(department_id = %id, from = ?from, to = ?plan.target, "department moved");
        Ok(tracked.aggregate)
    }
}
