//! Organization tree orchestration.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use orgiam_core::{
    AggregateRoot, DomainError, EntityStatus, ExpectedVersion, OrganizationId, PolicyConfig,
    TenantId, Violations,
};
use orgiam_directory::{Organization, OrganizationAggregate, OrganizationCode, OrganizationType};

use crate::error::ServiceResult;
use crate::repository::OrganizationRepository;
use crate::{Tracked, finish, required, save_move};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrganization {
    pub tenant_id: TenantId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub org_type: OrganizationType,
    pub parent_id: Option<OrganizationId>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    /// A blank description clears it.
    pub description: Option<String>,
    pub org_type: Option<OrganizationType>,
    /// `Some(None)` detaches the organization into a root.
    pub parent_id: Option<Option<OrganizationId>>,
}

/// Parent changes worked out by [`OrganizationDomainService::plan_reparent`].
struct Reparent {
    target: Option<OrganizationId>,
    old_parent: Option<Tracked<OrganizationAggregate>>,
    new_parent: Option<Tracked<OrganizationAggregate>>,
}

pub struct OrganizationDomainService {
    organizations: Arc<dyn OrganizationRepository>,
    policy: PolicyConfig,
}

impl OrganizationDomainService {
    pub fn new(organizations: Arc<dyn OrganizationRepository>, policy: PolicyConfig) -> Self {
        Self {
            organizations,
            policy,
        }
    }

    pub fn get(&self, id: OrganizationId) -> ServiceResult<OrganizationAggregate> {
        self.organizations
            .find_by_id(id)?
            .ok_or_else(|| DomainError::not_found(format!("organization {id} does not exist")).into())
    }

    /// Validate and persist a new organization, registering it on its parent.
    ///
    /// Every violation of the pipeline is reported together.
    pub fn create_organization(
        &self,
        cmd: CreateOrganization,
        now: DateTime<Utc>,
    ) -> ServiceResult<OrganizationAggregate> {
        tracing::debug!(tenant_id = %cmd.tenant_id, code = %cmd.code, "creating organization");
        let mut violations = Violations::new();

        let code = required(&mut violations, "organization code", &cmd.code)
            .and_then(|raw| violations.check(OrganizationCode::new(raw)));
        let name = required(&mut violations, "organization name", &cmd.name);

        if let Some(code) = &code {
            if self.organizations.find_by_code(code, cmd.tenant_id)?.is_some() {
                violations.push(DomainError::uniqueness(format!(
                    "organization code {code} already exists in this tenant"
                )));
            }
        }
        if let Some(name) = name {
            if self.organizations.find_by_name(name, cmd.tenant_id)?.is_some() {
                violations.push(DomainError::uniqueness(format!(
                    "organization name '{name}' already exists in this tenant"
                )));
            }
        }
        let parent = match cmd.parent_id {
            Some(parent_id) => self.check_parent(parent_id, cmd.tenant_id, &mut violations)?,
            None => None,
        };

        finish(violations, "create_organization")?;
        let (Some(code), Some(name)) = (code, name) else {
            return Err(DomainError::validation("organization code and name are required").into());
        };

        let id = OrganizationId::new();
        let mut organization = Organization::new(id, cmd.tenant_id, code, name, cmd.org_type, now)?;
        organization.update_description(cmd.description.as_deref(), now);
        organization.set_parent(cmd.parent_id, now)?;
        let aggregate = OrganizationAggregate::create(organization, now).with_policy(&self.policy);

        let mut parent = parent.map(Tracked::new);
        if let Some(parent) = parent.as_mut() {
            parent.aggregate.add_sub_organization(id, now)?;
        }

        self.organizations.save(&aggregate, ExpectedVersion::Exact(0))?;
        if let Some(parent) = parent {
            if let Err(err) = self.organizations.save(&parent.aggregate, parent.expected) {
                self.organizations.delete(id)?;
                return Err(err.into());
            }
        }

        tracing::info!(
            organization_id = %id,
            tenant_id = %cmd.tenant_id,
            code = %aggregate.organization().code(),
            "organization created"
        );
        Ok(aggregate)
    }

    /// Apply the supplied fields. Name uniqueness is only re-checked when the
    /// name changes; a parent change goes through the same checks as a move.
    pub fn update_organization(
        &self,
        id: OrganizationId,
        cmd: UpdateOrganization,
        now: DateTime<Utc>,
    ) -> ServiceResult<OrganizationAggregate> {
        tracing::debug!(organization_id = %id, "updating organization");
        let mut tracked = Tracked::new(self.get(id)?);
        let tenant_id = tracked.aggregate.tenant_id();
        let mut violations = Violations::new();

        let new_name = cmd
            .name
            .as_deref()
            .and_then(|raw| required(&mut violations, "organization name", raw))
            .filter(|name| *name != tracked.aggregate.organization().name());
        if let Some(name) = new_name {
            if let Some(existing) = self.organizations.find_by_name(name, tenant_id)? {
                if *existing.id() != id {
                    violations.push(DomainError::uniqueness(format!(
                        "organization name '{name}' already exists in this tenant"
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

        finish(violations, "update_organization")?;

        let aggregate = &mut tracked.aggregate;
        if let Some(name) = new_name {
            aggregate.update_name(name, now)?;
        }
        if cmd.description.is_some() || cmd.org_type.is_some() {
            let description = match cmd.description {
                Some(description) => Some(description),
                None => aggregate.organization().description().map(str::to_string),
            };
            let org_type = cmd.org_type.unwrap_or(aggregate.organization().org_type());
            aggregate.update_details(description.as_deref(), org_type, now);
        }

        match reparent {
            Some(plan) => self.commit_reparent(tracked, plan, now),
            None => {
                self.organizations.save(&tracked.aggregate, tracked.expected)?;
                tracing::info!(organization_id = %id, "organization updated");
                Ok(tracked.aggregate)
            }
        }
    }

    /// Re-parent `id` under `new_parent` (or make it a root).
    ///
    /// Rejects self-parenting and any target inside the subtree of `id`.
    pub fn move_organization(
        &self,
        id: OrganizationId,
        new_parent: Option<OrganizationId>,
        now: DateTime<Utc>,
    ) -> ServiceResult<OrganizationAggregate> {
        tracing::debug!(organization_id = %id, new_parent = ?new_parent, "moving organization");
        let tracked = Tracked::new(self.get(id)?);
        if tracked.aggregate.parent_id() == new_parent {
            return Err(DomainError::state("organization already has this parent").into());
        }

        let mut violations = Violations::new();
        let plan = self.plan_reparent(&tracked.aggregate, new_parent, &mut violations)?;
        finish(violations, "move_organization")?;
        self.commit_reparent(tracked, plan, now)
    }

    pub fn change_status(
        &self,
        id: OrganizationId,
        target: EntityStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServiceResult<OrganizationAggregate> {
        tracing::debug!(organization_id = %id, target = %target, "changing organization status");
        let mut tracked = Tracked::new(self.get(id)?);
        let from = tracked.aggregate.status();
        tracked.aggregate.change_status(target, reason, now)?;
        self.organizations.save(&tracked.aggregate, tracked.expected)?;
        tracing::info!(organization_id = %id, from = %from, to = %target, "organization status changed");
        Ok(tracked.aggregate)
    }

    /// Delete a childless, memberless organization without departments and
    /// detach it from its parent.
    pub fn delete_organization(&self, id: OrganizationId, now: DateTime<Utc>) -> ServiceResult<()> {
        tracing::debug!(organization_id = %id, "deleting organization");
        let aggregate = self.get(id)?;
        if !aggregate.can_be_deleted() {
            return Err(DomainError::state(format!(
                "organization {id} still has sub-organizations, members or departments"
            ))
            .into());
        }

        if let Some(parent_id) = aggregate.parent_id() {
            if let Some(parent) = self.organizations.find_by_id(parent_id)? {
                let mut parent = Tracked::new(parent);
                if parent.aggregate.children().contains(&id) {
                    parent.aggregate.remove_sub_organization(id, now)?;
                    self.organizations.save(&parent.aggregate, parent.expected)?;
                }
            }
        }
        self.organizations.delete(id)?;
        tracing::info!(organization_id = %id, "organization deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline steps
    // ─────────────────────────────────────────────────────────────────────────

    /// Existence, status and tenant checks for a prospective parent.
    fn check_parent(
        &self,
        parent_id: OrganizationId,
        tenant_id: TenantId,
        violations: &mut Violations,
    ) -> ServiceResult<Option<OrganizationAggregate>> {
        let Some(parent) = self.organizations.find_by_id(parent_id)? else {
            violations.push(DomainError::not_found(format!(
                "parent organization {parent_id} does not exist"
            )));
            return Ok(None);
        };
        if !parent.is_active() {
            violations.push(DomainError::hierarchy(format!(
                "parent organization {parent_id} is {}",
                parent.status()
            )));
        }
        if parent.tenant_id() != tenant_id {
            violations.push(DomainError::hierarchy(format!(
                "parent organization {parent_id} belongs to another tenant"
            )));
        }
        Ok(Some(parent))
    }

    fn plan_reparent(
        &self,
        aggregate: &OrganizationAggregate,
        target: Option<OrganizationId>,
        violations: &mut Violations,
    ) -> ServiceResult<Reparent> {
        let id = *aggregate.id();
        let mut new_parent = None;

        if let Some(target_id) = target {
            if target_id == id {
                violations.push(DomainError::hierarchy("an organization cannot be its own parent"));
            } else {
                new_parent = self.check_parent(target_id, aggregate.tenant_id(), violations)?;
                let descendants = self.organizations.get_descendants(id)?;
                if descendants.iter().any(|d| *d.id() == target_id) {
                    violations.push(DomainError::hierarchy(format!(
                        "cannot move organization {id} under its own descendant {target_id}"
                    )));
                }
            }
        }

        let old_parent = match aggregate.parent_id() {
            Some(parent_id) => self.organizations.find_by_id(parent_id)?,
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
        mut tracked: Tracked<OrganizationAggregate>,
        plan: Reparent,
        now: DateTime<Utc>,
    ) -> ServiceResult<OrganizationAggregate> {
        let id = *tracked.aggregate.id();
        let from = tracked.aggregate.parent_id();

        let mut parents = Vec::with_capacity(2);
        if let Some(mut new_parent) = plan.new_parent {
            new_parent.aggregate.add_sub_organization(id, now)?;
            parents.push(new_parent);
        }
        if let Some(mut old_parent) = plan.old_parent {
            if old_parent.aggregate.children().contains(&id) {
                old_parent.aggregate.remove_sub_organization(id, now)?;
                parents.push(old_parent);
            }
        }
        tracked.aggregate.set_parent(plan.target, now)?;

        save_move(
            &tracked,
            parents,
            |aggregate, expected| self.organizations.save(aggregate, expected),
            |parent| {
                if Some(*parent.id()) == plan.target {
                    parent.remove_sub_organization(id, now)
                } else {
                    parent.add_sub_organization(id, now)
                }
            },
        )?;

        tracing::info!(organization_id = %id, from = ?from, to = ?plan.target, "organization moved");
        Ok(tracked.aggregate)
    }
}
