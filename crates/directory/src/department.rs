//! Department entity: a node of the per-organization department tree.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgiam_core::{
    DepartmentId, DomainError, DomainResult, Entity, EntityStatus, Hierarchical, OrganizationId,
    UserId,
};

use crate::DepartmentCode;
use crate::tenant::non_empty_name;

/// Department entity. Same tree rules as [`crate::Organization`], scoped to
/// one organization, with an optional manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    id: DepartmentId,
    organization_id: OrganizationId,
    code: DepartmentCode,
    name: String,
    description: Option<String>,
    status: EntityStatus,
    parent_id: Option<DepartmentId>,
    manager_id: Option<UserId>,
    children: BTreeSet<DepartmentId>,
    members: BTreeSet<UserId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Department {
    pub fn new(
        id: DepartmentId,
        organization_id: OrganizationId,
        code: DepartmentCode,
        name: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            organization_id,
            code,
            name: non_empty_name(name)?,
            description: None,
            status: EntityStatus::Active,
            parent_id: None,
            manager_id: None,
            children: BTreeSet::new(),
            members: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    pub fn code(&self) -> &DepartmentCode {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> EntityStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn manager_id(&self) -> Option<UserId> {
        self.manager_id
    }

    pub fn children(&self) -> &BTreeSet<DepartmentId> {
        &self.children
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
        self.status = self.status.transition_to(target, "department")?;
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

    pub fn set_parent(&mut self, parent_id: Option<DepartmentId>, now: DateTime<Utc>) -> DomainResult<()> {
        if parent_id == Some(self.id) {
            return Err(DomainError::hierarchy("a department cannot be its own parent"));
        }
        self.parent_id = parent_id;
        self.touch(now);
        Ok(())
    }

    pub fn set_manager(&mut self, manager_id: Option<UserId>, now: DateTime<Utc>) {
        self.manager_id = manager_id;
        self.touch(now);
    }

    pub fn add_child(&mut self, child_id: DepartmentId, now: DateTime<Utc>) -> DomainResult<()> {
        if child_id == self.id {
            return Err(DomainError::hierarchy("a department cannot be its own child"));
        }
        if self.children.insert(child_id) {
            self.touch(now);
        }
        Ok(())
    }

    pub fn remove_child(&mut self, child_id: DepartmentId, now: DateTime<Utc>) {
        if self.children.remove(&child_id) {
            self.touch(now);
        }
    }

    pub fn has_child(&self, child_id: DepartmentId) -> bool {
        self.children.contains(&child_id)
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
}

impl Entity for Department {
    type Id = DepartmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Hierarchical for Department {
    fn parent_id(&self) -> Option<&Self::Id> {
        self.parent_id.as_ref()
    }
}
