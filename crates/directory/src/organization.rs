//! Organization entity: a node of the per-tenant organization tree.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgiam_core::{
    DomainError, DomainResult, Entity, EntityStatus, Hierarchical, OrganizationId, TenantId, UserId,
};

use crate::OrganizationCode;
use crate::tenant::non_empty_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrganizationType {
    #[default]
    Company,
    Subsidiary,
    Division,
    Department,
    Branch,
    Team,
}

/// Organization entity.
///
/// # Invariants
/// - `parent_id != Some(id)`; an organization is never its own child.
/// - `tenant_id` never changes.
/// - Children and members are plain id sets; the aggregate adds capacity and
///   "already present" checks on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    id: OrganizationId,
    tenant_id: TenantId,
    code: OrganizationCode,
    name: String,
    description: Option<String>,
    org_type: OrganizationType,
    status: EntityStatus,
    parent_id: Option<OrganizationId>,
    children: BTreeSet<OrganizationId>,
    members: BTreeSet<UserId>,
    metadata: BTreeMap<String, serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(
        id: OrganizationId,
        tenant_id: TenantId,
        code: OrganizationCode,
        name: &str,
        org_type: OrganizationType,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            tenant_id,
            code,
            name: non_empty_name(name)?,
            description: None,
            org_type,
            status: EntityStatus::Active,
            parent_id: None,
            children: BTreeSet::new(),
            members: BTreeSet::new(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn code(&self) -> &OrganizationCode {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn org_type(&self) -> OrganizationType {
        self.org_type
    }

    pub fn status(&self) -> EntityStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn children(&self) -> &BTreeSet<OrganizationId> {
        &self.children
    }

    pub fn members(&self) -> &BTreeSet<UserId> {
        &self.members
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
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
        self.status = self.status.transition_to(target, "organization")?;
        self.touch(now);
        Ok(())
    }

    pub fn update_name(&mut self, name: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.name = non_empty_name(name)?;
        self.touch(now);
        Ok(())
    }

    /// Blank descriptions are stored as `None`.
    pub fn update_description(&mut self, description: Option<&str>, now: DateTime<Utc>) {
        self.description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        self.touch(now);
    }

    pub fn change_type(&mut self, org_type: OrganizationType, now: DateTime<Utc>) {
        self.org_type = org_type;
        self.touch(now);
    }

    pub fn set_parent(&mut self, parent_id: Option<OrganizationId>, now: DateTime<Utc>) -> DomainResult<()> {
        if parent_id == Some(self.id) {
            return Err(DomainError::hierarchy("an organization cannot be its own parent"));
        }
        self.parent_id = parent_id;
        self.touch(now);
        Ok(())
    }

    pub fn add_child(&mut self, child_id: OrganizationId, now: DateTime<Utc>) -> DomainResult<()> {
        if child_id == self.id {
            return Err(DomainError::hierarchy("an organization cannot be its own child"));
        }
        if self.children.insert(child_id) {
            self.touch(now);
        }
        Ok(())
    }

    pub fn remove_child(&mut self, child_id: OrganizationId, now: DateTime<Utc>) {
        if self.children.remove(&child_id) {
            self.touch(now);
        }
    }

    pub fn has_child(&self, child_id: OrganizationId) -> bool {
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

    pub fn set_metadata(&mut self, key: &str, value: serde_json::Value, now: DateTime<Utc>) {
        self.metadata.insert(key.to_string(), value);
        self.touch(now);
    }
}

impl Entity for Organization {
    type Id = OrganizationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Hierarchical for Organization {
    fn parent_id(&self) -> Option<&Self::Id> {
        self.parent_id.as_ref()
    }
}
