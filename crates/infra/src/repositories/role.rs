use chrono::{DateTime, Utc};

use orgiam_access::{RoleAggregate, RoleCode};
use orgiam_core::{ExpectedVersion, OrganizationId, RoleId};
use orgiam_services::{RepositoryError, RepositoryResult, RoleRepository, names_match};

use super::store::VersionedStore;

#[derive(Debug)]
pub struct InMemoryRoleRepository {
    store: VersionedStore<RoleAggregate>,
}

impl InMemoryRoleRepository {
    pub fn new() -> Self {
        Self {
            store: VersionedStore::new("role"),
        }
    }
}

impl Default for InMemoryRoleRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Code and name are unique within an organization.
fn clash(new: &RoleAggregate, other: &RoleAggregate) -> Option<String> {
    if new.organization_id() != other.organization_id() {
        return None;
    }
    let (new, other) = (new.role(), other.role());
    if new.code() == other.code() {
        Some(format!("role code {} already exists in this organization", new.code()))
    } else if names_match(new.name(), other.name()) {
        Some(format!("role name '{}' already exists in this organization", new.name()))
    } else {
        None
    }
}

impl RoleRepository for InMemoryRoleRepository {
    fn find_by_id(&self, id: RoleId) -> RepositoryResult<Option<RoleAggregate>> {
        self.store.get(id)
    }

    fn find_by_code(&self, code: &RoleCode, organization_id: OrganizationId) -> RepositoryResult<Option<RoleAggregate>> {
        self.store
            .find(|role| role.organization_id() == organization_id && role.role().code() == code)
    }

    fn find_by_name(&self, name: &str, organization_id: OrganizationId) -> RepositoryResult<Option<RoleAggregate>> {
        self.store
            .find(|role| role.organization_id() == organization_id && names_match(role.role().name(), name))
    }

    fn find_by_parent(&self, parent_id: RoleId) -> RepositoryResult<Vec<RoleAggregate>> {
        self.store.filter(|role| role.parent_id() == Some(parent_id))
    }

    fn save(&self, aggregate: &RoleAggregate, expected: ExpectedVersion) -> RepositoryResult<()> {
        self.store.save(aggregate, expected, clash)
    }

    fn delete(&self, id: RoleId) -> RepositoryResult<()> {
        self.store.remove(id)
    }

    fn clone_role(
        &self,
        source_id: RoleId,
        new_id: RoleId,
        code: &RoleCode,
        name: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Option<RoleAggregate>> {
        let Some(source) = self.store.get(source_id)? else {
            return Ok(None);
        };
        let copy = source
            .clone_as(new_id, code.clone(), name, now)
            .map_err(|err| RepositoryError::Storage(format!("cannot clone role {source_id}: {err}")))?;
        self.store.save(&copy, ExpectedVersion::Exact(0), clash)?;
        Ok(Some(copy))
    }
}
