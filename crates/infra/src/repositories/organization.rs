use orgiam_core::{ExpectedVersion, OrganizationId, TenantId};
use orgiam_directory::{OrganizationAggregate, OrganizationCode};
use orgiam_services::{OrganizationRepository, RepositoryResult, names_match};

use super::store::VersionedStore;

#[derive(Debug)]
pub struct InMemoryOrganizationRepository {
    store: VersionedStore<OrganizationAggregate>,
}

impl InMemoryOrganizationRepository {
    pub fn new() -> Self {
        Self {
            store: VersionedStore::new("organization"),
        }
    }
}

impl Default for InMemoryOrganizationRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Code and name are unique within a tenant.
fn clash(new: &OrganizationAggregate, other: &OrganizationAggregate) -> Option<String> {
    if new.tenant_id() != other.tenant_id() {
        return None;
    }
    let (new, other) = (new.organization(), other.organization());
    if new.code() == other.code() {
        Some(format!("organization code {} already exists in this tenant", new.code()))
    } else if names_match(new.name(), other.name()) {
        Some(format!("organization name '{}' already exists in this tenant", new.name()))
    } else {
        None
    }
}

impl OrganizationRepository for InMemoryOrganizationRepository {
    fn find_by_id(&self, id: OrganizationId) -> RepositoryResult<Option<OrganizationAggregate>> {
        self.store.get(id)
    }

    fn find_by_code(
        &self,
        code: &OrganizationCode,
        tenant_id: TenantId,
    ) -> RepositoryResult<Option<OrganizationAggregate>> {
        self.store
            .find(|org| org.tenant_id() == tenant_id && org.organization().code() == code)
    }

    fn find_by_name(&self, name: &str, tenant_id: TenantId) -> RepositoryResult<Option<OrganizationAggregate>> {
        self.store
            .find(|org| org.tenant_id() == tenant_id && names_match(org.organization().name(), name))
    }

    fn find_by_parent(&self, parent_id: OrganizationId) -> RepositoryResult<Vec<OrganizationAggregate>> {
        self.store.filter(|org| org.parent_id() == Some(parent_id))
    }

    fn save(&self, aggregate: &OrganizationAggregate, expected: ExpectedVersion) -> RepositoryResult<()> {
        self.store.save(aggregate, expected, clash)
    }

    fn delete(&self, id: OrganizationId) -> RepositoryResult<()> {
        self.store.remove(id)
    }
}
