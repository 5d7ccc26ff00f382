use orgiam_core::{DepartmentId, ExpectedVersion, OrganizationId};
use orgiam_directory::{DepartmentAggregate, DepartmentCode};
use orgiam_services::{DepartmentRepository, RepositoryResult, names_match};

use super::store::VersionedStore;

#[derive(Debug)]
pub struct InMemoryDepartmentRepository {
    store: VersionedStore<DepartmentAggregate>,
}

impl InMemoryDepartmentRepository {
    pub fn new() -> Self {
        Self {
            store: VersionedStore::new("department"),
        }
    }
}

impl Default for InMemoryDepartmentRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Code and name are unique within an organization.
fn clash(new: &DepartmentAggregate, other: &DepartmentAggregate) -> Option<String> {
    if new.organization_id() != other.organization_id() {
        return None;
    }
    let (new, other) = (new.department(), other.department());
    if new.code() == other.code() {
        Some(format!("department code {} already exists in this organization", new.code()))
    } else if names_match(new.name(), other.name()) {
        Some(format!("department name '{}' already exists in this organization", new.name()))
    } else {
        None
    }
}

impl DepartmentRepository for InMemoryDepartmentRepository {
    fn find_by_id(&self, id: DepartmentId) -> RepositoryResult<Option<DepartmentAggregate>> {
        self.store.get(id)
    }

    fn find_by_code(
        &self,
        code: &DepartmentCode,
        organization_id: OrganizationId,
    ) -> RepositoryResult<Option<DepartmentAggregate>> {
        self.store
            .find(|dept| dept.organization_id() == organization_id && dept.department().code() == code)
    }

    fn find_by_name(
        &self,
        name: &str,
        organization_id: OrganizationId,
    ) -> RepositoryResult<Option<DepartmentAggregate>> {
        self.store.find(|dept| {
            dept.organization_id() == organization_id && names_match(dept.department().name(), name)
        })
    }

    fn find_by_parent(&self, parent_id: DepartmentId) -> RepositoryResult<Vec<DepartmentAggregate>> {
        self.store.filter(|dept| dept.parent_id() == Some(parent_id))
    }

    fn save(&self, aggregate: &DepartmentAggregate, expected: ExpectedVersion) -> RepositoryResult<()> {
        self.store.save(aggregate, expected, clash)
    }

    fn delete(&self, id: DepartmentId) -> RepositoryResult<()> {
        self.store.remove(id)
    }
}
