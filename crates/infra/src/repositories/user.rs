use orgiam_core::{ExpectedVersion, TenantId, UserId};
use orgiam_identity::{Email, UserAggregate, Username};
use orgiam_services::{RepositoryResult, UserRepository};

use super::store::VersionedStore;

#[derive(Debug)]
pub struct InMemoryUserRepository {
    store: VersionedStore<UserAggregate>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            store: VersionedStore::new("user"),
        }
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Username and email are unique within a tenant.
fn clash(new: &UserAggregate, other: &UserAggregate) -> Option<String> {
    if new.tenant_id() != other.tenant_id() {
        return None;
    }
    let (new, other) = (new.user(), other.user());
    if new.username() == other.username() {
        Some(format!("username {} is already taken in this tenant", new.username()))
    } else if new.email() == other.email() {
        Some(format!("email {} is already registered in this tenant", new.email()))
    } else {
        None
    }
}

impl UserRepository for InMemoryUserRepository {
    fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<UserAggregate>> {
        self.store.get(id)
    }

    fn find_by_username(&self, username: &Username, tenant_id: TenantId) -> RepositoryResult<Option<UserAggregate>> {
        self.store
            .find(|user| user.tenant_id() == tenant_id && user.user().username() == username)
    }

    fn find_by_email(&self, email: &Email, tenant_id: TenantId) -> RepositoryResult<Option<UserAggregate>> {
        self.store
            .find(|user| user.tenant_id() == tenant_id && user.user().email() == email)
    }

    fn save(&self, aggregate: &UserAggregate, expected: ExpectedVersion) -> RepositoryResult<()> {
        self.store.save(aggregate, expected, clash)
    }

    fn delete(&self, id: UserId) -> RepositoryResult<()> {
        self.store.remove(id)
    }
}
