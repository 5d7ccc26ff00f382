//! Persistence boundary consumed by the domain services.
//!
//! One trait per aggregate family. Implementations must:
//! - return `Ok(None)` / an empty `Vec` for "not found", never an error;
//! - compare names case-insensitively after trimming;
//! - reject a `save` whose [`ExpectedVersion`] does not match the stored
//!   version with [`RepositoryError::Conflict`] (nothing stored counts as 0);
//! - reject a second aggregate owning the same scoped unique key with
//!   [`RepositoryError::Duplicate`];
//! - store aggregates without their pending events.
//!
//! The services read, validate and then write; that sequence is not atomic,
//! so the last two rules are what closes the race between two concurrent
//! creates with the same code.
//!
//! [`RepositoryError::Conflict`]: crate::RepositoryError::Conflict
//! [`RepositoryError::Duplicate`]: crate::RepositoryError::Duplicate

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

use chrono::{DateTime, Utc};

use orgiam_access::{RoleAggregate, RoleCode};
use orgiam_core::{
    AggregateRoot, DepartmentId, ExpectedVersion, OrganizationId, RoleId, TenantId, UserId,
};
use orgiam_directory::{DepartmentAggregate, DepartmentCode, OrganizationAggregate, OrganizationCode};
use orgiam_identity::{Email, UserAggregate, Username};

use crate::error::RepositoryResult;

/// Breadth-first walk below `root` using `children_of`.
///
/// Every node is visited once even if the stored tree is corrupt and contains
/// a cycle; `root` itself is never part of the result.
pub fn collect_descendants<A, Id, F>(root: Id, mut children_of: F) -> RepositoryResult<Vec<A>>
where
    A: AggregateRoot<Id = Id>,
    Id: Copy + Eq + Hash + core::fmt::Debug,
    F: FnMut(Id) -> RepositoryResult<Vec<A>>,
{
    let mut visited = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);
    let mut descendants = Vec::new();

    while let Some(current) = queue.pop_front() {
        for child in children_of(current)? {
            let child_id = *child.id();
            if visited.insert(child_id) {
                queue.push_back(child_id);
                descendants.push(child);
            }
        }
    }
    Ok(descendants)
}

pub trait OrganizationRepository: Send + Sync {
    fn find_by_id(&self, id: OrganizationId) -> RepositoryResult<Option<OrganizationAggregate>>;

    /// Codes are unique per tenant.
    fn find_by_code(
        &self,
        code: &OrganizationCode,
        tenant_id: TenantId,
    ) -> RepositoryResult<Option<OrganizationAggregate>>;

    fn find_by_name(&self, name: &str, tenant_id: TenantId) -> RepositoryResult<Option<OrganizationAggregate>>;

    /// Direct children only.
    fn find_by_parent(&self, parent_id: OrganizationId) -> RepositoryResult<Vec<OrganizationAggregate>>;

    fn get_descendants(&self, id: OrganizationId) -> RepositoryResult<Vec<OrganizationAggregate>> {
        collect_descendants(id, |parent| self.find_by_parent(parent))
    }

    fn save(&self, aggregate: &OrganizationAggregate, expected: ExpectedVersion) -> RepositoryResult<()>;

    fn delete(&self, id: OrganizationId) -> RepositoryResult<()>;
}

pub trait DepartmentRepository: Send + Sync {
    fn find_by_id(&self, id: DepartmentId) -> RepositoryResult<Option<DepartmentAggregate>>;

    /// Codes are unique per organization.
    fn find_by_code(
        &self,
        code: &DepartmentCode,
        organization_id: OrganizationId,
    ) -> RepositoryResult<Option<DepartmentAggregate>>;

    fn find_by_name(
        &self,
        name: &str,
        organization_id: OrganizationId,
    ) -> RepositoryResult<Option<DepartmentAggregate>>;

    fn find_by_parent(&self, parent_id: DepartmentId) -> RepositoryResult<Vec<DepartmentAggregate>>;

    fn get_descendants(&self, id: DepartmentId) -> RepositoryResult<Vec<DepartmentAggregate>> {
        collect_descendants(id, |parent| self.find_by_parent(parent))
    }

    fn save(&self, aggregate: &DepartmentAggregate, expected: ExpectedVersion) -> RepositoryResult<()>;

    fn delete(&self, id: DepartmentId) -> RepositoryResult<()>;
}

pub trait RoleRepository: Send + Sync {
    fn find_by_id(&self, id: RoleId) -> RepositoryResult<Option<RoleAggregate>>;

    /// Codes are unique per organization.
    fn find_by_code(&self, code: &RoleCode, organization_id: OrganizationId) -> RepositoryResult<Option<RoleAggregate>>;

    fn find_by_name(&self, name: &str, organization_id: OrganizationId) -> RepositoryResult<Option<RoleAggregate>>;

    fn find_by_parent(&self, parent_id: RoleId) -> RepositoryResult<Vec<RoleAggregate>>;

    fn get_descendants(&self, id: RoleId) -> RepositoryResult<Vec<RoleAggregate>> {
        collect_descendants(id, |parent| self.find_by_parent(parent))
    }

    fn save(&self, aggregate: &RoleAggregate, expected: ExpectedVersion) -> RepositoryResult<()>;

    fn delete(&self, id: RoleId) -> RepositoryResult<()>;

    /// Persist a copy of `source_id` under a new identity, code and name.
    ///
    /// Returns `Ok(None)` when the source does not exist. The returned
    /// aggregate still carries its `Created` event.
    fn clone_role(
        &self,
        source_id: RoleId,
        new_id: RoleId,
        code: &RoleCode,
        name: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Option<RoleAggregate>>;
}

pub trait UserRepository: Send + Sync {
    fn find_by_id(&self, id: UserId) -> RepositoryResult<Option<UserAggregate>>;

    /// Usernames are unique per tenant.
    fn find_by_username(&self, username: &Username, tenant_id: TenantId) -> RepositoryResult<Option<UserAggregate>>;

    /// Emails are unique per tenant.
    fn find_by_email(&self, email: &Email, tenant_id: TenantId) -> RepositoryResult<Option<UserAggregate>>;

    fn save(&self, aggregate: &UserAggregate, expected: ExpectedVersion) -> RepositoryResult<()>;

    fn delete(&self, id: UserId) -> RepositoryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::RepositoryError;

    #[derive(Debug)]
    struct Node {
        id: u32,
    }

    impl AggregateRoot for Node {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.id
        }

        fn version(&self) -> u64 {
            1
        }
    }

    fn tree(edges: &[(u32, u32)]) -> HashMap<u32, Vec<u32>> {
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (parent, child) in edges {
            children.entry(*parent).or_default().push(*child);
        }
        children
    }

    #[test]
    fn walks_every_level_breadth_first() {
        let children = tree(&[(1, 2), (1, 3), (2, 4), (4, 5)]);
        let found = collect_descendants(1, |p| {
            Ok(children.get(&p).into_iter().flatten().map(|id| Node { id: *id }).collect())
        })
        .unwrap();
        let ids: Vec<u32> = found.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 3, 4, 5]);
    }

    #[test]
    fn terminates_on_corrupt_cycles() {
        let children = tree(&[(1, 2), (2, 3), (3, 1)]);
        let found = collect_descendants(1, |p| {
            Ok(children.get(&p).into_iter().flatten().map(|id| Node { id: *id }).collect())
        })
        .unwrap();
        let ids: Vec<u32> = found.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn propagates_repository_failures() {
        let result: RepositoryResult<Vec<Node>> =
            collect_descendants(1, |_| Err(RepositoryError::Storage("down".into())));
        assert!(matches!(result, Err(RepositoryError::Storage(_))));
    }
}
