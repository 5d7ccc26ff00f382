use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use orgiam_core::{AggregateRoot, ExpectedVersion};
use orgiam_events::RecordsEvents;
use orgiam_services::{RepositoryError, RepositoryResult};

/// Versioned in-memory table of aggregates keyed by id.
///
/// Rows are stored without pending events. Every save checks the stored
/// version (0 when absent) against the caller's expectation and rejects rows
/// whose unique keys clash with another stored aggregate.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug)]
pub(crate) struct VersionedStore<A: AggregateRoot> {
    label: &'static str,
    rows: RwLock<HashMap<A::Id, A>>,
}

impl<A> VersionedStore<A>
where
    A: AggregateRoot + RecordsEvents + Clone,
    A::Id: Copy + Ord + Display,
{
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            label,
            rows: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RepositoryResult<RwLockReadGuard<'_, HashMap<A::Id, A>>> {
        self.rows
            .read()
            .map_err(|_| RepositoryError::Storage(format!("{} store lock poisoned", self.label)))
    }

    fn write(&self) -> RepositoryResult<RwLockWriteGuard<'_, HashMap<A::Id, A>>> {
        self.rows
            .write()
            .map_err(|_| RepositoryError::Storage(format!("{} store lock poisoned", self.label)))
    }

    pub(crate) fn get(&self, id: A::Id) -> RepositoryResult<Option<A>> {
        Ok(self.read()?.get(&id).cloned())
    }

    pub(crate) fn find<P>(&self, predicate: P) -> RepositoryResult<Option<A>>
    where
        P: Fn(&A) -> bool,
    {
        Ok(self.read()?.values().find(|row| predicate(row)).cloned())
    }

    /// Matching rows ordered by id.
    pub(crate) fn filter<P>(&self, predicate: P) -> RepositoryResult<Vec<A>>
    where
        P: Fn(&A) -> bool,
    {
        let mut rows: Vec<A> = self.read()?.values().filter(|row| predicate(row)).cloned().collect();
        rows.sort_by_key(|row| *row.id());
        Ok(rows)
    }

    /// `clash(new, other)` returns a description when `new` would share a
    /// unique key with the stored row `other`.
    pub(crate) fn save<C>(&self, aggregate: &A, expected: ExpectedVersion, clash: C) -> RepositoryResult<()>
    where
        C: Fn(&A, &A) -> Option<String>,
    {
        let id = *aggregate.id();
        let mut rows = self.write()?;

        let current = rows.get(&id).map(|row| row.version()).unwrap_or(0);
        if !expected.matches(current) {
            tracing::debug!(store = self.label, %id, ?expected, current, "stale save rejected");
            return Err(RepositoryError::Conflict(format!(
                "{} {id}: expected {expected:?}, found {current}",
                self.label
            )));
        }

        if let Some(duplicate) = rows
            .values()
            .filter(|other| *other.id() != id)
            .find_map(|other| clash(aggregate, other))
        {
            return Err(RepositoryError::Duplicate(duplicate));
        }

        let mut stored = aggregate.clone();
        stored.clear_events();
        rows.insert(id, stored);
        Ok(())
    }

    /// Deleting a missing row is a no-op.
    pub(crate) fn remove(&self, id: A::Id) -> RepositoryResult<()> {
        self.write()?.remove(&id);
        Ok(())
    }
}
