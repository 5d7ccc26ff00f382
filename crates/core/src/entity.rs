//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Entity that can sit in a single-parent tree (organizations, departments, roles).
///
/// Implementors must reject `set_parent(Some(self.id()))`; transitive cycles are
/// checked by the owning domain service, which can see the whole tree.
pub trait Hierarchical: Entity {
    fn parent_id(&self) -> Option<&Self::Id>;

    fn is_root(&self) -> bool {
        self.parent_id().is_none()
    }
}
