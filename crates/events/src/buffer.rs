//! In-memory buffer of not-yet-published domain events.

use chrono::{DateTime, Utc};

use orgiam_core::{AggregateId, AggregateRoot};

use crate::domain_event::{DomainEvent, EventPayload};

/// Append-only buffer owned by an aggregate.
///
/// Events stay here until the caller has persisted the aggregate and then
/// takes them with [`EventBuffer::drain`]; draining returns and clears in one
/// step so the same event can never be published twice.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBuffer<P> {
    pending: Vec<DomainEvent<P>>,
}

impl<P> Default for EventBuffer<P> {
    fn default() -> Self {
        Self { pending: Vec::new() }
    }
}

impl<P: EventPayload> EventBuffer<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, aggregate_id: impl Into<AggregateId>, occurred_at: DateTime<Utc>, payload: P) {
        self.pending
            .push(DomainEvent::new(aggregate_id, occurred_at, payload));
    }

    pub fn pending(&self) -> &[DomainEvent<P>] {
        &self.pending
    }

    pub fn drain(&mut self) -> Vec<DomainEvent<P>> {
        std::mem::take(&mut self.pending)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Aggregate that buffers domain events for its caller.
pub trait RecordsEvents: AggregateRoot {
    type Payload: EventPayload;

    /// Events recorded since the last drain, oldest first.
    fn pending_events(&self) -> &[DomainEvent<Self::Payload>];

    /// Return and clear the pending events.
    fn drain_events(&mut self) -> Vec<DomainEvent<Self::Payload>>;

    /// Drop pending events without returning them (after a successful publish
    /// performed on a clone).
    fn clear_events(&mut self) {
        let _ = self.drain_events();
    }
}
