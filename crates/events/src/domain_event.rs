//! The record every aggregate appends for a state transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use orgiam_core::AggregateId;

use crate::Event;

/// Typed payload of a domain event (one enum per aggregate family).
pub trait EventPayload: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name, e.g. `"access.role.permission_granted"`.
    fn event_type(&self) -> &'static str;
}

/// `{type, aggregate id, timestamp, payload}`.
///
/// No wire schema is imposed; the payload is `serde`-serializable so a bus
/// adapter can pick its own encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent<P> {
    event_id: Uuid,
    aggregate_id: AggregateId,
    occurred_at: DateTime<Utc>,
    payload: P,
}

impl<P: EventPayload> DomainEvent<P> {
    pub fn new(aggregate_id: impl Into<AggregateId>, occurred_at: DateTime<Utc>, payload: P) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_id: aggregate_id.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}

impl<P: EventPayload> Event for DomainEvent<P> {
    fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    fn version(&self) -> u32 {
        1
    }

    fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
