//! Domain events: the typed record, the `Event` trait and the per-aggregate buffer.

pub mod buffer;
pub mod domain_event;
pub mod event;

pub use buffer::{EventBuffer, RecordsEvents};
pub use domain_event::{DomainEvent, EventPayload};
pub use event::Event;
