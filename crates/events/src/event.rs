use chrono::{DateTime, Utc};

use orgiam_core::AggregateId;

/// A fact recorded by an aggregate, as seen by whoever publishes it.
///
/// Events are immutable once recorded and leave the aggregate only through
/// `drain_events`.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name, `<crate area>.<aggregate>.<what happened>`
    /// (e.g. `"directory.organization.member_added"`).
    fn event_type(&self) -> &'static str;

    /// Schema version of the payload.
    fn version(&self) -> u32;

    /// Aggregate that recorded the event.
    fn aggregate_id(&self) -> AggregateId;

    /// Business time passed to the mutator, not wall-clock time.
    fn occurred_at(&self) -> DateTime<Utc>;
}
