//! Aggregate root abstraction.

use uuid::Uuid;

use crate::event::DomainEvent;

/// Trait for aggregate roots that reconstitute from event history.
///
/// Commands record events into an uncommitted batch and update in-memory
/// state immediately, so a multi-step transition can read its own writes.
/// The batch only becomes part of `version` once the caller has appended it
/// durably and calls [`AggregateRoot::mark_committed`].
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the sequence number of the last persisted event.
    fn version(&self) -> i64;

    /// Replays a persisted event (used during reconstitution).
    fn apply(&mut self, event: &Self::Event);

    /// Returns events recorded by command handling that are not yet stored.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Folds the uncommitted batch into `version` after a successful append.
    fn mark_committed(&mut self);
}
