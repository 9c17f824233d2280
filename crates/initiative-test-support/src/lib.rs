//! Shared test mocks and utilities for the initiative tracker.

mod announce;
mod clock;
mod identity;
mod repository;
mod rng;

pub use announce::RecordingAnnouncer;
pub use clock::FixedClock;
pub use identity::{FailingIdentityStore, InMemoryIdentityStore};
pub use repository::{FailingEventRepository, ReadOnlyEventRepository, RecordingEventRepository};
pub use rng::{MockRng, SequenceRng};
