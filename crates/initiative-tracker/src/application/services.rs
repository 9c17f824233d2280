//! Collaborators shared by every command handler.

use std::sync::{Arc, Mutex};

use initiative_core::announce::AnnouncementSink;
use initiative_core::clock::Clock;
use initiative_core::identity::IdentityStore;
use initiative_core::repository::EventRepository;
use initiative_core::rng::DeterministicRng;
use initiative_core::roll::RollEvaluator;

/// Injected dependencies of the tracker.
///
/// Cloning is cheap; all collaborators are shared. The RNG sits behind a
/// blocking mutex that is only ever locked around synchronous domain calls.
#[derive(Clone)]
pub struct TrackerServices {
    /// Timestamp source for events.
    pub clock: Arc<dyn Clock>,
    /// Randomness for initiative rolls.
    pub rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    /// Formula evaluator.
    pub roller: Arc<dyn RollEvaluator>,
    /// Event persistence.
    pub repository: Arc<dyn EventRepository>,
    /// Participant identities.
    pub identities: Arc<dyn IdentityStore>,
    /// Table announcements.
    pub announcer: Arc<dyn AnnouncementSink>,
}

impl std::fmt::Debug for TrackerServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerServices").finish_non_exhaustive()
    }
}
