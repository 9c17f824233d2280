//! Shared application state.

use std::sync::Arc;

use initiative_event_store::memory_identity_store::MemoryIdentityStore;
use initiative_tracker::application::scheduler::SchedulerRegistry;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Per-encounter schedulers and the services behind them.
    pub registry: Arc<SchedulerRegistry>,
    /// Identity store the tracker reads participants from.
    pub identities: MemoryIdentityStore,
    /// Formula for encounters created without one.
    pub default_formula: String,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        registry: Arc<SchedulerRegistry>,
        identities: MemoryIdentityStore,
        default_formula: String,
    ) -> Self {
        Self {
            registry,
            identities,
            default_formula,
        }
    }
}
