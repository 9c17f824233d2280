//! Announcement sink abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which part of the round a landing starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnProcess {
    /// The round-opening bookend.
    Setup,
    /// A participant's main action.
    Main,
    /// The round-closing bookend.
    Cleanup,
}

/// Table-facing messages produced by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Announcement {
    /// First round of an encounter is beginning.
    CombatStarted {
        /// The encounter.
        encounter_id: Uuid,
    },
    /// A round is beginning.
    RoundStarted {
        /// The encounter.
        encounter_id: Uuid,
        /// The round that just started (1-based).
        round: u32,
    },
    /// The turn landed on a new participant.
    InitiativeResolved {
        /// The encounter.
        encounter_id: Uuid,
        /// The process that is now running.
        process: TurnProcess,
        /// The acting participant; `None` for the cleanup bookend.
        participant_id: Option<Uuid>,
        /// Display name of the acting participant.
        participant_name: Option<String>,
    },
    /// The encounter ended.
    CombatEnded {
        /// The encounter.
        encounter_id: Uuid,
    },
}

impl Announcement {
    /// Short kind name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CombatStarted { .. } => "combat-start",
            Self::RoundStarted { .. } => "round-start",
            Self::InitiativeResolved { .. } => "initiative-resolved",
            Self::CombatEnded { .. } => "combat-end",
        }
    }
}

/// Fire-and-forget destination for announcements.
///
/// Sinks swallow and log their own delivery failures.
#[async_trait]
pub trait AnnouncementSink: Send + Sync {
    /// Publishes one announcement.
    async fn announce(&self, announcement: &Announcement);
}

/// Sink that writes announcements to the trace log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnnouncer;

#[async_trait]
impl AnnouncementSink for TracingAnnouncer {
    async fn announce(&self, announcement: &Announcement) {
        tracing::info!(kind = announcement.kind(), ?announcement, "announcement");
    }
}
