//! Query handlers for the Initiative Tracker context.
//!
//! This module contains query handlers that reconstitute the encounter from
//! stored events and return read-only view DTOs.

use initiative_core::aggregate::AggregateRoot;
use initiative_core::error::DomainError;
use initiative_core::repository::EventRepository;
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers;
use crate::domain::aggregates::{Encounter, EncounterStatus, TurnState};
use crate::domain::participant::Participant;
use crate::domain::sentinel::SentinelKind;

/// Read-only view of one entry in the turn order.
#[derive(Debug, Serialize)]
pub struct ParticipantView {
    /// The participant identifier.
    pub participant_id: Uuid,
    /// Display name.
    pub name: String,
    /// Current rank; `None` until first rolled.
    pub rank: Option<i32>,
    /// Set for the two bookends.
    pub sentinel: Option<SentinelKind>,
    /// Defeated flag.
    pub defeated: bool,
    /// Vitality.
    pub alive: bool,
    /// Ended this round.
    pub action_ended: bool,
    /// Delayed this round.
    pub action_delayed: bool,
    /// NPC classification.
    pub is_npc: bool,
    /// Member of the eligible pool.
    pub eligible: bool,
}

impl From<&Participant> for ParticipantView {
    fn from(p: &Participant) -> Self {
        Self {
            participant_id: p.id,
            name: p.name.clone(),
            rank: p.rank.map(|r| r.value()),
            sentinel: p.sentinel,
            defeated: p.flags.defeated,
            alive: p.alive,
            action_ended: p.flags.action_ended,
            action_delayed: p.flags.action_delayed,
            is_npc: p.is_npc,
            eligible: p.is_eligible(),
        }
    }
}

/// Read-only view of an encounter aggregate.
#[derive(Debug, Serialize)]
pub struct EncounterView {
    /// The encounter identifier.
    pub encounter_id: Uuid,
    /// Lifecycle status.
    pub status: EncounterStatus,
    /// Current round.
    pub round: u32,
    /// Where the turn rests.
    pub turn: TurnState,
    /// Position of the turn holder in `turn_order`.
    pub active_index: Option<usize>,
    /// Participant whose end/delay decision is pending.
    pub pending_confirmation: Option<Uuid>,
    /// Participants in turn order.
    pub turn_order: Vec<ParticipantView>,
    /// Formula for participants without their own.
    pub default_formula: String,
    /// Whether a view displayed the encounter at creation.
    pub attached_to_view: bool,
    /// Current version (last sequence number).
    pub version: i64,
}

impl From<&Encounter> for EncounterView {
    fn from(encounter: &Encounter) -> Self {
        let pending_confirmation = match encounter.state() {
            TurnState::AwaitingConfirmation(id) => Some(id),
            _ => None,
        };
        Self {
            encounter_id: encounter.id,
            status: encounter.status(),
            round: encounter.round(),
            turn: encounter.state(),
            active_index: encounter.active_index(),
            pending_confirmation,
            turn_order: encounter
                .participants_in_order()
                .into_iter()
                .map(ParticipantView::from)
                .collect(),
            default_formula: encounter.default_formula().to_owned(),
            attached_to_view: encounter.attached_to_view(),
            version: encounter.version(),
        }
    }
}

/// Retrieves an encounter by its aggregate ID.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the ID.
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub async fn get_encounter_by_id(
    encounter_id: Uuid,
    repo: &dyn EventRepository,
) -> Result<EncounterView, DomainError> {
    let stored_events = repo.load_events(encounter_id).await?;
    if stored_events.is_empty() {
        return Err(DomainError::AggregateNotFound(encounter_id));
    }
    let encounter = command_handlers::reconstitute(encounter_id, &stored_events)?;
    Ok(EncounterView::from(&encounter))
}
