//! Domain events for the encounter aggregate.

use initiative_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ranking::RankAssignment;

/// Outcome of a confirmation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The participant is done for this round.
    EndAction,
    /// The participant postpones and stays in the pool.
    DelayAction,
}

/// Emitted when an encounter is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterCreated {
    /// The encounter identifier.
    pub encounter_id: Uuid,
    /// Whether a view displayed the encounter when it was created.
    pub attached_to_view: bool,
    /// Formula used for participants without their own.
    pub default_formula: String,
}

/// Emitted when both sentinel identities are registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelsRegistered {
    /// The `[ Setup ]` participant.
    pub setup_id: Uuid,
    /// The `[ Cleanup ]` participant.
    pub cleanup_id: Uuid,
}

/// Emitted when a participant joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantAdded {
    /// The participant identifier.
    pub participant_id: Uuid,
    /// Display name.
    pub name: String,
    /// NPC classification.
    pub is_npc: bool,
    /// Whether the participant joined already defeated.
    pub defeated: bool,
    /// Whether the participant is alive.
    pub alive: bool,
    /// Participant-specific formula.
    pub initiative_formula: Option<String>,
}

/// Emitted when a participant leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRemoved {
    /// The participant identifier.
    pub participant_id: Uuid,
}

/// Emitted when the identity store reports changed health or classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantStatusChanged {
    /// The participant identifier.
    pub participant_id: Uuid,
    /// Display name.
    pub name: String,
    /// Defeated flag.
    pub defeated: bool,
    /// Vitality.
    pub alive: bool,
    /// NPC classification.
    pub is_npc: bool,
}

/// Emitted when action flags are overridden by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFlagsSet {
    /// The participant identifier.
    pub participant_id: Uuid,
    /// New `action_ended` value.
    pub action_ended: bool,
    /// New `action_delayed` value.
    pub action_delayed: bool,
}

/// Emitted when ranks are (re)computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RanksRolled {
    /// One entry per rolled participant.
    pub ranks: Vec<RankAssignment>,
}

/// Emitted when the first round is about to begin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterStarted {
    /// The encounter identifier.
    pub encounter_id: Uuid,
}

/// Emitted when a round begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundStarted {
    /// The new round number.
    pub round: u32,
}

/// Emitted when the turn lands on a participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnPassed {
    /// The participant now acting.
    pub participant_id: Uuid,
}

/// Emitted when the scheduler suspends for an end/delay decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequested {
    /// The participant whose action must be confirmed.
    pub participant_id: Uuid,
}

/// Emitted when a pending confirmation is answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDeclared {
    /// The participant that answered.
    pub participant_id: Uuid,
    /// The answer.
    pub decision: Decision,
}

/// Emitted when the encounter ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncounterEnded {
    /// The encounter identifier.
    pub encounter_id: Uuid,
    /// The round the encounter ended in.
    pub final_round: u32,
}

/// Event type identifier for [`EncounterCreated`].
pub const ENCOUNTER_CREATED_EVENT_TYPE: &str = "encounter.created";
/// Event type identifier for [`SentinelsRegistered`].
pub const SENTINELS_REGISTERED_EVENT_TYPE: &str = "encounter.sentinels_registered";
/// Event type identifier for [`ParticipantAdded`].
pub const PARTICIPANT_ADDED_EVENT_TYPE: &str = "encounter.participant_added";
/// Event type identifier for [`ParticipantRemoved`].
pub const PARTICIPANT_REMOVED_EVENT_TYPE: &str = "encounter.participant_removed";
/// Event type identifier for [`ParticipantStatusChanged`].
pub const PARTICIPANT_STATUS_CHANGED_EVENT_TYPE: &str = "encounter.participant_status_changed";
/// Event type identifier for [`ActionFlagsSet`].
pub const ACTION_FLAGS_SET_EVENT_TYPE: &str = "encounter.action_flags_set";
/// Event type identifier for [`RanksRolled`].
pub const RANKS_ROLLED_EVENT_TYPE: &str = "encounter.ranks_rolled";
/// Event type identifier for [`EncounterStarted`].
pub const ENCOUNTER_STARTED_EVENT_TYPE: &str = "encounter.started";
/// Event type identifier for [`RoundStarted`].
pub const ROUND_STARTED_EVENT_TYPE: &str = "encounter.round_started";
/// Event type identifier for [`TurnPassed`].
pub const TURN_PASSED_EVENT_TYPE: &str = "encounter.turn_passed";
/// Event type identifier for [`ConfirmationRequested`].
pub const CONFIRMATION_REQUESTED_EVENT_TYPE: &str = "encounter.confirmation_requested";
/// Event type identifier for [`ActionDeclared`].
pub const ACTION_DECLARED_EVENT_TYPE: &str = "encounter.action_declared";
/// Event type identifier for [`EncounterEnded`].
pub const ENCOUNTER_ENDED_EVENT_TYPE: &str = "encounter.ended";

/// Event payload variants for the encounter aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EncounterEventKind {
    /// The encounter was created.
    EncounterCreated(EncounterCreated),
    /// Sentinels were registered.
    SentinelsRegistered(SentinelsRegistered),
    /// A participant joined.
    ParticipantAdded(ParticipantAdded),
    /// A participant left.
    ParticipantRemoved(ParticipantRemoved),
    /// Health or classification changed outside the scheduler.
    ParticipantStatusChanged(ParticipantStatusChanged),
    /// Action flags were overridden.
    ActionFlagsSet(ActionFlagsSet),
    /// Ranks were recomputed.
    RanksRolled(RanksRolled),
    /// The encounter started.
    EncounterStarted(EncounterStarted),
    /// A round started.
    RoundStarted(RoundStarted),
    /// The turn moved.
    TurnPassed(TurnPassed),
    /// A confirmation gate opened.
    ConfirmationRequested(ConfirmationRequested),
    /// A confirmation gate was answered.
    ActionDeclared(ActionDeclared),
    /// The encounter ended.
    EncounterEnded(EncounterEnded),
}

impl EncounterEventKind {
    /// The event type identifier for this payload.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::EncounterCreated(_) => ENCOUNTER_CREATED_EVENT_TYPE,
            Self::SentinelsRegistered(_) => SENTINELS_REGISTERED_EVENT_TYPE,
            Self::ParticipantAdded(_) => PARTICIPANT_ADDED_EVENT_TYPE,
            Self::ParticipantRemoved(_) => PARTICIPANT_REMOVED_EVENT_TYPE,
            Self::ParticipantStatusChanged(_) => PARTICIPANT_STATUS_CHANGED_EVENT_TYPE,
            Self::ActionFlagsSet(_) => ACTION_FLAGS_SET_EVENT_TYPE,
            Self::RanksRolled(_) => RANKS_ROLLED_EVENT_TYPE,
            Self::EncounterStarted(_) => ENCOUNTER_STARTED_EVENT_TYPE,
            Self::RoundStarted(_) => ROUND_STARTED_EVENT_TYPE,
            Self::TurnPassed(_) => TURN_PASSED_EVENT_TYPE,
            Self::ConfirmationRequested(_) => CONFIRMATION_REQUESTED_EVENT_TYPE,
            Self::ActionDeclared(_) => ACTION_DECLARED_EVENT_TYPE,
            Self::EncounterEnded(_) => ENCOUNTER_ENDED_EVENT_TYPE,
        }
    }
}

/// Domain event envelope for the encounter aggregate.
#[derive(Debug, Clone)]
pub struct EncounterEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: EncounterEventKind,
}

impl DomainEvent for EncounterEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        // Serialization of derived Serialize types to Value is infallible.
        serde_json::to_value(&self.kind).expect("EncounterEventKind serialization is infallible")
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
