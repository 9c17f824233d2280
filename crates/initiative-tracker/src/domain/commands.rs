//! Commands for the Initiative Tracker context.

use initiative_core::command::Command;
use uuid::Uuid;

use super::events::Decision;

/// Command to create an encounter and its sentinels.
#[derive(Debug, Clone)]
pub struct CreateEncounter {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target encounter.
    pub encounter_id: Uuid,
    /// Whether a view displays the encounter.
    pub attached_to_view: bool,
    /// Formula for participants without their own; `None` uses the default.
    pub default_formula: Option<String>,
}

/// Command to add an existing identity to an encounter.
#[derive(Debug, Clone)]
pub struct AddParticipant {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target encounter.
    pub encounter_id: Uuid,
    /// The identity to add.
    pub participant_id: Uuid,
}

/// Command to remove a participant from an encounter.
#[derive(Debug, Clone)]
pub struct RemoveParticipant {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target encounter.
    pub encounter_id: Uuid,
    /// The participant to remove.
    pub participant_id: Uuid,
}

/// Command to start round 1.
#[derive(Debug, Clone)]
pub struct StartEncounter {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target encounter.
    pub encounter_id: Uuid,
}

/// Command to move the turn forward.
#[derive(Debug, Clone)]
pub struct AdvanceTurn {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target encounter.
    pub encounter_id: Uuid,
}

/// Command to step the turn back.
#[derive(Debug, Clone)]
pub struct RewindTurn {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target encounter.
    pub encounter_id: Uuid,
}

/// Command answering a pending confirmation.
#[derive(Debug, Clone)]
pub struct DeclareAction {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target encounter.
    pub encounter_id: Uuid,
    /// End or delay.
    pub decision: Decision,
}

/// Command to re-roll and re-select without moving past anyone.
#[derive(Debug, Clone)]
pub struct RecheckInitiative {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target encounter.
    pub encounter_id: Uuid,
}

/// Command to re-roll specific participants in place.
#[derive(Debug, Clone)]
pub struct RollInitiative {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target encounter.
    pub encounter_id: Uuid,
    /// Participants to roll.
    pub participant_ids: Vec<Uuid>,
}

/// Command to override a participant's action flags.
#[derive(Debug, Clone)]
pub struct SetActionFlags {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target encounter.
    pub encounter_id: Uuid,
    /// The participant.
    pub participant_id: Uuid,
    /// New `action_ended` value.
    pub action_ended: bool,
    /// New `action_delayed` value.
    pub action_delayed: bool,
}

/// Command to end an encounter and release its sentinels.
#[derive(Debug, Clone)]
pub struct EndEncounter {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The target encounter.
    pub encounter_id: Uuid,
}

macro_rules! impl_command {
    ($($command:ty => $name:literal),+ $(,)?) => {
        $(
            impl Command for $command {
                fn command_type(&self) -> &'static str {
                    $name
                }

                fn correlation_id(&self) -> Uuid {
                    self.correlation_id
                }

                fn encounter_id(&self) -> Uuid {
                    self.encounter_id
                }
            }
        )+
    };
}

impl_command! {
    CreateEncounter => "encounter.create",
    AddParticipant => "encounter.add_participant",
    RemoveParticipant => "encounter.remove_participant",
    StartEncounter => "encounter.start",
    AdvanceTurn => "encounter.advance",
    RewindTurn => "encounter.rewind",
    DeclareAction => "encounter.declare_action",
    RecheckInitiative => "encounter.recheck",
    RollInitiative => "encounter.roll_initiative",
    SetActionFlags => "encounter.set_action_flags",
    EndEncounter => "encounter.end",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exposes_routing_fields() {
        let command = DeclareAction {
            correlation_id: Uuid::new_v4(),
            encounter_id: Uuid::new_v4(),
            decision: Decision::EndAction,
        };

        assert_eq!(command.command_type(), "encounter.declare_action");
        assert_eq!(Command::encounter_id(&command), command.encounter_id);
        assert_eq!(Command::correlation_id(&command), command.correlation_id);
    }
}
