//! Round lifecycle: per-round flag resets and table announcements.

use initiative_core::announce::{Announcement, TurnProcess};

use super::aggregates::Encounter;
use super::events::{EncounterEvent, EncounterEventKind};
use super::participant::Participant;
use super::sentinel::SentinelKind;

/// Clears `action_ended` and `action_delayed` on every normal participant.
/// Already-clear flags stay clear.
pub fn reset_action_flags<'a, I>(participants: I)
where
    I: IntoIterator<Item = &'a mut Participant>,
{
    participants
        .into_iter()
        .filter(|p| !p.is_sentinel())
        .for_each(Participant::reset_action_flags);
}

/// Which process a landing on `participant` opens.
#[must_use]
pub fn process_for(participant: &Participant) -> TurnProcess {
    match participant.sentinel {
        Some(SentinelKind::Setup) => TurnProcess::Setup,
        Some(SentinelKind::Cleanup) => TurnProcess::Cleanup,
        None => TurnProcess::Main,
    }
}

/// Announcements for a committed batch, in event order.
///
/// The first round also announces the start of combat. Landings on the
/// cleanup bookend name nobody.
#[must_use]
pub fn announcements(encounter: &Encounter, events: &[EncounterEvent]) -> Vec<Announcement> {
    let encounter_id = encounter.id;
    let mut out = Vec::new();

    for event in events {
        match &event.kind {
            EncounterEventKind::RoundStarted(payload) => {
                if payload.round == 1 {
                    out.push(Announcement::CombatStarted { encounter_id });
                }
                out.push(Announcement::RoundStarted {
                    encounter_id,
                    round: payload.round,
                });
            }
            EncounterEventKind::TurnPassed(payload) => {
                let Some(participant) = encounter.participant(payload.participant_id) else {
                    continue;
                };
                let process = process_for(participant);
                let named = process != TurnProcess::Cleanup;
                out.push(Announcement::InitiativeResolved {
                    encounter_id,
                    process,
                    participant_id: named.then_some(participant.id),
                    participant_name: named.then(|| participant.name.clone()),
                });
            }
            EncounterEventKind::EncounterEnded(_) => {
                out.push(Announcement::CombatEnded { encounter_id });
            }
            _ => {}
        }
    }

    out
}
