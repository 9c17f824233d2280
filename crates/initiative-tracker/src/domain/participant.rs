//! Participants and their status flags.

use initiative_core::identity::ParticipantRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rank::RankValue;
use super::sentinel::SentinelKind;

/// Per-participant status flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    /// Taken out of the fight.
    pub defeated: bool,
    /// Has finished acting this round.
    pub action_ended: bool,
    /// Has postponed acting this round.
    pub action_delayed: bool,
}

/// One actor in the turn order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Stable identity.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Current rank; `None` until the first roll.
    pub rank: Option<RankValue>,
    /// Set for the two bookend entries.
    pub sentinel: Option<SentinelKind>,
    /// Status flags.
    pub flags: StatusFlags,
    /// Derived from external health state.
    pub alive: bool,
    /// NPC classification, only used to break rank ties.
    pub is_npc: bool,
    /// Formula overriding the encounter default.
    pub initiative_formula: Option<String>,
}

impl Participant {
    /// Builds a sentinel entry with its fixed rank.
    #[must_use]
    pub fn sentinel(id: Uuid, kind: SentinelKind) -> Self {
        Self {
            id,
            name: kind.label().to_owned(),
            rank: Some(kind.rank()),
            sentinel: Some(kind),
            flags: StatusFlags::default(),
            alive: true,
            is_npc: false,
            initiative_formula: None,
        }
    }

    /// Builds a normal participant from an identity record.
    #[must_use]
    pub fn from_record(record: &ParticipantRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            rank: None,
            sentinel: None,
            flags: StatusFlags {
                defeated: record.defeated,
                ..StatusFlags::default()
            },
            alive: record.alive,
            is_npc: record.is_npc,
            initiative_formula: record.initiative_formula.clone(),
        }
    }

    /// Whether this is a bookend entry.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.sentinel.is_some()
    }

    /// Whether the participant belongs to the eligible pool: a normal
    /// participant that is alive, not defeated and has not ended its action.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        !self.is_sentinel() && self.alive && !self.flags.defeated && !self.flags.action_ended
    }

    /// Whether advancing away from this participant skips the confirmation
    /// gate.
    #[must_use]
    pub fn skips_confirmation(&self) -> bool {
        self.flags.action_ended || self.flags.action_delayed || !self.is_eligible()
    }

    /// The rank used for ordering.
    #[must_use]
    pub fn effective_rank(&self) -> RankValue {
        match self.sentinel {
            Some(kind) => kind.rank(),
            None => self.rank.unwrap_or(RankValue::UNROLLED),
        }
    }

    /// Clears the per-round action flags. Sentinels carry none.
    pub fn reset_action_flags(&mut self) {
        self.flags.action_ended = false;
        self.flags.action_delayed = false;
    }
}
