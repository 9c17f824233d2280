//! Initiative (re)computation.

use std::collections::{HashMap, HashSet};

use initiative_core::error::DomainError;
use initiative_core::rng::DeterministicRng;
use initiative_core::roll::RollEvaluator;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::participant::Participant;
use super::rank::RankValue;

/// A freshly computed rank for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankAssignment {
    /// The participant.
    pub participant_id: Uuid,
    /// Its new rank.
    pub rank: RankValue,
}

/// Computes new ranks for `ids`.
///
/// Sentinels always get their reserved value. Every normal participant is
/// rolled again, whatever its flags; previous rolls are never reused. Each id
/// is rolled at most once per call. The participants themselves are not
/// modified.
///
/// # Errors
///
/// Returns `DomainError::ParticipantNotFound` for an unknown id and
/// `DomainError::Validation` if a formula cannot be evaluated.
pub fn recompute_ranks(
    participants: &HashMap<Uuid, Participant>,
    ids: &[Uuid],
    default_formula: &str,
    roller: &dyn RollEvaluator,
    rng: &mut dyn DeterministicRng,
) -> Result<Vec<RankAssignment>, DomainError> {
    let mut seen = HashSet::with_capacity(ids.len());
    let mut assignments = Vec::with_capacity(ids.len());

    for &id in ids {
        if !seen.insert(id) {
            continue;
        }
        let participant = participants
            .get(&id)
            .ok_or(DomainError::ParticipantNotFound(id))?;

        let rank = match participant.sentinel {
            Some(kind) => kind.rank(),
            None => {
                let formula = participant
                    .initiative_formula
                    .as_deref()
                    .unwrap_or(default_formula);
                RankValue::normal(roller.roll(formula, rng)?)
            }
        };
        assignments.push(RankAssignment {
            participant_id: id,
            rank,
        });
    }

    Ok(assignments)
}
