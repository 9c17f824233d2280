//! Turn-order sorting.

use std::cmp::Ordering;

use super::participant::Participant;

/// Compares two participants for turn order.
///
/// Higher rank first, then non-NPCs before NPCs, then display name
/// (case-sensitive), then id. Distinct participants never compare equal.
#[must_use]
pub fn compare(a: &Participant, b: &Participant) -> Ordering {
    b.effective_rank()
        .cmp(&a.effective_rank())
        .then_with(|| a.is_npc.cmp(&b.is_npc))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts participants into turn order.
pub fn sort<'a, I>(participants: I) -> Vec<&'a Participant>
where
    I: IntoIterator<Item = &'a Participant>,
{
    let mut ordered: Vec<&Participant> = participants.into_iter().collect();
    ordered.sort_by(|a, b| compare(a, b));
    ordered
}
