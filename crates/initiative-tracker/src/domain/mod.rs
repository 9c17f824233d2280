//! Domain model: participants, ranking, ordering and the encounter aggregate.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod lifecycle;
pub mod ordering;
pub mod participant;
pub mod rank;
pub mod ranking;
pub mod sentinel;
