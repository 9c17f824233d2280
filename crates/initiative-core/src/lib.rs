//! Shared domain abstractions for the initiative tracker.
//!
//! Traits and types the turn-order scheduler is built on: event-sourced
//! aggregates, the clock and RNG seams used for determinism, and the
//! event repository contract. It contains no infrastructure code.

pub mod aggregate;
pub mod announce;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod identity;
pub mod repository;
pub mod rng;
pub mod roll;
