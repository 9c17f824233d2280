//! Turn-order scheduling for round-based encounters.
//!
//! Keeps two bookend sentinels (`[ Setup ]` and `[ Cleanup ]`) around every
//! round, re-rolls and re-sorts initiative on each transition, and suspends
//! on a confirmation gate until the acting participant ends or delays their
//! action.

pub mod application;
pub mod domain;
