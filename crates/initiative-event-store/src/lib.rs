//! In-process stores for the initiative tracker.

pub mod memory_event_repository;
pub mod memory_identity_store;
