//! Identity store abstraction.
//!
//! Participant identities (names, health, NPC classification) live outside
//! the scheduler. The scheduler creates identities only for its own sentinel
//! entries and reads everything else.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// What to create when the scheduler needs a new identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDescriptor {
    /// Display name.
    pub name: String,
    /// Whether the identity is controlled by the game master.
    pub is_npc: bool,
    /// Hidden identities are bookkeeping entries that a view should not draw.
    pub hidden: bool,
}

/// Snapshot of an identity as the store currently sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// Stable identity.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Whether the participant has been taken out of the fight.
    pub defeated: bool,
    /// Derived from external health state (health above zero).
    pub alive: bool,
    /// NPC classification, used as a sort tie-break.
    pub is_npc: bool,
    /// Participant-specific initiative formula, if any.
    pub initiative_formula: Option<String>,
}

/// Store that owns participant identity records.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Creates an identity and returns its id once durably stored.
    async fn create_participant(&self, descriptor: ParticipantDescriptor) -> Result<Uuid, DomainError>;

    /// Destroys an identity.
    async fn destroy_participant(&self, id: Uuid) -> Result<(), DomainError>;

    /// Reads the current record for an identity.
    async fn get_participant(&self, id: Uuid) -> Result<ParticipantRecord, DomainError>;
}
