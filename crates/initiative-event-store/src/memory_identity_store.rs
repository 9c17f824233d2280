//! In-process implementation of the `IdentityStore` trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use initiative_core::error::DomainError;
use initiative_core::identity::{IdentityStore, ParticipantDescriptor, ParticipantRecord};

/// Participant identities held in memory.
///
/// Besides the trait surface used by the tracker, the store lets callers
/// register combatants and report health changes.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    records: Arc<RwLock<HashMap<Uuid, ParticipantRecord>>>,
}

impl MemoryIdentityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a living combatant and returns its record.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `name` is blank.
    pub async fn register(
        &self,
        name: &str,
        is_npc: bool,
        initiative_formula: Option<String>,
    ) -> Result<ParticipantRecord, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation(
                "participant name must not be empty".into(),
            ));
        }
        let record = ParticipantRecord {
            id: Uuid::now_v7(),
            name: name.to_owned(),
            defeated: false,
            alive: true,
            is_npc,
            initiative_formula,
        };
        self.records.write().await.insert(record.id, record.clone());
        debug!(participant_id = %record.id, "registered participant identity");
        Ok(record)
    }

    /// Records a health change made at the table.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ParticipantNotFound` if the identity is unknown.
    pub async fn set_status(
        &self,
        id: Uuid,
        defeated: bool,
        alive: bool,
    ) -> Result<ParticipantRecord, DomainError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or(DomainError::ParticipantNotFound(id))?;
        record.defeated = defeated;
        record.alive = alive;
        Ok(record.clone())
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create_participant(
        &self,
        descriptor: ParticipantDescriptor,
    ) -> Result<Uuid, DomainError> {
        let id = Uuid::now_v7();
        self.records.write().await.insert(
            id,
            ParticipantRecord {
                id,
                name: descriptor.name,
                defeated: false,
                alive: true,
                is_npc: descriptor.is_npc,
                initiative_formula: None,
            },
        );
        Ok(id)
    }

    async fn destroy_participant(&self, id: Uuid) -> Result<(), DomainError> {
        self.records
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(DomainError::ParticipantNotFound(id))
    }

    async fn get_participant(&self, id: Uuid) -> Result<ParticipantRecord, DomainError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(DomainError::ParticipantNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registered_participant_can_be_read_back() {
        // Arrange
        let store = MemoryIdentityStore::new();

        // Act
        let record = store
            .register("  Ayla ", false, Some("1d20".into()))
            .await
            .unwrap();

        // Assert
        let loaded = store.get_participant(record.id).await.unwrap();
        assert_eq!(loaded.name, "Ayla");
        assert!(loaded.alive);
        assert!(!loaded.defeated);
        assert_eq!(loaded.initiative_formula.as_deref(), Some("1d20"));
    }

    #[tokio::test]
    async fn test_register_rejects_blank_name() {
        let store = MemoryIdentityStore::new();

        let result = store.register("   ", true, None).await;

        match result.unwrap_err() {
            DomainError::Validation(msg) => assert!(msg.contains("name")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_set_status_updates_health_flags() {
        let store = MemoryIdentityStore::new();
        let record = store.register("Bram", true, None).await.unwrap();

        store.set_status(record.id, true, false).await.unwrap();

        let loaded = store.get_participant(record.id).await.unwrap();
        assert!(loaded.defeated);
        assert!(!loaded.alive);
    }

    #[tokio::test]
    async fn test_destroy_removes_sentinel_identity() {
        // Arrange
        let store = MemoryIdentityStore::new();
        let id = store
            .create_participant(ParticipantDescriptor {
                name: "[ Setup ]".into(),
                is_npc: true,
                hidden: true,
            })
            .await
            .unwrap();

        // Act
        store.destroy_participant(id).await.unwrap();

        // Assert
        match store.get_participant(id).await.unwrap_err() {
            DomainError::ParticipantNotFound(missing) => assert_eq!(missing, id),
            other => panic!("expected ParticipantNotFound, got {other:?}"),
        }
        assert!(matches!(
            store.destroy_participant(id).await,
            Err(DomainError::ParticipantNotFound(_))
        ));
    }
}
