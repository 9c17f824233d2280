//! Test identity stores.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use initiative_core::error::DomainError;
use initiative_core::identity::{IdentityStore, ParticipantDescriptor, ParticipantRecord};
use uuid::Uuid;

/// Identity store kept in a map. Records can be edited between transitions
/// to simulate health changes made elsewhere.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    records: Mutex<HashMap<Uuid, ParticipantRecord>>,
    created: Mutex<Vec<ParticipantDescriptor>>,
    destroyed: Mutex<Vec<Uuid>>,
}

impl InMemoryIdentityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a living, non-defeated participant and returns its record.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert(&self, name: &str, is_npc: bool) -> ParticipantRecord {
        let record = ParticipantRecord {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            defeated: false,
            alive: true,
            is_npc,
            initiative_formula: None,
        };
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        record
    }

    /// Applies `edit` to a stored record.
    ///
    /// # Panics
    ///
    /// Panics if the record does not exist or the mutex is poisoned.
    pub fn update(&self, id: Uuid, edit: impl FnOnce(&mut ParticipantRecord)) {
        let mut records = self.records.lock().unwrap();
        edit(records.get_mut(&id).expect("record must exist"));
    }

    /// Descriptors passed to `create_participant`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn created(&self) -> Vec<ParticipantDescriptor> {
        self.created.lock().unwrap().clone()
    }

    /// Ids passed to `destroy_participant`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn destroyed(&self) -> Vec<Uuid> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn create_participant(&self, descriptor: ParticipantDescriptor) -> Result<Uuid, DomainError> {
        let id = Uuid::new_v4();
        self.records.lock().unwrap().insert(
            id,
            ParticipantRecord {
                id,
                name: descriptor.name.clone(),
                defeated: false,
                alive: true,
                is_npc: descriptor.is_npc,
                initiative_formula: None,
            },
        );
        self.created.lock().unwrap().push(descriptor);
        Ok(id)
    }

    async fn destroy_participant(&self, id: Uuid) -> Result<(), DomainError> {
        self.records.lock().unwrap().remove(&id);
        self.destroyed.lock().unwrap().push(id);
        Ok(())
    }

    async fn get_participant(&self, id: Uuid) -> Result<ParticipantRecord, DomainError> {
        self.records
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(DomainError::ParticipantNotFound(id))
    }
}

/// Identity store whose creations start failing after `successes` calls.
/// Reads and destroys always succeed against an empty store.
#[derive(Debug)]
pub struct FailingIdentityStore {
    remaining: Mutex<usize>,
    destroyed: Mutex<Vec<Uuid>>,
}

impl FailingIdentityStore {
    /// Allows `successes` creations before failing.
    #[must_use]
    pub fn after(successes: usize) -> Self {
        Self {
            remaining: Mutex::new(successes),
            destroyed: Mutex::new(Vec::new()),
        }
    }

    /// Ids passed to `destroy_participant`, in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn destroyed(&self) -> Vec<Uuid> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityStore for FailingIdentityStore {
    async fn create_participant(&self, _descriptor: ParticipantDescriptor) -> Result<Uuid, DomainError> {
        let mut remaining = self.remaining.lock().unwrap();
        if *remaining == 0 {
            return Err(DomainError::Infrastructure("identity store unavailable".into()));
        }
        *remaining -= 1;
        Ok(Uuid::new_v4())
    }

    async fn destroy_participant(&self, id: Uuid) -> Result<(), DomainError> {
        self.destroyed.lock().unwrap().push(id);
        Ok(())
    }

    async fn get_participant(&self, id: Uuid) -> Result<ParticipantRecord, DomainError> {
        Err(DomainError::ParticipantNotFound(id))
    }
}
