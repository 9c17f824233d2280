//! Mock `EventRepository` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use initiative_core::error::DomainError;
use initiative_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

/// An event repository that keeps every appended batch and serves the
/// accumulated stream back from `load_events`, so consecutive commands see
/// each other's writes. Versions are checked like a real store.
#[derive(Debug, Default)]
pub struct RecordingEventRepository {
    stream: Mutex<Vec<StoredEvent>>,
    appended: Mutex<Vec<(Uuid, i64, Vec<StoredEvent>)>>,
}

impl RecordingEventRepository {
    /// Create a repository pre-loaded with `events`.
    #[must_use]
    pub fn new(events: Vec<StoredEvent>) -> Self {
        Self {
            stream: Mutex::new(events),
            appended: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all batches that were appended.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<(Uuid, i64, Vec<StoredEvent>)> {
        self.appended.lock().unwrap().clone()
    }

    /// Returns the full stream (pre-loaded plus appended).
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn stream(&self) -> Vec<StoredEvent> {
        self.stream.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .stream
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let mut stream = self.stream.lock().unwrap();
        let actual = stream
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.sequence_number)
            .max()
            .unwrap_or(0);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }
        stream.extend_from_slice(events);
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_id, expected_version, events.to_vec()));
        Ok(())
    }
}

/// A repository that serves a fixed stream but refuses every append with
/// `PersistenceFailure`. Useful for checking that failed writes leave the
/// previous state in place.
#[derive(Debug)]
pub struct ReadOnlyEventRepository {
    events: Vec<StoredEvent>,
}

impl ReadOnlyEventRepository {
    /// Create a repository that loads `events`.
    #[must_use]
    pub fn new(events: Vec<StoredEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl EventRepository for ReadOnlyEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(DomainError::PersistenceFailure("disk full".into()))
    }
}

/// An event repository that always returns an infrastructure error.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
