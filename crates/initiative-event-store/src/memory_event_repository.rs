//! In-process implementation of the `EventRepository` trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use initiative_core::error::DomainError;
use initiative_core::repository::{EventRepository, StoredEvent};

/// Event repository holding every stream in memory.
///
/// Appends take the write lock for the whole check-then-extend step, so a
/// batch is either fully visible or not at all.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventRepository {
    streams: Arc<RwLock<HashMap<Uuid, Vec<StoredEvent>>>>,
}

impl MemoryEventRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every aggregate with at least one event.
    pub async fn aggregate_ids(&self) -> Vec<Uuid> {
        self.streams.read().await.keys().copied().collect()
    }
}

#[async_trait]
impl EventRepository for MemoryEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let streams = self.streams.read().await;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut streams = self.streams.write().await;
        let actual = streams
            .get(&aggregate_id)
            .and_then(|stream| stream.last())
            .map_or(0, |e| e.sequence_number);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        for (offset, event) in (1_i64..).zip(events) {
            if event.aggregate_id != aggregate_id {
                return Err(DomainError::Validation(format!(
                    "event {} belongs to aggregate {}, not {aggregate_id}",
                    event.event_id, event.aggregate_id
                )));
            }
            if event.sequence_number != expected_version + offset {
                return Err(DomainError::Validation(format!(
                    "event {} has sequence number {}, expected {}",
                    event.event_id,
                    event.sequence_number,
                    expected_version + offset
                )));
            }
        }

        streams
            .entry(aggregate_id)
            .or_default()
            .extend_from_slice(events);
        debug!(%aggregate_id, expected_version, appended = events.len(), "events appended");
        Ok(())
    }
}
