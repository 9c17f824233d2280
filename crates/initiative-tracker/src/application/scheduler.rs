//! Per-encounter scheduler task.
//!
//! Each encounter gets one tokio task that owns its request queue. Requests
//! are handled strictly one at a time, so the turn order and the active
//! pointer of an encounter never change under a concurrent request. When a
//! transition opens a confirmation gate the task publishes a
//! [`DecisionRequest`] and simply keeps serving the queue; the gate is
//! answered by a later `Decide` request.

use std::collections::HashMap;

use initiative_core::error::DomainError;
use initiative_core::repository::StoredEvent;
use serde::Serialize;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::command_handlers::{
    handle_add_participant, handle_advance_turn, handle_create_encounter, handle_declare_action,
    handle_end_encounter, handle_recheck_initiative, handle_remove_participant,
    handle_rewind_turn, handle_roll_initiative, handle_set_action_flags, handle_start_encounter,
    load_encounter,
};
use super::services::TrackerServices;
use crate::domain::aggregates::TurnState;
use crate::domain::commands::{
    AddParticipant, AdvanceTurn, CreateEncounter, DeclareAction, EndEncounter, RecheckInitiative,
    RemoveParticipant, RewindTurn, RollInitiative, SetActionFlags, StartEncounter,
};
use crate::domain::events::{CONFIRMATION_REQUESTED_EVENT_TYPE, Decision, EncounterEventKind};

/// Channel buffer size for scheduler requests.
const REQUEST_CHANNEL_BUFFER: usize = 32;

/// What a decision request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// End or delay the current action.
    TurnEnd,
}

/// Published whenever an encounter waits on a participant's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionRequest {
    /// The encounter.
    pub encounter_id: Uuid,
    /// Who has to decide.
    pub participant_id: Uuid,
    /// What they are asked.
    pub prompt: PromptKind,
}

/// Requests served by a [`TurnScheduler`].
#[derive(Debug, Clone)]
pub enum SchedulerRequest {
    /// Create the encounter and its sentinels.
    Create {
        /// Whether a view displays the encounter.
        attached_to_view: bool,
        /// Formula for participants without their own.
        default_formula: Option<String>,
    },
    /// Add an identity.
    AddParticipant(Uuid),
    /// Remove a participant.
    RemoveParticipant(Uuid),
    /// Start round 1.
    Start,
    /// Move the turn forward.
    Advance,
    /// Step the turn back.
    Rewind,
    /// Re-roll and re-select in place.
    Recheck,
    /// Answer the pending gate.
    Decide(Decision),
    /// Re-roll the given participants.
    Roll(Vec<Uuid>),
    /// Override action flags.
    SetActionFlags {
        /// The participant.
        participant_id: Uuid,
        /// New `action_ended` value.
        action_ended: bool,
        /// New `action_delayed` value.
        action_delayed: bool,
    },
    /// End the encounter.
    End,
}

impl SchedulerRequest {
    fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::AddParticipant(_) => "add_participant",
            Self::RemoveParticipant(_) => "remove_participant",
            Self::Start => "start",
            Self::Advance => "advance",
            Self::Rewind => "rewind",
            Self::Recheck => "recheck",
            Self::Decide(_) => "decide",
            Self::Roll(_) => "roll",
            Self::SetActionFlags { .. } => "set_action_flags",
            Self::End => "end",
        }
    }
}

type Reply = Result<Vec<StoredEvent>, DomainError>;

#[derive(Debug)]
struct Envelope {
    request: SchedulerRequest,
    correlation_id: Uuid,
    reply: oneshot::Sender<Reply>,
}

/// Client side of a running scheduler task.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    encounter_id: Uuid,
    tx: mpsc::Sender<Envelope>,
}

impl SchedulerHandle {
    /// The encounter this scheduler serves.
    #[must_use]
    pub fn encounter_id(&self) -> Uuid {
        self.encounter_id
    }

    /// Queues `request` and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the handler's `DomainError`, or `DomainError::Infrastructure`
    /// if the scheduler task is gone.
    pub async fn submit(&self, correlation_id: Uuid, request: SchedulerRequest) -> Reply {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Envelope {
                request,
                correlation_id,
                reply,
            })
            .await
            .map_err(|_| self.stopped())?;
        response.await.map_err(|_| self.stopped())?
    }

    /// Answers the pending confirmation gate.
    ///
    /// # Errors
    ///
    /// See [`SchedulerHandle::submit`].
    pub async fn decide(&self, decision: Decision) -> Reply {
        self.submit(Uuid::new_v4(), SchedulerRequest::Decide(decision))
            .await
    }

    /// Moves the turn forward.
    ///
    /// # Errors
    ///
    /// See [`SchedulerHandle::submit`].
    pub async fn advance(&self) -> Reply {
        self.submit(Uuid::new_v4(), SchedulerRequest::Advance).await
    }

    fn stopped(&self) -> DomainError {
        DomainError::Infrastructure(format!(
            "scheduler for encounter {} has stopped",
            self.encounter_id
        ))
    }
}

/// The per-encounter task.
pub struct TurnScheduler {
    encounter_id: Uuid,
    services: TrackerServices,
    decisions: mpsc::Sender<DecisionRequest>,
}

impl TurnScheduler {
    /// Spawns the task for `encounter_id` and returns its handle. The task
    /// runs until every handle is dropped.
    #[must_use]
    pub fn spawn(
        encounter_id: Uuid,
        services: TrackerServices,
        decisions: mpsc::Sender<DecisionRequest>,
    ) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_BUFFER);
        let scheduler = Self {
            encounter_id,
            services,
            decisions,
        };
        tokio::spawn(scheduler.run(rx));
        SchedulerHandle { encounter_id, tx }
    }

    #[instrument(skip(self, rx), fields(encounter_id = %self.encounter_id))]
    async fn run(self, mut rx: mpsc::Receiver<Envelope>) {
        info!("scheduler started");
        while let Some(Envelope {
            request,
            correlation_id,
            reply,
        }) = rx.recv().await
        {
            let name = request.name();
            debug!(request = name, %correlation_id, "handling request");
            let result = self.dispatch(request, correlation_id).await;

            match &result {
                Ok(events) => self.publish_decision_request(events).await,
                Err(e) => {
                    warn!(request = name, error = %e, "request failed");
                    if matches!(
                        e,
                        DomainError::PersistenceFailure(_) | DomainError::ConcurrencyConflict { .. }
                    ) {
                        self.reraise_pending_gate().await;
                    }
                }
            }

            if reply.send(result).is_err() {
                debug!(request = name, "requester went away before the reply");
            }
        }
        info!("scheduler stopped");
    }

    async fn dispatch(&self, request: SchedulerRequest, correlation_id: Uuid) -> Reply {
        let encounter_id = self.encounter_id;
        let services = &self.services;
        match request {
            SchedulerRequest::Create {
                attached_to_view,
                default_formula,
            } => {
                let command = CreateEncounter {
                    correlation_id,
                    encounter_id,
                    attached_to_view,
                    default_formula,
                };
                handle_create_encounter(&command, services).await
            }
            SchedulerRequest::AddParticipant(participant_id) => {
                let command = AddParticipant {
                    correlation_id,
                    encounter_id,
                    participant_id,
                };
                handle_add_participant(&command, services).await
            }
            SchedulerRequest::RemoveParticipant(participant_id) => {
                let command = RemoveParticipant {
                    correlation_id,
                    encounter_id,
                    participant_id,
                };
                handle_remove_participant(&command, services).await
            }
            SchedulerRequest::Start => {
                let command = StartEncounter {
                    correlation_id,
                    encounter_id,
                };
                handle_start_encounter(&command, services).await
            }
            SchedulerRequest::Advance => {
                let command = AdvanceTurn {
                    correlation_id,
                    encounter_id,
                };
                handle_advance_turn(&command, services).await
            }
            SchedulerRequest::Rewind => {
                let command = RewindTurn {
                    correlation_id,
                    encounter_id,
                };
                handle_rewind_turn(&command, services).await
            }
            SchedulerRequest::Recheck => {
                let command = RecheckInitiative {
                    correlation_id,
                    encounter_id,
                };
                handle_recheck_initiative(&command, services).await
            }
            SchedulerRequest::Decide(decision) => {
                let command = DeclareAction {
                    correlation_id,
                    encounter_id,
                    decision,
                };
                handle_declare_action(&command, services).await
            }
            SchedulerRequest::Roll(participant_ids) => {
                let command = RollInitiative {
                    correlation_id,
                    encounter_id,
                    participant_ids,
                };
                handle_roll_initiative(&command, services).await
            }
            SchedulerRequest::SetActionFlags {
                participant_id,
                action_ended,
                action_delayed,
            } => {
                let command = SetActionFlags {
                    correlation_id,
                    encounter_id,
                    participant_id,
                    action_ended,
                    action_delayed,
                };
                handle_set_action_flags(&command, services).await
            }
            SchedulerRequest::End => {
                let command = EndEncounter {
                    correlation_id,
                    encounter_id,
                };
                handle_end_encounter(&command, services).await
            }
        }
    }

    /// Publishes the gate opened by a committed batch, if any.
    async fn publish_decision_request(&self, events: &[StoredEvent]) {
        let Some(participant_id) = events
            .iter()
            .rev()
            .filter(|e| e.event_type == CONFIRMATION_REQUESTED_EVENT_TYPE)
            .find_map(|e| {
                match serde_json::from_value::<EncounterEventKind>(e.payload.clone()) {
                    Ok(EncounterEventKind::ConfirmationRequested(payload)) => {
                        Some(payload.participant_id)
                    }
                    _ => None,
                }
            })
        else {
            return;
        };
        self.send_decision_request(participant_id).await;
    }

    /// After a failed write the last persisted gate is still pending; ask
    /// for the decision again.
    async fn reraise_pending_gate(&self) {
        match load_encounter(&self.services, self.encounter_id).await {
            Ok(encounter) => {
                if let TurnState::AwaitingConfirmation(participant_id) = encounter.state() {
                    self.send_decision_request(participant_id).await;
                }
            }
            Err(e) => warn!(error = %e, "could not reload encounter to re-raise gate"),
        }
    }

    async fn send_decision_request(&self, participant_id: Uuid) {
        let request = DecisionRequest {
            encounter_id: self.encounter_id,
            participant_id,
            prompt: PromptKind::TurnEnd,
        };
        if self.decisions.send(request).await.is_err() {
            warn!(%participant_id, "decision channel closed, request dropped");
        }
    }
}

/// Lazily spawns one scheduler per encounter and hands out their handles.
pub struct SchedulerRegistry {
    services: TrackerServices,
    decisions: mpsc::Sender<DecisionRequest>,
    schedulers: RwLock<HashMap<Uuid, SchedulerHandle>>,
}

impl SchedulerRegistry {
    /// Creates an empty registry. Every scheduler it spawns publishes on
    /// `decisions`.
    #[must_use]
    pub fn new(services: TrackerServices, decisions: mpsc::Sender<DecisionRequest>) -> Self {
        Self {
            services,
            decisions,
            schedulers: RwLock::new(HashMap::new()),
        }
    }

    /// Shared services.
    #[must_use]
    pub fn services(&self) -> &TrackerServices {
        &self.services
    }

    /// Returns the handle for `encounter_id`, spawning its task if needed.
    pub async fn handle_for(&self, encounter_id: Uuid) -> SchedulerHandle {
        {
            let schedulers = self.schedulers.read().await;
            if let Some(handle) = schedulers.get(&encounter_id) {
                return handle.clone();
            }
        }

        let mut schedulers = self.schedulers.write().await;
        // Double-check after acquiring the write lock.
        if let Some(handle) = schedulers.get(&encounter_id) {
            return handle.clone();
        }

        debug!(%encounter_id, "spawning scheduler task");
        let handle = TurnScheduler::spawn(
            encounter_id,
            self.services.clone(),
            self.decisions.clone(),
        );
        schedulers.insert(encounter_id, handle.clone());
        handle
    }

    /// Drops the registry's handle; the task stops once no other handle
    /// remains. Returns whether a scheduler was registered.
    pub async fn remove(&self, encounter_id: Uuid) -> bool {
        self.schedulers.write().await.remove(&encounter_id).is_some()
    }

    /// Number of live schedulers.
    pub async fn len(&self) -> usize {
        self.schedulers.read().await.len()
    }

    /// Whether no scheduler has been spawned.
    pub async fn is_empty(&self) -> bool {
        self.schedulers.read().await.is_empty()
    }
}

impl std::fmt::Debug for SchedulerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use initiative_core::clock::Clock;
    use initiative_core::repository::EventRepository;
    use initiative_core::roll::DiceRollEvaluator;
    use initiative_test_support::{
        FixedClock, InMemoryIdentityStore, ReadOnlyEventRepository, RecordingAnnouncer,
        RecordingEventRepository, SequenceRng,
    };

    use super::*;

    fn services(
        repository: Arc<dyn EventRepository>,
        identities: Arc<InMemoryIdentityStore>,
        rolls: Vec<u32>,
    ) -> TrackerServices {
        TrackerServices {
            clock: Arc::new(FixedClock::default()) as Arc<dyn Clock>,
            rng: Arc::new(Mutex::new(SequenceRng::cycle(rolls))),
            roller: Arc::new(DiceRollEvaluator),
            repository,
            identities,
            announcer: Arc::new(RecordingAnnouncer::new()),
        }
    }

    async fn created(
        handle: &SchedulerHandle,
        identities: &InMemoryIdentityStore,
        names: &[&str],
    ) -> Vec<Uuid> {
        handle
            .submit(
                Uuid::new_v4(),
                SchedulerRequest::Create {
                    attached_to_view: false,
                    default_formula: None,
                },
            )
            .await
            .unwrap();
        let mut ids = Vec::new();
        for name in names {
            let record = identities.insert(name, false);
            handle
                .submit(Uuid::new_v4(), SchedulerRequest::AddParticipant(record.id))
                .await
                .unwrap();
            ids.push(record.id);
        }
        ids
    }

    #[tokio::test]
    async fn test_gate_is_published_and_answered_through_the_handle() {
        // Arrange
        let identities = Arc::new(InMemoryIdentityStore::new());
        let repo = Arc::new(RecordingEventRepository::default());
        let (decisions, mut requests) = mpsc::channel(8);
        let encounter_id = Uuid::new_v4();
        let handle = TurnScheduler::spawn(
            encounter_id,
            services(repo, identities.clone(), vec![9, 4]),
            decisions,
        );
        let ids = created(&handle, &identities, &["Ayla", "Bram"]).await;
        handle
            .submit(Uuid::new_v4(), SchedulerRequest::Start)
            .await
            .unwrap();

        // Act
        handle.advance().await.unwrap();

        // Assert
        let request = requests.recv().await.unwrap();
        assert_eq!(request, DecisionRequest {
            encounter_id,
            participant_id: ids[0],
            prompt: PromptKind::TurnEnd,
        });

        handle.decide(Decision::EndAction).await.unwrap();
        let next = requests.recv().await.unwrap();
        assert_eq!(next.participant_id, ids[1]);
    }

    #[tokio::test]
    async fn test_concurrent_advances_are_serialized() {
        let identities = Arc::new(InMemoryIdentityStore::new());
        let repo = Arc::new(RecordingEventRepository::default());
        let (decisions, _requests) = mpsc::channel(8);
        let handle = TurnScheduler::spawn(
            Uuid::new_v4(),
            services(repo.clone(), identities.clone(), vec![5]),
            decisions,
        );
        created(&handle, &identities, &["Ayla"]).await;
        handle
            .submit(Uuid::new_v4(), SchedulerRequest::Start)
            .await
            .unwrap();

        let (first, second) = tokio::join!(handle.advance(), handle.advance());

        // One lands on the gate, the other meets it.
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|r| matches!(r, Err(DomainError::InvalidTransition(_))))
        );
        let sequences: Vec<i64> = repo.stream().iter().map(|e| e.sequence_number).collect();
        let expected: Vec<i64> = (1..=i64::try_from(sequences.len()).unwrap()).collect();
        assert_eq!(sequences, expected);
    }

    #[tokio::test]
    async fn test_failed_write_re_raises_the_pending_gate() {
        // Arrange
        let identities = Arc::new(InMemoryIdentityStore::new());
        let repo = Arc::new(RecordingEventRepository::default());
        let (decisions, mut requests) = mpsc::channel(8);
        let encounter_id = Uuid::new_v4();
        let writer = TurnScheduler::spawn(
            encounter_id,
            services(repo.clone(), identities.clone(), vec![3]),
            decisions.clone(),
        );
        let ids = created(&writer, &identities, &["Ayla"]).await;
        writer
            .submit(Uuid::new_v4(), SchedulerRequest::Start)
            .await
            .unwrap();
        writer.advance().await.unwrap();
        assert_eq!(requests.recv().await.unwrap().participant_id, ids[0]);

        let read_only = TurnScheduler::spawn(
            encounter_id,
            services(
                Arc::new(ReadOnlyEventRepository::new(repo.stream())),
                identities,
                vec![3],
            ),
            decisions,
        );

        // Act
        let result = read_only.decide(Decision::DelayAction).await;

        // Assert
        assert!(matches!(result, Err(DomainError::PersistenceFailure(_))));
        assert_eq!(requests.recv().await.unwrap().participant_id, ids[0]);
    }

    #[tokio::test]
    async fn test_stopped_scheduler_reports_infrastructure_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = SchedulerHandle {
            encounter_id: Uuid::new_v4(),
            tx,
        };

        let result = handle.advance().await;

        match result.unwrap_err() {
            DomainError::Infrastructure(msg) => assert!(msg.contains("stopped")),
            other => panic!("expected Infrastructure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_registry_reuses_one_scheduler_per_encounter() {
        let (decisions, _requests) = mpsc::channel(8);
        let registry = SchedulerRegistry::new(
            services(
                Arc::new(RecordingEventRepository::default()),
                Arc::new(InMemoryIdentityStore::new()),
                vec![1],
            ),
            decisions,
        );
        let encounter_id = Uuid::new_v4();

        let first = registry.handle_for(encounter_id).await;
        let second = registry.handle_for(encounter_id).await;
        registry.handle_for(Uuid::new_v4()).await;

        assert_eq!(first.encounter_id(), second.encounter_id());
        assert_eq!(registry.len().await, 2);
        assert!(registry.remove(encounter_id).await);
        assert!(!registry.remove(encounter_id).await);
        assert_eq!(registry.len().await, 1);
    }
}
