//! Command handlers for the Initiative Tracker context.
//!
//! Every handler follows the same shape: load the encounter, refresh
//! participant status from the identity store, run one domain transition,
//! append the resulting batch and, only once the append succeeded, publish
//! announcements. A failed append discards the in-memory copy, so the last
//! persisted state (including a pending confirmation) stays in effect.

use initiative_core::aggregate::AggregateRoot;
use initiative_core::command::Command;
use initiative_core::error::DomainError;
use initiative_core::event::{DomainEvent, EventMetadata};
use initiative_core::repository::StoredEvent;
use initiative_core::rng::DeterministicRng;
use tracing::{debug, warn};
use uuid::Uuid;

use super::services::TrackerServices;
use crate::domain::aggregates::{Encounter, EncounterStatus};
use crate::domain::commands::{
    AddParticipant, AdvanceTurn, CreateEncounter, DeclareAction, EndEncounter, RecheckInitiative,
    RemoveParticipant, RewindTurn, RollInitiative, SetActionFlags, StartEncounter,
};
use crate::domain::events::{EncounterEvent, EncounterEventKind};
use crate::domain::lifecycle;
use crate::domain::sentinel::{SentinelKind, SentinelRefs};

fn trace_command(command: &impl Command) {
    debug!(
        command = command.command_type(),
        correlation_id = %command.correlation_id(),
        encounter_id = %command.encounter_id(),
        "handling command"
    );
}

/// Reconstitutes an `Encounter` from stored events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if event deserialization fails.
pub(crate) fn reconstitute(
    encounter_id: Uuid,
    existing_events: &[StoredEvent],
) -> Result<Encounter, DomainError> {
    let mut encounter = Encounter::new(encounter_id);
    for stored in existing_events {
        let kind: EncounterEventKind =
            serde_json::from_value(stored.payload.clone()).map_err(|e| {
                DomainError::Infrastructure(format!("event deserialization failed: {e}"))
            })?;
        let event = EncounterEvent {
            metadata: EventMetadata::from_stored(stored),
            kind,
        };
        encounter.apply(&event);
    }
    Ok(encounter)
}

/// Loads an existing encounter.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the stream is empty.
pub async fn load_encounter(
    services: &TrackerServices,
    encounter_id: Uuid,
) -> Result<Encounter, DomainError> {
    let existing_events = services.repository.load_events(encounter_id).await?;
    if existing_events.is_empty() {
        return Err(DomainError::AggregateNotFound(encounter_id));
    }
    reconstitute(encounter_id, &existing_events)
}

/// Runs a synchronous domain call with the shared RNG locked.
fn with_rng<T>(
    services: &TrackerServices,
    f: impl FnOnce(&mut dyn DeterministicRng) -> Result<T, DomainError>,
) -> Result<T, DomainError> {
    // Lock RNG only for the synchronous domain method, never across an await.
    let mut rng_guard = services
        .rng
        .lock()
        .map_err(|e| DomainError::Infrastructure(format!("RNG mutex poisoned: {e}")))?;
    f(&mut *rng_guard)
}

/// Appends the uncommitted batch, then announces it.
async fn commit(
    services: &TrackerServices,
    encounter: &mut Encounter,
) -> Result<Vec<StoredEvent>, DomainError> {
    let stored_events: Vec<StoredEvent> = encounter
        .uncommitted_events()
        .iter()
        .map(DomainEvent::to_stored)
        .collect();
    if stored_events.is_empty() {
        return Ok(stored_events);
    }

    services
        .repository
        .append_events(encounter.id, encounter.version(), &stored_events)
        .await
        .map_err(|e| match e {
            DomainError::Infrastructure(msg) => DomainError::PersistenceFailure(msg),
            other => other,
        })?;

    let announcements = lifecycle::announcements(encounter, encounter.uncommitted_events());
    encounter.mark_committed();
    for announcement in &announcements {
        services.announcer.announce(announcement).await;
    }

    Ok(stored_events)
}

/// Pulls the current status of every normal participant from the identity
/// store. Identities that disappeared keep their last known status.
async fn refresh_status(
    services: &TrackerServices,
    encounter: &mut Encounter,
    correlation_id: Uuid,
) -> Result<(), DomainError> {
    if !matches!(
        encounter.status(),
        EncounterStatus::Created | EncounterStatus::Running
    ) {
        return Ok(());
    }

    let mut records = Vec::new();
    for id in encounter.normal_participant_ids() {
        match services.identities.get_participant(id).await {
            Ok(record) => records.push(record),
            Err(DomainError::ParticipantNotFound(_)) => {
                warn!(participant_id = %id, "identity missing, keeping last known status");
            }
            Err(e) => return Err(e),
        }
    }

    let changed = encounter.sync_status(&records, correlation_id, services.clock.as_ref());
    if changed > 0 {
        debug!(changed, "participant status refreshed");
    }
    Ok(())
}

async fn create_sentinel_identity(
    services: &TrackerServices,
    kind: SentinelKind,
) -> Result<Uuid, DomainError> {
    services
        .identities
        .create_participant(kind.descriptor())
        .await
        .map_err(|e| DomainError::CreationFailed(format!("{} identity: {e}", kind.label())))
}

/// Best-effort cleanup of identities created for a batch that never landed.
async fn release_identities(services: &TrackerServices, ids: &[Uuid]) {
    for &id in ids {
        if let Err(e) = services.identities.destroy_participant(id).await {
            warn!(participant_id = %id, error = %e, "failed to release identity");
        }
    }
}

/// Guarantees both sentinel participants exist on `encounter`.
///
/// Already registered sentinels are returned as they are. Otherwise both
/// identities are created and their registration is recorded on the
/// encounter; the caller persists it and releases the identities if that
/// fails.
///
/// # Errors
///
/// Returns `DomainError::CreationFailed` if an identity cannot be created.
/// An identity created before the failure is destroyed again.
pub async fn ensure_sentinels(
    services: &TrackerServices,
    encounter: &mut Encounter,
    correlation_id: Uuid,
) -> Result<SentinelRefs, DomainError> {
    if let Some(existing) = encounter.sentinels() {
        return Ok(existing);
    }

    let setup = create_sentinel_identity(services, SentinelKind::Setup).await?;
    let cleanup = match create_sentinel_identity(services, SentinelKind::Cleanup).await {
        Ok(id) => id,
        Err(e) => {
            release_identities(services, &[setup]).await;
            return Err(e);
        }
    };

    if let Err(e) =
        encounter.register_sentinels(setup, cleanup, correlation_id, services.clock.as_ref())
    {
        release_identities(services, &[setup, cleanup]).await;
        return Err(e);
    }
    debug!(%setup, %cleanup, "sentinels registered");
    Ok(SentinelRefs { setup, cleanup })
}

/// Commits a batch that may carry a fresh sentinel registration, releasing
/// those identities if the append fails.
async fn commit_with_sentinels(
    services: &TrackerServices,
    encounter: &mut Encounter,
    fresh: Option<SentinelRefs>,
) -> Result<Vec<StoredEvent>, DomainError> {
    match commit(services, encounter).await {
        Ok(stored_events) => Ok(stored_events),
        Err(e) => {
            if let Some(refs) = fresh {
                release_identities(services, &[refs.setup, refs.cleanup]).await;
            }
            Err(e)
        }
    }
}

/// Handles the `CreateEncounter` command: creates the encounter together
/// with its sentinels and persists both in one batch.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the encounter already exists,
/// `DomainError::CreationFailed` if a sentinel identity cannot be created,
/// or a persistence error.
pub async fn handle_create_encounter(
    command: &CreateEncounter,
    services: &TrackerServices,
) -> Result<Vec<StoredEvent>, DomainError> {
    trace_command(command);
    let existing_events = services.repository.load_events(command.encounter_id).await?;
    if !existing_events.is_empty() {
        return Err(DomainError::Validation(format!(
            "encounter {} already exists",
            command.encounter_id
        )));
    }

    let mut encounter = Encounter::new(command.encounter_id);
    encounter.create(
        command.attached_to_view,
        command.default_formula.clone(),
        command.correlation_id,
        services.clock.as_ref(),
    )?;
    let sentinels = ensure_sentinels(services, &mut encounter, command.correlation_id).await?;

    commit_with_sentinels(services, &mut encounter, Some(sentinels)).await
}

/// Handles the `AddParticipant` command: reads the identity and registers it.
///
/// # Errors
///
/// Returns `DomainError::ParticipantNotFound` if the identity does not exist,
/// `DomainError::Validation` for a duplicate, or a persistence error.
pub async fn handle_add_participant(
    command: &AddParticipant,
    services: &TrackerServices,
) -> Result<Vec<StoredEvent>, DomainError> {
    trace_command(command);
    let mut encounter = load_encounter(services, command.encounter_id).await?;
    let record = services
        .identities
        .get_participant(command.participant_id)
        .await?;

    encounter.add_participant(&record, command.correlation_id, services.clock.as_ref())?;

    commit(services, &mut encounter).await
}

/// Handles the `RemoveParticipant` command.
///
/// # Errors
///
/// Returns `DomainError::ParticipantNotFound` for an unknown participant,
/// `DomainError::Validation` for a sentinel, or a persistence error.
pub async fn handle_remove_participant(
    command: &RemoveParticipant,
    services: &TrackerServices,
) -> Result<Vec<StoredEvent>, DomainError> {
    trace_command(command);
    let mut encounter = load_encounter(services, command.encounter_id).await?;

    encounter.remove_participant(
        command.participant_id,
        command.correlation_id,
        services.clock.as_ref(),
    )?;

    commit(services, &mut encounter).await
}

/// Handles the `StartEncounter` command: makes sure sentinels exist, rolls
/// everyone and lands on setup.
///
/// # Errors
///
/// Returns `DomainError::InvalidTransition` if the encounter already started,
/// `DomainError::CreationFailed` if sentinels cannot be created, or a
/// persistence error.
pub async fn handle_start_encounter(
    command: &StartEncounter,
    services: &TrackerServices,
) -> Result<Vec<StoredEvent>, DomainError> {
    trace_command(command);
    let mut encounter = load_encounter(services, command.encounter_id).await?;
    refresh_status(services, &mut encounter, command.correlation_id).await?;

    let fresh = if encounter.sentinels().is_none() && encounter.status() == EncounterStatus::Created
    {
        Some(ensure_sentinels(services, &mut encounter, command.correlation_id).await?)
    } else {
        None
    };

    let started = with_rng(services, |rng| {
        encounter.start(
            command.correlation_id,
            services.clock.as_ref(),
            services.roller.as_ref(),
            rng,
        )
    });
    if let Err(e) = started {
        if let Some(refs) = fresh {
            release_identities(services, &[refs.setup, refs.cleanup]).await;
        }
        return Err(e);
    }

    commit_with_sentinels(services, &mut encounter, fresh).await
}

/// Handles the `AdvanceTurn` command.
///
/// # Errors
///
/// Returns `DomainError::InvalidTransition` if the turn cannot move, or a
/// persistence error.
pub async fn handle_advance_turn(
    command: &AdvanceTurn,
    services: &TrackerServices,
) -> Result<Vec<StoredEvent>, DomainError> {
    trace_command(command);
    let mut encounter = load_encounter(services, command.encounter_id).await?;
    refresh_status(services, &mut encounter, command.correlation_id).await?;

    with_rng(services, |rng| {
        encounter.advance(
            command.correlation_id,
            services.clock.as_ref(),
            services.roller.as_ref(),
            rng,
        )
    })?;

    commit(services, &mut encounter).await
}

/// Handles the `RewindTurn` command.
///
/// # Errors
///
/// Returns `DomainError::InvalidTransition` if the turn cannot step back, or
/// a persistence error.
pub async fn handle_rewind_turn(
    command: &RewindTurn,
    services: &TrackerServices,
) -> Result<Vec<StoredEvent>, DomainError> {
    trace_command(command);
    let mut encounter = load_encounter(services, command.encounter_id).await?;
    refresh_status(services, &mut encounter, command.correlation_id).await?;

    with_rng(services, |rng| {
        encounter.rewind(
            command.correlation_id,
            services.clock.as_ref(),
            services.roller.as_ref(),
            rng,
        )
    })?;

    commit(services, &mut encounter).await
}

/// Handles the `DeclareAction` command, answering a pending confirmation.
///
/// # Errors
///
/// Returns `DomainError::InvalidTransition` if no decision is pending, or a
/// persistence error.
pub async fn handle_declare_action(
    command: &DeclareAction,
    services: &TrackerServices,
) -> Result<Vec<StoredEvent>, DomainError> {
    trace_command(command);
    let mut encounter = load_encounter(services, command.encounter_id).await?;
    refresh_status(services, &mut encounter, command.correlation_id).await?;

    with_rng(services, |rng| {
        encounter.decide(
            command.decision,
            command.correlation_id,
            services.clock.as_ref(),
            services.roller.as_ref(),
            rng,
        )
    })?;

    commit(services, &mut encounter).await
}

/// Handles the `RecheckInitiative` command.
///
/// # Errors
///
/// Returns `DomainError::InvalidTransition` if nobody holds the turn or the
/// turn is at setup, or a persistence error.
pub async fn handle_recheck_initiative(
    command: &RecheckInitiative,
    services: &TrackerServices,
) -> Result<Vec<StoredEvent>, DomainError> {
    trace_command(command);
    let mut encounter = load_encounter(services, command.encounter_id).await?;
    refresh_status(services, &mut encounter, command.correlation_id).await?;

    with_rng(services, |rng| {
        encounter.recheck(
            command.correlation_id,
            services.clock.as_ref(),
            services.roller.as_ref(),
            rng,
        )
    })?;

    commit(services, &mut encounter).await
}

/// Handles the `RollInitiative` command.
///
/// # Errors
///
/// Returns `DomainError::ParticipantNotFound` for an unknown id,
/// `DomainError::Validation` for a bad formula, or a persistence error.
pub async fn handle_roll_initiative(
    command: &RollInitiative,
    services: &TrackerServices,
) -> Result<Vec<StoredEvent>, DomainError> {
    trace_command(command);
    let mut encounter = load_encounter(services, command.encounter_id).await?;
    refresh_status(services, &mut encounter, command.correlation_id).await?;

    with_rng(services, |rng| {
        encounter.roll_initiative(
            &command.participant_ids,
            command.correlation_id,
            services.clock.as_ref(),
            services.roller.as_ref(),
            rng,
        )
    })?;

    commit(services, &mut encounter).await
}

/// Handles the `SetActionFlags` command.
///
/// # Errors
///
/// Returns `DomainError::ParticipantNotFound` for an unknown participant,
/// `DomainError::Validation` for a sentinel, or a persistence error.
pub async fn handle_set_action_flags(
    command: &SetActionFlags,
    services: &TrackerServices,
) -> Result<Vec<StoredEvent>, DomainError> {
    trace_command(command);
    let mut encounter = load_encounter(services, command.encounter_id).await?;

    encounter.set_action_flags(
        command.participant_id,
        command.action_ended,
        command.action_delayed,
        command.correlation_id,
        services.clock.as_ref(),
    )?;

    commit(services, &mut encounter).await
}

/// Handles the `EndEncounter` command: ends the encounter, then destroys the
/// sentinel identities.
///
/// # Errors
///
/// Returns `DomainError::InvalidTransition` if the encounter already ended,
/// a persistence error, or an identity store error raised while destroying
/// the sentinels (the end itself is already persisted at that point).
pub async fn handle_end_encounter(
    command: &EndEncounter,
    services: &TrackerServices,
) -> Result<Vec<StoredEvent>, DomainError> {
    trace_command(command);
    let mut encounter = load_encounter(services, command.encounter_id).await?;

    encounter.end(command.correlation_id, services.clock.as_ref())?;
    let stored_events = commit(services, &mut encounter).await?;

    if let Some(refs) = encounter.sentinels() {
        for id in [refs.setup, refs.cleanup] {
            match services.identities.destroy_participant(id).await {
                Ok(()) => {}
                Err(DomainError::ParticipantNotFound(_)) => {
                    debug!(participant_id = %id, "sentinel identity already gone");
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(stored_events)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use initiative_core::announce::{Announcement, TurnProcess};
    use initiative_core::clock::Clock;
    use initiative_core::identity::IdentityStore;
    use initiative_core::repository::EventRepository;
    use initiative_core::roll::DiceRollEvaluator;
    use initiative_test_support::{
        FailingEventRepository, FailingIdentityStore, FixedClock, InMemoryIdentityStore,
        ReadOnlyEventRepository, RecordingAnnouncer, RecordingEventRepository, SequenceRng,
    };

    use super::*;
    use crate::domain::aggregates::TurnState;
    use crate::domain::events::{Decision, ENCOUNTER_CREATED_EVENT_TYPE};

    struct Harness {
        services: TrackerServices,
        repo: Arc<RecordingEventRepository>,
        identities: Arc<InMemoryIdentityStore>,
        announcer: Arc<RecordingAnnouncer>,
        encounter_id: Uuid,
    }

    fn services_with(
        repository: Arc<dyn EventRepository>,
        identities: Arc<dyn IdentityStore>,
        announcer: Arc<RecordingAnnouncer>,
        rolls: Vec<u32>,
    ) -> TrackerServices {
        TrackerServices {
            clock: Arc::new(FixedClock::default()) as Arc<dyn Clock>,
            rng: Arc::new(Mutex::new(SequenceRng::cycle(rolls))),
            roller: Arc::new(DiceRollEvaluator),
            repository,
            identities,
            announcer,
        }
    }

    /// Harness whose RNG cycles through `rolls`.
    fn harness(rolls: Vec<u32>) -> Harness {
        let repo = Arc::new(RecordingEventRepository::default());
        let identities = Arc::new(InMemoryIdentityStore::new());
        let announcer = Arc::new(RecordingAnnouncer::new());
        let services = services_with(repo.clone(), identities.clone(), announcer.clone(), rolls);
        Harness {
            services,
            repo,
            identities,
            announcer,
            encounter_id: Uuid::new_v4(),
        }
    }

    async fn create(h: &Harness) {
        handle_create_encounter(
            &CreateEncounter {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
                attached_to_view: true,
                default_formula: None,
            },
            &h.services,
        )
        .await
        .unwrap();
    }

    async fn add(h: &Harness, name: &str) -> Uuid {
        let record = h.identities.insert(name, false);
        handle_add_participant(
            &AddParticipant {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
                participant_id: record.id,
            },
            &h.services,
        )
        .await
        .unwrap();
        record.id
    }

    async fn start(h: &Harness) {
        handle_start_encounter(
            &StartEncounter {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
            },
            &h.services,
        )
        .await
        .unwrap();
    }

    async fn advance(h: &Harness) -> Result<Vec<StoredEvent>, DomainError> {
        handle_advance_turn(
            &AdvanceTurn {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
            },
            &h.services,
        )
        .await
    }

    async fn state(h: &Harness) -> Encounter {
        load_encounter(&h.services, h.encounter_id).await.unwrap()
    }

    // --- create ---

    #[tokio::test]
    async fn test_create_persists_encounter_and_sentinels_in_one_batch() {
        // Arrange
        let h = harness(vec![5]);

        // Act
        create(&h).await;

        // Assert
        let appended = h.repo.appended_events();
        assert_eq!(appended.len(), 1);
        let (agg_id, expected_version, events) = &appended[0];
        assert_eq!(*agg_id, h.encounter_id);
        assert_eq!(*expected_version, 0);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, ENCOUNTER_CREATED_EVENT_TYPE);
        assert_eq!(events[0].occurred_at, FixedClock::default().0);

        let created = h.identities.created();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].name, "[ Setup ]");
        assert_eq!(created[1].name, "[ Cleanup ]");
        assert!(created.iter().all(|d| d.hidden));

        let encounter = state(&h).await;
        assert!(encounter.attached_to_view());
        assert_eq!(encounter.turn_order().len(), 2);
    }

    #[tokio::test]
    async fn test_create_twice_is_rejected() {
        let h = harness(vec![5]);
        create(&h).await;

        let result = handle_create_encounter(
            &CreateEncounter {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
                attached_to_view: false,
                default_formula: None,
            },
            &h.services,
        )
        .await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(h.identities.created().len(), 2);
    }

    #[tokio::test]
    async fn test_second_sentinel_failure_releases_the_first() {
        // Arrange
        let repo = Arc::new(RecordingEventRepository::default());
        let identities = Arc::new(FailingIdentityStore::after(1));
        let announcer = Arc::new(RecordingAnnouncer::new());
        let services = services_with(repo.clone(), identities.clone(), announcer, vec![1]);
        let command = CreateEncounter {
            correlation_id: Uuid::new_v4(),
            encounter_id: Uuid::new_v4(),
            attached_to_view: false,
            default_formula: None,
        };

        // Act
        let result = handle_create_encounter(&command, &services).await;

        // Assert
        match result.unwrap_err() {
            DomainError::CreationFailed(msg) => assert!(msg.contains("[ Cleanup ]")),
            other => panic!("expected CreationFailed, got {other:?}"),
        }
        assert_eq!(identities.destroyed().len(), 1);
        assert!(repo.appended_events().is_empty());
    }

    #[tokio::test]
    async fn test_create_failing_to_persist_releases_both_sentinels() {
        let identities = Arc::new(InMemoryIdentityStore::new());
        let services = services_with(
            Arc::new(ReadOnlyEventRepository::new(Vec::new())),
            identities.clone(),
            Arc::new(RecordingAnnouncer::new()),
            vec![1],
        );

        let result = handle_create_encounter(
            &CreateEncounter {
                correlation_id: Uuid::new_v4(),
                encounter_id: Uuid::new_v4(),
                attached_to_view: false,
                default_formula: None,
            },
            &services,
        )
        .await;

        assert!(matches!(result, Err(DomainError::PersistenceFailure(_))));
        assert_eq!(identities.destroyed().len(), 2);
    }

    // --- turn flow ---

    #[tokio::test]
    async fn test_start_announces_combat_round_and_setup() {
        let h = harness(vec![7, 3]);
        create(&h).await;
        add(&h, "Ayla").await;
        add(&h, "Bram").await;

        start(&h).await;

        assert_eq!(
            h.announcer.kinds(),
            vec!["combat-start", "round-start", "initiative-resolved"]
        );
        match &h.announcer.announcements()[2] {
            Announcement::InitiativeResolved {
                process,
                participant_name,
                ..
            } => {
                assert_eq!(*process, TurnProcess::Setup);
                assert_eq!(participant_name.as_deref(), Some("[ Setup ]"));
            }
            other => panic!("expected InitiativeResolved, got {other:?}"),
        }
        let encounter = state(&h).await;
        assert_eq!(encounter.round(), 1);
        assert_eq!(
            encounter.state(),
            TurnState::Active(encounter.sentinels().unwrap().setup)
        );
    }

    #[tokio::test]
    async fn test_full_round_wraps_to_round_two_without_combat_start() {
        let h = harness(vec![7]);
        create(&h).await;
        let ayla = add(&h, "Ayla").await;
        start(&h).await;

        advance(&h).await.unwrap();
        assert_eq!(state(&h).await.state(), TurnState::AwaitingConfirmation(ayla));
        handle_declare_action(
            &DeclareAction {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
                decision: Decision::EndAction,
            },
            &h.services,
        )
        .await
        .unwrap();
        // Ayla ended: the pool is empty and the turn falls through to cleanup.
        let cleanup = state(&h).await.sentinels().unwrap().cleanup;
        assert_eq!(state(&h).await.state(), TurnState::Active(cleanup));

        h.announcer.clear();
        advance(&h).await.unwrap();

        let encounter = state(&h).await;
        assert_eq!(encounter.round(), 2);
        assert!(!encounter.participant(ayla).unwrap().flags.action_ended);
        assert_eq!(h.announcer.kinds(), vec!["round-start", "initiative-resolved"]);
    }

    #[tokio::test]
    async fn test_status_refresh_skips_defeated_participant() {
        let h = harness(vec![9, 4]);
        create(&h).await;
        let ayla = add(&h, "Ayla").await;
        let bram = add(&h, "Bram").await;
        start(&h).await;
        h.identities.update(ayla, |r| r.defeated = true);

        advance(&h).await.unwrap();

        // Ayla leads on rank but is no longer eligible; the sentinel hands
        // over sequentially to her, without a gate, and the next advance
        // passes her by.
        let encounter = state(&h).await;
        assert_eq!(encounter.state(), TurnState::Active(ayla));
        advance(&h).await.unwrap();
        assert_eq!(state(&h).await.state(), TurnState::AwaitingConfirmation(bram));
    }

    #[tokio::test]
    async fn test_advance_on_unknown_encounter_is_not_found() {
        let h = harness(vec![1]);

        let result = advance(&h).await;

        match result.unwrap_err() {
            DomainError::AggregateNotFound(id) => assert_eq!(id, h.encounter_id),
            other => panic!("expected AggregateNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_append_keeps_the_pending_gate() {
        // Arrange
        let h = harness(vec![6]);
        create(&h).await;
        let ayla = add(&h, "Ayla").await;
        start(&h).await;
        advance(&h).await.unwrap();
        let announcer = Arc::new(RecordingAnnouncer::new());
        let read_only = services_with(
            Arc::new(ReadOnlyEventRepository::new(h.repo.stream())),
            h.identities.clone(),
            announcer.clone(),
            vec![6],
        );

        // Act
        let result = handle_declare_action(
            &DeclareAction {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
                decision: Decision::EndAction,
            },
            &read_only,
        )
        .await;

        // Assert
        assert!(matches!(result, Err(DomainError::PersistenceFailure(_))));
        assert!(announcer.announcements().is_empty());
        let encounter = load_encounter(&read_only, h.encounter_id).await.unwrap();
        assert_eq!(encounter.state(), TurnState::AwaitingConfirmation(ayla));
        assert!(!encounter.participant(ayla).unwrap().flags.action_ended);
    }

    #[tokio::test]
    async fn test_infrastructure_errors_propagate_from_load() {
        let services = services_with(
            Arc::new(FailingEventRepository),
            Arc::new(InMemoryIdentityStore::new()),
            Arc::new(RecordingAnnouncer::new()),
            vec![1],
        );

        let result = handle_rewind_turn(
            &RewindTurn {
                correlation_id: Uuid::new_v4(),
                encounter_id: Uuid::new_v4(),
            },
            &services,
        )
        .await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }

    #[tokio::test]
    async fn test_add_unknown_identity_is_not_found() {
        let h = harness(vec![1]);
        create(&h).await;
        let stranger = Uuid::new_v4();

        let result = handle_add_participant(
            &AddParticipant {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
                participant_id: stranger,
            },
            &h.services,
        )
        .await;

        match result.unwrap_err() {
            DomainError::ParticipantNotFound(id) => assert_eq!(id, stranger),
            other => panic!("expected ParticipantNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_set_flags_then_roll_keeps_turn_holder() {
        let h = harness(vec![8, 2]);
        create(&h).await;
        let ayla = add(&h, "Ayla").await;
        let bram = add(&h, "Bram").await;
        start(&h).await;
        advance(&h).await.unwrap();

        handle_set_action_flags(
            &SetActionFlags {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
                participant_id: bram,
                action_ended: false,
                action_delayed: true,
            },
            &h.services,
        )
        .await
        .unwrap();
        handle_roll_initiative(
            &RollInitiative {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
                participant_ids: vec![ayla],
            },
            &h.services,
        )
        .await
        .unwrap();

        let encounter = state(&h).await;
        assert_eq!(encounter.state(), TurnState::AwaitingConfirmation(ayla));
        assert!(encounter.participant(bram).unwrap().flags.action_delayed);
    }

    #[tokio::test]
    async fn test_recheck_and_remove_round_trip_through_the_store() {
        let h = harness(vec![5]);
        create(&h).await;
        let ayla = add(&h, "Ayla").await;
        let bram = add(&h, "Bram").await;
        start(&h).await;
        advance(&h).await.unwrap();

        handle_recheck_initiative(
            &RecheckInitiative {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
            },
            &h.services,
        )
        .await
        .unwrap();
        // All ranks tie at 5: the recheck prefers Bram over the current Ayla.
        assert_eq!(state(&h).await.state(), TurnState::AwaitingConfirmation(bram));

        handle_remove_participant(
            &RemoveParticipant {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
                participant_id: bram,
            },
            &h.services,
        )
        .await
        .unwrap();

        let encounter = state(&h).await;
        assert!(encounter.participant(bram).is_none());
        assert!(encounter.participant(ayla).is_some());
        assert!(encounter.state().participant().is_some());
    }

    // --- end ---

    #[tokio::test]
    async fn test_end_announces_and_destroys_sentinels() {
        let h = harness(vec![5]);
        create(&h).await;
        add(&h, "Ayla").await;
        start(&h).await;
        let sentinels = state(&h).await.sentinels().unwrap();
        h.announcer.clear();

        handle_end_encounter(
            &EndEncounter {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
            },
            &h.services,
        )
        .await
        .unwrap();

        assert_eq!(h.announcer.kinds(), vec!["combat-end"]);
        assert_eq!(h.identities.destroyed(), vec![sentinels.setup, sentinels.cleanup]);
        assert_eq!(state(&h).await.status(), EncounterStatus::Ended);

        let again = handle_end_encounter(
            &EndEncounter {
                correlation_id: Uuid::new_v4(),
                encounter_id: h.encounter_id,
            },
            &h.services,
        )
        .await;
        assert!(matches!(again, Err(DomainError::InvalidTransition(_))));
    }
}
