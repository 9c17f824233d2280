//! Routes for encounters and their turn order.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use initiative_core::error::DomainError;
use initiative_core::repository::StoredEvent;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use initiative_tracker::application::query_handlers::{self, EncounterView};
use initiative_tracker::application::scheduler::SchedulerRequest;
use initiative_tracker::domain::events::Decision;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateEncounterRequest {
    /// Whether a view displays the encounter.
    #[serde(default)]
    pub attached_to_view: bool,
    /// Formula for participants without their own.
    pub default_formula: Option<String>,
}

/// Response body for POST /.
#[derive(Debug, Serialize)]
pub struct CreateEncounterResponse {
    /// The new encounter.
    pub encounter_id: Uuid,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

/// Request body for POST /{id}/participants.
#[derive(Debug, Deserialize)]
pub struct AddParticipantRequest {
    /// Identity to add.
    pub participant_id: Uuid,
}

/// Request body for POST /{id}/decide.
#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    /// Answer to the pending gate.
    pub decision: Decision,
}

/// Request body for POST /{id}/roll.
#[derive(Debug, Deserialize)]
pub struct RollRequest {
    /// Participants to re-roll.
    pub participant_ids: Vec<Uuid>,
}

/// Request body for PUT /{id}/participants/{participant_id}/flags.
#[derive(Debug, Deserialize)]
pub struct SetActionFlagsRequest {
    /// New `action_ended` value.
    pub action_ended: bool,
    /// New `action_delayed` value.
    pub action_delayed: bool,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

fn event_ids(stored_events: &[StoredEvent]) -> Vec<Uuid> {
    stored_events.iter().map(|e| e.event_id).collect()
}

/// Queues `request` on the encounter's scheduler and waits for the outcome.
///
/// Requests for unknown encounters do not keep a scheduler alive.
async fn submit(
    state: &AppState,
    encounter_id: Uuid,
    request: SchedulerRequest,
    name: &str,
) -> Result<Vec<StoredEvent>, ApiError> {
    let correlation_id = Uuid::new_v4();
    info!(%correlation_id, "handling {name} command");

    let handle = state.registry.handle_for(encounter_id).await;
    match handle.submit(correlation_id, request).await {
        Ok(stored_events) => Ok(stored_events),
        Err(DomainError::AggregateNotFound(id)) => {
            state.registry.remove(encounter_id).await;
            Err(ApiError(DomainError::AggregateNotFound(id)))
        }
        Err(e) => Err(ApiError(e)),
    }
}

/// POST /
#[instrument(skip(state, request))]
async fn create_encounter(
    State(state): State<AppState>,
    Json(request): Json<CreateEncounterRequest>,
) -> Result<Json<CreateEncounterResponse>, ApiError> {
    let encounter_id = Uuid::now_v7();
    let default_formula = request
        .default_formula
        .unwrap_or_else(|| state.default_formula.clone());

    let stored_events = submit(
        &state,
        encounter_id,
        SchedulerRequest::Create {
            attached_to_view: request.attached_to_view,
            default_formula: Some(default_formula),
        },
        "create_encounter",
    )
    .await;
    // A failed creation leaves nothing for the scheduler to serve.
    let stored_events = match stored_events {
        Ok(stored_events) => stored_events,
        Err(e) => {
            state.registry.remove(encounter_id).await;
            return Err(e);
        }
    };

    Ok(Json(CreateEncounterResponse {
        encounter_id,
        event_ids: event_ids(&stored_events),
    }))
}

/// GET /{id}
#[instrument(skip(state), fields(encounter_id = %encounter_id))]
async fn get_encounter(
    State(state): State<AppState>,
    Path(encounter_id): Path<Uuid>,
) -> Result<Json<EncounterView>, ApiError> {
    let view = query_handlers::get_encounter_by_id(
        encounter_id,
        &*state.registry.services().repository,
    )
    .await?;
    Ok(Json(view))
}

/// POST /{id}/participants
#[instrument(skip(state, request), fields(encounter_id = %encounter_id, participant_id = %request.participant_id))]
async fn add_participant(
    State(state): State<AppState>,
    Path(encounter_id): Path<Uuid>,
    Json(request): Json<AddParticipantRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let stored_events = submit(
        &state,
        encounter_id,
        SchedulerRequest::AddParticipant(request.participant_id),
        "add_participant",
    )
    .await?;
    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// DELETE /{id}/participants/{participant_id}
#[instrument(skip(state), fields(encounter_id = %encounter_id, participant_id = %participant_id))]
async fn remove_participant(
    State(state): State<AppState>,
    Path((encounter_id, participant_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<CommandResponse>, ApiError> {
    let stored_events = submit(
        &state,
        encounter_id,
        SchedulerRequest::RemoveParticipant(participant_id),
        "remove_participant",
    )
    .await?;
    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// PUT /{id}/participants/{participant_id}/flags
#[instrument(skip(state, request), fields(encounter_id = %encounter_id, participant_id = %participant_id))]
async fn set_action_flags(
    State(state): State<AppState>,
    Path((encounter_id, participant_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<SetActionFlagsRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let stored_events = submit(
        &state,
        encounter_id,
        SchedulerRequest::SetActionFlags {
            participant_id,
            action_ended: request.action_ended,
            action_delayed: request.action_delayed,
        },
        "set_action_flags",
    )
    .await?;
    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// POST /{id}/start
#[instrument(skip(state), fields(encounter_id = %encounter_id))]
async fn start_encounter(
    State(state): State<AppState>,
    Path(encounter_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let stored_events =
        submit(&state, encounter_id, SchedulerRequest::Start, "start_encounter").await?;
    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// POST /{id}/advance
#[instrument(skip(state), fields(encounter_id = %encounter_id))]
async fn advance_turn(
    State(state): State<AppState>,
    Path(encounter_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let stored_events =
        submit(&state, encounter_id, SchedulerRequest::Advance, "advance_turn").await?;
    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// POST /{id}/rewind
#[instrument(skip(state), fields(encounter_id = %encounter_id))]
async fn rewind_turn(
    State(state): State<AppState>,
    Path(encounter_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let stored_events =
        submit(&state, encounter_id, SchedulerRequest::Rewind, "rewind_turn").await?;
    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// POST /{id}/recheck
#[instrument(skip(state), fields(encounter_id = %encounter_id))]
async fn recheck_initiative(
    State(state): State<AppState>,
    Path(encounter_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let stored_events = submit(
        &state,
        encounter_id,
        SchedulerRequest::Recheck,
        "recheck_initiative",
    )
    .await?;
    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// POST /{id}/decide
#[instrument(skip(state, request), fields(encounter_id = %encounter_id, decision = ?request.decision))]
async fn declare_action(
    State(state): State<AppState>,
    Path(encounter_id): Path<Uuid>,
    Json(request): Json<DecideRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let stored_events = submit(
        &state,
        encounter_id,
        SchedulerRequest::Decide(request.decision),
        "declare_action",
    )
    .await?;
    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// POST /{id}/roll
#[instrument(skip(state, request), fields(encounter_id = %encounter_id))]
async fn roll_initiative(
    State(state): State<AppState>,
    Path(encounter_id): Path<Uuid>,
    Json(request): Json<RollRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let stored_events = submit(
        &state,
        encounter_id,
        SchedulerRequest::Roll(request.participant_ids),
        "roll_initiative",
    )
    .await?;
    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// POST /{id}/end
#[instrument(skip(state), fields(encounter_id = %encounter_id))]
async fn end_encounter(
    State(state): State<AppState>,
    Path(encounter_id): Path<Uuid>,
) -> Result<Json<CommandResponse>, ApiError> {
    let stored_events =
        submit(&state, encounter_id, SchedulerRequest::End, "end_encounter").await?;
    state.registry.remove(encounter_id).await;
    Ok(Json(CommandResponse {
        event_ids: event_ids(&stored_events),
    }))
}

/// Returns the router for encounters.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_encounter))
        .route("/{id}", get(get_encounter))
        .route("/{id}/participants", post(add_participant))
        .route(
            "/{id}/participants/{participant_id}",
            delete(remove_participant),
        )
        .route(
            "/{id}/participants/{participant_id}/flags",
            put(set_action_flags),
        )
        .route("/{id}/start", post(start_encounter))
        .route("/{id}/advance", post(advance_turn))
        .route("/{id}/rewind", post(rewind_turn))
        .route("/{id}/recheck", post(recheck_initiative))
        .route("/{id}/decide", post(declare_action))
        .route("/{id}/roll", post(roll_initiative))
        .route("/{id}/end", post(end_encounter))
}
