//! Routes for participant identities.
//!
//! Encounters only reference identities; these routes are how combatants
//! come into existence and how health changes reach the tracker.

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use initiative_core::identity::{IdentityStore, ParticipantRecord};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct RegisterParticipantRequest {
    /// Display name.
    pub name: String,
    /// Controlled by the game master.
    #[serde(default)]
    pub is_npc: bool,
    /// Participant-specific initiative formula.
    pub initiative_formula: Option<String>,
}

/// Request body for PUT /{id}/status.
#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    /// Taken out of the fight.
    pub defeated: bool,
    /// Health above zero.
    pub alive: bool,
}

/// POST /
#[instrument(skip(state, request), fields(name = %request.name))]
async fn register_participant(
    State(state): State<AppState>,
    Json(request): Json<RegisterParticipantRequest>,
) -> Result<Json<ParticipantRecord>, ApiError> {
    let record = state
        .identities
        .register(&request.name, request.is_npc, request.initiative_formula)
        .await?;
    info!(participant_id = %record.id, "registered participant");
    Ok(Json(record))
}

/// GET /{id}
#[instrument(skip(state), fields(participant_id = %participant_id))]
async fn get_participant(
    State(state): State<AppState>,
    Path(participant_id): Path<Uuid>,
) -> Result<Json<ParticipantRecord>, ApiError> {
    Ok(Json(state.identities.get_participant(participant_id).await?))
}

/// PUT /{id}/status
#[instrument(skip(state, request), fields(participant_id = %participant_id))]
async fn set_status(
    State(state): State<AppState>,
    Path(participant_id): Path<Uuid>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<ParticipantRecord>, ApiError> {
    let record = state
        .identities
        .set_status(participant_id, request.defeated, request.alive)
        .await?;
    info!(defeated = record.defeated, alive = record.alive, "participant status changed");
    Ok(Json(record))
}

/// Returns the router for participant identities.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(register_participant))
        .route("/{id}", get(get_participant))
        .route("/{id}/status", put(set_status))
}
