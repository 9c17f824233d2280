//! HTTP surface of the turn-order scheduler.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use initiative_tracker::application::scheduler::DecisionRequest;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;

/// Builds the full router.
pub fn app(app_state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/encounters", routes::encounters::router())
        .nest("/api/v1/participants", routes::participants::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Drains the decision channel into the log. Clients poll the encounter
/// view for `pending_confirmation` and answer through `/decide`.
pub fn spawn_decision_logger(mut decisions: mpsc::Receiver<DecisionRequest>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = decisions.recv().await {
            info!(
                encounter_id = %request.encounter_id,
                participant_id = %request.participant_id,
                prompt = ?request.prompt,
                "awaiting decision"
            );
        }
    })
}
