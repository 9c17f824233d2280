//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use initiative_core::clock::Clock;
use initiative_core::rng::DeterministicRng;
use initiative_core::roll::DiceRollEvaluator;
use initiative_event_store::memory_event_repository::MemoryEventRepository;
use initiative_event_store::memory_identity_store::MemoryIdentityStore;
use initiative_test_support::{FixedClock, RecordingAnnouncer, SequenceRng};
use initiative_tracker::application::scheduler::SchedulerRegistry;
use initiative_tracker::application::services::TrackerServices;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use initiative_api::state::AppState;

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Build the full app router over in-memory stores and a cycling
/// `SequenceRng`. Uses the same route structure as `main.rs`.
pub fn build_test_app() -> Router {
    build_test_app_with_rolls(vec![7, 3, 5])
}

/// Build the full app router with custom die results.
pub fn build_test_app_with_rolls(rolls: Vec<u32>) -> Router {
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> =
        Arc::new(Mutex::new(SequenceRng::cycle(rolls)));
    let identities = MemoryIdentityStore::new();
    let services = TrackerServices {
        clock: fixed_clock(),
        rng,
        roller: Arc::new(DiceRollEvaluator),
        repository: Arc::new(MemoryEventRepository::new()),
        identities: Arc::new(identities.clone()),
        announcer: Arc::new(RecordingAnnouncer::new()),
    };
    let (decisions, decision_rx) = mpsc::channel(64);
    initiative_api::spawn_decision_logger(decision_rx);

    let registry = Arc::new(SchedulerRegistry::new(services, decisions));
    initiative_api::app(AppState::new(registry, identities, "1d10".to_string()))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

fn with_body(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: &Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, with_body("POST", uri, body)).await
}

/// Send a PUT request with a JSON body and return the response.
pub async fn put_json(
    app: &Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, with_body("PUT", uri, body)).await
}

/// Send a bodiless POST request and return the response.
pub async fn post_empty(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// Send a DELETE request and return the response.
pub async fn delete_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// Register an identity and return its id.
pub async fn register(app: &Router, name: &str) -> Uuid {
    let (status, json) = post_json(
        app,
        "/api/v1/participants",
        &serde_json::json!({ "name": name }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    json["id"].as_str().unwrap().parse().unwrap()
}

/// Create an encounter holding `participants` and return its id.
pub async fn encounter_with(app: &Router, participants: &[Uuid]) -> Uuid {
    let (status, json) = post_json(app, "/api/v1/encounters", &serde_json::json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let encounter_id: Uuid = json["encounter_id"].as_str().unwrap().parse().unwrap();
    for participant_id in participants {
        let (status, _) = post_json(
            app,
            &format!("/api/v1/encounters/{encounter_id}/participants"),
            &serde_json::json!({ "participant_id": participant_id }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    encounter_id
}

/// Read the id stored in a JSON string field.
pub fn uuid_at(value: &serde_json::Value) -> Uuid {
    value.as_str().unwrap().parse().unwrap()
}

/// First non-sentinel entry of an encounter view's turn order.
pub fn first_normal(view: &serde_json::Value) -> Uuid {
    let entry = view["turn_order"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["sentinel"].is_null())
        .unwrap();
    uuid_at(&entry["participant_id"])
}
