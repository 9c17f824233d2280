//! Integration tests for participant identities.

mod common;

use axum::http::StatusCode;
use uuid::Uuid;

#[tokio::test]
async fn test_register_and_read_participant() {
    let app = common::build_test_app();

    let (status, json) = common::post_json(
        &app,
        "/api/v1/participants",
        &serde_json::json!({ "name": "Ayla", "is_npc": false, "initiative_formula": "1d20" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Ayla");
    assert_eq!(json["alive"], true);
    let id = common::uuid_at(&json["id"]);

    let (status, json) = common::get_json(&app, &format!("/api/v1/participants/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["initiative_formula"], "1d20");
}

#[tokio::test]
async fn test_register_blank_name_returns_400() {
    let app = common::build_test_app();

    let (status, json) = common::post_json(
        &app,
        "/api/v1/participants",
        &serde_json::json!({ "name": "  " }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_set_status_records_defeat() {
    let app = common::build_test_app();
    let id = common::register(&app, "Bram").await;

    let (status, json) = common::put_json(
        &app,
        &format!("/api/v1/participants/{id}/status"),
        &serde_json::json!({ "defeated": true, "alive": false }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["defeated"], true);
    assert_eq!(json["alive"], false);
}

#[tokio::test]
async fn test_unknown_participant_returns_404() {
    let app = common::build_test_app();

    let (status, json) =
        common::get_json(&app, &format!("/api/v1/participants/{}", Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "participant_not_found");
}
