//! End-to-end HTTP surface tests driven straight through the real axum
//! router via `tower::ServiceExt::oneshot`, no network socket bound
//! (spec §4.1 "Per-run access control", §4.1 "owner-active-run limit",
//! §4.1 "Session ensure").

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use credit_sim_server::{AppConfig, AppState};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tower::ServiceExt;

fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        session_secret: b"integration-test-secret-not-for-prod".to_vec(),
        session_ttl_sec: 3600,
        allowed_origins: HashSet::new(),
        admin_token: None,
        max_active_runs_per_owner: 1,
        max_active_runs: 100,
        allow_dev_secret: true,
    }
}

fn app() -> Router {
    let state = AppState::new(test_config());
    credit_sim_server::build_app(state)
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn minimal_scenario(scenario_id: &str) -> Value {
    json!({
        "scenario": {
            "scenario_id": scenario_id,
            "schema_version": "1",
            "participants": [],
            "trust_lines": [],
            "equivalents": ["UAH"],
            "behavior_profiles": [],
            "timeline": [],
        }
    })
}

fn json_request(method: &str, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    };
    builder.body(body).unwrap()
}

#[tokio::test]
async fn session_ensure_mints_anon_cookie_with_no_auth_headers() {
    let app = app();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/simulator/session/ensure")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_some());

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["actor_kind"], "anon");
}

#[tokio::test]
async fn create_run_against_unregistered_scenario_is_validation_error() {
    let app = app();
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/simulator/runs",
            Some("participant:alice"),
            Some(json!({ "scenario_id": "does-not-exist" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "E009");
}

#[tokio::test]
async fn owner_cannot_access_another_owners_run() {
    let app = app();

    let (status, _) = send(app.clone(), json_request("POST", "/simulator/scenarios", None, Some(minimal_scenario("s1")))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app.clone(),
        json_request("POST", "/simulator/runs", Some("participant:alice"), Some(json!({ "scenario_id": "s1" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        app.clone(),
        json_request("GET", &format!("/simulator/runs/{run_id}"), Some("participant:bob"), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "E006");

    let (status, _) = send(
        app,
        json_request("GET", &format!("/simulator/runs/{run_id}"), Some("participant:alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn second_active_run_for_same_owner_conflicts() {
    let app = app();

    let (status, _) = send(app.clone(), json_request("POST", "/simulator/scenarios", None, Some(minimal_scenario("s2")))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        app.clone(),
        json_request("POST", "/simulator/runs", Some("participant:carol"), Some(json!({ "scenario_id": "s2" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app,
        json_request("POST", "/simulator/runs", Some("participant:carol"), Some(json!({ "scenario_id": "s2" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "E008");
    assert_eq!(body["error"]["details"]["conflict_kind"], "owner_active_exists");
}

#[tokio::test]
async fn admin_only_endpoint_rejects_non_admin_actor() {
    let app = app();
    let (status, body) = send(app, json_request("GET", "/simulator/admin/runs", Some("participant:dave"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "E006");
}
