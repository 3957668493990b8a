pub mod admin;
pub mod events;
pub mod runs;
pub mod scenarios;
pub mod session;

use crate::error::ApiError;
use crate::state::AppState;
use axum::http::HeaderMap;
use credit_sim_engine::models::owner::Actor;
use credit_sim_engine::models::run::Run;
use credit_sim_engine::registry::RunRegistry;
use credit_sim_engine::CoreError;
use std::sync::Arc;

/// Derive the acting identity for one request (spec §4.1).
pub fn actor_from_request(state: &AppState, headers: &HeaderMap) -> Result<Actor, ApiError> {
    let now = state.now_unix();
    crate::auth::actor_from_headers(
        headers,
        state.config.admin_token.as_deref(),
        &state.config.session_secret,
        now,
        state.config.session_ttl_sec,
    )
    .map_err(ApiError::from)
}

/// Look up a run and check the actor may access it (spec §4.1 "Per-run
/// access control").
pub fn require_access(state: &AppState, run_id: &str, actor: &Actor) -> Result<Run, ApiError> {
    let run = state
        .registry
        .get(run_id)
        .ok_or_else(|| CoreError::Validation(format!("unknown run_id: {run_id}")))?;
    RunRegistry::check_access(actor, &run)?;
    Ok(run)
}

/// CSRF origin check for mutating, cookie-authenticated requests (spec
/// §4.1 "CSRF policy").
pub fn check_csrf(state: &AppState, actor: &Actor, headers: &HeaderMap, is_mutating: bool) -> Result<(), ApiError> {
    let origin = headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok());
    credit_sim_engine::registry::check_csrf(actor.kind, is_mutating, origin, &state.config.allowed_origins)
        .map_err(ApiError::from)
}

pub fn router(state: Arc<AppState>) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/simulator/session/ensure", post(session::ensure))
        .route("/simulator/scenarios", post(scenarios::register).get(scenarios::list))
        .route("/simulator/runs", post(runs::create))
        .route("/simulator/runs/active", get(runs::active))
        .route("/simulator/runs/:run_id", get(runs::status))
        .route("/simulator/runs/:run_id/pause", post(runs::pause))
        .route("/simulator/runs/:run_id/resume", post(runs::resume))
        .route("/simulator/runs/:run_id/stop", post(runs::stop))
        .route("/simulator/runs/:run_id/restart", post(runs::restart))
        .route("/simulator/runs/:run_id/intensity", post(runs::set_intensity))
        .route("/simulator/runs/:run_id/events", get(events::stream))
        .route("/simulator/runs/:run_id/graph/snapshot", get(runs::graph_snapshot))
        .route("/simulator/runs/:run_id/metrics", get(runs::metrics))
        .route("/simulator/admin/runs", get(admin::list_runs))
        .route("/simulator/admin/runs/stop-all", post(admin::stop_all))
        .with_state(state)
}
