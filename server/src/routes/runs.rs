//! Run lifecycle endpoints: create, status, active, pause/resume/stop/
//! restart, intensity, graph snapshot, metrics (spec §6, §4.2).

use crate::error::{ApiError, ApiResult};
use crate::routes::{actor_from_request, check_csrf, require_access};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use credit_sim_engine::models::equivalent::Equivalent;
use credit_sim_engine::models::run::{Run, RunMode};
use credit_sim_engine::CoreError;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

fn run_json(run: &Run) -> serde_json::Value {
    json!({
        "run_id": run.run_id,
        "scenario_id": run.scenario_id,
        "mode": run.mode,
        "state": run.state,
        "seed": run.seed,
        "tick_index": run.tick_index,
        "sim_time_ms": run.sim_time_ms(),
        "intensity_percent": run.intensity_percent,
        "owner_id": run.owner_id.as_str(),
        "attempts_total": run.counters.attempts_total,
        "committed_total": run.counters.committed_total,
        "rejected_total": run.counters.rejected_total,
        "errors_total": run.counters.errors_total,
        "timeouts_total": run.counters.timeouts_total,
        "last_error": run.last_error,
    })
}

#[derive(Deserialize)]
pub struct CreateRequest {
    scenario_id: String,
    #[serde(default = "default_mode")]
    mode: RunMode,
    #[serde(default = "default_intensity")]
    intensity_percent: i32,
    #[serde(default)]
    seed: Option<u64>,
}

fn default_mode() -> RunMode {
    RunMode::Real
}
fn default_intensity() -> i32 {
    30
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(req): Json<CreateRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = actor_from_request(&state, &headers)?;
    check_csrf(&state, &actor, &headers, true)?;

    let seed = req.seed.unwrap_or_else(|| {
        // Deterministic-enough default for a caller that doesn't care to
        // pin one; any caller wanting reproducibility passes `seed`
        // explicitly (spec §4.3 "Determinism contract").
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        use std::hash::{Hash, Hasher};
        req.scenario_id.hash(&mut hasher);
        state.now_unix().hash(&mut hasher);
        hasher.finish()
    });

    let worker = state.spawn_run(actor.owner_id, req.scenario_id, req.mode, seed, req.intensity_percent)?;
    Ok(Json(json!({ "run_id": worker.run_id })))
}

pub async fn active(State(state): State<Arc<AppState>>, headers: axum::http::HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let actor = actor_from_request(&state, &headers)?;
    let run_id = state.registry.active_run_for_owner(&actor.owner_id);
    Ok(Json(json!({ "run_id": run_id })))
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    headers: axum::http::HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = actor_from_request(&state, &headers)?;
    let run = require_access(&state, &run_id, &actor)?;
    Ok(Json(run_json(&run)))
}

async fn transition(
    state: &Arc<AppState>,
    run_id: &str,
    headers: &axum::http::HeaderMap,
    f: impl FnOnce(&mut credit_sim_engine::orchestrator::Orchestrator),
) -> ApiResult<Json<serde_json::Value>> {
    let actor = actor_from_request(state, headers)?;
    check_csrf(state, &actor, headers, true)?;
    let cached = require_access(state, run_id, &actor)?;
    let _ = cached;
    let worker = state
        .worker(run_id)
        .ok_or_else(|| ApiError::from(CoreError::Validation(format!("unknown run_id: {run_id}"))))?;
    {
        let mut orch = worker.orchestrator.lock();
        f(&mut orch);
    }
    let snapshot = worker.current_run();
    Ok(Json(run_json(&snapshot)))
}

pub async fn pause(State(state): State<Arc<AppState>>, Path(run_id): Path<String>, headers: axum::http::HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    transition(&state, &run_id, &headers, |orch| {
        orch.pause();
    })
    .await
}

pub async fn resume(State(state): State<Arc<AppState>>, Path(run_id): Path<String>, headers: axum::http::HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    transition(&state, &run_id, &headers, |orch| {
        orch.resume();
    })
    .await
}

pub async fn stop(State(state): State<Arc<AppState>>, Path(run_id): Path<String>, headers: axum::http::HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    transition(&state, &run_id, &headers, |orch| {
        orch.stop();
    })
    .await
}

pub async fn restart(State(state): State<Arc<AppState>>, Path(run_id): Path<String>, headers: axum::http::HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let actor = actor_from_request(&state, &headers)?;
    check_csrf(&state, &actor, &headers, true)?;
    let _ = require_access(&state, &run_id, &actor)?;
    let worker = state
        .restart_run(&run_id)
        .ok_or_else(|| ApiError::from(CoreError::Validation(format!("unknown run_id: {run_id}"))))?;
    Ok(Json(run_json(&worker.current_run())))
}

#[derive(Deserialize)]
pub struct IntensityRequest {
    intensity_percent: i32,
}

pub async fn set_intensity(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    headers: axum::http::HeaderMap,
    Json(req): Json<IntensityRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    transition(&state, &run_id, &headers, |orch| {
        orch.set_intensity(req.intensity_percent);
    })
    .await
}

#[derive(Deserialize)]
pub struct EquivalentQuery {
    equivalent: String,
}

pub async fn graph_snapshot(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    Query(query): Query<EquivalentQuery>,
    headers: axum::http::HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = actor_from_request(&state, &headers)?;
    let _ = require_access(&state, &run_id, &actor)?;
    let worker = state
        .worker(&run_id)
        .ok_or_else(|| ApiError::from(CoreError::Validation(format!("unknown run_id: {run_id}"))))?;

    let equivalent = Equivalent::new(query.equivalent);
    let orch = worker.orchestrator.lock();
    let lines: Vec<serde_json::Value> = orch
        .trust_lines_for(&equivalent)
        .into_iter()
        .map(|l| {
            json!({
                "from": l.from,
                "to": l.to,
                "equivalent": l.equivalent.as_str(),
                "limit": l.limit.to_wire_string(),
                "used": l.used.to_wire_string(),
                "available": l.available().to_wire_string(),
                "status": l.status,
                "version": l.version,
            })
        })
        .collect();
    let nodes: Vec<serde_json::Value> = orch
        .participant_statuses()
        .iter()
        .map(|(pid, status)| json!({ "pid": pid, "status": status }))
        .collect();

    Ok(Json(json!({ "nodes": nodes, "edges": lines })))
}

#[derive(Deserialize)]
pub struct MetricsQuery {
    equivalent: String,
    from_ms: u64,
    to_ms: u64,
    step_ms: u64,
}

pub async fn metrics(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    Query(query): Query<MetricsQuery>,
    headers: axum::http::HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = actor_from_request(&state, &headers)?;
    let _ = require_access(&state, &run_id, &actor)?;
    let worker = state
        .worker(&run_id)
        .ok_or_else(|| ApiError::from(CoreError::Validation(format!("unknown run_id: {run_id}"))))?;

    let equivalent = Equivalent::new(query.equivalent);
    let orch = worker.orchestrator.lock();
    let points = orch.metrics_range(&equivalent, query.from_ms, query.to_ms, query.step_ms);
    Ok(Json(json!({ "points": points })))
}
