//! `POST`/`GET /simulator/scenarios` — register and list scenarios
//! (spec §6). Scenario-file loading and schema validation against disk
//! are out of scope (spec §1); this endpoint accepts an already-built
//! scenario object.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use credit_sim_engine::models::scenario::Scenario;
use credit_sim_engine::CoreError;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct RegisterRequest {
    scenario: Scenario,
}

pub async fn register(State(state): State<Arc<AppState>>, Json(req): Json<RegisterRequest>) -> ApiResult<Json<serde_json::Value>> {
    let scenario = req.scenario;
    if scenario.scenario_id.trim().is_empty() {
        return Err(ApiError::from(CoreError::Validation("scenario_id must not be empty".to_string())));
    }
    if scenario.equivalents.is_empty() {
        return Err(ApiError::from(CoreError::Validation("scenario must declare at least one equivalent".to_string())));
    }
    let scenario_id = scenario.scenario_id.clone();
    state.scenarios.lock().insert(scenario_id.clone(), Arc::new(scenario));
    Ok(Json(json!({ "scenario_id": scenario_id })))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let ids: Vec<String> = state.scenarios.lock().keys().cloned().collect();
    Json(json!({ "scenarios": ids }))
}
