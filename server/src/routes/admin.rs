//! Admin-only endpoints: list every run, bulk stop (spec §6, §4.1
//! "Admin bypass").

use crate::error::{ApiError, ApiResult};
use crate::routes::actor_from_request;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use credit_sim_engine::CoreError;
use serde_json::json;
use std::sync::Arc;

fn require_admin(state: &AppState, headers: &axum::http::HeaderMap) -> Result<(), ApiError> {
    let actor = actor_from_request(state, headers)?;
    if !actor.is_admin {
        return Err(ApiError::from(CoreError::Forbidden {
            reason: "admin endpoint".to_string(),
        }));
    }
    Ok(())
}

pub async fn list_runs(State(state): State<Arc<AppState>>, headers: axum::http::HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&state, &headers)?;
    let runs = state.registry.admin_list();
    let items: Vec<serde_json::Value> = runs
        .iter()
        .map(|r| {
            json!({
                "run_id": r.run_id,
                "scenario_id": r.scenario_id,
                "owner_id": r.owner_id.as_str(),
                "state": r.state,
                "tick_index": r.tick_index,
            })
        })
        .collect();
    Ok(Json(json!({ "runs": items })))
}

pub async fn stop_all(State(state): State<Arc<AppState>>, headers: axum::http::HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    require_admin(&state, &headers)?;
    let stopped = state.registry.admin_stop_all();
    Ok(Json(json!({ "stopped": stopped })))
}
