//! `POST /simulator/session/ensure` — mint or verify the anon cookie
//! (spec §6, §4.1 "Session ensure").

use crate::auth;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use credit_sim_engine::models::owner::ActorKind;
use credit_sim_engine::registry::derive_actor;
use serde_json::json;
use std::sync::Arc;

pub async fn ensure(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Response> {
    let now = state.now_unix();
    let existing_sid = auth::verify_session_cookie(&headers, &state.config.session_secret, now, state.config.session_ttl_sec);

    let (sid_for_derivation, fresh_token) = match &existing_sid {
        Some(sid) => (sid.clone(), None),
        None => {
            let (sid, token) = auth::mint_session(&state.config.session_secret, now);
            (sid, Some(token))
        }
    };

    let admin_token = state.config.admin_token.as_deref();
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let admin_valid = matches!((admin_token, bearer), (Some(expected), Some(given)) if given == expected);
    let owner_override = headers.get("x-simulator-owner").and_then(|v| v.to_str().ok());
    let participant_sub = bearer.and_then(|b| b.strip_prefix("participant:"));

    let actor = derive_actor(admin_valid, owner_override, participant_sub, Some(&sid_for_derivation))
        .map_err(crate::error::ApiError::from)?;

    let mut response_headers = HeaderMap::new();
    if actor.kind == ActorKind::Anon {
        if let Some(token) = fresh_token {
            let cookie = auth::set_cookie_header(&token, state.is_https(&headers), state.config.session_ttl_sec);
            response_headers.insert(axum::http::header::SET_COOKIE, HeaderValue::from_str(&cookie).unwrap());
        }
    }

    let body = json!({
        "actor_kind": actor_kind_str(actor.kind),
        "owner_id": actor.owner_id.as_str(),
    });
    Ok((response_headers, Json(body)).into_response())
}

fn actor_kind_str(kind: ActorKind) -> &'static str {
    match kind {
        ActorKind::CliOverride => "cli_override",
        ActorKind::Admin => "admin",
        ActorKind::Participant => "participant",
        ActorKind::Anon => "anon",
    }
}
