//! `GET /simulator/runs/{run_id}/events` — the SSE stream (spec §4.9,
//! §6). Replays the ring buffer from `Last-Event-ID`, then continues
//! live from the run's broadcast channel.

use crate::error::ApiError;
use crate::routes::{actor_from_request, require_access};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use credit_sim_engine::emitter::ReplayOutcome;
use credit_sim_engine::models::equivalent::Equivalent;
use credit_sim_engine::models::event::{Event, EventBody};
use credit_sim_engine::CoreError;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Deserialize)]
pub struct EventsQuery {
    equivalent: Option<String>,
}

fn event_equivalent(body: &EventBody) -> Option<&Equivalent> {
    match body {
        EventBody::TxUpdated { equivalent, .. }
        | EventBody::TxFailed { equivalent, .. }
        | EventBody::ClearingPlan { equivalent, .. }
        | EventBody::ClearingDone { equivalent, .. }
        | EventBody::TopologyChanged { equivalent, .. }
        | EventBody::AuditDrift { equivalent, .. } => Some(equivalent),
        EventBody::RunStatus { .. } => None,
    }
}

fn passes_filter(event: &Event, filter: &Option<Equivalent>) -> bool {
    match (filter, event_equivalent(&event.body)) {
        (Some(wanted), Some(actual)) => wanted == actual,
        (Some(_), None) => true, // run_status always passes through
        (None, _) => true,
    }
}

fn to_sse(event: Event) -> Result<SseEvent, Infallible> {
    let data = serde_json::to_string(&event).unwrap_or_default();
    Ok(SseEvent::default()
        .id(event.event_id.to_string())
        .event("simulator.event")
        .data(data))
}

pub async fn stream(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    Query(query): Query<EventsQuery>,
    headers: axum::http::HeaderMap,
) -> Response {
    match stream_inner(state, run_id, query, headers).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn stream_inner(
    state: Arc<AppState>,
    run_id: String,
    query: EventsQuery,
    headers: axum::http::HeaderMap,
) -> Result<Response, ApiError> {
    let actor = actor_from_request(&state, &headers)?;
    let _ = require_access(&state, &run_id, &actor)?;
    let worker = state
        .worker(&run_id)
        .ok_or_else(|| ApiError::from(CoreError::Validation(format!("unknown run_id: {run_id}"))))?;

    let filter = query.equivalent.map(Equivalent::new);
    let last_event_id: Option<u64> = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    let receiver = worker.broadcast.subscribe();
    let backlog: Vec<Event> = {
        let emitter = worker.emitter.lock();
        match last_event_id {
            None => Vec::new(),
            Some(id) => match emitter.replay_since(id) {
                ReplayOutcome::Replay(events) => events,
                ReplayOutcome::ResumeLive => Vec::new(),
                ReplayOutcome::Gone => {
                    let body = json!({"error": {"code": "E010", "message": "last-event-id outside retained window"}});
                    return Ok((StatusCode::GONE, Json(body)).into_response());
                }
            },
        }
    };

    let backlog_stream = stream::iter(backlog.into_iter().filter(move |e| passes_filter(e, &filter.clone())).map(Ok::<Event, Infallible>));

    let filter2 = query.equivalent.map(Equivalent::new);
    let live_stream = BroadcastStream::new(receiver).filter_map(move |res| {
        let filter2 = filter2.clone();
        async move {
            match res {
                Ok(event) if passes_filter(&event, &filter2) => Some(Ok::<Event, Infallible>(event)),
                Ok(_) => None,
                // A lagging subscriber missed events; the client reconnects
                // with Last-Event-ID to recover the contiguous suffix
                // (spec §4.9 "Reconnect") rather than the stream silently
                // skipping ids mid-flight.
                Err(_lagged) => None,
            }
        }
    });

    let combined: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> =
        Box::pin(backlog_stream.chain(live_stream));
    let sse_stream = combined.map(|res| res.and_then(to_sse));

    Ok(Sse::new(sse_stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(17)).text(""))
        .into_response())
}
