//! HTTP/SSE adapter over the `credit-sim-engine` simulation core (spec
//! §6 "API surface").
//!
//! This crate owns process-level concerns the engine is deliberately
//! silent on: cookie/bearer-token identity, CSRF origin checking,
//! per-run background tick loops, and the wire encoding of engine
//! events and errors. The engine crate stays transport-agnostic; this
//! crate is the one adapter that makes it reachable over HTTP.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::AppConfig;
pub use state::AppState;

use std::sync::Arc;

/// Build the full `axum::Router` for the simulator API, wired to the
/// given [`AppState`].
pub fn build_app(state: Arc<AppState>) -> axum::Router {
    routes::router(state)
}
