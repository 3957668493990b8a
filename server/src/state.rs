//! Shared process state and the per-run background tick loop.
//!
//! One [`RunWorker`] exists per live run: it owns the [`Orchestrator`]
//! driving that run's ticks and the [`EventEmitter`] fanning out its
//! events. The tick loop itself is a plain `tokio::spawn`ed task — the
//! engine's "exactly one tick in flight per run" contract (spec §5) is
//! satisfied by nothing else ever touching `orchestrator` outside the
//! loop and request handlers, both of which take the same mutex.

use crate::config::AppConfig;
use axum::http::HeaderMap;
use credit_sim_engine::emitter::{EventEmitter, EventSink};
use credit_sim_engine::models::event::Event;
use credit_sim_engine::models::run::{Run, RunMode, RunState};
use credit_sim_engine::models::scenario::Scenario;
use credit_sim_engine::orchestrator::{Orchestrator, OrchestratorConfig};
use credit_sim_engine::registry::{RegistryConfig, RunRegistry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Wall-clock interval between ticks. Decoupled from `sim_time_ms`
/// (spec §4.2 "Virtual time").
pub const TICK_WALL_INTERVAL: Duration = Duration::from_millis(200);
const BROADCAST_CAPACITY: usize = 1024;

struct BroadcastSink(broadcast::Sender<Event>);

impl EventSink for BroadcastSink {
    fn try_send(&mut self, event: &Event) -> bool {
        // A lagging/absent receiver is the subscriber's problem to detect
        // (RecvError::Lagged); the emitter itself never blocks or drops
        // because of backpressure here.
        let _ = self.0.send(event.clone());
        true
    }
}

pub struct RunWorker {
    pub run_id: String,
    pub orchestrator: Mutex<Orchestrator>,
    pub emitter: Mutex<EventEmitter>,
    pub broadcast: broadcast::Sender<Event>,
    pub scenario: Arc<Scenario>,
    pub base_config: OrchestratorConfig,
}

impl RunWorker {
    fn new(run: Run, scenario: Arc<Scenario>, config: OrchestratorConfig) -> Arc<Self> {
        let run_id = run.run_id.clone();
        let orchestrator = Orchestrator::new(run, (*scenario).clone(), config.clone());
        let mut emitter = EventEmitter::default();
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        emitter.subscribe(Box::new(BroadcastSink(tx.clone())));
        Arc::new(Self {
            run_id,
            orchestrator: Mutex::new(orchestrator),
            emitter: Mutex::new(emitter),
            broadcast: tx,
            scenario,
            base_config: config,
        })
    }

    pub fn current_run(&self) -> Run {
        self.orchestrator.lock().run.clone()
    }
}

pub struct AppState {
    pub registry: Arc<RunRegistry>,
    pub scenarios: Mutex<HashMap<String, Arc<Scenario>>>,
    pub runs: Mutex<HashMap<String, Arc<RunWorker>>>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        let registry = RunRegistry::new(RegistryConfig {
            max_active_runs_per_owner: config.max_active_runs_per_owner,
            max_active_runs: config.max_active_runs,
        });
        // spec §4.1 "Reconciliation at startup": no persisted runs exist
        // in this in-memory deployment, so reconciliation is a no-op pass
        // over an empty registry, kept here so the startup sequencing
        // matches a persistence-backed deployment.
        registry.reconcile_at_startup();
        Arc::new(Self {
            registry: Arc::new(registry),
            scenarios: Mutex::new(HashMap::new()),
            runs: Mutex::new(HashMap::new()),
            config: Arc::new(config),
        })
    }

    pub fn now_unix(&self) -> u64 {
        chrono::Utc::now().timestamp() as u64
    }

    pub fn is_https(&self, headers: &HeaderMap) -> bool {
        crate::auth::is_https(headers)
    }

    /// Create a run, register it with the owner/run registry for
    /// lifecycle gating, and spawn its tick loop.
    pub fn spawn_run(
        self: &Arc<Self>,
        owner_id: credit_sim_engine::models::owner::OwnerId,
        scenario_id: String,
        mode: RunMode,
        seed: u64,
        intensity_percent: i32,
    ) -> Result<Arc<RunWorker>, credit_sim_engine::CoreError> {
        let scenario = self
            .scenarios
            .lock()
            .get(&scenario_id)
            .cloned()
            .ok_or_else(|| credit_sim_engine::CoreError::Validation(format!("unknown scenario_id: {scenario_id}")))?;

        let run = self.registry.create_run(owner_id, scenario_id, mode, seed, intensity_percent)?;
        let worker = RunWorker::new(run, scenario, OrchestratorConfig::default());
        self.runs.lock().insert(worker.run_id.clone(), worker.clone());
        spawn_tick_loop(self.clone(), worker.clone());
        Ok(worker)
    }

    /// Recreate a stopped/errored run's orchestrator from scratch and
    /// restart its tick loop (spec §4.2 "restart", idempotent on a
    /// non-terminal run per the Open Question recorded in DESIGN.md).
    pub fn restart_run(self: &Arc<Self>, run_id: &str) -> Option<Arc<RunWorker>> {
        let existing = self.runs.lock().get(run_id).cloned()?;
        if !existing.current_run().state.is_terminal() {
            return Some(existing);
        }
        let prior = existing.current_run();
        let fresh_run = Run::new(
            prior.run_id.clone(),
            prior.scenario_id.clone(),
            prior.mode,
            prior.seed,
            prior.owner_id.clone(),
            prior.intensity_percent,
        );
        let worker = RunWorker::new(fresh_run, existing.scenario.clone(), existing.base_config.clone());
        self.runs.lock().insert(run_id.to_string(), worker.clone());
        spawn_tick_loop(self.clone(), worker.clone());
        Some(worker)
    }

    pub fn worker(&self, run_id: &str) -> Option<Arc<RunWorker>> {
        self.runs.lock().get(run_id).cloned()
    }
}

/// Drive one run's tick loop until it reaches a terminal state. Skips
/// ticking entirely while paused rather than busy-spinning (spec §4.2
/// "Pause/resume" — a paused run produces no new events or sim-time
/// advancement).
fn spawn_tick_loop(state: Arc<AppState>, worker: Arc<RunWorker>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(TICK_WALL_INTERVAL).await;

            let state_snapshot = worker.orchestrator.lock().run.state;
            if state_snapshot == RunState::Paused {
                continue;
            }
            if state_snapshot.is_terminal() {
                break;
            }

            let outcome = worker.orchestrator.lock().tick();
            {
                let mut emitter = worker.emitter.lock();
                for body in outcome.events {
                    emitter.publish(body);
                }
            }

            let snapshot = worker.current_run();
            let admin = credit_sim_engine::models::owner::Actor {
                owner_id: credit_sim_engine::models::owner::OwnerId::admin(),
                kind: credit_sim_engine::models::owner::ActorKind::Admin,
                is_admin: true,
            };
            let _ = state.registry.with_run(&worker.run_id, &admin, |r| *r = snapshot.clone());

            if outcome.terminal {
                break;
            }
        }
    });
}
