//! Scenario-event (inject) executor — timed topology mutations (spec §4.1
//! step 1, §3 "Scenario ... timeline of events (inject, note, stress)").
//!
//! Grounded in the teacher's `events::handler::ScenarioEventHandler` and
//! `events::types::ScenarioEvent`/`EventSchedule`, generalized from a
//! balance-transfer model to trust-line mutations, debt injections, and
//! freezes, and from tick-indexed schedules to virtual-time (`time_ms`)
//! schedules per spec §4.2 step 1 ("whose `event.time` <= `sim_time_ms`").

use crate::core::decimal::Decimal;
use crate::models::equivalent::Equivalent;
use crate::models::event::EdgePatch;
use crate::models::participant::ParticipantStatus;
use crate::models::trust_line::{TrustLine, TrustLineStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A mutation applied to the topology at a specific virtual time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InjectAction {
    SetTrustLimit {
        from: String,
        to: String,
        equivalent: Equivalent,
        new_limit: Decimal,
    },
    AdjustDebt {
        from: String,
        to: String,
        equivalent: Equivalent,
        delta: Decimal,
    },
    Freeze {
        from: String,
        to: String,
        equivalent: Equivalent,
    },
    Unfreeze {
        from: String,
        to: String,
        equivalent: Equivalent,
    },
    SetParticipantStatus {
        pid: String,
        status: ParticipantStatus,
    },
}

/// One entry of a scenario's timeline (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioEvent {
    Inject { time_ms: u64, action: InjectAction },
    Note { time_ms: u64, message: String },
    Stress {
        time_ms: u64,
        equivalent: Option<Equivalent>,
        multiplier: f64,
        duration_ms: Option<u64>,
    },
}

impl ScenarioEvent {
    pub fn time_ms(&self) -> u64 {
        match self {
            ScenarioEvent::Inject { time_ms, .. } => *time_ms,
            ScenarioEvent::Note { time_ms, .. } => *time_ms,
            ScenarioEvent::Stress { time_ms, .. } => *time_ms,
        }
    }
}

/// An active stress multiplier window, tracked so §4.2 step 2 ("compute
/// stress multipliers effective at the current virtual time") can fold
/// them together without rescanning the whole timeline every tick.
#[derive(Debug, Clone)]
struct ActiveStress {
    equivalent: Option<Equivalent>,
    multiplier: f64,
    expires_at_ms: Option<u64>,
}

/// Tracks which timeline entries have fired and owns the live stress
/// windows. One instance per run.
#[derive(Debug, Default)]
pub struct InjectExecutor {
    fired: Vec<bool>,
    active_stress: Vec<ActiveStress>,
}

/// Minimal state surface the executor needs; implemented by
/// `SimulationState` in the orchestrator's owning crate module.
pub trait TopologyMutator {
    fn trust_line_mut(&mut self, from: &str, to: &str, equivalent: &Equivalent) -> Option<&mut TrustLine>;
    fn set_participant_status(&mut self, pid: &str, status: ParticipantStatus);
}

pub struct ApplyOutcome {
    pub fired_count: usize,
    pub edge_patches_by_equivalent: HashMap<Equivalent, EdgePatch>,
}

impl InjectExecutor {
    pub fn new(timeline_len: usize) -> Self {
        Self {
            fired: vec![false; timeline_len],
            active_stress: Vec::new(),
        }
    }

    /// Apply every timeline entry whose `time_ms <= sim_time_ms` that has
    /// not yet fired, marking it fired by index so it never re-applies.
    pub fn apply_due<S: TopologyMutator>(
        &mut self,
        timeline: &[ScenarioEvent],
        sim_time_ms: u64,
        state: &mut S,
    ) -> ApplyOutcome {
        let mut fired_count = 0;
        let mut patches: HashMap<Equivalent, EdgePatch> = HashMap::new();

        for (idx, event) in timeline.iter().enumerate() {
            if self.fired[idx] || event.time_ms() > sim_time_ms {
                continue;
            }
            self.fired[idx] = true;
            fired_count += 1;

            match event {
                ScenarioEvent::Inject { action, .. } => {
                    if let Some(eq) = self.apply_inject(action, state) {
                        patches.entry(eq).or_default().upserted.push(serde_json::json!({
                            "action": action,
                        }));
                    }
                }
                ScenarioEvent::Note { .. } => {}
                ScenarioEvent::Stress {
                    equivalent,
                    multiplier,
                    time_ms,
                    duration_ms,
                } => {
                    self.active_stress.push(ActiveStress {
                        equivalent: equivalent.clone(),
                        multiplier: *multiplier,
                        expires_at_ms: duration_ms.map(|d| time_ms + d),
                    });
                }
            }
        }

        ApplyOutcome {
            fired_count,
            edge_patches_by_equivalent: patches,
        }
    }

    fn apply_inject<S: TopologyMutator>(&self, action: &InjectAction, state: &mut S) -> Option<Equivalent> {
        match action {
            InjectAction::SetTrustLimit {
                from,
                to,
                equivalent,
                new_limit,
            } => {
                let line = state.trust_line_mut(from, to, equivalent)?;
                line.limit = *new_limit;
                Some(equivalent.clone())
            }
            InjectAction::AdjustDebt {
                from,
                to,
                equivalent,
                delta,
            } => {
                let line = state.trust_line_mut(from, to, equivalent)?;
                let version = line.version;
                // Scenario-authored debt injections bypass normal optimistic
                // concurrency: they run exclusively inside the orchestrator's
                // single-writer inject phase (spec §4.2 step 1), never
                // concurrently with payment or clearing sessions.
                let _ = line.apply_used_delta(version, *delta, 0);
                Some(equivalent.clone())
            }
            InjectAction::Freeze { from, to, equivalent } => {
                let line = state.trust_line_mut(from, to, equivalent)?;
                line.status = TrustLineStatus::Frozen;
                Some(equivalent.clone())
            }
            InjectAction::Unfreeze { from, to, equivalent } => {
                let line = state.trust_line_mut(from, to, equivalent)?;
                line.status = TrustLineStatus::Active;
                Some(equivalent.clone())
            }
            InjectAction::SetParticipantStatus { pid, status } => {
                state.set_participant_status(pid, *status);
                None
            }
        }
    }

    /// Effective stress multiplier for `equivalent` at `sim_time_ms`
    /// (spec §4.2 step 2); expired windows are pruned lazily.
    pub fn stress_multiplier(&mut self, equivalent: &Equivalent, sim_time_ms: u64) -> f64 {
        self.active_stress
            .retain(|s| s.expires_at_ms.map_or(true, |exp| exp > sim_time_ms));
        self.active_stress
            .iter()
            .filter(|s| s.equivalent.as_ref().map_or(true, |e| e == equivalent))
            .map(|s| s.multiplier)
            .product()
    }
}
