//! Run — a mutable simulation instance (spec §3).

use crate::core::time::VirtualClock;
use crate::models::owner::OwnerId;
use serde::{Deserialize, Serialize};

pub use crate::models::event::RunState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Fixtures,
    Real,
}

impl RunState {
    /// Terminal states free the owner's active-run slot (spec §3 "Lifecycle").
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Stopped | RunState::Error)
    }
}

/// Per-run cumulative counters (spec §3, surfaced on `run_status`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounters {
    pub attempts_total: u64,
    pub committed_total: u64,
    pub rejected_total: u64,
    pub errors_total: u64,
    pub timeouts_total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastErrorInfo {
    pub code: String,
    pub reason: String,
}

/// A live simulation instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub scenario_id: String,
    pub mode: RunMode,
    pub state: RunState,
    pub seed: u64,
    pub tick_ms_base: u64,
    pub tick_index: u64,
    pub intensity_percent: i32,
    pub owner_id: OwnerId,
    pub counters: RunCounters,
    pub last_error: Option<LastErrorInfo>,
    pub consec_tick_failures: u32,
}

impl Run {
    pub fn new(run_id: String, scenario_id: String, mode: RunMode, seed: u64, owner_id: OwnerId, intensity_percent: i32) -> Self {
        Self {
            run_id,
            scenario_id,
            mode,
            state: RunState::Running,
            seed,
            tick_ms_base: crate::core::time::DEFAULT_TICK_MS_BASE,
            tick_index: 0,
            intensity_percent: intensity_percent.clamp(0, 100),
            owner_id,
            counters: RunCounters::default(),
            last_error: None,
            consec_tick_failures: 0,
        }
    }

    pub fn sim_time_ms(&self) -> u64 {
        VirtualClock::at(self.tick_index, self.tick_ms_base).sim_time_ms()
    }

    pub fn is_owned_by(&self, owner_id: &OwnerId) -> bool {
        &self.owner_id == owner_id
    }

    /// Idempotent pause: pausing an already-paused run is a no-op that
    /// still reports success (spec §4.2 "Pause/resume/stop/restart").
    pub fn pause(&mut self) -> bool {
        if self.state == RunState::Running {
            self.state = RunState::Paused;
            true
        } else {
            self.state == RunState::Paused
        }
    }

    pub fn resume(&mut self) -> bool {
        if self.state == RunState::Paused {
            self.state = RunState::Running;
            true
        } else {
            self.state == RunState::Running
        }
    }

    pub fn stop(&mut self) -> bool {
        if self.state.is_terminal() {
            return true;
        }
        self.state = RunState::Stopped;
        true
    }

    pub fn set_intensity(&mut self, intensity_percent: i32) {
        self.intensity_percent = intensity_percent.clamp(0, 100);
    }

    pub fn transition_to_error(&mut self, code: &str, reason: impl Into<String>) {
        self.state = RunState::Error;
        self.last_error = Some(LastErrorInfo {
            code: code.to_string(),
            reason: reason.into(),
        });
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Run {
        Run::new(
            "r1".to_string(),
            "s1".to_string(),
            RunMode::Real,
            42,
            OwnerId::anon("sid"),
            30,
        )
    }

    #[test]
    fn pause_is_idempotent() {
        let mut run = fresh();
        assert!(run.pause());
        assert_eq!(run.state, RunState::Paused);
        assert!(run.pause()); // second pause: still true, no panic
        assert_eq!(run.state, RunState::Paused);
    }

    #[test]
    fn stop_on_terminal_is_idempotent() {
        let mut run = fresh();
        assert!(run.stop());
        assert_eq!(run.state, RunState::Stopped);
        assert!(run.stop());
        assert_eq!(run.state, RunState::Stopped);
    }

    #[test]
    fn intensity_clamps_to_0_100() {
        let mut run = fresh();
        run.set_intensity(-5);
        assert_eq!(run.intensity_percent, 0);
        run.set_intensity(150);
        assert_eq!(run.intensity_percent, 100);
    }
}
