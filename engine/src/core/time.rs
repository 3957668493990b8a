//! Virtual time management for the simulation.
//!
//! The simulation advances in discrete ticks. Virtual time is entirely
//! decoupled from wall-clock tick rate: `sim_time_ms = tick_index * tick_ms_base`.
//! Intensity scales the per-tick action budget but never the virtual-time
//! cadence (spec §4.2).
//!
//! # Example
//! ```
//! use credit_sim_engine::core::time::VirtualClock;
//!
//! let mut clock = VirtualClock::new(1000);
//! assert_eq!(clock.tick_index(), 0);
//! assert_eq!(clock.sim_time_ms(), 0);
//!
//! clock.advance();
//! assert_eq!(clock.tick_index(), 1);
//! assert_eq!(clock.sim_time_ms(), 1000);
//! ```

use serde::{Deserialize, Serialize};

/// Default virtual milliseconds represented by a single tick.
pub const DEFAULT_TICK_MS_BASE: u64 = 1000;

/// Tracks `tick_index` and derives `sim_time_ms` from a fixed base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualClock {
    tick_index: u64,
    tick_ms_base: u64,
}

impl VirtualClock {
    /// Create a clock starting at `tick_index = 0`.
    ///
    /// # Panics
    /// Panics if `tick_ms_base` is zero.
    pub fn new(tick_ms_base: u64) -> Self {
        assert!(tick_ms_base > 0, "tick_ms_base must be positive");
        Self {
            tick_index: 0,
            tick_ms_base,
        }
    }

    /// Restore a clock at an arbitrary tick (used when resuming a run).
    pub fn at(tick_index: u64, tick_ms_base: u64) -> Self {
        assert!(tick_ms_base > 0, "tick_ms_base must be positive");
        Self {
            tick_index,
            tick_ms_base,
        }
    }

    /// Advance by exactly one tick.
    pub fn advance(&mut self) {
        self.tick_index += 1;
    }

    pub fn tick_index(&self) -> u64 {
        self.tick_index
    }

    pub fn sim_time_ms(&self) -> u64 {
        self.tick_index * self.tick_ms_base
    }

    pub fn tick_ms_base(&self) -> u64 {
        self.tick_ms_base
    }
}

/// Linearly scale a per-tick action budget by `intensity_percent` (0-100).
///
/// `actions_budget = floor(actions_per_tick_max * intensity_percent / 100)`.
/// Out-of-range intensity is clamped to `[0, 100]` before scaling (spec §4.2
/// "Intensity set is idempotent ... out-of-range clamps to [0, 100]").
///
/// # Example
/// ```
/// use credit_sim_engine::core::time::actions_budget;
///
/// assert_eq!(actions_budget(100, 30), 30);
/// assert_eq!(actions_budget(100, 150), 100); // clamped to 100%
/// assert_eq!(actions_budget(7, 50), 3); // floor(3.5)
/// ```
pub fn actions_budget(actions_per_tick_max: u64, intensity_percent: i32) -> u64 {
    let clamped = intensity_percent.clamp(0, 100) as u64;
    (actions_per_tick_max * clamped) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "tick_ms_base must be positive")]
    fn zero_tick_ms_base_panics() {
        VirtualClock::new(0);
    }

    #[test]
    fn sim_time_tracks_tick_index_independent_of_wall_clock() {
        let mut clock = VirtualClock::new(250);
        for i in 1..=4u64 {
            clock.advance();
            assert_eq!(clock.tick_index(), i);
            assert_eq!(clock.sim_time_ms(), i * 250);
        }
    }

    #[test]
    fn actions_budget_clamps_negative_and_over_100() {
        assert_eq!(actions_budget(200, -10), 0);
        assert_eq!(actions_budget(200, 500), 200);
    }
}
