//! Adaptive clearing policy — a pure per-equivalent decision controller
//! with hysteresis, cooldown, and zero-yield backoff (spec §4.6).
//!
//! No I/O, no RNG: every decision is a deterministic function of the
//! signals fed in and the policy's own rolling state. Grounded in the
//! teacher's `policy` module's config-validate-and-clamp convention
//! (`policy::tree`'s constructor-time clamping), generalized here from a
//! routing-weight tree to a hysteresis/cooldown controller.

use std::collections::VecDeque;
use tracing::warn;

pub const ZERO_VOLUME_EPS: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearingReason {
    Guardrail,
    WarmupFallback,
    WarmupSuppressed,
    Cooldown,
    BelowThreshold,
    Active,
    Static,
}

impl ClearingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClearingReason::Guardrail => "guardrail",
            ClearingReason::WarmupFallback => "warmup_fallback",
            ClearingReason::WarmupSuppressed => "warmup_suppressed",
            ClearingReason::Cooldown => "cooldown",
            ClearingReason::BelowThreshold => "below_threshold",
            ClearingReason::Active => "active",
            ClearingReason::Static => "static",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClearingDecision {
    pub should_run: bool,
    pub reason: ClearingReason,
    pub time_budget_ms: Option<u64>,
    pub max_depth: Option<usize>,
}

impl ClearingDecision {
    fn skip(reason: ClearingReason) -> Self {
        Self {
            should_run: false,
            reason,
            time_budget_ms: None,
            max_depth: None,
        }
    }
}

/// Per-tick signals the orchestrator feeds to the policy for one
/// equivalent (spec §4.6 "Signals ingested").
#[derive(Debug, Clone, Copy, Default)]
pub struct TickSignals {
    pub attempted_payments: u64,
    pub rejected_no_capacity: u64,
    pub in_flight: u64,
    pub queue_depth: u64,
}

#[derive(Debug, Clone)]
pub struct AdaptivePolicyConfig {
    pub window_ticks: usize,
    pub no_capacity_low: f64,
    pub no_capacity_high: f64,
    pub min_interval_ticks: u64,
    pub backoff_max_interval_ticks: u64,
    pub warmup_fallback_cadence: u64,
    pub budget_min: u64,
    pub budget_max: u64,
    pub depth_min: usize,
    pub depth_max: usize,
    pub global_time_budget_ms: u64,
    pub global_max_depth: usize,
    pub inflight_threshold: Option<u64>,
    pub queue_depth_threshold: Option<u64>,
}

impl Default for AdaptivePolicyConfig {
    fn default() -> Self {
        Self {
            window_ticks: 30,
            no_capacity_low: 0.3,
            no_capacity_high: 0.6,
            min_interval_ticks: 5,
            backoff_max_interval_ticks: 160,
            warmup_fallback_cadence: 10,
            budget_min: 50,
            budget_max: 200,
            depth_min: 3,
            depth_max: 6,
            global_time_budget_ms: 200,
            global_max_depth: 6,
            inflight_threshold: None,
            queue_depth_threshold: None,
        }
    }
}

impl AdaptivePolicyConfig {
    /// Validate at construction; invalid values log a warning and clamp
    /// rather than fail (spec §4.6 "Config validation").
    pub fn validated(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.no_capacity_low)
            || !(0.0..=1.0).contains(&self.no_capacity_high)
            || self.no_capacity_low >= self.no_capacity_high
        {
            warn!(
                low = self.no_capacity_low,
                high = self.no_capacity_high,
                "adaptive policy: invalid hysteresis thresholds, clamping to defaults"
            );
            self.no_capacity_low = 0.3;
            self.no_capacity_high = 0.6;
        }
        if self.window_ticks == 0 {
            warn!("adaptive policy: window_ticks clamped to 1");
            self.window_ticks = 1;
        }
        if self.min_interval_ticks == 0 {
            warn!("adaptive policy: min_interval_ticks clamped to 1");
            self.min_interval_ticks = 1;
        }
        if self.budget_min > self.budget_max {
            warn!("adaptive policy: budget_min > budget_max, swapping");
            std::mem::swap(&mut self.budget_min, &mut self.budget_max);
        }
        self
    }
}

struct RollingWindow {
    samples: VecDeque<(u64, u64)>, // (attempted, rejected_no_capacity)
    capacity: usize,
}

impl RollingWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, attempted: u64, rejected_no_capacity: u64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((attempted, rejected_no_capacity));
    }

    fn is_warm(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    fn no_capacity_rate(&self) -> f64 {
        let attempted: u64 = self.samples.iter().map(|(a, _)| a).sum();
        let rejected: u64 = self.samples.iter().map(|(_, r)| r).sum();
        rejected as f64 / attempted.max(1) as f64
    }
}

/// Per-equivalent controller state. One instance lives for the lifetime
/// of a run, keyed by equivalent by the caller.
pub struct AdaptiveClearingPolicy {
    config: AdaptivePolicyConfig,
    window: RollingWindow,
    last_clearing_tick: Option<u64>,
    zero_volume_streak: u32,
    active: bool,
}

impl AdaptiveClearingPolicy {
    pub fn new(config: AdaptivePolicyConfig) -> Self {
        let config = config.validated();
        let window = RollingWindow::new(config.window_ticks);
        Self {
            config,
            window,
            last_clearing_tick: None,
            zero_volume_streak: 0,
            active: false,
        }
    }

    /// Evaluate the decision rule in priority order (spec §4.6 "first
    /// match wins").
    pub fn evaluate(&mut self, tick_index: u64, signals: TickSignals) -> ClearingDecision {
        self.window.push(signals.attempted_payments, signals.rejected_no_capacity);

        if let Some(threshold) = self.config.inflight_threshold {
            if signals.in_flight > threshold {
                return ClearingDecision::skip(ClearingReason::Guardrail);
            }
        }
        if let Some(threshold) = self.config.queue_depth_threshold {
            if signals.queue_depth > threshold {
                return ClearingDecision::skip(ClearingReason::Guardrail);
            }
        }

        if !self.window.is_warm() {
            if self.config.warmup_fallback_cadence == 0 {
                return ClearingDecision::skip(ClearingReason::WarmupSuppressed);
            }
            let due = tick_index % self.config.warmup_fallback_cadence == 0;
            return ClearingDecision {
                should_run: due,
                reason: ClearingReason::WarmupFallback,
                time_budget_ms: due.then_some(self.config.budget_min),
                max_depth: due.then_some(self.config.depth_min),
            };
        }

        let effective_interval = self
            .config
            .backoff_max_interval_ticks
            .min(self.config.min_interval_ticks.saturating_mul(1u64 << self.zero_volume_streak.min(32)));
        if let Some(last) = self.last_clearing_tick {
            if tick_index.saturating_sub(last) < effective_interval {
                return ClearingDecision::skip(ClearingReason::Cooldown);
            }
        }

        let rate = self.window.no_capacity_rate();
        if rate >= self.config.no_capacity_high {
            self.active = true;
        } else if rate <= self.config.no_capacity_low {
            self.active = false;
        }
        if !self.active {
            return ClearingDecision::skip(ClearingReason::BelowThreshold);
        }

        let span = (self.config.no_capacity_high - self.config.no_capacity_low).max(f64::EPSILON);
        let pressure = ((rate - self.config.no_capacity_low) / span).clamp(0.0, 1.0);
        let budget_ceiling = self.config.budget_max.min(self.config.global_time_budget_ms);
        let depth_ceiling = self.config.depth_max.min(self.config.global_max_depth);
        let time_budget_ms = lerp(self.config.budget_min as f64, budget_ceiling as f64, pressure).round() as u64;
        let max_depth = lerp(self.config.depth_min as f64, depth_ceiling as f64, pressure).round() as usize;

        ClearingDecision {
            should_run: true,
            reason: ClearingReason::Active,
            time_budget_ms: Some(time_budget_ms),
            max_depth: Some(max_depth),
        }
    }

    /// Informs the policy of the clearing engine's observed outcome
    /// (spec §4.6 "Post-decision update").
    pub fn record_outcome(&mut self, tick_index: u64, volume: f64, _cost_ms: u64) {
        if volume < ZERO_VOLUME_EPS {
            self.zero_volume_streak += 1;
        } else {
            self.zero_volume_streak = 0;
        }
        self.last_clearing_tick = Some(tick_index);
    }
}

/// `{should_run = tick_index % n == 0, reason = "static"}`, ignoring all
/// signals (spec §4.6 "Backward compatibility"). This is the default
/// policy selection.
pub struct StaticClearingPolicy {
    pub every_n_ticks: u64,
}

impl StaticClearingPolicy {
    pub fn new(every_n_ticks: u64) -> Self {
        Self {
            every_n_ticks: every_n_ticks.max(1),
        }
    }

    pub fn evaluate(&self, tick_index: u64) -> ClearingDecision {
        let should_run = tick_index % self.every_n_ticks == 0;
        ClearingDecision {
            should_run,
            reason: ClearingReason::Static,
            time_budget_ms: None,
            max_depth: None,
        }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(attempted: u64, rejected: u64) -> TickSignals {
        TickSignals {
            attempted_payments: attempted,
            rejected_no_capacity: rejected,
            in_flight: 0,
            queue_depth: 0,
        }
    }

    #[test]
    fn warmup_then_hysteresis_transitions_match_scenario() {
        let config = AdaptivePolicyConfig {
            window_ticks: 30,
            no_capacity_high: 0.6,
            no_capacity_low: 0.3,
            min_interval_ticks: 5,
            warmup_fallback_cadence: 1,
            ..AdaptivePolicyConfig::default()
        };
        let mut policy = AdaptiveClearingPolicy::new(config);

        for tick in 0..15u64 {
            let decision = policy.evaluate(tick, signals(100, 75));
            policy.record_outcome(tick, 1.0, 1);
            if tick >= 29 {
                assert_eq!(decision.reason, ClearingReason::Active);
            }
        }
        for tick in 15..30u64 {
            policy.evaluate(tick, signals(100, 10));
            policy.record_outcome(tick, 1.0, 1);
        }
        let final_decision = policy.evaluate(30, signals(100, 10));
        assert_eq!(final_decision.reason, ClearingReason::BelowThreshold);
        assert!(!final_decision.should_run);
    }

    #[test]
    fn zero_yield_backoff_grows_interval_and_resets_on_volume() {
        let config = AdaptivePolicyConfig {
            window_ticks: 1,
            no_capacity_high: 0.1,
            no_capacity_low: 0.05,
            min_interval_ticks: 2,
            backoff_max_interval_ticks: 64,
            warmup_fallback_cadence: 1,
            ..AdaptivePolicyConfig::default()
        };
        let mut policy = AdaptiveClearingPolicy::new(config);

        policy.evaluate(0, signals(10, 9));
        policy.record_outcome(0, 0.0, 1);
        assert_eq!(policy.zero_volume_streak, 1);

        policy.evaluate(1, signals(10, 9));
        policy.record_outcome(1, 0.0, 1);
        assert_eq!(policy.zero_volume_streak, 2);

        policy.evaluate(2, signals(10, 9));
        policy.record_outcome(2, 5.0, 1);
        assert_eq!(policy.zero_volume_streak, 0);
    }

    #[test]
    fn invalid_config_clamps_instead_of_panicking() {
        let config = AdaptivePolicyConfig {
            no_capacity_low: 0.9,
            no_capacity_high: 0.1,
            window_ticks: 0,
            min_interval_ticks: 0,
            ..AdaptivePolicyConfig::default()
        };
        let policy = AdaptiveClearingPolicy::new(config);
        assert!(policy.config.no_capacity_low < policy.config.no_capacity_high);
        assert!(policy.config.window_ticks >= 1);
        assert!(policy.config.min_interval_ticks >= 1);
    }

    #[test]
    fn static_policy_runs_on_cadence_only() {
        let policy = StaticClearingPolicy::new(3);
        assert!(policy.evaluate(0).should_run);
        assert!(!policy.evaluate(1).should_run);
        assert!(!policy.evaluate(2).should_run);
        assert!(policy.evaluate(3).should_run);
    }
}
