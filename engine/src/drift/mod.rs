//! Trust-drift engine — slow reward/atrophy adjustment of trust-line
//! limits (spec §4.7).
//!
//! Growth rewards edges the clearing engine just settled a cycle
//! through; decay atrophies edges nobody has touched in a while. Both
//! operate on the same `TrustLine` optimistic-lock contract the executor
//! and clearing engine use, grounded in this crate's own
//! `apply_used_delta` pattern generalized here to `limit` mutation
//! (there is no `apply_limit_delta` on `TrustLine` since only this
//! module ever changes `limit`, so it mutates the field directly under
//! the same version-bump discipline).

use crate::executor::LineKey;
use crate::models::equivalent::Equivalent;
use crate::models::event::{EdgePatch, EventBody};
use crate::models::trust_line::TrustLine;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct DriftConfig {
    pub growth_coefficient: f64,
    pub decay_rate_minor_units: i128,
    pub limit_min_minor_units: i128,
    pub limit_max_minor_units: i128,
    pub decay_grace_ticks: u64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            growth_coefficient: 0.01,
            decay_rate_minor_units: 100,
            limit_min_minor_units: 0,
            limit_max_minor_units: 1_000_000_00,
            decay_grace_ticks: 50,
        }
    }
}

/// Grow the limit of every edge named in `touched_edges` (the cycle the
/// clearing engine just settled), capped by `limit_max`. Returns the
/// `topology.changed` event, or `None` if no edge actually grew (empty
/// patches are suppressed per spec §4.7).
pub fn apply_growth(
    equivalent: &Equivalent,
    lines: &mut HashMap<LineKey, TrustLine>,
    touched_edges: &[LineKey],
    cleared_on_edge: &HashMap<LineKey, crate::core::decimal::Decimal>,
    config: &DriftConfig,
    tick_index: u64,
) -> Option<EventBody> {
    let mut edge_patch = EdgePatch::default();

    let mut keys: Vec<&LineKey> = touched_edges.iter().collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        let Some(line) = lines.get_mut(key) else {
            continue;
        };
        let Some(cleared) = cleared_on_edge.get(key) else {
            continue;
        };
        if !line.is_active() || !cleared.is_positive() {
            continue;
        }

        let scale = line.limit.scale();
        let limit_minor = line.limit.mantissa();
        let cleared_minor = cleared.mantissa() as f64;
        let grown = (limit_minor as f64 + config.growth_coefficient * cleared_minor).round() as i128;
        let capped = grown.min(config.limit_max_minor_units);
        if capped == limit_minor {
            continue;
        }

        line.limit = crate::core::decimal::Decimal::from_minor(capped, scale);
        line.version += 1;
        line.last_touched_tick = tick_index;
        edge_patch.upserted.push(serde_json::json!({
            "from": line.from,
            "to": line.to,
            "equivalent": equivalent.as_str(),
            "limit": line.limit.to_wire_string(),
            "version": line.version,
        }));
    }

    if edge_patch.is_empty() {
        return None;
    }
    Some(EventBody::TopologyChanged {
        reason: "trust_drift_growth".to_string(),
        equivalent: equivalent.clone(),
        edge_patch,
    })
}

/// Decay every eligible edge in `equivalent`'s graph: active, `used ==
/// 0`, and last touched at least `decay_grace_ticks` ago. Returns the
/// `topology.changed` event, or `None` if nothing decayed.
pub fn apply_decay(
    equivalent: &Equivalent,
    lines: &mut HashMap<LineKey, TrustLine>,
    config: &DriftConfig,
    tick_index: u64,
) -> Option<EventBody> {
    let mut edge_patch = EdgePatch::default();

    let mut keys: Vec<LineKey> = lines
        .iter()
        .filter(|(_, l)| &l.equivalent == equivalent)
        .map(|(k, _)| k.clone())
        .collect();
    keys.sort();

    for key in keys {
        let Some(line) = lines.get_mut(&key) else {
            continue;
        };
        if !line.is_active() || line.used.is_positive() {
            continue;
        }
        let idle_ticks = tick_index.saturating_sub(line.last_touched_tick);
        if idle_ticks < config.decay_grace_ticks {
            continue;
        }

        let scale = line.limit.scale();
        let limit_minor = line.limit.mantissa();
        let decayed = (limit_minor - config.decay_rate_minor_units).max(config.limit_min_minor_units);
        if decayed == limit_minor {
            continue;
        }

        line.limit = crate::core::decimal::Decimal::from_minor(decayed, scale);
        line.version += 1;
        edge_patch.upserted.push(serde_json::json!({
            "from": line.from,
            "to": line.to,
            "equivalent": equivalent.as_str(),
            "limit": line.limit.to_wire_string(),
            "version": line.version,
        }));
    }

    if edge_patch.is_empty() {
        return None;
    }
    Some(EventBody::TopologyChanged {
        reason: "trust_drift_decay".to_string(),
        equivalent: equivalent.clone(),
        edge_patch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decimal::{Decimal, SCALE_CENTS};
    use crate::executor::line_key;

    fn amt(s: &str) -> Decimal {
        Decimal::parse_strict(s, SCALE_CENTS).unwrap()
    }

    #[test]
    fn growth_increases_limit_capped_at_max_and_emits_patch() {
        let eq = Equivalent::new("UAH");
        let mut line = TrustLine::new("A", "B", eq.clone(), amt("100.00"));
        let key = line_key("A", "B", &eq);
        let mut lines = HashMap::new();
        lines.insert(key.clone(), line.clone());

        let mut cleared = HashMap::new();
        cleared.insert(key.clone(), amt("50.00"));

        let config = DriftConfig {
            growth_coefficient: 0.1,
            limit_max_minor_units: 10_500,
            ..DriftConfig::default()
        };
        let event = apply_growth(&eq, &mut lines, &[key.clone()], &cleared, &config, 5);
        assert!(event.is_some());
        line = lines[&key].clone();
        assert_eq!(line.limit, amt("105.00"));
        assert_eq!(line.version, 1);

        let event2 = apply_growth(&eq, &mut lines, &[key.clone()], &cleared, &config, 6);
        assert!(event2.is_none());
        assert_eq!(lines[&key].limit, amt("105.00"));
    }

    #[test]
    fn decay_skips_edges_inside_grace_period_and_with_positive_used() {
        let eq = Equivalent::new("UAH");
        let mut idle_line = TrustLine::new("A", "B", eq.clone(), amt("100.00"));
        idle_line.last_touched_tick = 0;
        let mut recent_line = TrustLine::new("B", "C", eq.clone(), amt("100.00"));
        recent_line.last_touched_tick = 95;
        let mut busy_line = TrustLine::new("C", "A", eq.clone(), amt("100.00"));
        busy_line.used = amt("10.00");
        busy_line.last_touched_tick = 0;

        let mut lines = HashMap::new();
        lines.insert(line_key("A", "B", &eq), idle_line);
        lines.insert(line_key("B", "C", &eq), recent_line);
        lines.insert(line_key("C", "A", &eq), busy_line);

        let config = DriftConfig {
            decay_rate_minor_units: 500,
            decay_grace_ticks: 50,
            ..DriftConfig::default()
        };
        let event = apply_decay(&eq, &mut lines, &config, 100);
        assert!(event.is_some());
        assert_eq!(lines[&line_key("A", "B", &eq)].limit, amt("95.00"));
        assert_eq!(lines[&line_key("B", "C", &eq)].limit, amt("100.00"));
        assert_eq!(lines[&line_key("C", "A", &eq)].limit, amt("100.00"));
    }

    #[test]
    fn decay_never_drops_below_limit_min() {
        let eq = Equivalent::new("UAH");
        let mut line = TrustLine::new("A", "B", eq.clone(), amt("1.00"));
        line.last_touched_tick = 0;
        let key = line_key("A", "B", &eq);
        let mut lines = HashMap::new();
        lines.insert(key.clone(), line);

        let config = DriftConfig {
            decay_rate_minor_units: 500,
            decay_grace_ticks: 0,
            limit_min_minor_units: 50,
            ..DriftConfig::default()
        };
        apply_decay(&eq, &mut lines, &config, 10);
        assert_eq!(lines[&key].limit, amt("0.50"));
    }

    #[test]
    fn no_eligible_edges_suppresses_the_event() {
        let eq = Equivalent::new("UAH");
        let mut line = TrustLine::new("A", "B", eq.clone(), amt("100.00"));
        line.used = amt("1.00");
        let mut lines = HashMap::new();
        lines.insert(line_key("A", "B", &eq), line);

        let config = DriftConfig::default();
        assert!(apply_decay(&eq, &mut lines, &config, 1000).is_none());
    }
}
