//! Post-tick balance audit — detection-only anomaly check for lost
//! updates that slipped past optimistic locking (spec §4.8).
//!
//! Snapshots each participant's net position before the payment phase,
//! compares it to the actual post-phase position, and flags any
//! discrepancy beyond `tolerance`. Never rolls the tick back; this is
//! strictly an observability tap, grounded in this crate's own
//! `apply_used_delta`/clearing contracts as the thing being checked on.

use crate::core::decimal::Decimal;
use crate::executor::LineKey;
use crate::models::equivalent::Equivalent;
use crate::models::event::{AuditSeverity, EventBody, ParticipantDrift};
use crate::models::trust_line::TrustLine;
use std::collections::HashMap;

pub const TOLERANCE: f64 = 1e-8;

/// Net position snapshot: for each participant, outgoing debt minus
/// incoming debt for one equivalent, as a float (the audit only needs
/// approximate comparison against `tolerance`, never settlement-grade
/// precision).
pub fn snapshot_net_positions(lines: &HashMap<LineKey, TrustLine>, equivalent: &Equivalent) -> HashMap<String, f64> {
    let mut net: HashMap<String, f64> = HashMap::new();
    for line in lines.values() {
        if &line.equivalent != equivalent {
            continue;
        }
        let used = decimal_to_f64(&line.used);
        // `to` is the debtor: it owes `used` to `from`, so `to` carries a
        // positive outgoing position and `from` a positive incoming one.
        *net.entry(line.to.clone()).or_insert(0.0) += used;
        *net.entry(line.from.clone()).or_insert(0.0) -= used;
    }
    net
}

/// Compare a pre-phase snapshot to the post-phase actual state, given
/// the expected delta this phase should have produced per participant
/// (committed flow amounts plus clearing volume, signed the same way as
/// [`snapshot_net_positions`]). Returns `None` when every participant is
/// within `tolerance`.
pub fn check(
    equivalent: &Equivalent,
    tick_index: u64,
    before: &HashMap<String, f64>,
    after: &HashMap<String, f64>,
    expected_delta: &HashMap<String, f64>,
) -> Option<EventBody> {
    let mut participants: Vec<&String> = before.keys().chain(after.keys()).chain(expected_delta.keys()).collect();
    participants.sort();
    participants.dedup();

    let mut drifts = Vec::new();
    let mut total_drift = 0.0f64;
    let mut worst = 0.0f64;

    for pid in participants {
        let before_pos = before.get(pid).copied().unwrap_or(0.0);
        let after_pos = after.get(pid).copied().unwrap_or(0.0);
        let expected = expected_delta.get(pid).copied().unwrap_or(0.0);

        let actual_delta = after_pos - before_pos;
        let drift = actual_delta - expected;
        if drift.abs() <= TOLERANCE {
            continue;
        }

        total_drift += drift.abs();
        worst = worst.max(drift.abs());
        drifts.push(ParticipantDrift {
            participant_id: pid.clone(),
            expected_delta: format!("{expected:.8}"),
            actual_delta: format!("{actual_delta:.8}"),
            drift: format!("{drift:.8}"),
        });
    }

    if drifts.is_empty() {
        return None;
    }

    let severity = if worst > TOLERANCE * 1000.0 {
        AuditSeverity::Critical
    } else {
        AuditSeverity::Warning
    };

    Some(EventBody::AuditDrift {
        severity,
        equivalent: equivalent.clone(),
        tick_index,
        total_drift: format!("{total_drift:.8}"),
        drifts,
        source: "post_tick_audit",
    })
}

fn decimal_to_f64(d: &Decimal) -> f64 {
    d.mantissa() as f64 / 10f64.powi(d.scale() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decimal::SCALE_CENTS;
    use crate::executor::line_key;

    fn amt(s: &str) -> Decimal {
        Decimal::parse_strict(s, SCALE_CENTS).unwrap()
    }

    #[test]
    fn matching_expected_and_actual_delta_is_silent() {
        let eq = Equivalent::new("UAH");
        let mut lines = HashMap::new();
        let mut line = TrustLine::new("A", "B", eq.clone(), amt("100.00"));
        line.used = amt("10.00");
        lines.insert(line_key("A", "B", &eq), line);

        let before = snapshot_net_positions(&HashMap::new(), &eq);
        let after = snapshot_net_positions(&lines, &eq);
        let mut expected = HashMap::new();
        expected.insert("B".to_string(), 10.0);
        expected.insert("A".to_string(), -10.0);

        assert!(check(&eq, 1, &before, &after, &expected).is_none());
    }

    #[test]
    fn unexplained_delta_emits_audit_drift_with_offending_participant() {
        let eq = Equivalent::new("UAH");
        let before: HashMap<String, f64> = HashMap::new();
        let mut after = HashMap::new();
        after.insert("B".to_string(), 10.0);
        let expected: HashMap<String, f64> = HashMap::new();

        let event = check(&eq, 7, &before, &after, &expected).unwrap();
        match event {
            EventBody::AuditDrift { tick_index, drifts, severity, .. } => {
                assert_eq!(tick_index, 7);
                assert_eq!(drifts.len(), 1);
                assert_eq!(drifts[0].participant_id, "B");
                assert_eq!(severity, AuditSeverity::Warning);
            }
            _ => panic!("expected AuditDrift"),
        }
    }

    #[test]
    fn lost_update_prevention_scenario_has_no_drift() {
        // Triangular debt A->B=100, B->C=100, C->A=100: clearing clears 30 off
        // each edge while a payment adds 50 to A->B. Final A->B = 120.
        let eq = Equivalent::new("UAH");
        let mut lines = HashMap::new();
        for (creditor, debtor, used) in [("A", "B", "120.00"), ("B", "C", "70.00"), ("C", "A", "70.00")] {
            let mut line = TrustLine::new(creditor, debtor, eq.clone(), amt("200.00"));
            line.used = amt(used);
            lines.insert(line_key(creditor, debtor, &eq), line);
        }
        // Pre-tick, before the payment and the clearing: a symmetric
        // A->B=100, B->C=100, C->A=100 cycle nets everyone to zero.
        let before: HashMap<String, f64> = [("A".to_string(), 0.0), ("B".to_string(), 0.0), ("C".to_string(), 0.0)]
            .into_iter()
            .collect();
        let after = snapshot_net_positions(&lines, &eq);
        // Clearing moves debt around a closed cycle, so it never changes
        // any participant's net position; only the 50 added to A->B does.
        // A (creditor on that edge) nets -50, B (debtor) nets +50, C untouched.
        let expected: HashMap<String, f64> = [("A".to_string(), -50.0), ("B".to_string(), 50.0), ("C".to_string(), 0.0)]
            .into_iter()
            .collect();

        assert!(check(&eq, 1, &before, &after, &expected).is_none());
    }
}
