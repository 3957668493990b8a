//! Payment executor — route, apply flow under optimistic locking, and emit
//! `tx.updated`/`tx.failed` with contiguous per-tick sequence numbers
//! (spec §4.4).
//!
//! Grounded in the teacher's `settlement::rtgs` retry-then-fail shape and
//! the `TrustLine::apply_used_delta` optimistic-lock contract defined in
//! this crate; generalized from RTGS queue draining to per-attempt routed
//! payments.

use crate::core::decimal::Decimal;
use crate::models::equivalent::Equivalent;
use crate::models::event::EventBody;
use crate::models::trust_line::TrustLine;
use crate::planner::PlannedPayment;
use crate::routing::{RoutingError, RoutingPort};
use std::collections::HashMap;
use std::fmt;

const MAX_OPTIMISTIC_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionCode {
    RoutingNoCapacity,
    InvalidAmount,
    PaymentTimeout,
    InternalError,
    PaymentRejected,
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectionCode::RoutingNoCapacity => "ROUTING_NO_CAPACITY",
            RejectionCode::InvalidAmount => "INVALID_AMOUNT",
            RejectionCode::PaymentTimeout => "PAYMENT_TIMEOUT",
            RejectionCode::InternalError => "INTERNAL_ERROR",
            RejectionCode::PaymentRejected => "PAYMENT_REJECTED",
        };
        write!(f, "{s}")
    }
}

/// Key identifying a trust line for the executor's live-state lookup.
pub type LineKey = (String, String, String);

pub fn line_key(creditor: &str, debtor: &str, equivalent: &Equivalent) -> LineKey {
    (creditor.to_string(), debtor.to_string(), equivalent.as_str().to_string())
}

#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    pub events: Vec<EventBody>,
    pub committed: u64,
    pub rejected: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub rejection_codes_by_eq: HashMap<Equivalent, HashMap<RejectionCode, u64>>,
    /// Per-equivalent committed count, needed by the adaptive policy's
    /// `attempted_payments_tick = committed + rejected + errors + timeouts`
    /// signal (spec §4.6), which is scoped per equivalent, not global.
    pub committed_by_eq: HashMap<Equivalent, u64>,
}

impl ExecutionOutcome {
    fn record_rejection(&mut self, equivalent: &Equivalent, code: RejectionCode) {
        *self
            .rejection_codes_by_eq
            .entry(equivalent.clone())
            .or_default()
            .entry(code)
            .or_insert(0) += 1;
        match code {
            RejectionCode::PaymentTimeout => {
                self.errors += 1;
                self.timeouts += 1;
            }
            RejectionCode::InternalError => self.errors += 1,
            _ => self.rejected += 1,
        }
    }

    fn record_commit(&mut self, equivalent: &Equivalent) {
        self.committed += 1;
        *self.committed_by_eq.entry(equivalent.clone()).or_insert(0) += 1;
    }

    /// Total attempts recorded against `equivalent` this tick (spec §4.6
    /// `attempted_payments_tick`).
    pub fn attempted_for(&self, equivalent: &Equivalent) -> u64 {
        let committed = self.committed_by_eq.get(equivalent).copied().unwrap_or(0);
        let rejected: u64 = self
            .rejection_codes_by_eq
            .get(equivalent)
            .map(|by_code| by_code.values().sum())
            .unwrap_or(0);
        committed + rejected
    }

    /// `rejected_no_capacity_tick` for `equivalent` (spec §4.6).
    pub fn rejected_no_capacity_for(&self, equivalent: &Equivalent) -> u64 {
        self.rejection_codes_by_eq
            .get(equivalent)
            .and_then(|by_code| by_code.get(&RejectionCode::RoutingNoCapacity))
            .copied()
            .unwrap_or(0)
    }
}

/// Attempt every planned payment in order, mutating `lines` in place.
/// `seq` is the attempt's position within `attempts`, which callers must
/// pass through as-is to preserve the contiguous `0..N` emission contract.
pub fn run<R: RoutingPort>(
    attempts: &[PlannedPayment],
    lines: &mut HashMap<LineKey, TrustLine>,
    routing: &mut R,
    tick_index: u64,
) -> ExecutionOutcome {
    let mut outcome = ExecutionOutcome::default();

    for (seq, attempt) in attempts.iter().enumerate() {
        let seq = seq as u64;
        let tx_id = format!("{tick_index}-{seq}");

        if !attempt.amount.is_positive() {
            outcome.record_rejection(&attempt.equivalent, RejectionCode::InvalidAmount);
            outcome.events.push(failed_event(tick_index, seq, &tx_id, attempt, RejectionCode::InvalidAmount));
            continue;
        }

        let route = routing.find_route(&attempt.sender, &attempt.receiver, &attempt.equivalent, &attempt.amount);
        let code = match route {
            Ok(_) => None,
            Err(RoutingError::NoRoute { .. }) | Err(RoutingError::InsufficientCapacity { .. }) => {
                Some(RejectionCode::RoutingNoCapacity)
            }
        };
        if let Some(code) = code {
            outcome.record_rejection(&attempt.equivalent, code);
            outcome.events.push(failed_event(tick_index, seq, &tx_id, attempt, code));
            continue;
        }

        let key = line_key(&attempt.receiver, &attempt.sender, &attempt.equivalent);
        match apply_with_retry(lines.get_mut(&key), attempt.amount, tick_index) {
            Ok(()) => {
                routing.invalidate(&attempt.equivalent);
                outcome.record_commit(&attempt.equivalent);
                outcome.events.push(EventBody::TxUpdated {
                    tick_index,
                    seq,
                    tx_id,
                    from: attempt.sender.clone(),
                    to: attempt.receiver.clone(),
                    equivalent: attempt.equivalent.clone(),
                    amount: attempt.amount.to_wire_string(),
                });
            }
            Err(code) => {
                outcome.record_rejection(&attempt.equivalent, code);
                outcome.events.push(failed_event(tick_index, seq, &tx_id, attempt, code));
            }
        }
    }

    outcome
}

fn failed_event(tick_index: u64, seq: u64, tx_id: &str, attempt: &PlannedPayment, code: RejectionCode) -> EventBody {
    EventBody::TxFailed {
        tick_index,
        seq,
        tx_id: tx_id.to_string(),
        from: attempt.sender.clone(),
        to: attempt.receiver.clone(),
        equivalent: attempt.equivalent.clone(),
        amount: attempt.amount.to_wire_string(),
        rejection_code: code.to_string(),
    }
}

/// Increase the trust line's `used` by `amount` under optimistic locking,
/// retrying on a stale version up to `MAX_OPTIMISTIC_RETRIES` times
/// (spec §4.4 step 2).
fn apply_with_retry(line: Option<&mut TrustLine>, amount: Decimal, tick_index: u64) -> Result<(), RejectionCode> {
    let Some(line) = line else {
        return Err(RejectionCode::RoutingNoCapacity);
    };

    for _ in 0..=MAX_OPTIMISTIC_RETRIES {
        let observed = line.version;
        match line.apply_used_delta(observed, amount, tick_index) {
            Ok(_) => return Ok(()),
            Err(crate::models::trust_line::TrustLineError::StaleVersion { .. }) => continue,
            Err(crate::models::trust_line::TrustLineError::WouldExceedLimit { .. }) => {
                return Err(RejectionCode::RoutingNoCapacity)
            }
            Err(crate::models::trust_line::TrustLineError::NotActive { .. }) => {
                return Err(RejectionCode::PaymentRejected)
            }
        }
    }
    Err(RejectionCode::PaymentRejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decimal::SCALE_CENTS;
    use crate::models::equivalent::Equivalent;
    use crate::routing::InMemoryRoutingCache;

    fn amt(s: &str) -> Decimal {
        Decimal::parse_strict(s, SCALE_CENTS).unwrap()
    }

    #[test]
    fn commits_within_capacity_and_emits_tx_updated() {
        let eq = Equivalent::new("UAH");
        let line = TrustLine::new("creditor", "debtor", eq.clone(), amt("100.00"));
        let mut lines = HashMap::new();
        lines.insert(line_key("creditor", "debtor", &eq), line.clone());

        let mut routing = InMemoryRoutingCache::new();
        routing.rebuild(&eq, &[&line]);

        let attempts = vec![PlannedPayment {
            sender: "debtor".to_string(),
            receiver: "creditor".to_string(),
            equivalent: eq.clone(),
            amount: amt("10.00"),
        }];

        let outcome = run(&attempts, &mut lines, &mut routing, 1);
        assert_eq!(outcome.committed, 1);
        assert_eq!(outcome.rejected, 0);
        assert!(matches!(outcome.events[0], EventBody::TxUpdated { .. }));
        assert_eq!(lines[&line_key("creditor", "debtor", &eq)].used, amt("10.00"));
    }

    #[test]
    fn rejects_and_counts_routing_no_capacity_when_no_route() {
        let eq = Equivalent::new("UAH");
        let mut lines = HashMap::new();
        let mut routing = InMemoryRoutingCache::new();

        let attempts = vec![PlannedPayment {
            sender: "debtor".to_string(),
            receiver: "creditor".to_string(),
            equivalent: eq.clone(),
            amount: amt("10.00"),
        }];

        let outcome = run(&attempts, &mut lines, &mut routing, 1);
        assert_eq!(outcome.rejected, 1);
        assert_eq!(
            outcome.rejection_codes_by_eq[&eq][&RejectionCode::RoutingNoCapacity],
            1
        );
        assert!(matches!(outcome.events[0], EventBody::TxFailed { .. }));
    }

    #[test]
    fn seq_numbers_are_contiguous_per_tick() {
        let eq = Equivalent::new("UAH");
        let mut lines = HashMap::new();
        let mut routing = InMemoryRoutingCache::new();
        let attempts: Vec<PlannedPayment> = (0..3)
            .map(|_| PlannedPayment {
                sender: "debtor".to_string(),
                receiver: "creditor".to_string(),
                equivalent: eq.clone(),
                amount: amt("10.00"),
            })
            .collect();

        let outcome = run(&attempts, &mut lines, &mut routing, 5);
        let seqs: Vec<u64> = outcome
            .events
            .iter()
            .map(|e| match e {
                EventBody::TxFailed { seq, .. } => *seq,
                EventBody::TxUpdated { seq, .. } => *seq,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }
}
