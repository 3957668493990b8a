//! Event — the tagged union streamed to observers (spec §3, §4.9).
//!
//! Every event carries `event_id` (monotone within a run), `ts` (ISO
//! UTC), and `type`. Domain events additionally carry `equivalent`.
//! Adding a new variant must stay backward compatible (spec §9 "Event
//! taxonomy is open") — UIs ignore unknown `type` values.
//!
//! Wire-alias invariant (spec §4.9): any field carrying a "from" concept
//! is emitted as the literal JSON key `"from"`. Rust does not reserve
//! `from` as an identifier, so the struct field is simply named `from`
//! with no `#[serde(rename)]` required — but the field is never renamed
//! to `from_` or anything else even if a future refactor is tempted to,
//! since that would break the wire contract tested in spec §8.

use crate::models::equivalent::Equivalent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Stopping,
    Stopped,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDrift {
    pub participant_id: String,
    pub expected_delta: String,
    pub actual_delta: String,
    pub drift: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearingStep {
    pub from: String,
    pub to: String,
    pub amount: String,
    pub highlight_edges: Option<Vec<String>>,
    pub particles_edges: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EdgePatch {
    pub upserted: Vec<serde_json::Value>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodePatch {
    pub upserted: Vec<serde_json::Value>,
    pub removed: Vec<String>,
}

impl EdgePatch {
    pub fn is_empty(&self) -> bool {
        self.upserted.is_empty() && self.removed.is_empty()
    }
}

/// The tagged event union. `event_id` and `ts` are assigned by the
/// emitter at append time, not by the producing component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventBody {
    #[serde(rename = "run_status")]
    RunStatus {
        run_id: String,
        scenario_id: String,
        state: RunState,
        sim_time_ms: u64,
        intensity_percent: i32,
        ops_sec: f64,
        queue_depth: u64,
        last_event_type: Option<String>,
        current_phase: Option<String>,
        last_error: Option<LastError>,
        errors_total: u64,
        errors_last_1m: u64,
        committed_total: u64,
        rejected_total: u64,
        timeouts_total: u64,
    },

    #[serde(rename = "tx.updated")]
    TxUpdated {
        tick_index: u64,
        seq: u64,
        tx_id: String,
        from: String,
        to: String,
        equivalent: Equivalent,
        amount: String,
    },

    #[serde(rename = "tx.failed")]
    TxFailed {
        tick_index: u64,
        seq: u64,
        tx_id: String,
        from: String,
        to: String,
        equivalent: Equivalent,
        amount: String,
        rejection_code: String,
    },

    #[serde(rename = "clearing.plan")]
    ClearingPlan {
        plan_id: String,
        equivalent: Equivalent,
        steps: Vec<ClearingStep>,
    },

    #[serde(rename = "clearing.done")]
    ClearingDone {
        plan_id: String,
        equivalent: Equivalent,
        cleared_cycles: u64,
        cleared_amount: String,
        cycle_edges: Vec<String>,
        node_patch: NodePatch,
        edge_patch: EdgePatch,
    },

    #[serde(rename = "topology.changed")]
    TopologyChanged {
        reason: String,
        equivalent: Equivalent,
        edge_patch: EdgePatch,
    },

    #[serde(rename = "audit.drift")]
    AuditDrift {
        severity: AuditSeverity,
        equivalent: Equivalent,
        tick_index: u64,
        total_drift: String,
        drifts: Vec<ParticipantDrift>,
        source: &'static str,
    },
}

impl EventBody {
    /// Short discriminator used for `run_status.last_event_type` and for
    /// ring-buffer priority decisions (`run_status` is never dropped).
    pub fn type_name(&self) -> &'static str {
        match self {
            EventBody::RunStatus { .. } => "run_status",
            EventBody::TxUpdated { .. } => "tx.updated",
            EventBody::TxFailed { .. } => "tx.failed",
            EventBody::ClearingPlan { .. } => "clearing.plan",
            EventBody::ClearingDone { .. } => "clearing.done",
            EventBody::TopologyChanged { .. } => "topology.changed",
            EventBody::AuditDrift { .. } => "audit.drift",
        }
    }

    /// `run_status` carries priority: it must never be dropped under
    /// backpressure (spec §4.9).
    pub fn is_high_priority(&self) -> bool {
        matches!(self, EventBody::RunStatus { .. })
    }
}

/// A fully addressed event: the envelope the ring buffer stores and the
/// emitter frames onto SSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: u64,
    pub ts: String,
    #[serde(flatten)]
    pub body: EventBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_updated_serializes_from_as_literal_key() {
        let event = Event {
            event_id: 1,
            ts: "2026-07-28T00:00:00Z".to_string(),
            body: EventBody::TxUpdated {
                tick_index: 0,
                seq: 0,
                tx_id: "tx1".to_string(),
                from: "alice".to_string(),
                to: "bob".to_string(),
                equivalent: Equivalent::new("UAH"),
                amount: "1.00".to_string(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["from"], serde_json::json!("alice"));
        assert_eq!(json["type"], serde_json::json!("tx.updated"));
    }

    #[test]
    fn run_status_is_high_priority() {
        let body = EventBody::RunStatus {
            run_id: "r1".to_string(),
            scenario_id: "s1".to_string(),
            state: RunState::Running,
            sim_time_ms: 0,
            intensity_percent: 30,
            ops_sec: 0.0,
            queue_depth: 0,
            last_event_type: None,
            current_phase: None,
            last_error: None,
            errors_total: 0,
            errors_last_1m: 0,
            committed_total: 0,
            rejected_total: 0,
            timeouts_total: 0,
        };
        assert!(body.is_high_priority());
        assert_eq!(body.type_name(), "run_status");
    }
}
