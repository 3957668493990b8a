//! Scenario — an immutable bundle of participants, trust lines,
//! equivalents, behavior profiles, and a timeline of events (spec §3).
//!
//! Scenario loading from disk and schema validation are out of scope
//! (spec §1): a `Scenario` here is always an already-loaded, already
//! validated input value.

use crate::core::decimal::Decimal;
use crate::inject::ScenarioEvent;
use crate::models::equivalent::Equivalent;
use crate::models::participant::Participant;
use crate::models::trust_line::TrustLine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `amount_model[eq] = {min, max, p50}` (spec §3) used by the planner's
/// triangular-distribution amount pick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountModel {
    pub min: Decimal,
    pub max: Decimal,
    pub p50: Decimal,
}

/// A named behavior profile referenced by `Participant.behavior_profile_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub id: String,
    /// Base per-tick probability of attempting a payment, before stress
    /// multipliers and clamping to `[0, 1]`.
    pub tx_rate: f64,
    pub equivalent_weights: HashMap<String, f64>,
    pub recipient_group_weights: HashMap<String, f64>,
    pub amount_model: HashMap<String, AmountModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    pub schema_version: String,
    pub participants: Vec<Participant>,
    pub trust_lines: Vec<TrustLine>,
    pub equivalents: Vec<Equivalent>,
    pub behavior_profiles: Vec<BehaviorProfile>,
    pub timeline: Vec<ScenarioEvent>,
}

impl Scenario {
    pub fn behavior_profile(&self, id: &str) -> Option<&BehaviorProfile> {
        self.behavior_profiles.iter().find(|p| p.id == id)
    }
}
