//! Payment planner — deterministic, prefix-stable candidate generation and
//! acceptance (spec §4.3).
//!
//! Grounded in the teacher's `arrivals::ArrivalGenerator`: the counterparty
//! weighting (`select_counterparty`) and priority-categorical sampling
//! (`sample_categorical`) patterns are reused almost verbatim for receiver
//! and amount selection, generalized from a per-agent Poisson arrival model
//! to the trust-line-inversion candidate model required here.

use crate::core::decimal::{Decimal, SCALE_CENTS};
use crate::models::equivalent::Equivalent;
use crate::models::participant::Participant;
use crate::models::scenario::{AmountModel, BehaviorProfile, Scenario};
use crate::models::trust_line::TrustLine;
use crate::rng::{action_rng, tick_rng};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPayment {
    pub sender: String,
    pub receiver: String,
    pub equivalent: Equivalent,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Environment-wide ceiling on any single planned amount, independent of
    /// profile or trust-line capacity.
    pub amount_cap_env: Decimal,
    pub bfs_max_depth: usize,
    pub bfs_max_nodes: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            amount_cap_env: Decimal::from_minor(10_000_000_00, SCALE_CENTS),
            bfs_max_depth: 3,
            bfs_max_nodes: 200,
        }
    }
}

/// A direct-trust-line payment candidate before acceptance filtering.
struct Candidate {
    sender: String,
    receiver: String,
    equivalent: Equivalent,
    edge_available: Decimal,
}

/// Produce the deterministic, prefix-stable ordered list of payment
/// attempts for this tick, up to `actions_budget` entries.
pub fn plan(
    scenario: &Scenario,
    lines: &[TrustLine],
    seed: u64,
    tick_index: u64,
    actions_budget: u64,
    stress_multipliers: &HashMap<Equivalent, f64>,
    config: &PlannerConfig,
) -> Vec<PlannedPayment> {
    let participants: HashMap<&str, &Participant> =
        scenario.participants.iter().map(|p| (p.pid.as_str(), p)).collect();

    let mut candidates = build_candidates(lines, &participants);

    let mut trng = tick_rng(seed, tick_index);
    let tick_seed = trng.state();
    trng.shuffle(&mut candidates);

    let adjacency = build_payment_adjacency(lines);

    let hard_cap = (50u64.saturating_mul(actions_budget)) as usize;
    let scan_len = candidates.len().min(hard_cap);

    let mut accepted = Vec::new();

    for (i, candidate) in candidates.iter().take(scan_len).enumerate() {
        if accepted.len() as u64 >= actions_budget {
            break;
        }
        let mut arng = action_rng(tick_seed, i as u64);

        let Some(sender) = participants.get(candidate.sender.as_str()) else {
            continue;
        };
        let Some(profile_id) = sender.behavior_profile_id.as_deref() else {
            continue;
        };
        let Some(profile) = scenario.behavior_profile(profile_id) else {
            continue;
        };

        // Filter 1: effective transaction rate vs stress.
        let stress = stress_multipliers.get(&candidate.equivalent).copied().unwrap_or(1.0);
        let tx_rate_eff = (profile.tx_rate * stress).clamp(0.0, 1.0);
        if tx_rate_eff < arng.uniform01() {
            continue;
        }

        // Filter 2: equivalent weight, normalized by the profile's max weight.
        let weight = profile
            .equivalent_weights
            .get(candidate.equivalent.as_str())
            .copied()
            .unwrap_or(1.0);
        let max_weight = profile
            .equivalent_weights
            .values()
            .cloned()
            .fold(0.0_f64, f64::max)
            .max(1.0);
        let ratio = (weight / max_weight).clamp(0.0, 1.0);
        if ratio < arng.uniform01() {
            continue;
        }

        // Filter 3: receiver selection via bounded BFS, weighted by recipient group.
        let Some(receiver_pid) = select_receiver(
            &candidate.sender,
            &candidate.equivalent,
            &adjacency,
            &participants,
            profile,
            &mut arng,
            config,
        ) else {
            continue;
        };

        // Filter 4: amount pick, clamped and rounded.
        let edge_capacity = if receiver_pid == candidate.receiver {
            Some(candidate.edge_available)
        } else {
            lines
                .iter()
                .find(|l| l.from == receiver_pid && l.to == candidate.sender && l.equivalent == candidate.equivalent)
                .map(|l| l.available())
        };

        let amount_model = profile.amount_model.get(candidate.equivalent.as_str());
        let raw = pick_amount(amount_model, config.amount_cap_env, &mut arng);

        let mut cap = config.amount_cap_env;
        if let Some(model) = amount_model {
            cap = cap.min(&model.max);
        }
        if let Some(edge_cap) = edge_capacity {
            cap = cap.min(&edge_cap);
        }
        let amount = raw.min(&cap);
        if !amount.is_positive() {
            continue;
        }

        accepted.push(PlannedPayment {
            sender: candidate.sender.clone(),
            receiver: receiver_pid,
            equivalent: candidate.equivalent.clone(),
            amount,
        });
    }

    accepted
}

fn build_candidates(lines: &[TrustLine], participants: &HashMap<&str, &Participant>) -> Vec<Candidate> {
    let mut sorted: Vec<&TrustLine> = lines.iter().filter(|l| l.is_active() && l.available().is_positive()).collect();
    sorted.sort_by(|a, b| (a.equivalent.as_str(), a.from.as_str(), a.to.as_str()).cmp(&(b.equivalent.as_str(), b.from.as_str(), b.to.as_str())));

    sorted
        .into_iter()
        .filter(|l| {
            participants
                .get(l.to.as_str())
                .map_or(false, |p| p.status.can_originate())
        })
        .map(|l| Candidate {
            sender: l.to.clone(),
            receiver: l.from.clone(),
            equivalent: l.equivalent.clone(),
            edge_available: l.available(),
        })
        .collect()
}

/// `sender -> sorted receivers` in payment direction (a trust line `from -> to`
/// lets `to` pay `from`), keyed by equivalent for per-equivalent isolation.
fn build_payment_adjacency(lines: &[TrustLine]) -> HashMap<Equivalent, HashMap<String, Vec<String>>> {
    let mut adjacency: HashMap<Equivalent, HashMap<String, Vec<String>>> = HashMap::new();
    for line in lines.iter().filter(|l| l.is_active()) {
        adjacency
            .entry(line.equivalent.clone())
            .or_default()
            .entry(line.to.clone())
            .or_default()
            .push(line.from.clone());
    }
    for by_sender in adjacency.values_mut() {
        for receivers in by_sender.values_mut() {
            receivers.sort();
            receivers.dedup();
        }
    }
    adjacency
}

#[allow(clippy::too_many_arguments)]
fn select_receiver(
    sender: &str,
    equivalent: &Equivalent,
    adjacency: &HashMap<Equivalent, HashMap<String, Vec<String>>>,
    participants: &HashMap<&str, &Participant>,
    profile: &BehaviorProfile,
    arng: &mut crate::rng::DeterministicRng,
    config: &PlannerConfig,
) -> Option<String> {
    let graph = adjacency.get(equivalent)?;

    let direct_neighbors: Vec<String> = graph.get(sender).cloned().unwrap_or_default();

    let mut reachable: Vec<String> = bfs_reachable(sender, graph, config.bfs_max_depth, config.bfs_max_nodes);
    if reachable.is_empty() {
        reachable = direct_neighbors;
    }
    if reachable.is_empty() {
        return None;
    }

    let total_weight: f64 = reachable
        .iter()
        .map(|pid| recipient_group_weight(pid, participants, profile))
        .sum();

    if total_weight <= 0.0 {
        return reachable.into_iter().next();
    }

    let mut target = arng.uniform01() * total_weight;
    for pid in &reachable {
        let weight = recipient_group_weight(pid, participants, profile);
        target -= weight;
        if target <= 0.0 {
            return Some(pid.clone());
        }
    }
    reachable.into_iter().last()
}

fn recipient_group_weight(pid: &str, participants: &HashMap<&str, &Participant>, profile: &BehaviorProfile) -> f64 {
    participants
        .get(pid)
        .and_then(|p| p.group_id.as_deref())
        .and_then(|g| profile.recipient_group_weights.get(g))
        .copied()
        .unwrap_or(1.0)
}

fn bfs_reachable(start: &str, graph: &HashMap<String, Vec<String>>, max_depth: usize, max_nodes: usize) -> Vec<String> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut order: Vec<String> = Vec::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    queue.push_back((start.to_string(), 0));
    visited.insert(start.to_string());

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let Some(neighbors) = graph.get(&node) else {
            continue;
        };
        for next in neighbors {
            if visited.contains(next) {
                continue;
            }
            visited.insert(next.clone());
            order.push(next.clone());
            if order.len() >= max_nodes {
                return order;
            }
            queue.push_back((next.clone(), depth + 1));
        }
    }
    order
}

fn pick_amount(model: Option<&AmountModel>, amount_cap_env: Decimal, arng: &mut crate::rng::DeterministicRng) -> Decimal {
    let draw = arng.uniform01();
    match model {
        Some(m) => {
            let min = decimal_to_f64(&m.min);
            let max = decimal_to_f64(&m.max);
            let p50 = decimal_to_f64(&m.p50);
            round_to_cents(triangular(min, p50, max, draw))
        }
        None => {
            let cap = decimal_to_f64(&amount_cap_env).max(0.10);
            round_to_cents(0.10 + draw * (cap - 0.10))
        }
    }
}

/// Inverse-CDF sample of a triangular distribution with mode `c`.
fn triangular(min: f64, c: f64, max: f64, u: f64) -> f64 {
    if max <= min {
        return min;
    }
    let fc = (c - min) / (max - min);
    if u < fc {
        min + (u * (max - min) * (c - min)).sqrt()
    } else {
        max - ((1.0 - u) * (max - min) * (max - c)).sqrt()
    }
}

fn decimal_to_f64(d: &Decimal) -> f64 {
    d.mantissa() as f64 / 10f64.powi(d.scale() as i32)
}

fn round_to_cents(x: f64) -> Decimal {
    let cents = (x * 100.0).round() as i128;
    Decimal::from_minor(cents.max(0), SCALE_CENTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::participant::{ParticipantStatus, ParticipantType};
    use crate::models::scenario::AmountModel;

    fn participant(pid: &str, profile: &str) -> Participant {
        let mut p = Participant::new(pid, pid, ParticipantType::Person);
        p.behavior_profile_id = Some(profile.to_string());
        p
    }

    fn scenario_fixture() -> (Scenario, Vec<TrustLine>) {
        let eq = Equivalent::new("UAH");
        let participants = vec![
            participant("A", "default"),
            participant("B", "default"),
            participant("C", "default"),
        ];
        let mut lines = vec![
            TrustLine::new("A", "B", eq.clone(), Decimal::parse_strict("100.00", SCALE_CENTS).unwrap()),
            TrustLine::new("B", "C", eq.clone(), Decimal::parse_strict("50.00", SCALE_CENTS).unwrap()),
            TrustLine::new("C", "A", eq.clone(), Decimal::parse_strict("75.00", SCALE_CENTS).unwrap()),
        ];
        lines.iter_mut().for_each(|l| l.version = 0);

        let mut amount_model = HashMap::new();
        amount_model.insert(
            "UAH".to_string(),
            AmountModel {
                min: Decimal::parse_strict("1.00", SCALE_CENTS).unwrap(),
                p50: Decimal::parse_strict("5.00", SCALE_CENTS).unwrap(),
                max: Decimal::parse_strict("20.00", SCALE_CENTS).unwrap(),
            },
        );
        let profile = BehaviorProfile {
            id: "default".to_string(),
            tx_rate: 0.9,
            equivalent_weights: HashMap::from([("UAH".to_string(), 1.0)]),
            recipient_group_weights: HashMap::new(),
            amount_model,
        };

        let scenario = Scenario {
            scenario_id: "s1".to_string(),
            schema_version: "1".to_string(),
            participants,
            trust_lines: lines.clone(),
            equivalents: vec![eq],
            behavior_profiles: vec![profile],
            timeline: vec![],
        };
        (scenario, lines)
    }

    #[test]
    fn same_inputs_produce_identical_plan() {
        let (scenario, lines) = scenario_fixture();
        let stress = HashMap::new();
        let config = PlannerConfig::default();

        let plan1 = plan(&scenario, &lines, 42, 7, 3, &stress, &config);
        let plan2 = plan(&scenario, &lines, 42, 7, 3, &stress, &config);
        assert_eq!(plan1, plan2);
    }

    #[test]
    fn lower_budget_plan_is_prefix_of_higher_budget_plan() {
        let (scenario, lines) = scenario_fixture();
        let stress = HashMap::new();
        let config = PlannerConfig::default();

        let small = plan(&scenario, &lines, 42, 7, 1, &stress, &config);
        let large = plan(&scenario, &lines, 42, 7, 3, &stress, &config);

        assert_eq!(&large[..small.len()], &small[..]);
    }

    #[test]
    fn amounts_never_exceed_profile_max_or_edge_capacity() {
        let (scenario, lines) = scenario_fixture();
        let stress = HashMap::new();
        let config = PlannerConfig::default();

        let planned = plan(&scenario, &lines, 1, 1, 10, &stress, &config);
        for p in &planned {
            assert!(p.amount <= Decimal::parse_strict("20.00", SCALE_CENTS).unwrap());
            assert!(p.amount.is_positive());
        }
    }
}
