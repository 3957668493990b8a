//! Clearing engine — per-equivalent cycle discovery and atomic settlement
//! (spec §4.5).
//!
//! Grounded in the teacher's `settlement::lsm` module: the bounded-depth
//! cycle search here generalizes the teacher's `AggregatedGraph`/
//! `SccFinder` pipeline (Tarjan prefilter + triangle enumeration) down to
//! a single bounded DFS appropriate for the smaller per-equivalent debt
//! graphs this engine clears, while keeping the teacher's habit of
//! deterministic, lexicographically sorted vertex iteration.

use crate::core::decimal::Decimal;
use crate::executor::{line_key, LineKey};
use crate::models::event::{ClearingStep, EdgePatch, EventBody, NodePatch};
use crate::models::equivalent::Equivalent;
use crate::models::trust_line::TrustLine;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ClearingConfig {
    pub max_depth: usize,
    pub time_budget_ms: u64,
}

impl Default for ClearingConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            time_budget_ms: 200,
        }
    }
}

#[derive(Debug, Default)]
pub struct ClearingOutcome {
    pub events: Vec<EventBody>,
    pub cleared_cycles: u64,
    pub cleared_amount: Decimal,
    pub cost: Duration,
    /// Amount cleared per edge this tick, summed across every cycle that
    /// touched it. Consumed by the trust-drift engine's growth pass
    /// (spec §4.7 "for each touched edge, `limit += growth_coefficient *
    /// cleared_on_edge`").
    pub cleared_on_edge: HashMap<LineKey, Decimal>,
}

/// Discover and settle debt cycles for one equivalent. `plan_id` is
/// supplied by the caller (the orchestrator) so cross-equivalent plan ids
/// stay unique without this module needing a global counter.
pub fn run_for_equivalent(
    equivalent: &Equivalent,
    lines: &mut HashMap<LineKey, TrustLine>,
    config: &ClearingConfig,
    plan_id: String,
    tick_index: u64,
) -> ClearingOutcome {
    let started = Instant::now();
    let scale = lines.values().next().map(|l| l.used.scale()).unwrap_or(2);
    let mut outcome = ClearingOutcome {
        cleared_amount: Decimal::zero(scale),
        ..Default::default()
    };

    let graph = build_debt_graph(lines, equivalent);
    if graph.is_empty() {
        return outcome;
    }

    let mut starts: Vec<String> = graph.keys().cloned().collect();
    starts.sort();

    let mut steps = Vec::new();
    let mut cycle_edges: Vec<String> = Vec::new();
    let mut edge_patch = EdgePatch::default();
    let mut settled_nodes: HashSet<String> = HashSet::new();

    for start in &starts {
        if started.elapsed() > Duration::from_millis(config.time_budget_ms) {
            break;
        }
        if settled_nodes.contains(start) {
            continue;
        }
        let Some(cycle) = find_cycle(&graph, start, config.max_depth) else {
            continue;
        };

        let clearable = cycle_clearable_amount(&cycle, lines, equivalent);
        if !clearable.is_positive() {
            continue;
        }

        for pair in cycle_edge_pairs(&cycle) {
            let (debtor, creditor) = pair;
            let key = line_key(&creditor, &debtor, equivalent);
            if let Some(line) = lines.get_mut(&key) {
                let version = line.version;
                let negated = Decimal::zero(line.used.scale())
                    .checked_sub(&clearable)
                    .unwrap_or_else(|| Decimal::zero(line.used.scale()));
                let _ = line.apply_used_delta(version, negated, tick_index);
                let entry = outcome
                    .cleared_on_edge
                    .entry(key.clone())
                    .or_insert_with(|| Decimal::zero(clearable.scale()));
                *entry = entry.checked_add(&clearable).unwrap_or(*entry);
                let edge_label = format!("{creditor}->{debtor}");
                cycle_edges.push(edge_label.clone());
                edge_patch.upserted.push(serde_json::json!({
                    "from": creditor,
                    "to": debtor,
                    "equivalent": equivalent.as_str(),
                    "used": line.used.to_wire_string(),
                    "version": line.version,
                }));
                steps.push(ClearingStep {
                    from: creditor,
                    to: debtor,
                    amount: clearable.to_wire_string(),
                    highlight_edges: Some(vec![edge_label]),
                    particles_edges: None,
                });
            }
        }

        for node in &cycle {
            settled_nodes.insert(node.clone());
        }
        outcome.cleared_cycles += 1;
        outcome.cleared_amount = outcome.cleared_amount.checked_add(&clearable).unwrap_or(outcome.cleared_amount);
    }

    outcome.cost = started.elapsed();

    if outcome.cleared_cycles > 0 {
        outcome.events.push(EventBody::ClearingPlan {
            plan_id: plan_id.clone(),
            equivalent: equivalent.clone(),
            steps,
        });
        outcome.events.push(EventBody::ClearingDone {
            plan_id,
            equivalent: equivalent.clone(),
            cleared_cycles: outcome.cleared_cycles,
            cleared_amount: outcome.cleared_amount.to_wire_string(),
            cycle_edges,
            node_patch: NodePatch::default(),
            edge_patch,
        });
    }

    outcome
}

/// `debtor -> creditor` adjacency restricted to edges with `used > 0`
/// (spec §4.5 "starting from debt edges with used > 0").
fn build_debt_graph(lines: &HashMap<LineKey, TrustLine>, equivalent: &Equivalent) -> HashMap<String, Vec<String>> {
    let mut graph: HashMap<String, Vec<String>> = HashMap::new();
    for line in lines.values() {
        if &line.equivalent != equivalent || !line.used.is_positive() {
            continue;
        }
        graph.entry(line.to.clone()).or_default().push(line.from.clone());
    }
    for neighbors in graph.values_mut() {
        neighbors.sort();
        neighbors.dedup();
    }
    graph
}

/// Bounded DFS from `start`, returning the first closed cycle found
/// (node list, `start` not repeated at the end).
fn find_cycle(graph: &HashMap<String, Vec<String>>, start: &str, max_depth: usize) -> Option<Vec<String>> {
    let mut path = vec![start.to_string()];
    let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
    dfs_step(graph, start, &mut path, &mut visited, max_depth)
}

fn dfs_step(
    graph: &HashMap<String, Vec<String>>,
    start: &str,
    path: &mut Vec<String>,
    visited: &mut HashSet<String>,
    max_depth: usize,
) -> Option<Vec<String>> {
    if path.len() > max_depth {
        return None;
    }
    let current = path.last().unwrap().clone();
    let Some(neighbors) = graph.get(&current) else {
        return None;
    };
    for next in neighbors {
        if next == start && path.len() >= 2 {
            return Some(path.clone());
        }
        if visited.contains(next) {
            continue;
        }
        visited.insert(next.clone());
        path.push(next.clone());
        if let Some(cycle) = dfs_step(graph, start, path, visited, max_depth) {
            return Some(cycle);
        }
        path.pop();
        visited.remove(next);
    }
    None
}

/// Consecutive `(debtor, creditor)` pairs around the closed cycle,
/// including the edge that closes it back to the first node.
fn cycle_edge_pairs(cycle: &[String]) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(cycle.len());
    for i in 0..cycle.len() {
        let debtor = cycle[i].clone();
        let creditor = cycle[(i + 1) % cycle.len()].clone();
        pairs.push((debtor, creditor));
    }
    pairs
}

fn cycle_clearable_amount(cycle: &[String], lines: &HashMap<LineKey, TrustLine>, equivalent: &Equivalent) -> Decimal {
    let mut min_used: Option<Decimal> = None;
    for (debtor, creditor) in cycle_edge_pairs(cycle) {
        let key = line_key(&creditor, &debtor, equivalent);
        let used = lines.get(&key).map(|l| l.used).unwrap_or_else(|| Decimal::zero(2));
        min_used = Some(match min_used {
            Some(m) => m.min(&used),
            None => used,
        });
    }
    min_used.unwrap_or_else(|| Decimal::zero(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decimal::SCALE_CENTS;

    fn amt(s: &str) -> Decimal {
        Decimal::parse_strict(s, SCALE_CENTS).unwrap()
    }

    fn triangle() -> (Equivalent, HashMap<LineKey, TrustLine>) {
        let eq = Equivalent::new("UAH");
        let mut lines = HashMap::new();
        for (creditor, debtor, used) in [("A", "B", "100.00"), ("B", "C", "100.00"), ("C", "A", "100.00")] {
            let mut line = TrustLine::new(creditor, debtor, eq.clone(), amt("200.00"));
            line.used = amt(used);
            lines.insert(line_key(creditor, debtor, &eq), line);
        }
        (eq, lines)
    }

    #[test]
    fn settles_a_closed_triangle_down_to_zero() {
        let (eq, mut lines) = triangle();
        let config = ClearingConfig::default();
        let outcome = run_for_equivalent(&eq, &mut lines, &config, "plan-1".to_string(), 1);

        assert_eq!(outcome.cleared_cycles, 1);
        assert_eq!(outcome.cleared_amount, amt("100.00"));
        for line in lines.values() {
            assert_eq!(line.used, Decimal::zero(SCALE_CENTS));
        }
        assert_eq!(outcome.events.len(), 2);
    }

    #[test]
    fn no_cycle_yields_no_events_and_zero_volume() {
        let eq = Equivalent::new("UAH");
        let mut lines = HashMap::new();
        let mut line = TrustLine::new("A", "B", eq.clone(), amt("200.00"));
        line.used = amt("50.00");
        lines.insert(line_key("A", "B", &eq), line);

        let config = ClearingConfig::default();
        let outcome = run_for_equivalent(&eq, &mut lines, &config, "plan-2".to_string(), 1);

        assert_eq!(outcome.cleared_cycles, 0);
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn settles_uneven_triangle_by_the_minimum_edge() {
        let eq = Equivalent::new("UAH");
        let mut lines = HashMap::new();
        for (creditor, debtor, used) in [("A", "B", "80.00"), ("B", "C", "50.00"), ("C", "A", "100.00")] {
            let mut line = TrustLine::new(creditor, debtor, eq.clone(), amt("200.00"));
            line.used = amt(used);
            lines.insert(line_key(creditor, debtor, &eq), line);
        }
        let config = ClearingConfig::default();
        let outcome = run_for_equivalent(&eq, &mut lines, &config, "plan-3".to_string(), 1);

        assert_eq!(outcome.cleared_amount, amt("50.00"));
        assert_eq!(lines[&line_key("A", "B", &eq)].used, amt("30.00"));
        assert_eq!(lines[&line_key("B", "C", &eq)].used, Decimal::zero(SCALE_CENTS));
        assert_eq!(lines[&line_key("C", "A", &eq)].used, amt("50.00"));
    }
}
