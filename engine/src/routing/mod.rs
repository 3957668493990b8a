//! Routing port — the abstract capability consumed by the executor and
//! (for target-listing) the HTTP surface (spec §4.10).
//!
//! The in-memory implementation here keys an adjacency+capacity cache by
//! equivalent; inject, drift, and the executor all call `invalidate` on
//! relevant mutations so the routing graph never serves stale capacity
//! across those writers (spec §5 "Routing cache").

use crate::core::decimal::Decimal;
use crate::models::equivalent::Equivalent;
use crate::models::trust_line::TrustLine;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RoutingError {
    #[error("no route from {sender} to {receiver}")]
    NoRoute { sender: String, receiver: String },
    #[error("insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: String, available: String },
}

/// A single hop of a discovered route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteHop {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub hops: Vec<RouteHop>,
    pub bottleneck_capacity: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTarget {
    pub to_pid: String,
    pub hops: usize,
}

/// The capability surface consumed by the executor, planner, and the
/// HTTP surface's target-listing endpoint.
pub trait RoutingPort {
    fn find_route(
        &mut self,
        sender: &str,
        receiver: &str,
        equivalent: &Equivalent,
        amount: &Decimal,
    ) -> Result<Route, RoutingError>;

    fn payment_targets(
        &mut self,
        sender: &str,
        equivalent: &Equivalent,
        max_hops: usize,
        limit: usize,
    ) -> Vec<PaymentTarget>;

    fn invalidate(&mut self, equivalent: &Equivalent);
}

/// Adjacency list keyed by sender, built fresh on each cache miss from the
/// trust-line set for one equivalent. Direct single-hop routing only: the
/// spec explicitly excludes general multi-hop max-flow routing (spec §1
/// Non-goals); a trust-line `to -> from` only yields a usable route when
/// the payment direction `sender -> receiver` matches an existing edge
/// `receiver -> sender` (the creditor extending trust to the sender).
#[derive(Debug, Default)]
struct GraphCache {
    /// `to` (debtor/sender-of-payment) -> list of `(from/receiver, available)`
    adjacency: HashMap<String, Vec<(String, Decimal)>>,
}

/// The default in-memory routing cache, one instance per run.
#[derive(Debug, Default)]
pub struct InMemoryRoutingCache {
    by_equivalent: HashMap<Equivalent, GraphCache>,
}

impl InMemoryRoutingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the adjacency cache for `equivalent` from the authoritative
    /// trust-line set. Called lazily on first use after construction or
    /// invalidation.
    pub fn rebuild(&mut self, equivalent: &Equivalent, lines: &[&TrustLine]) {
        let mut adjacency: HashMap<String, Vec<(String, Decimal)>> = HashMap::new();
        for line in lines {
            if line.equivalent != *equivalent || !line.is_active() {
                continue;
            }
            // `from` trusts `to`: a payment from `to` to `from` is possible
            // up to `available()`.
            adjacency
                .entry(line.to.clone())
                .or_default()
                .push((line.from.clone(), line.available()));
        }
        self.by_equivalent
            .insert(equivalent.clone(), GraphCache { adjacency });
    }

    fn graph_for(&self, equivalent: &Equivalent) -> Option<&GraphCache> {
        self.by_equivalent.get(equivalent)
    }
}

impl RoutingPort for InMemoryRoutingCache {
    fn find_route(
        &mut self,
        sender: &str,
        receiver: &str,
        equivalent: &Equivalent,
        amount: &Decimal,
    ) -> Result<Route, RoutingError> {
        let graph = self.graph_for(equivalent).ok_or_else(|| RoutingError::NoRoute {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
        })?;

        let candidates = graph.adjacency.get(sender).ok_or_else(|| RoutingError::NoRoute {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
        })?;

        let (_, available) = candidates
            .iter()
            .find(|(to, _)| to == receiver)
            .ok_or_else(|| RoutingError::NoRoute {
                sender: sender.to_string(),
                receiver: receiver.to_string(),
            })?;

        if amount > available {
            return Err(RoutingError::InsufficientCapacity {
                requested: amount.to_wire_string(),
                available: available.to_wire_string(),
            });
        }

        Ok(Route {
            hops: vec![RouteHop {
                from: sender.to_string(),
                to: receiver.to_string(),
            }],
            bottleneck_capacity: *available,
        })
    }

    fn payment_targets(
        &mut self,
        sender: &str,
        equivalent: &Equivalent,
        max_hops: usize,
        limit: usize,
    ) -> Vec<PaymentTarget> {
        let Some(graph) = self.graph_for(equivalent) else {
            return Vec::new();
        };
        let _ = max_hops; // single-hop routing only (spec §1 Non-goals)
        graph
            .adjacency
            .get(sender)
            .map(|targets| {
                targets
                    .iter()
                    .filter(|(_, available)| available.is_positive())
                    .take(limit)
                    .map(|(to, _)| PaymentTarget {
                        to_pid: to.clone(),
                        hops: 1,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn invalidate(&mut self, equivalent: &Equivalent) {
        self.by_equivalent.remove(equivalent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decimal::SCALE_CENTS;

    fn amt(s: &str) -> Decimal {
        Decimal::parse_strict(s, SCALE_CENTS).unwrap()
    }

    #[test]
    fn finds_route_when_capacity_sufficient() {
        let eq = Equivalent::new("UAH");
        let line = TrustLine::new("A", "B", eq.clone(), amt("100.00"));
        let mut cache = InMemoryRoutingCache::new();
        cache.rebuild(&eq, &[&line]);

        let route = cache.find_route("B", "A", &eq, &amt("50.00")).unwrap();
        assert_eq!(route.hops.len(), 1);
    }

    #[test]
    fn rejects_over_capacity() {
        let eq = Equivalent::new("UAH");
        let mut line = TrustLine::new("A", "B", eq.clone(), amt("100.00"));
        line.used = amt("90.00");
        let mut cache = InMemoryRoutingCache::new();
        cache.rebuild(&eq, &[&line]);

        let err = cache.find_route("B", "A", &eq, &amt("50.00")).unwrap_err();
        assert!(matches!(err, RoutingError::InsufficientCapacity { .. }));
    }

    #[test]
    fn invalidate_forces_rebuild() {
        let eq = Equivalent::new("UAH");
        let mut cache = InMemoryRoutingCache::new();
        assert!(cache.find_route("B", "A", &eq, &amt("1.00")).is_err());
        cache.invalidate(&eq);
        assert!(cache.graph_for(&eq).is_none());
    }
}
