//! Credit-network economic simulator — core engine.
//!
//! Drives a credit-clearing network (participants linked by directional
//! trust lines with finite credit limits) through discrete time, generating
//! payment attempts and periodic debt-clearing cycles, and streaming the
//! resulting events to one or more observers.
//!
//! # Architecture
//!
//! - **core**: virtual time and fixed-point decimal handling
//! - **rng**: deterministic, cross-language-reproducible random number generation
//! - **models**: domain types (Participant, TrustLine, Equivalent, Scenario, Run, Event, Owner)
//! - **planner**: deterministic, prefix-stable payment candidate generation
//! - **routing**: the routing port consumed by the executor and clearing engine
//! - **executor**: route+commit payment execution with optimistic concurrency
//! - **clearing**: cycle discovery and settlement
//! - **policy**: the adaptive clearing decision controller
//! - **drift**: trust-limit growth and decay
//! - **inject**: timed scenario-event execution
//! - **audit**: post-tick balance drift detection
//! - **emitter**: event serialization, ring buffer, fan-out
//! - **metrics**: per-tick time-series sampling
//! - **registry**: owner/run identity and lifecycle
//! - **orchestrator**: per-tick phase sequencing composing all of the above
//! - **error**: crate-wide error taxonomy
//!
//! # Critical invariants
//!
//! 1. All monetary amounts are fixed-point decimals, never floats.
//! 2. All randomness is deterministic (seeded, hash-derived per tick/index).
//! 3. Exactly one tick is in flight at a time for a given run.
//! 4. `event_id` is strictly monotone per run; `seq` is contiguous per tick.

pub mod core;
pub mod rng;
pub mod models;
pub mod planner;
pub mod routing;
pub mod executor;
pub mod clearing;
pub mod policy;
pub mod drift;
pub mod inject;
pub mod audit;
pub mod emitter;
pub mod metrics;
pub mod registry;
pub mod orchestrator;
pub mod error;

pub use core::decimal::Decimal;
pub use core::time::VirtualClock;
pub use error::CoreError;
pub use models::event::Event;
pub use models::owner::OwnerId;
pub use models::run::{Run, RunState};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TickOutcome};
pub use rng::{action_rng, tick_rng, DeterministicRng};
