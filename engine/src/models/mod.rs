//! Domain types: participants, trust lines, equivalents, scenarios, runs,
//! events, and owner identity (spec §3).

pub mod equivalent;
pub mod event;
pub mod owner;
pub mod participant;
pub mod run;
pub mod scenario;
pub mod trust_line;

pub use equivalent::Equivalent;
pub use event::Event;
pub use owner::{ActorKind, AnonSession, OwnerId};
pub use participant::{Participant, ParticipantStatus, ParticipantType};
pub use run::{Run, RunMode, RunState};
pub use scenario::{AmountModel, BehaviorProfile, Scenario};
pub use trust_line::{Debt, TrustLine, TrustLineStatus};
