//! Virtual time and fixed-point decimal handling.
//!
//! Everything that touches wall-clock time or money funnels through these
//! two submodules so the rest of the engine never has to reason about
//! float drift or clock skew directly.

pub mod decimal;
pub mod time;
