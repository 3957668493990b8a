//! Equivalent — a currency-like unit. Each equivalent is an independent
//! routing graph; there is no cross-equivalent clearing or routing
//! (spec §1 Non-goals, §3, §9 "Per-equivalent isolation").

use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency-like code, e.g. `UAH`, `HOUR`. Cheap to clone and hash so it
/// can key per-equivalent maps throughout the engine (routing cache,
/// clearing state, adaptive policy windows).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Equivalent(pub String);

impl Equivalent {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decimal scale used for amounts denominated in this equivalent.
    /// Fiat-like codes quantize to cents; anything else defaults to the
    /// high-precision 1e-18 scale (spec §3).
    pub fn decimal_scale(&self) -> u32 {
        match self.0.as_str() {
            "UAH" | "USD" | "EUR" => crate::core::decimal::SCALE_CENTS,
            _ => crate::core::decimal::SCALE_NANO18,
        }
    }
}

impl fmt::Display for Equivalent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Equivalent {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
