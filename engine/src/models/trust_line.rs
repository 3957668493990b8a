//! TrustLine — a directed credit edge `from -> to` (spec §3).
//!
//! `from` (creditor) trusts `to` (debtor) up to `limit`. `used` tracks how
//! much of that trust is currently extended; `available = limit - used`.
//! The `version` counter is the sole source of truth for concurrent
//! update safety (spec §3 "Ownership rules", §9 "Optimistic locking over
//! pessimistic for debts"): every writer must present the version it last
//! observed, and a mismatch means someone else moved first.
//!
//! A [`Debt`] row is a read-only mirror of the same edge in the opposite
//! semantic direction: `used > 0` means the debtor (`to`) owes the
//! creditor (`from`) that amount.

use crate::core::decimal::Decimal;
use crate::models::equivalent::Equivalent;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLineStatus {
    Active,
    Frozen,
    Closed,
}

#[derive(Debug, Error, PartialEq)]
pub enum TrustLineError {
    #[error("stale version: expected {expected}, observed {observed}")]
    StaleVersion { expected: u64, observed: u64 },
    #[error("would exceed limit: used {used} + delta {delta} > limit {limit}")]
    WouldExceedLimit {
        used: String,
        delta: String,
        limit: String,
    },
    #[error("trust line is not active (status = {status:?})")]
    NotActive { status: TrustLineStatus },
}

/// A directed, versioned credit edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustLine {
    pub from: String,
    pub to: String,
    pub equivalent: Equivalent,
    pub limit: Decimal,
    pub used: Decimal,
    pub status: TrustLineStatus,
    pub policy: Option<String>,
    /// Optimistic-lock counter. Incremented on every successful mutation.
    pub version: u64,
    /// Last tick at which `used` changed (consulted by trust-drift decay,
    /// spec §4.7 "last touched >= decay_grace_ticks ago").
    pub last_touched_tick: u64,
    /// Authoritative "reverse" used amount for close-guard checks
    /// (spec §9(b)). `None` on snapshots predating this field; callers
    /// fall back to `used` best-effort in that case.
    pub reverse_used: Option<Decimal>,
}

impl TrustLine {
    pub fn new(from: impl Into<String>, to: impl Into<String>, equivalent: Equivalent, limit: Decimal) -> Self {
        let scale = limit.scale();
        Self {
            from: from.into(),
            to: to.into(),
            equivalent,
            limit,
            used: Decimal::zero(scale),
            status: TrustLineStatus::Active,
            policy: None,
            version: 0,
            last_touched_tick: 0,
            reverse_used: Some(Decimal::zero(scale)),
        }
    }

    /// `available = limit - used`. A `limit` of exactly zero is modeled
    /// as "zero-but-open" (spec §9(a)): available is zero but the line
    /// remains eligible for inbound trust-drift growth, distinct from a
    /// frozen/closed line.
    pub fn available(&self) -> Decimal {
        self.limit
            .checked_sub(&self.used)
            .unwrap_or_else(|| Decimal::zero(self.limit.scale()))
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TrustLineStatus::Active)
    }

    /// Authoritative used-for-close-guard amount (spec §9(b)).
    pub fn reverse_used_or_fallback(&self) -> Decimal {
        self.reverse_used.unwrap_or(self.used)
    }

    /// Apply a signed delta to `used` under optimistic concurrency control.
    /// `expected_version` must match `self.version` or the call fails with
    /// [`TrustLineError::StaleVersion`] so the caller can re-read and retry
    /// (spec §3, §4.4, up to 3 retries).
    pub fn apply_used_delta(
        &mut self,
        expected_version: u64,
        delta: Decimal,
        tick_index: u64,
    ) -> Result<u64, TrustLineError> {
        if expected_version != self.version {
            return Err(TrustLineError::StaleVersion {
                expected: expected_version,
                observed: self.version,
            });
        }
        if !self.is_active() {
            return Err(TrustLineError::NotActive {
                status: self.status,
            });
        }
        let new_used = self
            .used
            .checked_add(&delta)
            .unwrap_or_else(|| Decimal::zero(self.used.scale()));
        if new_used > self.limit {
            return Err(TrustLineError::WouldExceedLimit {
                used: self.used.to_wire_string(),
                delta: delta.to_wire_string(),
                limit: self.limit.to_wire_string(),
            });
        }
        if new_used.is_negative() {
            // clamp: a cycle-clearing decrement can never remove more than
            // what's currently used.
            self.used = Decimal::zero(self.used.scale());
        } else {
            self.used = new_used;
        }
        self.reverse_used = Some(self.used);
        self.version += 1;
        self.last_touched_tick = tick_index;
        Ok(self.version)
    }
}

/// Read-only mirror of a [`TrustLine`] in debtor/creditor terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debt {
    pub creditor: String,
    pub debtor: String,
    pub equivalent: Equivalent,
    pub amount: Decimal,
    pub version: u64,
}

impl From<&TrustLine> for Debt {
    fn from(tl: &TrustLine) -> Self {
        Self {
            creditor: tl.from.clone(),
            debtor: tl.to.clone(),
            equivalent: tl.equivalent.clone(),
            amount: tl.reverse_used_or_fallback(),
            version: tl.version,
        }
    }
}
