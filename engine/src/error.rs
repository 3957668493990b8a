//! Crate-wide error taxonomy (spec §7).
//!
//! Every fallible engine operation ultimately returns (or is mapped into)
//! a [`CoreError`], whose variants correspond 1:1 with the conceptual
//! error kinds of spec §7: validation, auth/authz, state conflict,
//! business rejection, transient technical, and fatal. The `server`
//! crate maps each variant to an HTTP status and the `{error:{code,...}}`
//! envelope of spec §6 without needing to re-derive the taxonomy.

use serde::Serialize;
use thiserror::Error;

/// Machine-readable error code surfaced on the wire (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E006")]
    Forbidden,
    #[serde(rename = "E008")]
    StateConflict,
    #[serde(rename = "E009")]
    Validation,
    #[serde(rename = "E010")]
    Internal,
}

/// The crate-wide error type. Each variant names its conceptual kind
/// from spec §7 directly in its identifier.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("state conflict: {conflict_kind}")]
    StateConflict {
        conflict_kind: &'static str,
        details: serde_json::Value,
    },

    /// Not a run failure — surfaced as a `tx.failed` event, not an `Err`
    /// that propagates past the tick boundary (spec §7 "Business rejection").
    #[error("business rejection: {0}")]
    BusinessRejection(String),

    /// Retried up to 3 times by the caller before being classified as a
    /// terminal `tx.failed`/fatal condition (spec §7 "Transient technical").
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Validation(_) => ErrorCode::Validation,
            CoreError::Unauthorized | CoreError::Forbidden { .. } => ErrorCode::Forbidden,
            CoreError::StateConflict { .. } => ErrorCode::StateConflict,
            CoreError::BusinessRejection(_) | CoreError::Transient(_) | CoreError::Fatal(_) => {
                ErrorCode::Internal
            }
        }
    }

    pub fn details(&self) -> Option<&serde_json::Value> {
        match self {
            CoreError::StateConflict { details, .. } => Some(details),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_conflict_carries_machine_readable_kind() {
        let err = CoreError::StateConflict {
            conflict_kind: "owner_active_exists",
            details: serde_json::json!({"active_run_id": "r1"}),
        };
        assert_eq!(err.code(), ErrorCode::StateConflict);
        assert_eq!(
            err.details().unwrap()["active_run_id"],
            serde_json::json!("r1")
        );
    }

    #[test]
    fn forbidden_maps_to_e006() {
        let err = CoreError::Forbidden {
            reason: "csrf_origin".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }
}
