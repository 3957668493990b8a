//! Participant — a node in the credit network (spec §3).
//!
//! Grounded in the teacher's `Agent` (bank) model, generalized from a
//! single-equivalent settlement account into an identity record; the
//! actual balances live on [`crate::models::trust_line::TrustLine`]
//! edges, one independent graph per equivalent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantType {
    Person,
    Business,
    Hub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Active,
    Suspended,
    Left,
    Deleted,
    Frozen,
}

impl ParticipantStatus {
    /// Whether this participant may originate new payment attempts
    /// (spec §4.3 candidate generation requires `status == active`).
    pub fn can_originate(&self) -> bool {
        matches!(self, ParticipantStatus::Active)
    }
}

/// A node in the credit network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub pid: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub kind: ParticipantType,
    pub status: ParticipantStatus,
    pub group_id: Option<String>,
    pub behavior_profile_id: Option<String>,
}

impl Participant {
    pub fn new(pid: impl Into<String>, display_name: impl Into<String>, kind: ParticipantType) -> Self {
        Self {
            pid: pid.into(),
            display_name: display_name.into(),
            kind,
            status: ParticipantStatus::Active,
            group_id: None,
            behavior_profile_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_participants_can_originate_payments() {
        assert!(ParticipantStatus::Active.can_originate());
        for s in [
            ParticipantStatus::Suspended,
            ParticipantStatus::Left,
            ParticipantStatus::Deleted,
            ParticipantStatus::Frozen,
        ] {
            assert!(!s.can_originate());
        }
    }
}
