//! Owner & run registry — actor derivation, run lifecycle gating, and the
//! per-owner/global active-run limits (spec §4.1).
//!
//! A single shared map `owner_id -> set<run_id>` and `run_id -> Run`
//! lives under one mutex (spec §5 "Run registry"): every create/stop/
//! transition operation holds it for the minimal critical section. The
//! HTTP surface (out of scope here, spec §1) is expected to be a thin
//! caller of this module plus `orchestrator`.

use crate::error::CoreError;
use crate::models::owner::{Actor, ActorKind, OwnerId};
use crate::models::run::{Run, RunMode};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub max_active_runs_per_owner: usize,
    pub max_active_runs: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_active_runs_per_owner: 1,
            max_active_runs: 100,
        }
    }
}

struct RegistryState {
    runs: HashMap<String, Run>,
    by_owner: HashMap<OwnerId, HashSet<String>>,
}

/// The shared run registry. Cheap to clone (an `Arc` around the mutex is
/// the caller's job); this type itself holds the lock directly since it
/// is meant to be wrapped in one `Arc<RunRegistry>` per process.
pub struct RunRegistry {
    state: Mutex<RegistryState>,
    config: RegistryConfig,
}

impl RunRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                runs: HashMap::new(),
                by_owner: HashMap::new(),
            }),
            config,
        }
    }

    fn active_count_for(state: &RegistryState, owner: &OwnerId) -> usize {
        state
            .by_owner
            .get(owner)
            .map(|ids| ids.iter().filter_map(|id| state.runs.get(id)).filter(|r| !r.state.is_terminal()).count())
            .unwrap_or(0)
    }

    fn active_count_global(state: &RegistryState) -> usize {
        state.runs.values().filter(|r| !r.state.is_terminal()).count()
    }

    /// Create a run for `owner_id`, enforcing the per-owner and global
    /// active-run limits (spec §4.1 "Run creation invariants"). Both
    /// checks apply on every create so the two conflict kinds stay
    /// distinguishable.
    pub fn create_run(
        &self,
        owner_id: OwnerId,
        scenario_id: String,
        mode: RunMode,
        seed: u64,
        intensity_percent: i32,
    ) -> Result<Run, CoreError> {
        let mut state = self.state.lock();

        if let Some(existing_ids) = state.by_owner.get(&owner_id) {
            if let Some(active_id) = existing_ids
                .iter()
                .find(|id| state.runs.get(*id).map_or(false, |r| !r.state.is_terminal()))
            {
                if Self::active_count_for(&state, &owner_id) >= self.config.max_active_runs_per_owner {
                    return Err(CoreError::StateConflict {
                        conflict_kind: "owner_active_exists",
                        details: serde_json::json!({
                            "conflict_kind": "owner_active_exists",
                            "active_run_id": active_id,
                            "owner_id": owner_id.as_str(),
                        }),
                    });
                }
            }
        }

        let active_global = Self::active_count_global(&state);
        if active_global >= self.config.max_active_runs {
            return Err(CoreError::StateConflict {
                conflict_kind: "global_active_limit",
                details: serde_json::json!({
                    "conflict_kind": "global_active_limit",
                    "max_active_runs": self.config.max_active_runs,
                    "active_runs": active_global,
                }),
            });
        }

        let run_id = Uuid::new_v4().to_string();
        let run = Run::new(run_id.clone(), scenario_id, mode, seed, owner_id.clone(), intensity_percent);
        state.runs.insert(run_id.clone(), run.clone());
        state.by_owner.entry(owner_id).or_default().insert(run_id);

        Ok(run)
    }

    pub fn get(&self, run_id: &str) -> Option<Run> {
        self.state.lock().runs.get(run_id).cloned()
    }

    /// The owner's single non-terminal run, if any (spec §6 `GET
    /// /simulator/runs/active`).
    pub fn active_run_for_owner(&self, owner_id: &OwnerId) -> Option<String> {
        let state = self.state.lock();
        state.by_owner.get(owner_id)?.iter().find(|id| state.runs.get(*id).map_or(false, |r| !r.state.is_terminal())).cloned()
    }

    /// Access control for per-run operations (spec §4.1 "Per-run access
    /// control"): admin bypasses ownership; otherwise the actor's
    /// `owner_id` must exactly match the run's. An empty owner id denies
    /// by default.
    pub fn check_access(actor: &Actor, run: &Run) -> Result<(), CoreError> {
        if actor.is_admin {
            return Ok(());
        }
        if actor.owner_id.as_str().is_empty() {
            return Err(CoreError::Forbidden {
                reason: "empty_owner".to_string(),
            });
        }
        if run.is_owned_by(&actor.owner_id) {
            Ok(())
        } else {
            Err(CoreError::Forbidden {
                reason: "not_owner".to_string(),
            })
        }
    }

    /// Mutate a run in place under the registry lock after an access
    /// check, returning the post-mutation snapshot. Used by the
    /// pause/resume/stop/restart/intensity handlers, all of which are
    /// idempotent by construction on [`Run`]'s own methods.
    pub fn with_run<F, T>(&self, run_id: &str, actor: &Actor, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut Run) -> T,
    {
        let mut state = self.state.lock();
        let run = state.runs.get_mut(run_id).ok_or_else(|| CoreError::Validation(format!("unknown run_id: {run_id}")))?;
        Self::check_access(actor, run)?;
        Ok(f(run))
    }

    pub fn admin_list(&self) -> Vec<Run> {
        self.state.lock().runs.values().cloned().collect()
    }

    /// Admin-only bulk stop (spec §6 `POST /simulator/admin/runs/stop-all`).
    /// Returns the number of runs transitioned.
    pub fn admin_stop_all(&self) -> usize {
        let mut state = self.state.lock();
        let mut stopped = 0;
        for run in state.runs.values_mut() {
            if !run.state.is_terminal() {
                run.stop();
                stopped += 1;
            }
        }
        stopped
    }

    /// Transition every non-terminal run to `error` at process startup
    /// (spec §4.1 "Reconciliation at startup"), to avoid phantom-running
    /// displays after a restart. Callers load persisted runs (the
    /// persistence port is out of scope, spec §1) and hand them to
    /// [`RunRegistry::restore`] before calling this.
    pub fn reconcile_at_startup(&self) {
        let mut state = self.state.lock();
        for run in state.runs.values_mut() {
            if !run.state.is_terminal() {
                run.transition_to_error("INTERNAL_ERROR", "server_restart");
            }
        }
    }

    /// Load a previously persisted run back into the registry (used only
    /// at startup, before [`RunRegistry::reconcile_at_startup`]).
    pub fn restore(&self, run: Run) {
        let mut state = self.state.lock();
        state.by_owner.entry(run.owner_id.clone()).or_default().insert(run.run_id.clone());
        state.runs.insert(run.run_id.clone(), run);
    }
}

/// Validation for `X-Simulator-Owner` overrides (spec §4.1 actor
/// derivation step 1): trimmed, 1-64 chars, `[A-Za-z0-9._:-]`.
pub fn validate_owner_override(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > 64 {
        return Err(CoreError::Validation("owner override must be 1-64 characters".to_string()));
    }
    if !trimmed.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-')) {
        return Err(CoreError::Validation(
            "owner override must match [A-Za-z0-9._:-]".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Derive the acting identity in strict priority order (spec §4.1
/// "Actor derivation"). Each input represents a credential the caller
/// has already cryptographically verified (token signature, HMAC on the
/// anon cookie, etc.) — this function only applies the precedence rule.
pub fn derive_actor(
    admin_token_valid: bool,
    owner_override_header: Option<&str>,
    participant_sub: Option<&str>,
    anon_sid: Option<&str>,
) -> Result<Actor, CoreError> {
    if admin_token_valid {
        if let Some(raw_override) = owner_override_header {
            let normalized = validate_owner_override(raw_override)?;
            return Ok(Actor {
                owner_id: OwnerId::cli(&normalized),
                kind: ActorKind::CliOverride,
                is_admin: true,
            });
        }
        return Ok(Actor {
            owner_id: OwnerId::admin(),
            kind: ActorKind::Admin,
            is_admin: true,
        });
    }
    if let Some(sub) = participant_sub {
        return Ok(Actor {
            owner_id: OwnerId::participant(sub),
            kind: ActorKind::Participant,
            is_admin: false,
        });
    }
    if let Some(sid) = anon_sid {
        return Ok(Actor {
            owner_id: OwnerId::anon(sid),
            kind: ActorKind::Anon,
            is_admin: false,
        });
    }
    Err(CoreError::Unauthorized)
}

/// CSRF origin check for cookie-authenticated mutating operations (spec
/// §4.1 "CSRF policy"). Only applies when the actor derives solely from
/// the anon cookie; bearer- or admin-authenticated requests are exempt.
pub fn check_csrf(
    actor_kind: ActorKind,
    is_mutating: bool,
    origin: Option<&str>,
    allowed_origins: &HashSet<String>,
) -> Result<(), CoreError> {
    if actor_kind != ActorKind::Anon || !is_mutating {
        return Ok(());
    }
    match origin {
        Some(o) if allowed_origins.contains(o) => Ok(()),
        _ => Err(CoreError::Forbidden {
            reason: "csrf_origin".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(owner: OwnerId, is_admin: bool) -> Actor {
        Actor { owner_id: owner, kind: ActorKind::Anon, is_admin }
    }

    #[test]
    fn per_owner_limit_rejects_second_active_run() {
        let registry = RunRegistry::new(RegistryConfig::default());
        let owner = OwnerId::anon("A");
        let r1 = registry.create_run(owner.clone(), "minimal".to_string(), RunMode::Fixtures, 1, 30).unwrap();

        let err = registry
            .create_run(owner, "minimal".to_string(), RunMode::Fixtures, 2, 30)
            .unwrap_err();
        match err {
            CoreError::StateConflict { conflict_kind, details } => {
                assert_eq!(conflict_kind, "owner_active_exists");
                assert_eq!(details["active_run_id"], serde_json::json!(r1.run_id));
            }
            _ => panic!("expected StateConflict"),
        }
    }

    #[test]
    fn global_limit_rejects_once_capacity_is_exhausted() {
        let registry = RunRegistry::new(RegistryConfig {
            max_active_runs_per_owner: 10,
            max_active_runs: 1,
        });
        registry
            .create_run(OwnerId::anon("A"), "minimal".to_string(), RunMode::Fixtures, 1, 30)
            .unwrap();

        let err = registry
            .create_run(OwnerId::anon("B"), "minimal".to_string(), RunMode::Fixtures, 2, 30)
            .unwrap_err();
        match err {
            CoreError::StateConflict { conflict_kind, .. } => assert_eq!(conflict_kind, "global_active_limit"),
            _ => panic!("expected StateConflict"),
        }
    }

    #[test]
    fn owner_isolation_denies_cross_owner_access() {
        let registry = RunRegistry::new(RegistryConfig::default());
        let owner_a = OwnerId::anon("A");
        let run = registry.create_run(owner_a, "minimal".to_string(), RunMode::Fixtures, 1, 30).unwrap();

        let foreign = actor(OwnerId::anon("B"), false);
        let err = registry.with_run(&run.run_id, &foreign, |r| r.state).unwrap_err();
        assert!(matches!(err, CoreError::Forbidden { .. }));
    }

    #[test]
    fn admin_bypasses_ownership() {
        let registry = RunRegistry::new(RegistryConfig::default());
        let owner_a = OwnerId::anon("A");
        let run = registry.create_run(owner_a, "minimal".to_string(), RunMode::Fixtures, 1, 30).unwrap();

        let admin = actor(OwnerId::admin(), true);
        assert!(registry.with_run(&run.run_id, &admin, |r| r.pause()).is_ok());
    }

    #[test]
    fn a_stopped_run_frees_the_owners_slot() {
        let registry = RunRegistry::new(RegistryConfig::default());
        let owner = OwnerId::anon("A");
        let run = registry.create_run(owner.clone(), "minimal".to_string(), RunMode::Fixtures, 1, 30).unwrap();
        let self_actor = actor(owner.clone(), false);
        registry.with_run(&run.run_id, &self_actor, |r| r.stop()).unwrap();

        let second = registry.create_run(owner, "minimal".to_string(), RunMode::Fixtures, 2, 30);
        assert!(second.is_ok());
    }

    #[test]
    fn actor_derivation_follows_strict_priority_order() {
        let admin_override = derive_actor(true, Some("bot-1"), Some("sub1"), Some("sid1")).unwrap();
        assert_eq!(admin_override.owner_id, OwnerId::cli("bot-1"));
        assert!(admin_override.is_admin);

        let admin_only = derive_actor(true, None, Some("sub1"), Some("sid1")).unwrap();
        assert_eq!(admin_only.owner_id, OwnerId::admin());

        let participant = derive_actor(false, None, Some("sub1"), Some("sid1")).unwrap();
        assert_eq!(participant.owner_id, OwnerId::participant("sub1"));

        let anon = derive_actor(false, None, None, Some("sid1")).unwrap();
        assert_eq!(anon.owner_id, OwnerId::anon("sid1"));

        assert!(matches!(derive_actor(false, None, None, None), Err(CoreError::Unauthorized)));
    }

    #[test]
    fn invalid_owner_override_is_a_validation_error() {
        assert!(validate_owner_override("").is_err());
        assert!(validate_owner_override(&"x".repeat(65)).is_err());
        assert!(validate_owner_override("bad owner!").is_err());
        assert!(validate_owner_override("good-owner.1:2").is_ok());
    }

    #[test]
    fn csrf_applies_only_to_mutating_anon_cookie_requests() {
        let mut allowed = HashSet::new();
        allowed.insert("https://sim.example".to_string());

        assert!(check_csrf(ActorKind::Admin, true, None, &allowed).is_ok());
        assert!(check_csrf(ActorKind::Anon, false, None, &allowed).is_ok());
        assert!(check_csrf(ActorKind::Anon, true, Some("https://sim.example"), &allowed).is_ok());
        assert!(matches!(
            check_csrf(ActorKind::Anon, true, Some("https://evil.example"), &allowed),
            Err(CoreError::Forbidden { .. })
        ));
        assert!(matches!(check_csrf(ActorKind::Anon, true, None, &allowed), Err(CoreError::Forbidden { .. })));
    }
}
