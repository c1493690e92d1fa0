//! Persisted run state.
//!
//! The orchestrator process exits after every turn, so everything it needs on
//! the next turn lives in `state.json`: the frozen plan, the current phase,
//! what was classified at initialization and a transition history. The
//! scratchpad keeps mirrors of the plan and phase for humans, and runs that
//! predate the state file can be recovered from those mirrors.

use crate::classify::HealthcareDecision;
use crate::errors::LoopError;
use crate::plan::{Phase, Plan};
use crate::scratchpad::find_marker;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const PLAN_KEY: &str = "ORCH:PLAN";
pub const PHASE_KEY: &str = "ORCH:PHASE";
pub const TOUCHED_KEY: &str = "ORCH:TOUCHED";
pub const INIT_HEADER: &str = "# ORCH:INIT";

/// One recorded phase change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub loop_count: u32,
    pub at: DateTime<Utc>,
}

/// State of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub initialized_at: DateTime<Utc>,
    pub plan: Plan,
    pub phase: Phase,
    /// Paths touched when the plan was built (informational)
    #[serde(default)]
    pub touched_at_init: Vec<String>,
    #[serde(default)]
    pub healthcare: HealthcareDecision,
    #[serde(default)]
    pub history: Vec<PhaseTransition>,
}

impl RunState {
    /// Fresh state positioned at the first phase of `plan`.
    pub fn new(plan: Plan, touched: Vec<String>, healthcare: HealthcareDecision) -> Self {
        let phase = plan.first();
        Self {
            run_id: Uuid::new_v4(),
            initialized_at: Utc::now(),
            plan,
            phase,
            touched_at_init: touched,
            healthcare,
            history: Vec::new(),
        }
    }

    /// Move to the next planned phase and record the transition.
    pub fn advance(&mut self, loop_count: u32) -> Phase {
        let next = self.plan.next_after(self.phase);
        self.history.push(PhaseTransition {
            from: self.phase,
            to: next,
            loop_count,
            at: Utc::now(),
        });
        self.phase = next;
        next
    }

    /// Phases already left behind, in order.
    pub fn completed_phases(&self) -> Vec<Phase> {
        self.history.iter().map(|t| t.from).collect()
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Rebuild state from the `ORCH:PLAN` / `ORCH:PHASE` scratchpad markers.
    ///
    /// Returns `None` when the scratchpad has no plan marker, or an empty
    /// one left behind by a reset. An unknown phase name is treated as `DONE`.
    pub fn recover_from_markers(scratchpad: &str) -> Result<Option<Self>, LoopError> {
        let Some(plan_marker) = find_marker(scratchpad, PLAN_KEY).filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        let plan = Plan::parse_marker(&plan_marker);

        let phase = match find_marker(scratchpad, PHASE_KEY) {
            Some(name) if !name.is_empty() => name.parse().unwrap_or_else(|_| {
                tracing::warn!(phase = %name, "unknown phase in scratchpad marker, treating as DONE");
                Phase::Done
            }),
            _ => plan.first(),
        };

        let touched = find_marker(scratchpad, TOUCHED_KEY)
            .filter(|t| t != "(none)")
            .map(|t| {
                t.split(';')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let healthcare = HealthcareDecision {
            enabled: find_marker(scratchpad, "HEALTHCARE_MODE").as_deref() == Some("YES"),
            reasons: find_marker(scratchpad, "HEALTHCARE_REASON")
                .map(|r| {
                    r.split(" | ")
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };

        let mut state = Self::new(plan, touched, healthcare);
        state.phase = phase;
        Ok(Some(state))
    }
}

/// Loads and saves [`RunState`] as pretty JSON.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<Option<RunState>, LoopError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| LoopError::StateRead {
            path: self.path.clone(),
            source,
        })?;
        let state = serde_json::from_str(&content).map_err(|source| LoopError::StateParse {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(state))
    }

    /// Load state, falling back to the scratchpad markers of an older run.
    pub fn load_or_recover(&self, scratchpad: &str) -> Result<Option<RunState>, LoopError> {
        if let Some(state) = self.load()? {
            return Ok(Some(state));
        }
        let recovered = RunState::recover_from_markers(scratchpad)?;
        if let Some(ref state) = recovered {
            tracing::info!(phase = %state.phase, "recovered run state from scratchpad markers");
            self.save(state)?;
        }
        Ok(recovered)
    }

    pub fn save(&self, state: &RunState) -> Result<(), LoopError> {
        let write_err = |source| LoopError::StateWrite {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| LoopError::Other(anyhow::Error::new(e).context("Failed to serialize run state")))?;
        std::fs::write(&self.path, content).map_err(|source| LoopError::StateWrite {
            path: self.path.clone(),
            source,
        })
    }

    /// Delete the state file. Returns whether there was one.
    pub fn reset(&self) -> Result<bool, LoopError> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path).map_err(|source| LoopError::StateWrite {
            path: self.path.clone(),
            source,
        })?;
        Ok(true)
    }
}

/// Exclusive advisory lock held for the duration of one turn.
///
/// Two hook invocations racing on the same repository would otherwise lose
/// scratchpad or state updates. Released on drop.
#[derive(Debug)]
pub struct TurnLock {
    file: File,
    path: PathBuf,
}

impl TurnLock {
    /// Block until the lock at `path` is acquired.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LoopError> {
        let path = path.into();
        let lock_err = |source| LoopError::LockFailed {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;
        tracing::debug!(path = %path.display(), "turn lock acquired");
        Ok(Self { file, path })
    }

    /// Acquire without blocking; `None` if another turn holds it.
    #[cfg(test)]
    pub fn try_acquire(path: impl Into<PathBuf>) -> Result<Option<Self>, LoopError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LoopError::LockFailed {
                path: path.clone(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| LoopError::LockFailed {
                path: path.clone(),
                source,
            })?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for TurnLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release turn lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_plan() -> Plan {
        Plan::from_phases(vec![Phase::Grind, Phase::EventSchema, Phase::Done])
    }

    #[test]
    fn test_new_starts_at_first_phase() {
        let state = RunState::new(sample_plan(), vec![], HealthcareDecision::default());
        assert_eq!(state.phase, Phase::Grind);
        assert!(state.history.is_empty());
        assert!(!state.is_done());
    }

    #[test]
    fn test_new_with_empty_plan_is_done() {
        let state = RunState::new(
            Plan::from_phases(vec![]),
            vec![],
            HealthcareDecision::default(),
        );
        assert!(state.is_done());
    }

    #[test]
    fn test_advance_records_history() {
        let mut state = RunState::new(sample_plan(), vec![], HealthcareDecision::default());
        assert_eq!(state.advance(1), Phase::EventSchema);
        assert_eq!(state.advance(2), Phase::Done);
        assert_eq!(state.completed_phases(), vec![Phase::Grind, Phase::EventSchema]);
        assert_eq!(state.history[1].loop_count, 2);
        assert!(state.is_done());
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join(".loopwarden/state.json"));
        assert!(store.load().unwrap().is_none());

        let state = RunState::new(
            sample_plan(),
            vec!["shared/events/a.ts".to_string()],
            HealthcareDecision::default(),
        );
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));
    }

    #[test]
    fn test_store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = StateStore::new(&path).load().unwrap_err();
        assert!(matches!(err, LoopError::StateParse { .. }));
    }

    #[test]
    fn test_store_reset() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(!store.reset().unwrap());
        store
            .save(&RunState::new(sample_plan(), vec![], HealthcareDecision::default()))
            .unwrap();
        assert!(store.reset().unwrap());
        assert!(!store.exists());
    }

    #[test]
    fn test_recover_from_markers() {
        let scratchpad = "\n# ORCH:INIT\nORCH:PLAN=GRIND,EVENT_SCHEMA,DIAGRAMS_SYNC,DONE\n\
                          ORCH:PHASE=EVENT_SCHEMA\nORCH:TOUCHED=shared/events/schema.json\n\
                          HEALTHCARE_MODE=NO\n";
        let state = RunState::recover_from_markers(scratchpad).unwrap().unwrap();
        assert_eq!(state.phase, Phase::EventSchema);
        assert_eq!(
            state.plan.to_marker(),
            "GRIND,EVENT_SCHEMA,DIAGRAMS_SYNC,DONE"
        );
        assert_eq!(state.touched_at_init, vec!["shared/events/schema.json"]);
        assert!(!state.healthcare.enabled);
    }

    #[test]
    fn test_recover_unknown_phase_is_done() {
        let scratchpad = "ORCH:PLAN=GRIND,DONE\nORCH:PHASE=LINT\n";
        let state = RunState::recover_from_markers(scratchpad).unwrap().unwrap();
        assert_eq!(state.phase, Phase::Done);
    }

    #[test]
    fn test_recover_skips_unknown_plan_entries() {
        let scratchpad = "ORCH:PLAN=GRIND,LINT,DONE\nORCH:PHASE=GRIND\n";
        let state = RunState::recover_from_markers(scratchpad).unwrap().unwrap();
        assert_eq!(state.plan.phases(), &[Phase::Grind, Phase::Done]);
        assert_eq!(state.phase, Phase::Grind);
    }

    #[test]
    fn test_recover_blank_healthcare_reason() {
        let scratchpad = "ORCH:PLAN=GRIND,DONE\nHEALTHCARE_MODE=NO\nHEALTHCARE_REASON=\n";
        let state = RunState::recover_from_markers(scratchpad).unwrap().unwrap();
        assert!(!state.healthcare.enabled);
        assert!(state.healthcare.reasons.is_empty());
    }

    #[test]
    fn test_recover_without_markers() {
        assert!(RunState::recover_from_markers("just notes").unwrap().is_none());
    }

    #[test]
    fn test_recover_ignores_reset_markers() {
        let scratchpad = "ORCH:PLAN=\nORCH:PHASE=\n";
        assert!(RunState::recover_from_markers(scratchpad).unwrap().is_none());
    }

    #[test]
    fn test_load_or_recover_persists_recovered_state() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let state = store
            .load_or_recover("ORCH:PLAN=GRIND,DONE\nORCH:PHASE=GRIND\nORCH:TOUCHED=(none)\n")
            .unwrap()
            .unwrap();
        assert!(state.touched_at_init.is_empty());
        assert!(store.exists());
    }

    #[test]
    fn test_turn_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".loopwarden/turn.lock");
        let held = TurnLock::acquire(&path).unwrap();
        assert!(TurnLock::try_acquire(&path).unwrap().is_none());
        drop(held);
        assert!(TurnLock::try_acquire(&path).unwrap().is_some());
    }
}
