//! Phases and the plan builder.
//!
//! A plan is the ordered list of phases for one run. It always starts with
//! `GRIND` and ends with `DONE`; the phases in between depend on what the
//! touched paths look like. Once written at initialization the plan is never
//! recomputed, even if later turns touch new files.

use crate::classify::PathClassification;
use crate::errors::LoopError;
use serde::{Deserialize, Serialize};

/// One stage of the orchestration plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Run the test command (and E2E when relevant) until green
    Grind,
    /// Agent validates event schemas
    EventSchema,
    /// Agent validates projector idempotency
    ProjectionCheck,
    /// Agent scans for personal data
    GdprScan,
    /// Agent updates docs and diagrams
    DiagramsSync,
    /// Terminal
    Done,
}

impl Phase {
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Grind,
            Phase::EventSchema,
            Phase::ProjectionCheck,
            Phase::GdprScan,
            Phase::DiagramsSync,
            Phase::Done,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Grind => "GRIND",
            Phase::EventSchema => "EVENT_SCHEMA",
            Phase::ProjectionCheck => "PROJECTION_CHECK",
            Phase::GdprScan => "GDPR_SCAN",
            Phase::DiagramsSync => "DIAGRAMS_SYNC",
            Phase::Done => "DONE",
        }
    }

    /// Phases completed by the agent writing `ORCH:PHASE_DONE=<phase>`.
    pub fn is_agent_phase(&self) -> bool {
        matches!(
            self,
            Phase::EventSchema | Phase::ProjectionCheck | Phase::GdprScan | Phase::DiagramsSync
        )
    }

    /// The scratchpad line that marks an agent phase as complete.
    pub fn done_marker(&self) -> String {
        format!("{}={}", PHASE_DONE_KEY, self.as_str())
    }

    /// Instructions shown to the agent for this phase.
    pub fn instructions(&self, test_cmd: &str) -> String {
        match self {
            Phase::Grind => [
                "Run and fix until green:".to_string(),
                format!("- Execute: {}", test_cmd),
                "- Fix failing tests with minimal changes".to_string(),
                "- Repeat until green (hook will advance automatically)".to_string(),
            ]
            .join("\n"),
            Phase::EventSchema => [
                "Run Event Schema Guard (skill):",
                "- Validate event fields, schema_version, naming, and no PII in payload",
                "- Ensure shared schema/types are aligned",
                "When complete, append to scratchpad: ORCH:PHASE_DONE=EVENT_SCHEMA",
            ]
            .join("\n"),
            Phase::ProjectionCheck => [
                "Run Projection Rebuild Check (skill):",
                "- Validate idempotency of projectors",
                "- Replay/rebuild mental model; ensure deterministic output",
                "- Add/adjust tests for idempotency if needed",
                "When complete, append: ORCH:PHASE_DONE=PROJECTION_CHECK",
            ]
            .join("\n"),
            Phase::GdprScan => [
                "Run GDPR Scan (skill):",
                "- Verify no PII in logs, tests, docs, diagrams",
                "- Replace any real-looking emails/phones/names with placeholders",
                "When complete, append: ORCH:PHASE_DONE=GDPR_SCAN",
            ]
            .join("\n"),
            Phase::DiagramsSync => [
                "Run docs drift + diagram update:",
                "- Use #diagram_diff to identify diagram impact",
                "- Then run #update_diagrams_after_feature to update Mermaid diagrams",
                "When complete, append: ORCH:PHASE_DONE=DIAGRAMS_SYNC",
            ]
            .join("\n"),
            Phase::Done => "No further actions.".to_string(),
        }
    }
}

/// Marker key the agent writes when it finishes an agent phase.
pub const PHASE_DONE_KEY: &str = "ORCH:PHASE_DONE";

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = LoopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Phase::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| LoopError::UnknownPhase(s.to_string()))
    }
}

/// Ordered, frozen list of phases for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan(Vec<Phase>);

impl Plan {
    /// Derive the plan from a path classification.
    ///
    /// `GDPR_SCAN` is only added in healthcare mode.
    pub fn build(classification: &PathClassification) -> Self {
        let mut phases = vec![Phase::Grind];

        if classification.touches_events {
            phases.push(Phase::EventSchema);
        }
        if classification.touches_projections {
            phases.push(Phase::ProjectionCheck);
        }
        if classification.healthcare.enabled {
            phases.push(Phase::GdprScan);
        }
        if classification.touches_docs_or_flows {
            phases.push(Phase::DiagramsSync);
        }

        phases.push(Phase::Done);
        Self(phases)
    }

    pub fn from_phases(phases: Vec<Phase>) -> Self {
        Self(phases)
    }

    pub fn phases(&self) -> &[Phase] {
        &self.0
    }

    /// First phase, or `DONE` for an empty plan.
    pub fn first(&self) -> Phase {
        self.0.first().copied().unwrap_or(Phase::Done)
    }

    /// Phase after `current`; `DONE` past the end or when `current` is not planned.
    pub fn next_after(&self, current: Phase) -> Phase {
        self.0
            .iter()
            .position(|p| *p == current)
            .and_then(|idx| self.0.get(idx + 1))
            .copied()
            .unwrap_or(Phase::Done)
    }

    /// Comma-joined form stored in the `ORCH:PLAN` marker.
    pub fn to_marker(&self) -> String {
        self.0
            .iter()
            .map(Phase::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse the `ORCH:PLAN` marker form. Empty and unknown entries are
    /// skipped, so a hand-edited marker never wedges the loop.
    pub fn parse_marker(value: &str) -> Self {
        let phases = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match s.parse::<Phase>() {
                Ok(phase) => Some(phase),
                Err(_) => {
                    tracing::warn!(phase = s, "unknown phase in plan marker, skipping");
                    None
                }
            })
            .collect();
        Self(phases)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "DONE");
        }
        let names: Vec<_> = self.0.iter().map(Phase::as_str).collect();
        write!(f, "{}", names.join(" → "))
    }
}
