//! Phase state machine driven once per agent turn.
//!
//! Each call to [`Orchestrator::turn`] runs to the first blocking instruction
//! and returns. Between turns everything lives in the state file and the
//! scratchpad, so the process can exit after every turn.

use super::state::{INIT_HEADER, PHASE_KEY, PLAN_KEY, RunState, StateStore, TOUCHED_KEY, TurnLock};
use crate::classify::classify;
use crate::config::LoopConfig;
use crate::e2e;
use crate::plan::{Phase, Plan};
use crate::runner::{CommandRunner, RunResult, format_run_summary};
use crate::scratchpad::Scratchpad;
use crate::tracker::collect_touched_paths;
use crate::turn::{TurnInput, TurnOutput};
use anyhow::{Context, Result};
use std::path::PathBuf;

pub const HEALTHCARE_MODE_KEY: &str = "HEALTHCARE_MODE";
pub const HEALTHCARE_REASON_KEY: &str = "HEALTHCARE_REASON";

/// Tunables for one orchestrator, resolved from [`LoopConfig`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub test_cmd: String,
    pub e2e_cmd: String,
    pub max_iterations: u32,
    pub truncate_chars: usize,
    pub run_e2e_when_frontend_unclassified: bool,
    pub healthcare_keywords: Vec<String>,
    /// How the scratchpad is named in follow-up messages
    pub scratchpad_label: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        let toml = crate::config::LoopToml::default();
        Self {
            test_cmd: toml.commands.test,
            e2e_cmd: toml.commands.e2e,
            max_iterations: toml.orchestrator.max_iterations,
            truncate_chars: toml.scratchpad.truncate_chars,
            run_e2e_when_frontend_unclassified: toml.e2e.run_when_frontend_unclassified,
            healthcare_keywords: toml.healthcare.keywords,
            scratchpad_label: toml.scratchpad.path.display().to_string(),
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &LoopConfig) -> Self {
        Self {
            test_cmd: config.test_cmd(),
            e2e_cmd: config.e2e_cmd(),
            max_iterations: config.toml.orchestrator.max_iterations,
            truncate_chars: config.toml.scratchpad.truncate_chars,
            run_e2e_when_frontend_unclassified: config.toml.e2e.run_when_frontend_unclassified,
            healthcare_keywords: config.toml.healthcare.keywords.clone(),
            scratchpad_label: scratchpad_label(config),
        }
    }
}

/// Scratchpad path relative to the project when possible.
pub(crate) fn scratchpad_label(config: &LoopConfig) -> String {
    let path = config.scratchpad_path();
    path.strip_prefix(&config.project_dir)
        .unwrap_or(&path)
        .display()
        .to_string()
}

/// Phased orchestrator over a scratchpad, a state file and a command runner.
pub struct Orchestrator<R: CommandRunner> {
    settings: OrchestratorSettings,
    scratchpad: Scratchpad,
    store: StateStore,
    runner: R,
    lock_path: Option<PathBuf>,
}

impl<R: CommandRunner> Orchestrator<R> {
    pub fn new(
        settings: OrchestratorSettings,
        scratchpad: Scratchpad,
        store: StateStore,
        runner: R,
    ) -> Self {
        Self {
            settings,
            scratchpad,
            store,
            runner,
            lock_path: None,
        }
    }

    pub fn from_config(config: &LoopConfig, runner: R) -> Self {
        Self::new(
            OrchestratorSettings::from_config(config),
            Scratchpad::new(config.scratchpad_path()),
            StateStore::new(config.state_file()),
            runner,
        )
        .with_turn_lock(config.lock_file())
    }

    /// Hold an exclusive lock on `path` while a turn mutates anything.
    pub fn with_turn_lock(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    #[cfg(test)]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run one turn.
    pub async fn turn(&self, input: &TurnInput) -> Result<TurnOutput> {
        if !input.is_completed() {
            tracing::debug!(status = ?input.status, "agent run did not complete, nothing to do");
            return Ok(TurnOutput::stop());
        }

        let _lock = match &self.lock_path {
            Some(path) => Some(TurnLock::acquire(path)?),
            None => None,
        };

        if input.loop_count >= self.settings.max_iterations {
            tracing::warn!(
                loop_count = input.loop_count,
                max_iterations = self.settings.max_iterations,
                "iteration budget exhausted"
            );
            self.scratchpad.append(&format!(
                "\n[loopwarden] STOP: reached MAX_ITERATIONS={}\n",
                self.settings.max_iterations
            ))?;
            return Ok(TurnOutput::stop());
        }

        let text = self.scratchpad.read()?;
        let Some(mut state) = self
            .store
            .load_or_recover(&text)
            .context("Failed to load run state")?
        else {
            return self.initialize(&text).await;
        };

        tracing::info!(
            phase = %state.phase,
            loop_count = input.loop_count,
            run_id = %state.run_id,
            "orchestrator turn"
        );

        match state.phase {
            Phase::Grind => self.handle_grind(&mut state, input.loop_count).await,
            Phase::EventSchema | Phase::ProjectionCheck | Phase::GdprScan | Phase::DiagramsSync => {
                self.handle_agent_phase(&mut state, input.loop_count)
            }
            Phase::Done => self.handle_done(),
        }
    }

    /// Classify the touched paths, freeze the plan and point the agent at its
    /// first phase. No commands besides the git queries run on this turn.
    async fn initialize(&self, scratchpad_text: &str) -> Result<TurnOutput> {
        let touched = collect_touched_paths(&self.runner).await?;
        let classification = classify(scratchpad_text, &touched, &self.settings.healthcare_keywords);
        let plan = Plan::build(&classification);
        let state = RunState::new(plan, touched, classification.healthcare.clone());

        self.scratchpad.append(&format!("\n{}\n", INIT_HEADER))?;
        self.scratchpad.set_marker(PLAN_KEY, &state.plan.to_marker())?;
        self.scratchpad.set_marker(PHASE_KEY, state.phase.as_str())?;
        let touched_marker = if state.touched_at_init.is_empty() {
            "(none)".to_string()
        } else {
            state.touched_at_init.join(";")
        };
        self.scratchpad.set_marker(TOUCHED_KEY, &touched_marker)?;
        let healthcare = if state.healthcare.enabled { "YES" } else { "NO" };
        self.scratchpad.set_marker(HEALTHCARE_MODE_KEY, healthcare)?;
        if !state.healthcare.reasons.is_empty() {
            self.scratchpad
                .set_marker(HEALTHCARE_REASON_KEY, &state.healthcare.reasons.join(" | "))?;
        } else if !self.scratchpad.get_marker(HEALTHCARE_REASON_KEY)?.is_empty() {
            // left over from an earlier run
            self.scratchpad.set_marker(HEALTHCARE_REASON_KEY, "")?;
        }
        self.store.save(&state)?;

        tracing::info!(
            run_id = %state.run_id,
            plan = %state.plan,
            healthcare = state.healthcare.enabled,
            touched = state.touched_at_init.len(),
            "initialized orchestration plan"
        );

        let touched_list = if state.touched_at_init.is_empty() {
            "(none)".to_string()
        } else {
            state.touched_at_init.join(", ")
        };
        let message = [
            format!("[loopwarden] Initialized plan: {}", state.plan),
            format!("Touched paths: {}", touched_list),
            String::new(),
            format!("Proceed with phase: {}", state.phase),
            format!(
                "Follow the instructions below and update {} markers when done.",
                self.settings.scratchpad_label
            ),
        ]
        .join("\n");
        Ok(TurnOutput::followup(format!(
            "{}\n\n{}",
            message,
            state.phase.instructions(&self.settings.test_cmd)
        )))
    }

    async fn handle_grind(&self, state: &mut RunState, loop_count: u32) -> Result<TurnOutput> {
        let iteration = loop_count + 1;
        let test_cmd = &self.settings.test_cmd;

        let base = self.runner.run(test_cmd).await?;
        self.append_summary("GRIND", iteration, test_cmd, &base)?;
        if !base.success() {
            tracing::info!(exit_code = base.exit_code, timed_out = base.timed_out, "base tests failed");
            return Ok(TurnOutput::followup(self.not_green_message(
                iteration,
                "Base tests are NOT green.",
                "Fix minimal root cause ONLY. Do not expand scope.",
                test_cmd,
                &base,
            )));
        }

        let touched = collect_touched_paths(&self.runner).await?;
        let decision = e2e::decide(&touched, self.settings.run_e2e_when_frontend_unclassified);
        self.scratchpad.append(&format!(
            "\n[loopwarden] E2E_DECISION={} REASON={}\n",
            if decision.run { "YES" } else { "NO" },
            decision.reasons.join(" | ")
        ))?;
        tracing::debug!(run = decision.run, reasons = ?decision.reasons, "e2e decision");

        if decision.run {
            let e2e_cmd = &self.settings.e2e_cmd;
            let e2e = self.runner.run(e2e_cmd).await?;
            self.append_summary("E2E", iteration, e2e_cmd, &e2e)?;
            if !e2e.success() {
                tracing::info!(exit_code = e2e.exit_code, timed_out = e2e.timed_out, "e2e failed");
                return Ok(TurnOutput::followup(self.not_green_message(
                    iteration,
                    "E2E is NOT green (frontend touched).",
                    "Fix minimal root cause ONLY. Avoid brittle selectors if possible.",
                    e2e_cmd,
                    &e2e,
                )));
            }
        }

        self.scratchpad.append(&format!(
            "\n[loopwarden] GRIND green (base{}). Advancing.\n",
            if decision.run { "+e2e" } else { "" }
        ))?;
        self.advance(state, loop_count)
    }

    /// Agent phases are complete once the agent wrote `ORCH:PHASE_DONE=<phase>`
    /// on a line of its own.
    fn handle_agent_phase(&self, state: &mut RunState, loop_count: u32) -> Result<TurnOutput> {
        let phase = state.phase;
        let marker = phase.done_marker();

        if !self.scratchpad.has_line(&marker)? {
            tracing::debug!(phase = %phase, "waiting for phase completion marker");
            let message = [
                format!("[loopwarden] Phase \"{}\" pending.", phase),
                format!(
                    "Complete the phase and then append this exact line to {}:",
                    self.settings.scratchpad_label
                ),
                marker,
                String::new(),
                "Phase instructions:".to_string(),
                phase.instructions(&self.settings.test_cmd),
            ]
            .join("\n");
            return Ok(TurnOutput::followup(message));
        }

        self.scratchpad
            .append(&format!("\n[loopwarden] {} completed. Advancing.\n", phase))?;
        self.advance(state, loop_count)
    }

    fn handle_done(&self) -> Result<TurnOutput> {
        self.scratchpad
            .append("\n[loopwarden] DONE. No further actions.\n")?;
        Ok(TurnOutput::stop())
    }

    fn advance(&self, state: &mut RunState, loop_count: u32) -> Result<TurnOutput> {
        let from = state.phase;
        let next = state.advance(loop_count);
        self.store.save(state)?;
        self.scratchpad.set_marker(PHASE_KEY, next.as_str())?;
        tracing::info!(from = %from, to = %next, loop_count, "phase advanced");

        if next == Phase::Done {
            self.scratchpad.append("\n[loopwarden] All phases done.\n")?;
            return Ok(TurnOutput::stop());
        }

        Ok(TurnOutput::followup(format!(
            "[loopwarden] Next phase: {}\n\n{}",
            next,
            next.instructions(&self.settings.test_cmd)
        )))
    }

    fn append_summary(&self, label: &str, iteration: u32, command: &str, result: &RunResult) -> Result<()> {
        let summary = format_run_summary(label, iteration, command, result, self.settings.truncate_chars);
        self.scratchpad.append(&summary)?;
        Ok(())
    }

    fn not_green_message(
        &self,
        iteration: u32,
        headline: &str,
        advice: &str,
        command: &str,
        result: &RunResult,
    ) -> String {
        let mut lines = vec![
            format!("[Iteration {}/{}] {}", iteration, self.settings.max_iterations, headline),
            advice.to_string(),
        ];
        if result.timed_out {
            lines.push("The command timed out and was killed; look for a hang before anything else.".to_string());
        }
        lines.push(String::new());
        lines.push(format!("Re-run: {}", command));
        lines.join("\n")
    }
}

/// Forget the current run: delete the state file and blank the plan and phase
/// mirrors so the next turn initializes a fresh plan. Returns whether a run
/// existed. The scratchpad itself is kept.
pub fn reset_run(store: &StateStore, scratchpad: &Scratchpad) -> Result<bool> {
    let had_state = store.reset()?;
    let had_markers = !scratchpad.get_marker(PLAN_KEY)?.is_empty();
    if had_markers {
        scratchpad.set_marker(PLAN_KEY, "")?;
        scratchpad.set_marker(PHASE_KEY, "")?;
    }
    if !scratchpad.get_marker(HEALTHCARE_REASON_KEY)?.is_empty() {
        scratchpad.set_marker(HEALTHCARE_REASON_KEY, "")?;
    }
    if had_state || had_markers {
        scratchpad.append("\n[loopwarden] Run state reset.\n")?;
    }
    Ok(had_state || had_markers)
}
