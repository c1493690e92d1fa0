//! Golden-path grind: the single-phase loop.
//!
//! Every turn runs the test command and logs the run. The loop stops once the
//! tests pass and the agent has written a line reading exactly `DONE` to the
//! scratchpad.

use crate::config::LoopConfig;
use crate::orchestrator::TurnLock;
use crate::orchestrator::machine::scratchpad_label;
use crate::runner::{CommandRunner, format_run_summary};
use crate::scratchpad::Scratchpad;
use crate::turn::{TurnInput, TurnOutput};
use anyhow::Result;
use std::path::PathBuf;

/// Line the agent writes when it considers the work green.
pub const DONE_LINE: &str = "DONE";

#[derive(Debug, Clone)]
pub struct GrindSettings {
    pub test_cmd: String,
    pub max_iterations: u32,
    pub truncate_chars: usize,
    pub scratchpad_label: String,
}

impl Default for GrindSettings {
    fn default() -> Self {
        let toml = crate::config::LoopToml::default();
        Self {
            test_cmd: toml.commands.test,
            max_iterations: toml.grind.max_iterations,
            truncate_chars: toml.scratchpad.truncate_chars,
            scratchpad_label: toml.scratchpad.path.display().to_string(),
        }
    }
}

impl GrindSettings {
    pub fn from_config(config: &LoopConfig) -> Self {
        Self {
            test_cmd: config.test_cmd(),
            max_iterations: config.toml.grind.max_iterations,
            truncate_chars: config.toml.scratchpad.truncate_chars,
            scratchpad_label: scratchpad_label(config),
        }
    }
}

pub struct GrindLoop<R: CommandRunner> {
    settings: GrindSettings,
    scratchpad: Scratchpad,
    runner: R,
    lock_path: Option<PathBuf>,
}

impl<R: CommandRunner> GrindLoop<R> {
    pub fn new(settings: GrindSettings, scratchpad: Scratchpad, runner: R) -> Self {
        Self {
            settings,
            scratchpad,
            runner,
            lock_path: None,
        }
    }

    pub fn from_config(config: &LoopConfig, runner: R) -> Self {
        Self::new(
            GrindSettings::from_config(config),
            Scratchpad::new(config.scratchpad_path()),
            runner,
        )
        .with_turn_lock(config.lock_file())
    }

    pub fn with_turn_lock(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    #[cfg(test)]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub async fn turn(&self, input: &TurnInput) -> Result<TurnOutput> {
        if !input.is_completed() {
            tracing::debug!(status = ?input.status, "agent run did not complete, nothing to do");
            return Ok(TurnOutput::stop());
        }

        let _lock = match &self.lock_path {
            Some(path) => Some(TurnLock::acquire(path)?),
            None => None,
        };

        let max = self.settings.max_iterations;
        if input.loop_count >= max {
            tracing::warn!(loop_count = input.loop_count, max_iterations = max, "grind budget exhausted");
            self.scratchpad
                .append(&format!("\n[loopwarden] grind reached MAX_ITERATIONS={}. STOP.\n", max))?;
            return Ok(TurnOutput::stop());
        }

        let iteration = input.loop_count + 1;
        let test_cmd = &self.settings.test_cmd;
        let result = self.runner.run(test_cmd).await?;
        self.scratchpad.append(&format_run_summary(
            "Grind",
            iteration,
            test_cmd,
            &result,
            self.settings.truncate_chars,
        ))?;

        let tests_passed = result.success();
        let has_done = self.scratchpad.has_line(DONE_LINE)?;
        tracing::info!(iteration, tests_passed, has_done, "grind turn");

        if tests_passed && has_done {
            self.scratchpad
                .append("\n[loopwarden] Green state confirmed. STOP.\n")?;
            return Ok(TurnOutput::stop());
        }

        let label = &self.settings.scratchpad_label;
        let message = [
            format!("[Iteration {}/{}] Golden path is not green yet.", iteration, max),
            format!("- Tests passed: {}", tests_passed),
            format!("- Scratchpad DONE: {}", has_done),
            String::new(),
            "Continue working with minimal fixes only. Do not expand scope.".to_string(),
            format!("1) Read latest failures from {}", label),
            "2) Fix the root cause".to_string(),
            format!("3) Re-run {}", test_cmd),
            format!("4) When fully green, add a line reading DONE to {}", label),
        ]
        .join("\n");
        Ok(TurnOutput::followup(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunResult;
    use crate::runner::testing::ScriptedRunner;
    use crate::turn::TurnStatus;
    use tempfile::tempdir;

    fn grind(dir: &std::path::Path, runner: ScriptedRunner) -> GrindLoop<ScriptedRunner> {
        GrindLoop::new(
            GrindSettings::default(),
            Scratchpad::new(dir.join(".cursor/scratchpad.md")),
            runner,
        )
    }

    fn completed(loop_count: u32) -> TurnInput {
        TurnInput {
            conversation_id: String::new(),
            status: TurnStatus::Completed,
            loop_count,
        }
    }

    #[tokio::test]
    async fn test_incomplete_turn_is_noop() {
        let dir = tempdir().unwrap();
        let g = grind(dir.path(), ScriptedRunner::new());
        let input = TurnInput {
            status: TurnStatus::Aborted,
            ..completed(0)
        };
        assert!(g.turn(&input).await.unwrap().is_stop());
        assert!(g.runner().calls().is_empty());
        assert!(!dir.path().join(".cursor").exists());
    }

    #[tokio::test]
    async fn test_budget_stop() {
        let dir = tempdir().unwrap();
        let g = grind(dir.path(), ScriptedRunner::new());
        assert!(g.turn(&completed(5)).await.unwrap().is_stop());
        assert_eq!(
            g.scratchpad.read().unwrap(),
            "\n[loopwarden] grind reached MAX_ITERATIONS=5. STOP.\n"
        );
        assert!(g.runner().calls().is_empty());
    }

    #[tokio::test]
    async fn test_failing_tests_continue() {
        let dir = tempdir().unwrap();
        let g = grind(
            dir.path(),
            ScriptedRunner::new().with("./scripts/test.sh", RunResult::failed(1, "assertion failed")),
        );
        g.scratchpad.append("DONE\n").unwrap();

        let out = g.turn(&completed(2)).await.unwrap();
        let msg = out.followup_message.unwrap();
        assert!(msg.starts_with("[Iteration 3/5] Golden path is not green yet."));
        assert!(msg.contains("- Tests passed: false"));
        assert!(msg.contains("- Scratchpad DONE: true"));
        assert!(msg.contains("3) Re-run ./scripts/test.sh"));
        assert!(g.scratchpad.read().unwrap().contains("[loopwarden] Grind Iteration 3 - FAIL"));
    }

    #[tokio::test]
    async fn test_green_without_done_continues() {
        let dir = tempdir().unwrap();
        let g = grind(dir.path(), ScriptedRunner::new());
        // DONE inside a sentence or marker does not count
        g.scratchpad.append("not DONE yet\nORCH:PHASE=DONE\n").unwrap();

        let out = g.turn(&completed(0)).await.unwrap();
        let msg = out.followup_message.unwrap();
        assert!(msg.contains("- Tests passed: true"));
        assert!(msg.contains("- Scratchpad DONE: false"));
    }

    #[tokio::test]
    async fn test_green_with_done_stops() {
        let dir = tempdir().unwrap();
        let g = grind(dir.path(), ScriptedRunner::new().with("./scripts/test.sh", RunResult::passed("ok")));
        g.scratchpad.append("fixed the flake\nDONE\n").unwrap();

        assert!(g.turn(&completed(1)).await.unwrap().is_stop());
        let text = g.scratchpad.read().unwrap();
        assert!(text.contains("[loopwarden] Grind Iteration 2 - PASS"));
        assert!(text.ends_with("\n[loopwarden] Green state confirmed. STOP.\n"));
    }
}
