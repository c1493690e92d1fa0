//! Shell command execution with a bounded duration.
//!
//! Commands run through `sh -c` in the project directory with stdin closed.
//! stdout and stderr are captured and trimmed. A command that outlives the
//! configured timeout is killed together with everything it started, and is
//! reported as a failing [`RunResult`] with `timed_out` set; it never stalls the turn.

use crate::errors::LoopError;
use crate::scratchpad::{SUMMARY_SEPARATOR, truncate};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Exit code reported for a command killed by the timeout (same as `timeout(1)`).
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Outcome of a single command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    pub fn passed(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Default::default()
        }
    }
}

/// Executes shell commands on behalf of the orchestrator.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<RunResult, LoopError>;
}

/// Runs commands through `sh -c` with a timeout.
pub struct ShellRunner {
    working_dir: PathBuf,
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(working_dir: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            timeout,
        }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<RunResult, LoopError> {
        tracing::debug!(command, timeout_secs = self.timeout.as_secs_f64(), "running command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout reaches everything `sh` started.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| LoopError::SpawnFailed {
            command: command.to_string(),
            source,
        })?;
        let pid = child.id();

        // On expiry the group is killed here; dropping the wait future reaps the child.
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| LoopError::SpawnFailed {
                command: command.to_string(),
                source,
            })?,
            Err(_) => {
                tracing::warn!(command, timeout_secs = self.timeout.as_secs_f64(), "command timed out");
                if let Some(pid) = pid {
                    process_group::kill(pid);
                }
                return Ok(RunResult {
                    exit_code: TIMEOUT_EXIT_CODE,
                    stdout: String::new(),
                    stderr: format!(
                        "Command timed out after {:.1}s and was killed",
                        self.timeout.as_secs_f64()
                    ),
                    timed_out: true,
                });
            }
        };

        // Killed by a signal: no code to report, count it as a failure.
        let exit_code = output.status.code().unwrap_or(1);
        tracing::debug!(command, exit_code, "command finished");

        Ok(RunResult {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            timed_out: false,
        })
    }
}

#[cfg(unix)]
mod process_group {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    /// SIGKILL every process in the group led by `pid`.
    pub fn kill(pid: u32) {
        let Ok(raw) = i32::try_from(pid) else {
            return;
        };
        match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
            // Group already gone
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!(pid, error = %e, "failed to kill process group"),
        }
    }
}

#[cfg(not(unix))]
mod process_group {
    /// No-op on non-Unix platforms; `kill_on_drop` covers the direct child.
    pub fn kill(_pid: u32) {}
}

/// Render a run as a `====` delimited scratchpad block.
pub fn format_run_summary(
    label: &str,
    iteration: u32,
    command: &str,
    result: &RunResult,
    max_chars: usize,
) -> String {
    let status = if result.success() { "PASS" } else { "FAIL" };
    let mut lines = vec![
        format!("\n{}", SUMMARY_SEPARATOR),
        format!("[loopwarden] {} Iteration {} - {}", label, iteration, status),
        format!("Command: {}", command),
        format!("Exit code: {}", result.exit_code),
    ];
    if result.timed_out {
        lines.push("Timed out: yes".to_string());
    }
    if !result.stdout.is_empty() {
        lines.push(format!("\n--- STDOUT ---\n{}", truncate(&result.stdout, max_chars)));
    }
    if !result.stderr.is_empty() {
        lines.push(format!("\n--- STDERR ---\n{}", truncate(&result.stderr, max_chars)));
    }
    lines.push(format!("{}\n", SUMMARY_SEPARATOR));
    lines.join("\n")
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner for state-machine tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns canned results per command and records every invocation.
    /// Commands without a script pass with empty output.
    #[derive(Default)]
    pub struct ScriptedRunner {
        scripts: HashMap<String, RunResult>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, command: &str, result: RunResult) -> Self {
            self.scripts.insert(command.to_string(), result);
            self
        }

        /// Report `paths` as unstaged changes from `git diff --name-only`.
        pub fn with_touched(self, paths: &[&str]) -> Self {
            let listing = paths.join("\n");
            self.with("git diff --name-only", RunResult::passed(listing))
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn was_called(&self, command: &str) -> bool {
            self.calls().iter().any(|c| c == command)
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, command: &str) -> Result<RunResult, LoopError> {
            self.calls.lock().unwrap().push(command.to_string());
            Ok(self.scripts.get(command).cloned().unwrap_or_default())
        }
    }
}
