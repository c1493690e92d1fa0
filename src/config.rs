//! Layered configuration for loopwarden.
//!
//! Settings come from `.loopwarden/loopwarden.toml`, then environment
//! variables, then CLI flags. Every key is optional.
//!
//! # Configuration File Format
//!
//! ```toml
//! [scratchpad]
//! path = ".cursor/scratchpad.md"
//! truncate_chars = 6000
//!
//! [commands]
//! test = "./scripts/test.sh"
//! e2e = "cd frontend && npx playwright test"
//! timeout_secs = 1800
//!
//! [orchestrator]
//! max_iterations = 8
//!
//! [grind]
//! max_iterations = 5
//!
//! [e2e]
//! run_when_frontend_unclassified = false
//!
//! [healthcare]
//! keywords = ["patient", "medical", "therapy"]
//!
//! [logging]
//! file = false
//! ```

use crate::classify::DEFAULT_HEALTHCARE_KEYWORDS;
use crate::scratchpad::DEFAULT_TRUNCATE_CHARS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-project loopwarden directory.
pub const LOOPWARDEN_DIR: &str = ".loopwarden";
pub const CONFIG_FILE: &str = "loopwarden.toml";

pub const ENV_TEST_CMD: &str = "LOOPWARDEN_TEST_CMD";
pub const ENV_E2E_CMD: &str = "LOOPWARDEN_E2E_CMD";
pub const ENV_TIMEOUT_SECS: &str = "LOOPWARDEN_TIMEOUT_SECS";
pub const ENV_SCRATCHPAD: &str = "LOOPWARDEN_SCRATCHPAD";

/// Scratchpad location and summary size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchpadSection {
    #[serde(default = "default_scratchpad_path")]
    pub path: PathBuf,
    /// Character budget for stdout/stderr excerpts in run summaries
    #[serde(default = "default_truncate_chars")]
    pub truncate_chars: usize,
}

fn default_scratchpad_path() -> PathBuf {
    PathBuf::from(".cursor").join("scratchpad.md")
}

fn default_truncate_chars() -> usize {
    DEFAULT_TRUNCATE_CHARS
}

impl Default for ScratchpadSection {
    fn default() -> Self {
        Self {
            path: default_scratchpad_path(),
            truncate_chars: default_truncate_chars(),
        }
    }
}

/// Commands run by the GRIND phase and the grind loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsSection {
    #[serde(default = "default_test_cmd")]
    pub test: String,
    #[serde(default = "default_e2e_cmd")]
    pub e2e: String,
    /// Upper bound for any single command
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_test_cmd() -> String {
    "./scripts/test.sh".to_string()
}

fn default_e2e_cmd() -> String {
    "cd frontend && npx playwright test".to_string()
}

fn default_timeout_secs() -> u64 {
    1800
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            test: default_test_cmd(),
            e2e: default_e2e_cmd(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default = "default_orchestrator_max_iterations")]
    pub max_iterations: u32,
}

fn default_orchestrator_max_iterations() -> u32 {
    8
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_iterations: default_orchestrator_max_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrindSection {
    #[serde(default = "default_grind_max_iterations")]
    pub max_iterations: u32,
}

fn default_grind_max_iterations() -> u32 {
    5
}

impl Default for GrindSection {
    fn default() -> Self {
        Self {
            max_iterations: default_grind_max_iterations(),
        }
    }
}

/// E2E relevance policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct E2eSection {
    /// Run E2E when frontend files changed but none look flow-relevant
    #[serde(default)]
    pub run_when_frontend_unclassified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthcareSection {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

fn default_keywords() -> Vec<String> {
    DEFAULT_HEALTHCARE_KEYWORDS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

impl Default for HealthcareSection {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Also write logs to `.loopwarden/logs/`
    #[serde(default)]
    pub file: bool,
}

/// The complete loopwarden.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopToml {
    #[serde(default)]
    pub scratchpad: ScratchpadSection,
    #[serde(default)]
    pub commands: CommandsSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub grind: GrindSection,
    #[serde(default)]
    pub e2e: E2eSection,
    #[serde(default)]
    pub healthcare: HealthcareSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl LoopToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse loopwarden.toml")
    }

    /// Load `.loopwarden/loopwarden.toml`, or defaults if it doesn't exist.
    pub fn load_or_default(loopwarden_dir: &Path) -> Result<Self> {
        let path = loopwarden_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize loopwarden.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.commands.test.trim().is_empty() {
            warnings.push("commands.test is empty: GRIND can never pass".to_string());
        }
        if self.commands.e2e.trim().is_empty() {
            warnings.push("commands.e2e is empty".to_string());
        }
        if self.commands.timeout_secs == 0 {
            warnings.push("commands.timeout_secs is 0: every command will time out".to_string());
        }
        if self.orchestrator.max_iterations == 0 {
            warnings.push("orchestrator.max_iterations is 0: every turn stops immediately".to_string());
        }
        if self.grind.max_iterations == 0 {
            warnings.push("grind.max_iterations is 0: every turn stops immediately".to_string());
        }
        if self.scratchpad.truncate_chars == 0 {
            warnings.push("scratchpad.truncate_chars is 0: run output will not be logged".to_string());
        }
        if self.healthcare.keywords.is_empty() {
            warnings.push("healthcare.keywords is empty: only markers enable healthcare mode".to_string());
        }

        warnings
    }
}

/// Effective configuration: loopwarden.toml merged with env and CLI.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub project_dir: PathBuf,
    pub loopwarden_dir: PathBuf,
    pub toml: LoopToml,
    pub verbose: bool,
}

impl LoopConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let loopwarden_dir = project_dir.join(LOOPWARDEN_DIR);
        let toml = LoopToml::load_or_default(&loopwarden_dir)?;

        Ok(Self {
            project_dir,
            loopwarden_dir,
            toml,
            verbose: false,
        })
    }

    pub fn with_cli_args(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        Ok(config)
    }

    /// Test command (env → file → default).
    pub fn test_cmd(&self) -> String {
        std::env::var(ENV_TEST_CMD).unwrap_or_else(|_| self.toml.commands.test.clone())
    }

    /// E2E command (env → file → default).
    pub fn e2e_cmd(&self) -> String {
        std::env::var(ENV_E2E_CMD).unwrap_or_else(|_| self.toml.commands.e2e.clone())
    }

    /// Per-command timeout. An unparseable env value falls back to the file.
    pub fn command_timeout(&self) -> Duration {
        let secs = std::env::var(ENV_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(self.toml.commands.timeout_secs);
        Duration::from_secs(secs)
    }

    /// Scratchpad path, resolved against the project directory.
    pub fn scratchpad_path(&self) -> PathBuf {
        let configured = std::env::var(ENV_SCRATCHPAD)
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.toml.scratchpad.path.clone());
        if configured.is_absolute() {
            configured
        } else {
            self.project_dir.join(configured)
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.loopwarden_dir.join("state.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.loopwarden_dir.join("turn.lock")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.loopwarden_dir.join("logs")
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
