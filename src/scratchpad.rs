//! Scratchpad store: the append-only text log shared with the agent.
//!
//! The scratchpad is both a human-readable run log and the channel through
//! which the agent signals progress. Signals are line-oriented `KEY=value`
//! markers. Only the first line for a key counts: `set_marker` rewrites that
//! line in place, `get_marker` reads it.
//!
//! Every operation goes to disk; nothing is cached between calls, so a
//! `get_marker` after `set_marker` in the same process always sees the new
//! value.

use crate::errors::LoopError;
use regex::{NoExpand, Regex};
use std::path::{Path, PathBuf};

/// Separator line used around run-summary blocks.
pub const SUMMARY_SEPARATOR: &str = "==============================";

/// Default character budget for stdout/stderr excerpts in run summaries.
pub const DEFAULT_TRUNCATE_CHARS: usize = 6000;

/// Handle to a scratchpad file on disk.
#[derive(Debug, Clone)]
pub struct Scratchpad {
    path: PathBuf,
}

impl Scratchpad {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full contents, or an empty string if the file does not exist yet.
    pub fn read(&self) -> Result<String, LoopError> {
        if !self.path.exists() {
            return Ok(String::new());
        }
        std::fs::read_to_string(&self.path).map_err(|source| LoopError::ScratchpadRead {
            path: self.path.clone(),
            source,
        })
    }

    /// Append text. Creates the file (and its parent directory) on first use.
    pub fn append(&self, text: &str) -> Result<(), LoopError> {
        let mut content = self.read()?;
        content.push_str(text);
        self.write(&content)
    }

    /// Value of the first `KEY=...` line, trimmed. Empty if absent.
    pub fn get_marker(&self, key: &str) -> Result<String, LoopError> {
        Ok(find_marker(&self.read()?, key).unwrap_or_default())
    }

    /// Replace the first `KEY=...` line, or append `\nKEY=value\n`.
    pub fn set_marker(&self, key: &str, value: &str) -> Result<(), LoopError> {
        let content = self.read()?;
        let re = marker_line_regex(key)?;
        if re.is_match(&content) {
            let line = format!("{}={}", key, value);
            let next = re.replace(&content, NoExpand(&line));
            self.write(&next)
        } else {
            self.append(&format!("\n{}={}\n", key, value))
        }
    }

    /// Whether any line, trimmed, equals `line`.
    pub fn has_line(&self, line: &str) -> Result<bool, LoopError> {
        Ok(contains_line(&self.read()?, line))
    }

    fn write(&self, content: &str) -> Result<(), LoopError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| LoopError::ScratchpadWrite {
                path: self.path.clone(),
                source,
            })?;
        }
        std::fs::write(&self.path, content).map_err(|source| LoopError::ScratchpadWrite {
            path: self.path.clone(),
            source,
        })
    }
}

fn marker_line_regex(key: &str) -> Result<Regex, LoopError> {
    Regex::new(&format!(r"(?m)^{}=.*$", regex::escape(key)))
        .map_err(|e| LoopError::Other(e.into()))
}

/// First value for `key` in `text`, trimmed.
pub fn find_marker(text: &str, key: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?m)^{}=(.*)$", regex::escape(key))).ok()?;
    re.captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Whether `text` has a line that equals `line` after trimming.
pub fn contains_line(text: &str, line: &str) -> bool {
    text.lines().any(|l| l.trim() == line)
}

/// Cut `s` to at most `max` characters, noting how much was dropped.
pub fn truncate(s: &str, max: usize) -> String {
    let total = s.chars().count();
    if total <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max).collect();
    format!("{}\n...[truncated {} chars]", kept, total - max)
}
