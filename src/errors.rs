//! Typed error hierarchy for loopwarden.
//!
//! `LoopError` covers the leaf subsystems (scratchpad, run state, turn lock,
//! command runner, turn input). The orchestration and CLI layers wrap these in
//! `anyhow` with additional context.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the scratchpad, state store, runner and turn decoding.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("Failed to read scratchpad at {path}: {source}")]
    ScratchpadRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write scratchpad at {path}: {source}")]
    ScratchpadWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read run state at {path}: {source}")]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write run state at {path}: {source}")]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse run state at {path}: {source}")]
    StateParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to acquire turn lock at {path}: {source}")]
    LockFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn command `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid turn input: {0}")]
    InvalidInput(#[source] serde_json::Error),

    #[error("Unknown phase '{0}'. Valid values: GRIND, EVENT_SCHEMA, PROJECTION_CHECK, GDPR_SCAN, DIAGRAMS_SYNC, DONE")]
    UnknownPhase(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratchpad_write_carries_path() {
        let path = PathBuf::from("/repo/.cursor/scratchpad.md");
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = LoopError::ScratchpadWrite {
            path: path.clone(),
            source: io_err,
        };
        match &err {
            LoopError::ScratchpadWrite { path: p, source } => {
                assert_eq!(p, &path);
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected ScratchpadWrite"),
        }
        assert!(err.to_string().contains("scratchpad.md"));
    }

    #[test]
    fn unknown_phase_lists_valid_values() {
        let err = LoopError::UnknownPhase("LINT".to_string());
        let msg = err.to_string();
        assert!(msg.contains("LINT"));
        assert!(msg.contains("DIAGRAMS_SYNC"));
    }

    #[test]
    fn spawn_failed_names_command() {
        let err = LoopError::SpawnFailed {
            command: "./scripts/test.sh".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "sh not found"),
        };
        assert!(err.to_string().contains("./scripts/test.sh"));
    }

    #[test]
    fn converts_from_anyhow() {
        let err: LoopError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, LoopError::Other(_)));
    }

    #[test]
    fn implements_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&LoopError::UnknownPhase("X".into()));
    }
}
