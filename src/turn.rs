//! Stop-hook wire format.
//!
//! The agent driver sends one JSON object per turn on stdin and reads one
//! JSON object back from stdout: `{}` to stop, or `{"followup_message": ...}`
//! to start another agent turn with those instructions.

use crate::errors::LoopError;
use serde::{Deserialize, Serialize};

/// How the agent's last run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Completed,
    Aborted,
    Error,
}

/// Input supplied by the driver for each turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnInput {
    #[serde(default)]
    pub conversation_id: String,
    pub status: TurnStatus,
    #[serde(default)]
    pub loop_count: u32,
}

impl TurnInput {
    pub fn parse(json: &str) -> Result<Self, LoopError> {
        serde_json::from_str(json.trim()).map_err(LoopError::InvalidInput)
    }

    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}

/// Output for the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_message: Option<String>,
}

impl TurnOutput {
    /// No further agent turn.
    pub fn stop() -> Self {
        Self::default()
    }

    pub fn followup(message: impl Into<String>) -> Self {
        Self {
            followup_message: Some(message.into()),
        }
    }

    pub fn is_stop(&self) -> bool {
        self.followup_message.is_none()
    }

    pub fn to_json(&self) -> String {
        // A struct with one optional string field always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
