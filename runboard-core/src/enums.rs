//! Enum types for runboard entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CORE ENUMS
// ============================================================================

/// Lifecycle status of a remote run.
///
/// Runs move `Queued -> Initializing -> Processing -> PostProcess` and end in
/// either `Done` or `Failed`. Wire names are kebab-case (`"post-process"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Queued,
    Initializing,
    Processing,
    PostProcess,
    Done,
    Failed,
}

impl RunStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [RunStatus; 6] = [
        RunStatus::Queued,
        RunStatus::Initializing,
        RunStatus::Processing,
        RunStatus::PostProcess,
        RunStatus::Done,
        RunStatus::Failed,
    ];

    /// A terminal status is never expected to change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Failed)
    }

    /// Wire name used in persisted documents.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Initializing => "initializing",
            RunStatus::Processing => "processing",
            RunStatus::PostProcess => "post-process",
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
        }
    }
}

/// Which cache tier a record belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreTier {
    /// In-process, TTL-bounded memory table.
    Ephemeral,
    /// Per-user on-disk store.
    Durable,
}

impl StoreTier {
    pub fn is_durable(self) -> bool {
        matches!(self, StoreTier::Durable)
    }
}

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "queued" | "pending" => Ok(RunStatus::Queued),
            "initializing" | "init" => Ok(RunStatus::Initializing),
            "processing" | "running" => Ok(RunStatus::Processing),
            "postprocess" | "postprocessing" => Ok(RunStatus::PostProcess),
            "done" | "completed" | "complete" => Ok(RunStatus::Done),
            "failed" | "failure" | "error" => Ok(RunStatus::Failed),
            _ => Err(format!("Invalid RunStatus: {}", s)),
        }
    }
}

impl fmt::Display for StoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            StoreTier::Ephemeral => "Ephemeral",
            StoreTier::Durable => "Durable",
        };
        write!(f, "{}", value)
    }
}
