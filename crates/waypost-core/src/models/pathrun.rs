//! Durable run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pathway::Pathway;
use super::VarMap;

/// Lifecycle state shared by path runs and post steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "PENDING",
            RunState::Running => "RUNNING",
            RunState::Completed => "COMPLETED",
            RunState::Stopped => "STOPPED",
            RunState::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "RUNNING" => RunState::Running,
            "COMPLETED" => RunState::Completed,
            "STOPPED" => RunState::Stopped,
            "FAILED" => RunState::Failed,
            _ => RunState::Pending,
        }
    }
}

/// One durable execution instance of a pathway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRun {
    /// Generated run id (uuid v4)
    pub pathrun_id: String,

    /// Snapshot of the pathway taken at creation time
    pub pathway: Pathway,

    /// Agent that created the run
    pub owner_agent_id: String,

    /// Whether another agent may take over a stalled run
    pub can_take_over: bool,

    pub state: RunState,

    pub status_msg: String,

    pub description: String,

    /// Initial variable bindings
    pub inputs: VarMap,

    /// Retention hint, in days from `create_time` (0 = unbounded)
    pub days_to_live: i64,

    /// Final results, persisted on completion when the variable
    /// environment carries a `result` key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,

    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<DateTime<Utc>>,
}

/// Partial update applied to a persisted run.
#[derive(Debug, Clone, Default)]
pub struct UpdatePathRunInput {
    pub state: Option<RunState>,
    pub status_msg: Option<String>,
    pub inputs: Option<VarMap>,
}
