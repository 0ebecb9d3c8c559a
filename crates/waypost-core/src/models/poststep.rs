//! Durable step records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::pathrun::RunState;
use super::pathway::Post;
use super::VarMap;

/// The variable environment snapshot carried by a step.
///
/// `inputs` holds the environment the step starts from, `parameters` the
/// post's declared parameter templates, and `outputs` the environment the
/// step produced once it completed. The active environment of a step is
/// therefore `outputs` when present, `inputs` otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepVariables {
    #[serde(default)]
    pub inputs: VarMap,

    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<VarMap>,
}

impl StepVariables {
    pub fn new(inputs: VarMap, parameters: HashMap<String, serde_json::Value>) -> Self {
        Self {
            inputs,
            parameters,
            outputs: None,
        }
    }

    /// The environment this step's execution starts from or produced.
    pub fn environment(&self) -> &VarMap {
        self.outputs.as_ref().unwrap_or(&self.inputs)
    }
}

/// One durable execution record of a single post within a path run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostStep {
    pub pathrun_id: String,

    /// Per-run sequential id, starting at 1
    pub poststep_id: i64,

    /// Snapshot of the post being executed
    pub post: Post,

    pub owner_agent_id: String,

    pub pathway_id: String,

    pub state: RunState,

    pub status_msg: String,

    pub variables: StepVariables,

    /// Id of the step executed before this one (0 for the first step)
    pub last_poststep: Option<i64>,

    /// Id of the step executed after this one, linked once it is created
    pub next_poststep: Option<i64>,

    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_environment_prefers_outputs() {
        let mut vars = StepVariables::new(
            VarMap::from([("a".to_string(), json!(1))]),
            HashMap::new(),
        );
        assert_eq!(vars.environment().get("a"), Some(&json!(1)));

        vars.outputs = Some(VarMap::from([("a".to_string(), json!(2))]));
        assert_eq!(vars.environment().get("a"), Some(&json!(2)));
    }
}
