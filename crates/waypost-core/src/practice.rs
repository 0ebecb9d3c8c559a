//! Local capability registry.
//!
//! An agent exposes practices directly and through its pits (named
//! component groups). Handlers are in-process functions taking the
//! substituted parameter payload and returning the practice result,
//! which the step executor maps back into workflow variables.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::models::VarMap;

/// An in-process practice implementation.
pub type PracticeHandler =
    Box<dyn Fn(&VarMap) -> Result<serde_json::Value, EngineError> + Send + Sync>;

/// A named component exposing a set of practices.
pub struct Pit {
    pub name: String,
    practices: HashMap<String, PracticeHandler>,
}

impl Pit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            practices: HashMap::new(),
        }
    }

    pub fn add_practice(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&VarMap) -> Result<serde_json::Value, EngineError> + Send + Sync + 'static,
    ) -> Self {
        self.practices.insert(name.into(), Box::new(handler));
        self
    }

    pub fn practice_names(&self) -> Vec<String> {
        self.practices.keys().cloned().collect()
    }
}

/// The practices one agent can dispatch locally: its own plus those of
/// its pits.
#[derive(Default)]
pub struct PracticeRegistry {
    practices: HashMap<String, PracticeHandler>,
    pits: Vec<Pit>,
}

impl PracticeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a practice directly on the agent.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&VarMap) -> Result<serde_json::Value, EngineError> + Send + Sync + 'static,
    ) {
        self.practices.insert(name.into(), Box::new(handler));
    }

    /// Attach a pit; its practices become dispatchable as `pit/practice`.
    pub fn add_pit(&mut self, pit: Pit) {
        self.pits.push(pit);
    }

    /// Whether the agent directly exposes this practice.
    pub fn has(&self, practice: &str) -> bool {
        self.practices.contains_key(practice)
    }

    /// Search the attached pits for a practice; returns the qualified
    /// name (`pit/practice`) of the first pit that exposes it.
    pub fn find_in_pits(&self, practice: &str) -> Option<String> {
        self.pits
            .iter()
            .find(|pit| pit.practices.contains_key(practice))
            .map(|pit| format!("{}/{}", pit.name, practice))
    }

    /// Invoke a practice by plain or qualified (`pit/practice`) name.
    pub fn invoke(
        &self,
        qualified: &str,
        payload: &VarMap,
    ) -> Result<serde_json::Value, EngineError> {
        let handler = match qualified.split_once('/') {
            Some((pit_name, practice)) => self
                .pits
                .iter()
                .find(|pit| pit.name == pit_name)
                .and_then(|pit| pit.practices.get(practice)),
            None => self.practices.get(qualified),
        };
        match handler {
            Some(handler) => handler(payload),
            None => Err(EngineError::NotFound(format!(
                "No local handler for practice '{}'",
                qualified
            ))),
        }
    }
}
