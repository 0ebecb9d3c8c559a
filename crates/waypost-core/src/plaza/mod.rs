//! Plaza — the agent directory.
//!
//! A plaza knows which agents are currently active and which practices
//! each of their components advertises. The engine only needs one
//! operation from it, so it is a trait; the production implementation
//! queries a directory service over HTTP, and tests substitute a stub.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One component's advertised capability catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentInfo {
    #[serde(default)]
    pub practices: Vec<String>,
}

/// One active agent as listed by a plaza.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentListing {
    pub agent_id: String,
    #[serde(default)]
    pub components: HashMap<String, ComponentInfo>,
}

/// Agent directory service.
#[async_trait]
pub trait Plaza: Send + Sync {
    /// List the currently active agents with their capability catalogs.
    async fn list_active_agents(&self) -> Result<Vec<AgentListing>, EngineError>;
}

/// Directory client backed by an HTTP plaza service.
pub struct HttpPlaza {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPlaza {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Plaza for HttpPlaza {
    async fn list_active_agents(&self) -> Result<Vec<AgentListing>, EngineError> {
        let url = format!("{}/agents/active", self.base_url.trim_end_matches('/'));
        tracing::debug!("Listing active agents from plaza: {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Dispatch(format!("Plaza request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(EngineError::Dispatch(format!(
                "Plaza returned {}",
                response.status()
            )));
        }
        response
            .json::<Vec<AgentListing>>()
            .await
            .map_err(|e| EngineError::Dispatch(format!("Invalid plaza response: {}", e)))
    }
}
