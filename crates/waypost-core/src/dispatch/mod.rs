//! Remote practice dispatch.
//!
//! A remote call yields a list of response envelopes. The first
//! envelope's `content` is a JSON document whose `body` is expected to
//! carry a `result` object; that object feeds the post's output mapping.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::VarMap;

/// One message of a remote practice response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// JSON document: `{ "body": { "result": ... } }`
    pub content: String,
}

impl ResponseEnvelope {
    /// Wrap a practice result into the envelope shape remote agents send.
    pub fn from_result(result: serde_json::Value) -> Self {
        Self {
            content: serde_json::json!({ "body": { "result": result } }).to_string(),
        }
    }
}

/// Extract the `result` section from a response envelope list.
///
/// An empty list or a malformed first envelope is a dispatch error; a
/// well-formed body without a `result` key is `None` (the caller logs
/// and skips output mapping).
pub fn parse_result(
    envelopes: &[ResponseEnvelope],
) -> Result<Option<serde_json::Value>, EngineError> {
    let first = envelopes
        .first()
        .ok_or_else(|| EngineError::Dispatch("Empty practice response".to_string()))?;
    let content: serde_json::Value = serde_json::from_str(&first.content)
        .map_err(|e| EngineError::Dispatch(format!("Malformed response envelope: {}", e)))?;
    let body = content
        .get("body")
        .ok_or_else(|| EngineError::Dispatch("Response envelope has no body".to_string()))?;
    Ok(body.get("result").cloned())
}

/// Transport for invoking a practice on a remote agent.
#[async_trait]
pub trait PracticeCaller: Send + Sync {
    /// Call `practice` (possibly `component/practice`-qualified) on the
    /// agent at `address` with the substituted parameter payload.
    async fn call(
        &self,
        address: &str,
        practice: &str,
        payload: &VarMap,
    ) -> Result<Vec<ResponseEnvelope>, EngineError>;
}

/// HTTP transport: POSTs the payload to the plaza-routed practice
/// endpoint of the target agent.
pub struct HttpCaller {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCaller {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PracticeCaller for HttpCaller {
    async fn call(
        &self,
        address: &str,
        practice: &str,
        payload: &VarMap,
    ) -> Result<Vec<ResponseEnvelope>, EngineError> {
        // Address is "agent_id@plaza"; the plaza routes by agent id.
        let agent_id = address.split('@').next().unwrap_or(address);
        let url = format!(
            "{}/agents/{}/practices/{}",
            self.base_url.trim_end_matches('/'),
            agent_id,
            practice
        );
        tracing::info!("Dispatching practice {} to {}", practice, url);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| EngineError::Dispatch(format!("Practice request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(EngineError::Dispatch(format!(
                "Practice call to {} returned {}",
                address,
                response.status()
            )));
        }
        response
            .json::<Vec<ResponseEnvelope>>()
            .await
            .map_err(|e| EngineError::Dispatch(format!("Invalid practice response: {}", e)))
    }
}
