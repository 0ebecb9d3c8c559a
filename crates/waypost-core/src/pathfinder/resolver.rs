//! Capability resolution.
//!
//! Deterministic first-match search: the asking agent's own practices,
//! then its pits, then the plaza's listing of remote agents. No load
//! balancing, no caching; absence is a value, not an error.

use std::sync::Arc;

use crate::error::EngineError;
use crate::plaza::Plaza;
use crate::practice::PracticeRegistry;

/// Where a resolved practice should be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTarget {
    /// In-process invocation, by plain or `pit/practice`-qualified name.
    Local { practice: String },
    /// Remote invocation on `address` (`agent_id@plaza`).
    Remote { address: String, practice: String },
}

/// Find a dispatch target for `practice_name`, or `None` if no agent
/// currently offers it.
pub async fn resolve_practice(
    registry: &PracticeRegistry,
    plaza: &Arc<dyn Plaza>,
    self_agent_id: &str,
    plaza_name: &str,
    practice_name: &str,
) -> Result<Option<DispatchTarget>, EngineError> {
    if registry.has(practice_name) {
        tracing::debug!("Found practice {} directly on this agent", practice_name);
        return Ok(Some(DispatchTarget::Local {
            practice: practice_name.to_string(),
        }));
    }

    if let Some(qualified) = registry.find_in_pits(practice_name) {
        tracing::debug!("Found practice {} in a local pit", qualified);
        return Ok(Some(DispatchTarget::Local {
            practice: qualified,
        }));
    }

    tracing::debug!(
        "Practice {} not found locally, searching remote agents",
        practice_name
    );
    for listing in plaza.list_active_agents().await? {
        // Local pits were already checked above.
        if listing.agent_id == self_agent_id {
            continue;
        }
        for (component, info) in &listing.components {
            if info.practices.iter().any(|p| p == practice_name) {
                let qualified = format!("{}/{}", component, practice_name);
                tracing::info!(
                    "Found practice {} on remote agent {}",
                    qualified,
                    listing.agent_id
                );
                return Ok(Some(DispatchTarget::Remote {
                    address: format!("{}@{}", listing.agent_id, plaza_name),
                    practice: qualified,
                }));
            }
        }
    }

    tracing::warn!("No agent found for practice {}", practice_name);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plaza::{AgentListing, ComponentInfo};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    struct StubPlaza {
        listings: Vec<AgentListing>,
    }

    #[async_trait]
    impl Plaza for StubPlaza {
        async fn list_active_agents(&self) -> Result<Vec<AgentListing>, EngineError> {
            Ok(self.listings.clone())
        }
    }

    fn listing(agent_id: &str, component: &str, practices: &[&str]) -> AgentListing {
        AgentListing {
            agent_id: agent_id.to_string(),
            components: HashMap::from([(
                component.to_string(),
                ComponentInfo {
                    practices: practices.iter().map(|p| p.to_string()).collect(),
                },
            )]),
        }
    }

    #[tokio::test]
    async fn test_local_practice_wins_over_remote() {
        let mut registry = PracticeRegistry::new();
        registry.register("Translate", |_| Ok(json!({})));
        let plaza: Arc<dyn Plaza> = Arc::new(StubPlaza {
            listings: vec![listing("remote-1", "translator", &["Translate"])],
        });

        let target = resolve_practice(&registry, &plaza, "self", "MainPlaza", "Translate")
            .await
            .unwrap();
        assert_eq!(
            target,
            Some(DispatchTarget::Local {
                practice: "Translate".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_remote_resolution_skips_self() {
        let registry = PracticeRegistry::new();
        let plaza: Arc<dyn Plaza> = Arc::new(StubPlaza {
            listings: vec![
                listing("self", "translator", &["Translate"]),
                listing("remote-1", "translator", &["Translate"]),
            ],
        });

        let target = resolve_practice(&registry, &plaza, "self", "MainPlaza", "Translate")
            .await
            .unwrap();
        assert_eq!(
            target,
            Some(DispatchTarget::Remote {
                address: "remote-1@MainPlaza".to_string(),
                practice: "translator/Translate".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_absence_is_none_not_error() {
        let registry = PracticeRegistry::new();
        let plaza: Arc<dyn Plaza> = Arc::new(StubPlaza { listings: vec![] });

        let target = resolve_practice(&registry, &plaza, "self", "MainPlaza", "Nowhere")
            .await
            .unwrap();
        assert!(target.is_none());
    }
}
