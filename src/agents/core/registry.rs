// Copyright 2025 Zileo-Chat-3 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Name-keyed lookup of workflow agents.
//!
//! Workflow nodes reference agents by name (`price_alert`,
//! `research`, `rebalancing`, ...), and the engine resolves those
//! references here at execution time. Registration happens once at
//! startup from the composition root; an unresolvable name is not a
//! registry error but an entry in the execution's error list, so a
//! bad definition degrades the run instead of aborting it.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::agent::Agent;

/// The set of agents the workflow engine can drive.
///
/// Every entry honors the [`Agent`] contract: `run(state) -> state`,
/// never panicking, never failing the run. Entries are keyed by
/// [`Agent::name`], which is also the namespace the agent writes its
/// results under, so one registry name maps to one result key family.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Adds an agent under its own name.
    ///
    /// Registering the same name twice replaces the earlier entry
    /// (latest wins); executions already holding the old handle keep
    /// running it to completion.
    pub async fn register(&self, agent: Arc<dyn Agent>) {
        let name = agent.name().to_string();
        let previous = self.agents.write().await.insert(name.clone(), agent);

        if previous.is_some() {
            warn!(agent = %name, "Replacing previously registered agent");
        } else {
            info!(agent = %name, "Agent registered");
        }
    }

    /// Resolves a workflow node's agent reference.
    ///
    /// `None` means the definition names an agent nobody registered;
    /// the engine records that on the execution rather than failing
    /// the lookup.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.read().await.get(name).cloned()
    }

    /// Registered agent names, sorted for stable listings.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkflowState;
    use async_trait::async_trait;

    struct NoopAgent {
        name: String,
    }

    #[async_trait]
    impl Agent for NoopAgent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, state: WorkflowState) -> WorkflowState {
            state
        }
    }

    fn noop(name: &str) -> Arc<dyn Agent> {
        Arc::new(NoopAgent {
            name: name.to_string(),
        })
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = AgentRegistry::new();
        registry.register(noop("research")).await;

        assert!(registry.get("research").await.is_some());
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_reregistration_replaces() {
        let registry = AgentRegistry::new();
        registry.register(noop("price_alert")).await;
        registry.register(noop("price_alert")).await;

        // Still a single entry under the name
        assert_eq!(registry.list().await, vec!["price_alert".to_string()]);
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let registry = AgentRegistry::new();
        for name in ["research", "price_alert", "rebalancing"] {
            registry.register(noop(name)).await;
        }

        assert_eq!(
            registry.list().await,
            vec![
                "price_alert".to_string(),
                "rebalancing".to_string(),
                "research".to_string()
            ]
        );
    }
}
