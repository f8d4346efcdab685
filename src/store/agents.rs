use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::api::types::Agent;
use crate::api::AgentCatalog;
use crate::error::Result;

/// Agents seen during this process, keyed by id.
#[derive(Default)]
pub struct AgentCache {
    agents: RwLock<HashMap<String, Agent>>,
}

impl AgentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, agent_id: &str) -> Option<Agent> {
        self.agents.read().await.get(agent_id).cloned()
    }

    /// Return the cached agent, fetching and caching it on a miss.
    pub async fn get_or_fetch(&self, catalog: &dyn AgentCatalog, agent_id: &str) -> Result<Agent> {
        if let Some(agent) = self.get(agent_id).await {
            tracing::debug!(agent = agent_id, "Agent cache hit");
            return Ok(agent);
        }

        let agent = catalog.get_agent(agent_id).await?;
        self.agents
            .write()
            .await
            .insert(agent.id.clone(), agent.clone());
        Ok(agent)
    }

    /// Cache every agent from a listing page.
    pub async fn insert_page(&self, agents: &[Agent]) {
        let mut cache = self.agents.write().await;
        for agent in agents {
            cache.insert(agent.id.clone(), agent.clone());
        }
    }

    pub async fn invalidate(&self, agent_id: &str) {
        self.agents.write().await.remove(agent_id);
    }
}
