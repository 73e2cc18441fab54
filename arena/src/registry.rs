//! Agent directory with O(1) lookup by id and by case-insensitive name.
//!
//! Iteration order is registration (insertion) order; Async-mode mention
//! fan-out depends on it, so the registry keeps an explicit order index
//! alongside the id map.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::agent::Agent;
use crate::error::{ArenaError, ArenaResult};
use crate::message::AgentId;

/// Registry of agents in the arena.
///
/// Invariant: the id map, the lowercase-name index, and the order list are
/// always mutually consistent.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentId, Arc<Agent>>,
    by_name: HashMap<String, AgentId>,
    order: Vec<AgentId>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. Fails on a duplicate id; never silently overwrites.
    pub fn register(&mut self, agent: Arc<Agent>) -> ArenaResult<()> {
        if self.agents.contains_key(agent.id()) {
            return Err(ArenaError::DuplicateAgent(agent.id().to_string()));
        }

        let id = agent.id().to_string();
        self.by_name.insert(agent.name().to_lowercase(), id.clone());
        self.order.push(id.clone());
        info!(agent = %agent.name(), id = %id, "registered agent");
        self.agents.insert(id, agent);
        Ok(())
    }

    /// Remove an agent by id, returning it if present.
    pub fn unregister(&mut self, agent_id: &str) -> Option<Arc<Agent>> {
        let agent = self.agents.remove(agent_id)?;
        self.by_name.remove(&agent.name().to_lowercase());
        self.order.retain(|id| id != agent_id);
        info!(agent = %agent.name(), "unregistered agent");
        Some(agent)
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents.get(agent_id).cloned()
    }

    /// Lookup by name, case-insensitive.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<Agent>> {
        let id = self.by_name.get(&name.to_lowercase())?;
        self.agents.get(id).cloned()
    }

    /// All agents in registration order.
    pub fn all(&self) -> Vec<Arc<Agent>> {
        self.order
            .iter()
            .filter_map(|id| self.agents.get(id).cloned())
            .collect()
    }

    /// All agent names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.all().iter().map(|a| a.name().to_string()).collect()
    }

    pub fn count(&self) -> usize {
        self.agents.len()
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }
}
