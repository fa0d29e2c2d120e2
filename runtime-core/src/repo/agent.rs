use crate::model::Agent;
use crate::storage::Storage;
use crate::{Result, RuntimeError};
use dashmap::DashMap;
use std::sync::Arc;

const KEY_PREFIX: &str = "agent:";

/// Agent registry indexed both by internal id and by the tenant-facing
/// `public_dynamic_id` used to route incoming browser/telephony connections.
pub struct AgentRepo {
    storage: Arc<Storage>,
    agents: DashMap<String, Agent>,
    by_public_id: DashMap<String, String>,
}

impl AgentRepo {
    pub fn load(storage: Arc<Storage>) -> Result<Self> {
        let existing: Vec<Agent> = storage.scan_prefix(KEY_PREFIX)?;
        let agents = DashMap::new();
        let by_public_id = DashMap::new();
        for a in existing {
            by_public_id.insert(a.public_dynamic_id.clone(), a.id.clone());
            agents.insert(a.id.clone(), a);
        }
        Ok(Self {
            storage,
            agents,
            by_public_id,
        })
    }

    fn key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    pub fn upsert(&self, agent: Agent) -> Result<()> {
        self.storage.put(Self::key(&agent.id), &agent)?;
        self.by_public_id
            .insert(agent.public_dynamic_id.clone(), agent.id.clone());
        self.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Agent> {
        self.agents
            .get(id)
            .map(|a| a.clone())
            .ok_or_else(|| RuntimeError::NotFound(format!("agent {id}")))
    }

    pub fn get_by_public_id(&self, public_dynamic_id: &str) -> Result<Agent> {
        let id = self
            .by_public_id
            .get(public_dynamic_id)
            .map(|r| r.clone())
            .ok_or_else(|| {
                RuntimeError::NotFound(format!("agent with public id {public_dynamic_id}"))
            })?;
        self.get(&id)
    }

    /// Applies a mutation to the stored and in-memory copy atomically, then
    /// persists. Used by the Quota Enforcer to update per-agent counters
    /// without a read-modify-write race across concurrent sessions.
    pub fn mutate<F>(&self, id: &str, f: F) -> Result<Agent>
    where
        F: FnOnce(&mut Agent),
    {
        let mut entry = self
            .agents
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NotFound(format!("agent {id}")))?;
        f(&mut entry);
        let snapshot = entry.clone();
        drop(entry);
        self.storage.put(Self::key(id), &snapshot)?;
        Ok(snapshot)
    }
}
