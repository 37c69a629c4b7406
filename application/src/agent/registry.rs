//! Agent registry
//!
//! One map from agent id to a complete entry (handle, parent, registration
//! time). Entries are inserted whole under the write lock, so readers never
//! see a partial one. Parent, child and sibling lookups are queries over
//! the same map.

use super::handle::AgentHandle;
use chrono::{DateTime, Utc};
use conclave_domain::AgentId;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Agent {0} is already registered")]
    Duplicate(AgentId),

    #[error("Agent registry lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub handle: AgentHandle,
    pub parent: Option<AgentId>,
    pub registered_at: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn new(handle: AgentHandle, parent: Option<AgentId>) -> Self {
        Self {
            handle,
            parent,
            registered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct AgentRegistry {
    entries: RwLock<HashMap<AgentId, RegistryEntry>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entry` unless the id is taken.
    pub fn register(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().map_err(|_| RegistryError::Poisoned)?;
        let id = entry.handle.id().clone();
        if entries.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        entries.insert(id, entry);
        Ok(())
    }

    pub fn unregister(&self, agent_id: &AgentId) -> Result<Option<RegistryEntry>, RegistryError> {
        let mut entries = self.entries.write().map_err(|_| RegistryError::Poisoned)?;
        Ok(entries.remove(agent_id))
    }

    pub fn lookup(&self, agent_id: &AgentId) -> Result<Option<AgentHandle>, RegistryError> {
        let entries = self.entries.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(entries.get(agent_id).map(|e| e.handle.clone()))
    }

    pub fn parent_of(&self, agent_id: &AgentId) -> Result<Option<AgentId>, RegistryError> {
        let entries = self.entries.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(entries.get(agent_id).and_then(|e| e.parent.clone()))
    }

    /// Registered children of `agent_id`, sorted.
    pub fn children_of(&self, agent_id: &AgentId) -> Result<Vec<AgentId>, RegistryError> {
        let entries = self.entries.read().map_err(|_| RegistryError::Poisoned)?;
        let mut children: Vec<AgentId> = entries
            .iter()
            .filter(|(_, e)| e.parent.as_ref() == Some(agent_id))
            .map(|(id, _)| id.clone())
            .collect();
        children.sort();
        Ok(children)
    }

    /// Other children of the same parent, sorted. Root agents have none.
    pub fn siblings_of(&self, agent_id: &AgentId) -> Result<Vec<AgentId>, RegistryError> {
        let Some(parent) = self.parent_of(agent_id)? else {
            return Ok(Vec::new());
        };
        let mut siblings = self.children_of(&parent)?;
        siblings.retain(|id| id != agent_id);
        Ok(siblings)
    }

    pub fn handles(&self) -> Result<Vec<AgentHandle>, RegistryError> {
        let entries = self.entries.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(entries.values().map(|e| e.handle.clone()).collect())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn entry(id: &str, parent: Option<&str>) -> RegistryEntry {
        let (tx, _rx) = mpsc::unbounded_channel();
        RegistryEntry::new(AgentHandle::new(AgentId::from(id), tx), parent.map(AgentId::from))
    }

    fn ids(names: &[&str]) -> Vec<AgentId> {
        names.iter().map(|n| AgentId::from(*n)).collect()
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = AgentRegistry::new();
        registry.register(entry("a", None)).unwrap();
        let err = registry.register(entry("a", Some("other"))).unwrap_err();

        assert_eq!(err, RegistryError::Duplicate(AgentId::from("a")));
        // the original entry is untouched
        assert_eq!(registry.parent_of(&AgentId::from("a")).unwrap(), None);
    }

    #[test]
    fn test_family_queries() {
        let registry = AgentRegistry::new();
        registry.register(entry("root", None)).unwrap();
        registry.register(entry("c2", Some("root"))).unwrap();
        registry.register(entry("c1", Some("root"))).unwrap();
        registry.register(entry("g1", Some("c1"))).unwrap();

        let root = AgentId::from("root");
        assert_eq!(registry.children_of(&root).unwrap(), ids(&["c1", "c2"]));
        assert_eq!(registry.parent_of(&AgentId::from("g1")).unwrap(), Some(AgentId::from("c1")));
        assert_eq!(registry.siblings_of(&AgentId::from("c1")).unwrap(), ids(&["c2"]));
        assert!(registry.siblings_of(&root).unwrap().is_empty());

        registry.unregister(&AgentId::from("c2")).unwrap();
        assert!(registry.siblings_of(&AgentId::from("c1")).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_registration_admits_one() {
        let registry = Arc::new(AgentRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register(entry("same", None)).is_ok())
            })
            .collect();
        let admitted = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(registry.len(), 1);
    }
}
