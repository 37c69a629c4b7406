//! Agent memory stored as one JSON file per agent.

use async_trait::async_trait;
use conclave_application::{PersistenceError, StateStore};
use conclave_domain::{AgentId, ContextMemory};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores each agent's [`ContextMemory`] as `<dir>/<agent_id>.json`.
///
/// Writes go to a temporary file that is renamed over the old one, so a
/// crash never leaves a half-written snapshot.
pub struct JsonFileStateStore {
    dir: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Agent ids are used as file names; anything but `[A-Za-z0-9_-]`
    /// becomes `_`.
    fn path_for(&self, agent_id: &AgentId) -> PathBuf {
        let name: String = agent_id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> PersistenceError {
    PersistenceError::Io(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn persist(&self, agent_id: &AgentId, memory: &ContextMemory) -> Result<(), PersistenceError> {
        let json = memory
            .to_json()
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;
        let path = self.path_for(agent_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| io_error(&path, e))?;

        debug!(agent_id = %agent_id, path = %path.display(), "Persisted agent memory");
        Ok(())
    }

    async fn restore(&self, agent_id: &AgentId) -> Result<ContextMemory, PersistenceError> {
        let path = self.path_for(agent_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(io_error(&path, e)),
        };
        ContextMemory::from_json(raw.as_deref()).map_err(|e| PersistenceError::Serialization(e.to_string()))
    }
}
