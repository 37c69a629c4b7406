//! Append-only JSONL cost ledger.

use async_trait::async_trait;
use conclave_application::{CostSink, PersistenceError, SpendSource};
use conclave_domain::{AgentId, CostRecord};
use rust_decimal::Decimal;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Writes every [`CostRecord`] as one JSON line and answers committed
/// spend by summing the ledger.
pub struct JsonlCostLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlCostLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: std::io::Error) -> PersistenceError {
        PersistenceError::Io(format!("{}: {}", self.path.display(), e))
    }

    /// Every record in the ledger. Unreadable lines are skipped.
    pub async fn records(&self) -> Result<Vec<CostRecord>, PersistenceError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        Ok(raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<CostRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(path = %self.path.display(), "Skipping unreadable cost record: {}", e);
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl CostSink for JsonlCostLedger {
    async fn flush(&self, records: Vec<CostRecord>) -> Result<(), PersistenceError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for record in &records {
            let line = serde_json::to_string(record).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.io_error(e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(buf.as_bytes()).await.map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))
    }
}

#[async_trait]
impl SpendSource for JsonlCostLedger {
    async fn committed(&self, agent_id: &AgentId) -> Result<Decimal, PersistenceError> {
        Ok(self
            .records()
            .await?
            .iter()
            .filter(|r| r.context.agent_id.as_ref() == Some(agent_id))
            .map(|r| r.amount)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_domain::{CostContext, CostKind, ModelId, TaskId};
    use std::str::FromStr;

    fn record(agent: &str, amount: &str) -> CostRecord {
        let context = CostContext::new(AgentId::from(agent), TaskId::from("t-1"), "consensus");
        CostRecord::new(context, CostKind::Query, Decimal::from_str(amount).unwrap())
            .with_model(ModelId::from("m-a"))
            .with_tokens(120, 30)
    }

    #[tokio::test]
    async fn test_committed_sums_per_agent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlCostLedger::new(dir.path().join("costs.jsonl"));

        ledger
            .flush(vec![record("a", "0.25"), record("b", "1.00")])
            .await
            .unwrap();
        ledger.flush(vec![record("a", "0.50")]).await.unwrap();

        assert_eq!(
            ledger.committed(&AgentId::from("a")).await.unwrap(),
            Decimal::from_str("0.75").unwrap()
        );
        assert_eq!(ledger.committed(&AgentId::from("b")).await.unwrap(), Decimal::ONE);
        assert_eq!(ledger.records().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_ledger_counts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonlCostLedger::new(dir.path().join("none.jsonl"));
        assert_eq!(ledger.committed(&AgentId::from("a")).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unreadable_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("costs.jsonl");
        let good = serde_json::to_string(&record("a", "2")).unwrap();
        std::fs::write(&path, format!("garbage\n{}\n\n", good)).unwrap();

        let ledger = JsonlCostLedger::new(&path);
        assert_eq!(ledger.committed(&AgentId::from("a")).await.unwrap(), Decimal::TWO);
    }
}
