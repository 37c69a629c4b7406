//! JSONL file writer for agent events.
//!
//! Each [`BroadcastEvent`] is serialized as a single JSON line with `type`,
//! `timestamp`, `agent_id` and `task_id` fields merged into its payload.

use conclave_application::{BroadcastEvent, Broadcaster};
use serde_json::{Value, json};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Broadcaster that appends one JSON object per line.
///
/// Thread-safe via `Mutex<BufWriter<File>>`. Flushes after every event and
/// on `Drop`.
pub struct JsonlBroadcaster {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlBroadcaster {
    /// Open `path` for appending, creating it and its parent directories.
    ///
    /// Returns `None` if the file cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!("Could not create event log directory {}: {}", parent.display(), e);
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not open event log {}: {}", path.display(), e);
                return None;
            }
        };

        Some(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(event: BroadcastEvent) -> Value {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let mut map = match event.payload {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        map.insert("type".to_string(), json!(event.event_type));
        map.insert("timestamp".to_string(), json!(timestamp));
        if let Some(agent_id) = event.agent_id {
            map.insert("agent_id".to_string(), json!(agent_id));
        }
        if let Some(task_id) = event.task_id {
            map.insert("task_id".to_string(), json!(task_id));
        }
        Value::Object(map)
    }
}

impl Broadcaster for JsonlBroadcaster {
    fn broadcast(&self, event: BroadcastEvent) {
        let Ok(line) = serde_json::to_string(&Self::record(event)) else {
            return;
        };

        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
            let _ = writer.flush();
        }
    }
}

impl Drop for JsonlBroadcaster {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_domain::{AgentId, TaskId};

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("events.jsonl");
        let broadcaster = JsonlBroadcaster::new(&path).unwrap();

        broadcaster.broadcast(
            BroadcastEvent::new("decision", json!({"action": "orient", "round": 1}))
                .for_agent(&AgentId::from("a-1"), &TaskId::from("t-1")),
        );
        broadcaster.broadcast(BroadcastEvent::new("user_message", json!({"content": "done"})));
        drop(broadcaster);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "decision");
        assert_eq!(lines[0]["action"], "orient");
        assert_eq!(lines[0]["agent_id"], "a-1");
        assert_eq!(lines[0]["task_id"], "t-1");
        assert!(lines[0]["timestamp"].is_string());
        assert_eq!(lines[1]["type"], "user_message");
        assert!(lines[1].get("agent_id").is_none());
    }

    #[test]
    fn test_non_object_payload_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let broadcaster = JsonlBroadcaster::new(&path).unwrap();
        broadcaster.broadcast(BroadcastEvent::new("note", json!("just a string")));
        drop(broadcaster);

        let lines = read_lines(&path);
        assert_eq!(lines[0]["type"], "note");
        assert_eq!(lines[0]["data"], "just a string");
    }

    #[test]
    fn test_reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        for _ in 0..2 {
            let broadcaster = JsonlBroadcaster::new(&path).unwrap();
            broadcaster.broadcast(BroadcastEvent::new("tick", json!({})));
        }
        assert_eq!(read_lines(&path).len(), 2);
    }
}
