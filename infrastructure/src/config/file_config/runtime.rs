//! Runtime timings (`[runtime]`)
//!
//! ```toml
//! [runtime]
//! retry_delay_ms = 5000
//! router_shutdown_timeout_ms = 5000
//! command_retention_secs = 600
//! ```

use conclave_application::RuntimeConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileRuntimeConfig {
    /// Delay before a failed consensus cycle is retried
    pub retry_delay_ms: u64,
    /// How long shutdown waits for each router
    pub router_shutdown_timeout_ms: u64,
    /// How long finished commands stay queryable
    pub command_retention_secs: u64,
}

impl Default for FileRuntimeConfig {
    fn default() -> Self {
        let config = RuntimeConfig::default();
        Self {
            retry_delay_ms: config.retry_delay.as_millis() as u64,
            router_shutdown_timeout_ms: config.router_shutdown_timeout.as_millis() as u64,
            command_retention_secs: config.command_retention.as_secs(),
        }
    }
}

impl FileRuntimeConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn router_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.router_shutdown_timeout_ms)
    }

    pub fn command_retention(&self) -> Duration {
        Duration::from_secs(self.command_retention_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations() {
        let config = FileRuntimeConfig {
            retry_delay_ms: 250,
            router_shutdown_timeout_ms: 1000,
            command_retention_secs: 60,
        };
        assert_eq!(config.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.router_shutdown_timeout(), Duration::from_secs(1));
        assert_eq!(config.command_retention(), Duration::from_secs(60));

        let defaults = FileRuntimeConfig::default();
        assert_eq!(defaults.retry_delay(), RuntimeConfig::default().retry_delay);
    }
}
