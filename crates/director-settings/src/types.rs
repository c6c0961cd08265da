//! Settings types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectorSettings {
    /// Network listener settings.
    pub server: ServerSettings,
    /// Liveness supervision.
    pub heartbeat: HeartbeatSettings,
    /// Invocation scheduling.
    pub invocation: InvocationSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl DirectorSettings {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("heartbeat.intervalMs", self.heartbeat.interval_ms == 0),
            ("server.sendQueueCapacity", self.server.send_queue_capacity == 0),
            ("server.maxMessageSize", self.server.max_message_size == 0),
        ];
        match zero.into_iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(SettingsError::Invalid {
                field,
                reason: "must be greater than zero",
            }),
            None => Ok(()),
        }
    }
}

/// Network listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` auto-assigns).
    pub port: u16,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound channel capacity.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_message_size: 16 * 1024 * 1024,
            send_queue_capacity: 1024,
        }
    }
}

/// Heartbeat supervision settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// Probe interval in milliseconds. A connection silent for two full
    /// intervals is evicted.
    pub interval_ms: u64,
}

impl HeartbeatSettings {
    /// Interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self { interval_ms: 30_000 }
    }
}

/// Invocation scheduling settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvocationSettings {
    /// Wait before a chosen invocation is transmitted, in milliseconds.
    pub settle_delay_ms: u64,
    /// Retry cap for actions the game reports as failed. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl InvocationSettings {
    /// Settle delay as a [`Duration`].
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for InvocationSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 500,
            max_retries: None,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = DirectorSettings::default();
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 8000);
        assert_eq!(s.server.max_message_size, 16 * 1024 * 1024);
        assert_eq!(s.heartbeat.interval(), Duration::from_secs(30));
        assert_eq!(s.invocation.settle_delay(), Duration::from_millis(500));
        assert!(s.invocation.max_retries.is_none());
        assert_eq!(s.logging.level, "info");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(DirectorSettings::default()).unwrap();
        assert_eq!(value["heartbeat"]["intervalMs"], 30_000);
        assert_eq!(value["invocation"]["settleDelayMs"], 500);
        assert!(value["invocation"]["maxRetries"].is_null());
        assert_eq!(value["server"]["sendQueueCapacity"], 1024);
    }

    #[test]
    fn zero_heartbeat_rejected() {
        let mut s = DirectorSettings::default();
        s.heartbeat.interval_ms = 0;
        assert!(matches!(s.validate(), Err(SettingsError::Invalid { .. })));
    }

    #[test]
    fn zero_send_queue_rejected() {
        let mut s = DirectorSettings::default();
        s.server.send_queue_capacity = 0;
        assert!(s.validate().is_err());
    }
}
