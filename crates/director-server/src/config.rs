//! Server configuration.

use std::time::Duration;

use director_settings::DirectorSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the director server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max `WebSocket` message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound frame capacity.
    pub send_queue_capacity: usize,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl ServerConfig {
    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            send_queue_capacity: 1024,
            heartbeat_interval_ms: 30_000,
        }
    }
}

impl From<&DirectorSettings> for ServerConfig {
    fn from(settings: &DirectorSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            send_queue_capacity: settings.server.send_queue_capacity,
            heartbeat_interval_ms: settings.heartbeat.interval_ms,
        }
    }
}
