//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taxdesk_settings::ServerSettings;

/// Configuration for the taxdesk server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Live push connections one user may hold.
    pub max_connections_per_user: usize,
    /// Max inbound `WebSocket` message size in bytes.
    pub max_message_size: usize,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds (close after this long without a pong).
    pub heartbeat_timeout_secs: u64,
    /// Domain event bus capacity.
    pub event_bus_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections_per_user: 5,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            event_bus_capacity: 1024,
        }
    }
}

impl ServerConfig {
    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Heartbeat timeout as a `Duration`.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections_per_user: s.max_connections_per_user,
            max_message_size: s.max_message_size,
            send_queue_capacity: s.send_queue_capacity,
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            heartbeat_timeout_secs: s.heartbeat_timeout_secs,
            event_bus_capacity: s.event_bus_capacity,
        }
    }
}
