//! Settings schema.
//!
//! Every struct uses `#[serde(default)]` so a partial settings file only
//! needs the keys it changes. Keys are camelCase on disk.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Development signing secret. Servers started with it log a warning.
pub const DEV_JWT_SECRET: &str = "taxdesk-dev-secret-change-me";

/// `~/.taxdesk`, or `/tmp/.taxdesk` when `HOME` is unset.
pub fn data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".taxdesk")
}

/// Root settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaxdeskSettings {
    /// Listener and push-channel policy.
    pub server: ServerSettings,
    /// Token issuing and verification.
    pub auth: AuthSettings,
    /// Message store location.
    pub database: DatabaseSettings,
    /// Logging.
    pub telemetry: TelemetrySettings,
}

/// Listener and push-channel policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port.
    pub port: u16,
    /// Live connections one user may hold at once.
    pub max_connections_per_user: usize,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before the connection is closed.
    pub heartbeat_timeout_secs: u64,
    /// Buffered domain events before slow consumers lag.
    pub event_bus_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8780,
            max_connections_per_user: 5,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            event_bus_capacity: 1024,
        }
    }
}

/// Token issuing and verification.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HS256 signing secret.
    pub jwt_secret: String,
    /// Lifetime of issued tokens.
    pub token_ttl_secs: u64,
    /// `iss` claim written and required.
    pub issuer: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_secs: 3600,
            issuer: "taxdesk".to_string(),
        }
    }
}

impl AuthSettings {
    /// Whether the compiled-in development secret is still in use.
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

/// Message store location.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// SQLite file path.
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: data_dir().join("taxdesk.db").to_string_lossy().into_owned(),
        }
    }
}

/// Logging.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetrySettings {
    /// Default level (`trace` .. `error`).
    pub level: String,
    /// JSON lines instead of compact text.
    pub json: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
