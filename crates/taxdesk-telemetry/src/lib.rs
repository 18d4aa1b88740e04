//! # taxdesk-telemetry
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` built from the
//! configured level and per-module overrides (`RUST_LOG` wins when set) and a
//! `fmt` layer writing JSON or compact text to stdout.

#![deny(unsafe_code)]

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub log_level: Level,
    /// Per-module level overrides (e.g. `taxdesk_server::session` => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit one JSON object per line instead of compact text.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Config with `level` parsed from a string such as `"debug"`. Unknown
    /// strings fall back to INFO.
    pub fn with_level(level: &str, json: bool) -> Self {
        Self {
            log_level: Level::from_str(level).unwrap_or(Level::INFO),
            module_levels: Vec::new(),
            json,
        }
    }

    /// Filter directives equivalent to this config, e.g. `info,taxdesk_store=debug`.
    pub fn directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push(',');
            filter.push_str(module);
            filter.push('=');
            filter.push_str(&level.to_string().to_lowercase());
        }
        filter
    }
}

/// Initialize the global subscriber. Call once at startup.
///
/// Returns `false` if a subscriber was already installed (tests, embedding),
/// in which case the existing one is kept.
pub fn init_telemetry(config: &TelemetryConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().compact().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_info_compact() {
        let config = TelemetryConfig::default();
        assert_eq!(config.directives(), "info");
        assert!(!config.json);
    }

    #[test]
    fn module_overrides_join_directives() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("taxdesk_server".into(), Level::DEBUG),
                ("taxdesk_store".into(), Level::TRACE),
            ],
            json: true,
        };
        assert_eq!(config.directives(), "warn,taxdesk_server=debug,taxdesk_store=trace");
    }

    #[test]
    fn level_parsing_falls_back_to_info() {
        assert_eq!(TelemetryConfig::with_level("debug", false).log_level, Level::DEBUG);
        assert_eq!(TelemetryConfig::with_level("loud", false).log_level, Level::INFO);
    }

    #[test]
    fn second_init_is_a_noop() {
        let config = TelemetryConfig::default();
        let _ = init_telemetry(&config);
        assert!(!init_telemetry(&config));
    }
}
