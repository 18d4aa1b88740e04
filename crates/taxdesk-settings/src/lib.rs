//! # taxdesk-settings
//!
//! Configuration for the taxdesk server.
//!
//! Loading flow:
//! 1. Start with compiled [`TaxdeskSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `TAXDESK_*` environment variable overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{AuthSettings, DatabaseSettings, ServerSettings, TaxdeskSettings, TelemetrySettings};
