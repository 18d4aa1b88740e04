//! # taxdesk-client
//!
//! The browser-side half of the push channel, as a library.
//!
//! - [`state::ChannelMachine`]: the pure connection state machine
//! - [`manager::ConnectionManager`]: drives the machine over a real socket
//! - [`inbound`]: maps each payload to cache invalidations and an alert
//! - [`cache`]: the `CacheInvalidator` and `AlertSink` seams

#![deny(unsafe_code)]

pub mod cache;
pub mod config;
pub mod errors;
pub mod inbound;
pub mod manager;
pub mod state;

pub use cache::{Alert, AlertSink, CacheInvalidator, CacheKey, LogAlerts, RecordingAlerts, RecordingCache};
pub use config::ClientConfig;
pub use errors::ClientError;
pub use manager::{ConnectionManager, ManagerHandle};
pub use state::{ChannelEvent, ChannelMachine, ChannelState, Effect};
