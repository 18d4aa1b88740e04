//! # taxdesk-server
//!
//! Axum HTTP + `WebSocket` server for the real-time notification subsystem.
//!
//! - Push channel at `/ws?token=...`: admission, per-user connection limit,
//!   heartbeat, size policy, server-initiated close codes
//! - [`registry::ConnectionRegistry`]: user id to live connections
//! - [`dispatcher::NotificationDispatcher`]: domain events to typed payloads
//! - [`event_bridge::EventBridge`]: feeds the dispatcher from the event bus
//! - REST API for conversations, unread counts, and sending messages
//! - `/health`, `/metrics`, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod event_bridge;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use dispatcher::NotificationDispatcher;
pub use registry::{AdmitError, ConnectionRegistry};
pub use server::{AppState, TaxdeskServer};
