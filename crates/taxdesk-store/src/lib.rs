//! # taxdesk-store
//!
//! SQLite persistence for the message log and the user directory.
//!
//! The message log is the source of truth for unread state and conversation
//! history. Nothing here knows about push delivery: callers publish a domain
//! event after a successful write.

#![deny(unsafe_code)]

pub mod database;
pub mod error;
pub mod messages;
pub mod row_helpers;
pub mod schema;
pub mod users;

pub use database::Database;
pub use error::StoreError;
pub use messages::{MessageRepo, NewMessage};
pub use users::UserRepo;
