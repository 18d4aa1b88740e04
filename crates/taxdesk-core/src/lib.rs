//! # taxdesk-core
//!
//! Shared vocabulary for the notification and conversation subsystem.
//!
//! - **Branded IDs**: `UserId`, `MessageId`, `CaseId`, ... as newtypes
//! - **Models**: `Message`, `UserProfile`, `Role`
//! - **Notifications**: the `Notification` sum type and its flat wire form
//! - **Domain events**: what the record stores emit when something changes
//! - **Close codes**: push-channel close codes shared by server and client
//! - **Conversations**: the pure aggregation from a message log to threads

#![deny(unsafe_code)]

pub mod close_code;
pub mod conversation;
pub mod events;
pub mod ids;
pub mod models;
pub mod notification;

pub use conversation::{Conversation, Counterpart, aggregate_conversations};
pub use events::DomainEvent;
pub use ids::{AppointmentId, CaseId, ConnectionId, DocumentId, MessageId, UserId};
pub use models::{Message, Role, UserProfile};
pub use notification::{Notification, NotificationDetail, NotificationKind, PayloadError, WirePayload};
