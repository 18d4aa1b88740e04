//! REST API: conversations, messages, and the collaborator event hook.
//!
//! Every route authenticates with `Authorization: Bearer <token>` using the
//! same verifier as the push channel. Errors use the envelope
//! `{ "error": { "code": "...", "message": "..." } }`.

pub mod auth;
pub mod conversations;
pub mod error;
pub mod events;
pub mod messages;

use axum::Router;
use axum::routing::{get, post};

use crate::server::AppState;

/// Routes under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/conversations", get(conversations::list))
        .route("/api/conversations/{counterpart_id}", get(conversations::thread))
        .route("/api/conversations/{counterpart_id}/read", post(conversations::mark_read))
        .route("/api/messages", post(messages::send))
        .route("/api/messages/unread-count", get(messages::unread_count))
        .route("/api/events", post(events::publish))
}
