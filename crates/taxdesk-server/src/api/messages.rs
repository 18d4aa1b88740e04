//! Sending messages and the unread badge count.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use taxdesk_core::{CaseId, DomainEvent, Message, UserId};
use taxdesk_store::NewMessage;
use tracing::{debug, instrument};

use super::auth::AuthUser;
use super::error::ApiError;
use crate::server::AppState;

/// Body of `POST /api/messages`.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Addressee.
    pub recipient_id: UserId,
    /// Message text.
    pub body: String,
    /// Related case.
    #[serde(default)]
    pub case_id: Option<CaseId>,
}

/// Body of `GET /api/messages/unread-count`.
#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    /// Unread messages addressed to the caller.
    pub count: u32,
}

/// `GET /api/messages/unread-count`.
pub async fn unread_count(State(state): State<AppState>, user: AuthUser) -> Result<Json<UnreadCountResponse>, ApiError> {
    let count = state.messages.unread_count(&user.0.user_id)?;
    Ok(Json(UnreadCountResponse { count }))
}

/// `POST /api/messages`: store, then publish for push delivery.
///
/// The response does not wait for delivery; an offline recipient sees the
/// message through the conversation list instead.
#[instrument(skip_all, fields(sender_id = %user.0.user_id, recipient_id = %req.recipient_id))]
pub async fn send(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let sender = user.0.user_id;
    let body = req.body.trim();
    if body.is_empty() {
        return Err(ApiError::invalid("body must not be empty"));
    }
    if req.recipient_id == sender {
        return Err(ApiError::invalid("cannot send a message to yourself"));
    }
    if state.users.find(&req.recipient_id)?.is_none() {
        return Err(ApiError::not_found(format!("user {}", req.recipient_id)));
    }

    let message = state.messages.send(NewMessage {
        sender_id: sender.clone(),
        recipient_id: req.recipient_id,
        case_id: req.case_id,
        body: body.to_owned(),
    })?;

    let sender_name = state
        .users
        .find(&sender)?
        .map_or_else(|| sender.to_string(), |p| p.display_name);
    let event = DomainEvent::MessageCreated {
        message: message.clone(),
        sender_name,
    };
    if state.events.send(event).is_err() {
        debug!("no event bridge subscribed, push skipped");
    }

    Ok((StatusCode::CREATED, Json(message)))
}
