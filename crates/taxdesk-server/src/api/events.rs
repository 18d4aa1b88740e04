//! Collaborator hook for publishing case, document, and appointment events.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use taxdesk_core::DomainEvent;
use tracing::{debug, instrument};

use super::auth::AuthUser;
use super::error::ApiError;
use crate::server::AppState;

/// Body of a `202 Accepted` reply.
#[derive(Debug, Serialize)]
pub struct Accepted {
    /// Always `true`.
    pub accepted: bool,
}

/// `POST /api/events`: staff publish a domain event for push delivery.
///
/// Message events are refused; those only originate from `POST /api/messages`
/// so the message log stays the source of truth.
#[instrument(skip_all, fields(user_id = %user.0.user_id, event = event.name()))]
pub async fn publish(
    State(state): State<AppState>,
    user: AuthUser,
    Json(event): Json<DomainEvent>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    user.require_staff()?;
    if matches!(event, DomainEvent::MessageCreated { .. }) {
        return Err(ApiError::invalid("message events are published by POST /api/messages"));
    }
    if state.events.send(event).is_err() {
        debug!("no event bridge subscribed, push skipped");
    }
    Ok((StatusCode::ACCEPTED, Json(Accepted { accepted: true })))
}
