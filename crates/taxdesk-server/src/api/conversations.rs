//! Conversation list, thread history, and mark-read.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;
use taxdesk_core::{Conversation, Message, UserId, aggregate_conversations};
use tracing::instrument;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::server::AppState;

/// Body of `POST /api/conversations/{counterpart_id}/read`.
#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    /// Messages flipped to read.
    pub updated: usize,
}

/// `GET /api/conversations`: one entry per counterpart, most recent first.
#[instrument(skip_all, fields(user_id = %user.0.user_id))]
pub async fn list(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Conversation>>, ApiError> {
    let me = &user.0.user_id;
    let messages = state.messages.list_for_user(me)?;

    let mut counterpart_ids: Vec<&UserId> = messages.iter().filter_map(|m| m.counterpart_of(me)).collect();
    counterpart_ids.sort_unstable();
    counterpart_ids.dedup();
    let mut profiles = state.users.profiles(&counterpart_ids)?;

    Ok(Json(aggregate_conversations(me, &messages, |id| profiles.remove(id))))
}

/// `GET /api/conversations/{counterpart_id}`: the thread, oldest first.
#[instrument(skip_all, fields(user_id = %user.0.user_id, counterpart_id = %counterpart_id))]
pub async fn thread(
    State(state): State<AppState>,
    user: AuthUser,
    Path(counterpart_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let counterpart = UserId::from_raw(counterpart_id);
    let _ = state.users.get(&counterpart)?;
    Ok(Json(state.messages.list_between(&user.0.user_id, &counterpart)?))
}

/// `POST /api/conversations/{counterpart_id}/read`.
#[instrument(skip_all, fields(user_id = %user.0.user_id, counterpart_id = %counterpart_id))]
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(counterpart_id): Path<String>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let counterpart = UserId::from_raw(counterpart_id);
    let updated = state.messages.mark_conversation_read(&user.0.user_id, &counterpart)?;
    Ok(Json(MarkReadResponse { updated }))
}
