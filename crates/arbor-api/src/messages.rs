use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use arbor_db::Database;
use arbor_db::models::{MessageRow, parse_timestamp};
use arbor_gateway::connection::{chat_message_event, reply_preview, room_message_event};
use arbor_types::api::{Claims, MessageResponse, SendMessageRequest};

use crate::authz::{ensure_chat_participant, ensure_room_read};
use crate::error::ApiError;
use crate::state::AppState;

const MAX_MESSAGE_LEN: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination: the id of the oldest message from the
    /// previous page; only strictly older messages are returned.
    pub before: Option<Uuid>,
}

fn default_limit() -> u32 {
    50
}

pub async fn get_room_messages(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let rid = room_id.to_string();
    let uid = claims.sub.to_string();
    let limit = query.limit.clamp(1, 200);
    let before = query.before.map(|b| b.to_string());

    // Run blocking DB work off the async runtime.
    let rows = tokio::task::spawn_blocking(move || {
        ensure_room_read(&db, &rid, &uid)?;
        validate_cursor(&db, before.as_deref(), |row| {
            row.room_id.as_deref() == Some(rid.as_str())
        })?;
        db.list_room_messages(&rid, limit, before.as_deref())
            .map_err(ApiError::Internal)
    })
    .await
    .map_err(join_error)??;

    let messages: Vec<MessageResponse> = rows.iter().map(message_response).collect();
    Ok(Json(messages))
}

pub async fn send_room_message(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_content(&req.content)?;

    let db = state.db.clone();
    let message_id = Uuid::new_v4();
    let mid = message_id.to_string();
    let rid = room_id.to_string();
    let uid = claims.sub.to_string();
    let reply = req.reply_to_id.map(|r| r.to_string());
    let content = req.content.clone();

    let row = tokio::task::spawn_blocking(move || {
        ensure_room_read(&db, &rid, &uid)?;
        if let Some(reply_id) = reply.as_deref() {
            let target = db.get_message(reply_id).map_err(ApiError::Internal)?;
            if !target.is_some_and(|t| t.room_id.as_deref() == Some(rid.as_str())) {
                return Err(ApiError::invalid("reply_to_id", "not a message in this room"));
            }
        }
        db.insert_room_message(&mid, &rid, &uid, &content, reply.as_deref())
            .map_err(ApiError::Internal)
    })
    .await
    .map_err(join_error)??;

    // Persist first, then broadcast: subscribers see room messages in
    // database insert order.
    state
        .dispatcher
        .broadcast_room(room_id, room_message_event(&row))
        .await;
    state
        .notifier
        .notify_reply(&row, claims.sub, &claims.username)
        .await;

    Ok((StatusCode::CREATED, Json(message_response(&row))))
}

pub async fn get_chat_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let cid = chat_id.to_string();
    let uid = claims.sub.to_string();
    let limit = query.limit.clamp(1, 200);
    let before = query.before.map(|b| b.to_string());

    let rows = tokio::task::spawn_blocking(move || {
        ensure_chat_participant(&db, &cid, &uid)?;
        validate_cursor(&db, before.as_deref(), |row| {
            row.chat_id.as_deref() == Some(cid.as_str())
        })?;
        db.list_chat_messages(&cid, limit, before.as_deref())
            .map_err(ApiError::Internal)
    })
    .await
    .map_err(join_error)??;

    let messages: Vec<MessageResponse> = rows.iter().map(message_response).collect();
    Ok(Json(messages))
}

pub async fn send_chat_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_content(&req.content)?;

    let db = state.db.clone();
    let message_id = Uuid::new_v4();
    let mid = message_id.to_string();
    let cid = chat_id.to_string();
    let uid = claims.sub.to_string();
    let reply = req.reply_to_id.map(|r| r.to_string());
    let content = req.content.clone();

    let row = tokio::task::spawn_blocking(move || {
        ensure_chat_participant(&db, &cid, &uid)?;
        if let Some(reply_id) = reply.as_deref() {
            let target = db.get_message(reply_id).map_err(ApiError::Internal)?;
            if !target.is_some_and(|t| t.chat_id.as_deref() == Some(cid.as_str())) {
                return Err(ApiError::invalid("reply_to_id", "not a message in this chat"));
            }
        }
        db.insert_chat_message(&mid, &cid, &uid, &content, reply.as_deref())
            .map_err(ApiError::Internal)
    })
    .await
    .map_err(join_error)??;

    state
        .dispatcher
        .broadcast_chat(chat_id, chat_message_event(&row))
        .await;
    state
        .notifier
        .notify_reply(&row, claims.sub, &claims.username)
        .await;

    Ok((StatusCode::CREATED, Json(message_response(&row))))
}

/// Sender-only delete; messages are otherwise immutable.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = state
        .db
        .get_message(&message_id.to_string())
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound("message"))?;
    if existing.sender_id != claims.sub.to_string() {
        return Err(ApiError::Forbidden);
    }

    state
        .db
        .delete_message(&message_id.to_string(), &claims.sub.to_string())
        .map_err(ApiError::Internal)?;

    Ok(StatusCode::NO_CONTENT)
}

fn validate_content(content: &str) -> Result<(), ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::invalid("content", "must not be empty"));
    }
    if content.len() > MAX_MESSAGE_LEN {
        return Err(ApiError::invalid("content", "too long"));
    }
    Ok(())
}

/// A `before` cursor must name a message in the same container.
fn validate_cursor(
    db: &Arc<Database>,
    before: Option<&str>,
    in_container: impl Fn(&MessageRow) -> bool,
) -> Result<(), ApiError> {
    let Some(before) = before else {
        return Ok(());
    };
    let target = db.get_message(before).map_err(ApiError::Internal)?;
    if !target.is_some_and(|t| in_container(&t)) {
        return Err(ApiError::invalid("before", "unknown cursor message"));
    }
    Ok(())
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!("spawn_blocking join error: {}", e);
    ApiError::Internal(e.into())
}

fn message_response(row: &MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.id, e);
            Uuid::default()
        }),
        room_id: row.room_id.as_deref().and_then(|r| r.parse().ok()),
        chat_id: row.chat_id.as_deref().and_then(|c| c.parse().ok()),
        sender_id: row.sender_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt sender_id '{}' on message '{}': {}", row.sender_id, row.id, e);
            Uuid::default()
        }),
        sender_username: row.sender_username.clone(),
        content: row.content.clone(),
        reply_to: reply_preview(row),
        created_at: parse_timestamp(&row.created_at),
    }
}
