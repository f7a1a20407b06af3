use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use arbor_types::api::{ChatResponse, Claims, CreateChatRequest};

use crate::authz::ensure_chat_participant;
use crate::error::ApiError;
use crate::state::AppState;

/// Get or create the direct chat with another user. Idempotent for a given
/// unordered pair: 201 on first creation, 200 with the same chat afterwards.
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.other_user_id == claims.sub {
        return Err(ApiError::invalid("other_user_id", "cannot chat with yourself"));
    }

    state
        .db
        .get_user_by_id(&req.other_user_id.to_string())
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound("user"))?;

    let (chat_id, created) = state
        .db
        .get_or_create_chat(&claims.sub.to_string(), &req.other_user_id.to_string())
        .map_err(ApiError::Internal)?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(chat_response(&state, &chat_id)?)))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_chat_participant(&state.db, &chat_id.to_string(), &claims.sub.to_string())?;
    Ok(Json(chat_response(&state, &chat_id.to_string())?))
}

fn chat_response(state: &AppState, chat_id: &str) -> Result<ChatResponse, ApiError> {
    let participants = state
        .db
        .get_chat_participants(chat_id)
        .map_err(ApiError::Internal)?;

    Ok(ChatResponse {
        id: chat_id.parse().unwrap_or_default(),
        participant_ids: participants
            .iter()
            .filter_map(|p| p.parse().ok())
            .collect(),
    })
}
