use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use arbor_db::models::parse_timestamp;
use arbor_types::api::{Claims, NotificationResponse, UnreadCountResponse};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .db
        .list_notifications(&claims.sub.to_string(), query.limit.clamp(1, 200))
        .map_err(ApiError::Internal)?;

    let response: Vec<NotificationResponse> = rows
        .into_iter()
        .map(|row| NotificationResponse {
            id: row.id.parse().unwrap_or_default(),
            kind: row.kind,
            title: row.title,
            body: row.body,
            linked_id: row.linked_id.as_deref().and_then(|l| l.parse().ok()),
            is_read: row.is_read,
            created_at: parse_timestamp(&row.created_at),
        })
        .collect();

    Ok(Json(response))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let unread = state
        .db
        .unread_notification_count(&claims.sub.to_string())
        .map_err(ApiError::Internal)?;

    Ok(Json(UnreadCountResponse { unread }))
}

/// Read state only moves forward; marking an already-read notification is a
/// harmless no-op.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .db
        .mark_notification_read(&notification_id.to_string(), &claims.sub.to_string())
        .map_err(ApiError::Internal)?;
    if !updated {
        return Err(ApiError::NotFound("notification"));
    }

    Ok(Json(serde_json::json!({ "read": true })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .db
        .mark_all_notifications_read(&claims.sub.to_string())
        .map_err(ApiError::Internal)?;

    Ok(Json(serde_json::json!({ "updated": updated })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .delete_notification(&notification_id.to_string(), &claims.sub.to_string())
        .map_err(ApiError::Internal)?;
    if !deleted {
        return Err(ApiError::NotFound("notification"));
    }

    Ok(StatusCode::NO_CONTENT)
}
