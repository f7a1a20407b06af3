use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use arbor_db::models::parse_timestamp;
use arbor_types::api::{Claims, PushSubscriptionResponse, SubscribePushRequest};

use crate::error::ApiError;
use crate::state::AppState;

/// Register this device for push delivery. Re-registering an endpoint
/// refreshes its keys instead of duplicating the subscription.
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubscribePushRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !req.endpoint.starts_with("https://") {
        return Err(ApiError::invalid("endpoint", "must be an https URL"));
    }
    if req.p256dh.is_empty() || req.auth.is_empty() {
        return Err(ApiError::invalid("keys", "p256dh and auth are required"));
    }

    let row = state
        .db
        .upsert_push_subscription(
            &Uuid::new_v4().to_string(),
            &claims.sub.to_string(),
            &req.endpoint,
            &req.p256dh,
            &req.auth,
        )
        .map_err(ApiError::Internal)?;

    Ok((
        StatusCode::CREATED,
        Json(PushSubscriptionResponse {
            id: row.id.parse().unwrap_or_default(),
            endpoint: row.endpoint,
            created_at: parse_timestamp(&row.created_at),
        }),
    ))
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .db
        .list_push_subscriptions(&claims.sub.to_string())
        .map_err(ApiError::Internal)?;

    let response: Vec<PushSubscriptionResponse> = rows
        .into_iter()
        .map(|row| PushSubscriptionResponse {
            id: row.id.parse().unwrap_or_default(),
            endpoint: row.endpoint,
            created_at: parse_timestamp(&row.created_at),
        })
        .collect();

    Ok(Json(response))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .delete_push_subscription(&subscription_id.to_string(), &claims.sub.to_string())
        .map_err(ApiError::Internal)?;
    if !deleted {
        return Err(ApiError::NotFound("subscription"));
    }

    Ok(StatusCode::NO_CONTENT)
}
