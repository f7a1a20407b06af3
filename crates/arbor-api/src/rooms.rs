use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use arbor_db::models::{JoinOutcome, ResolveOutcome, parse_timestamp};
use arbor_types::api::{
    Claims, CreateRoomRequest, JoinRequestResponse, PendingJoinRequestResponse, RoomResponse,
};
use arbor_types::models::JoinRequestStatus;
use arbor_types::notify::NotificationKind;

use crate::error::ApiError;
use crate::state::AppState;

/// Owner or co-owner creates a room inside a pod.
pub async fn create_room(
    State(state): State<AppState>,
    Path(pod_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim();
    if name.is_empty() || name.len() > 80 {
        return Err(ApiError::invalid("name", "must be 1-80 characters"));
    }

    state
        .db
        .get_pod(&pod_id.to_string())
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound("pod"))?;
    if !state
        .db
        .is_owner_or_co_owner(&pod_id.to_string(), &claims.sub.to_string())
        .map_err(ApiError::Internal)?
    {
        return Err(ApiError::Forbidden);
    }

    let room_id = Uuid::new_v4();
    state
        .db
        .create_room(
            &room_id.to_string(),
            &pod_id.to_string(),
            name,
            req.kind.as_str(),
            req.privacy.as_str(),
        )
        .map_err(ApiError::Internal)?;

    let room = state
        .db
        .get_room(&room_id.to_string())
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("created room missing")))?;

    Ok((
        StatusCode::CREATED,
        Json(RoomResponse {
            id: room_id,
            pod_id,
            name: room.name,
            kind: req.kind,
            privacy: req.privacy,
            created_at: parse_timestamp(&room.created_at),
        }),
    ))
}

/// Ask to join a room. Pod membership is required first; the rest is the
/// join-request state machine (immediate membership for public rooms).
pub async fn request_join(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let room = state
        .db
        .get_room(&room_id.to_string())
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound("room"))?;

    if !state
        .db
        .is_pod_member(&room.pod_id, &claims.sub.to_string())
        .map_err(ApiError::Internal)?
    {
        return Err(ApiError::Forbidden);
    }

    let outcome = state
        .db
        .request_join(&room_id.to_string(), &claims.sub.to_string())
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound("room"))?;

    match outcome {
        JoinOutcome::JoinedPublic => Ok((
            StatusCode::OK,
            Json(JoinRequestResponse {
                room_id,
                status: JoinRequestStatus::Accepted,
            }),
        )),
        JoinOutcome::Pending | JoinOutcome::Resubmitted => {
            notify_owner_of_request(&state, &room.pod_id, room_id, &room.name, &claims).await;
            Ok((
                StatusCode::CREATED,
                Json(JoinRequestResponse {
                    room_id,
                    status: JoinRequestStatus::Pending,
                }),
            ))
        }
        JoinOutcome::AlreadyPending => Err(ApiError::Conflict("a pending request already exists")),
        JoinOutcome::AlreadyAccepted => Err(ApiError::Conflict("already accepted")),
        JoinOutcome::AlreadyMember => Err(ApiError::Conflict("already a member")),
    }
}

/// Pod owner lists a room's pending requests.
pub async fn list_join_requests(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let room = state
        .db
        .get_room(&room_id.to_string())
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound("room"))?;
    crate::authz::ensure_pod_owner(&state.db, &room.pod_id, &claims.sub.to_string())?;

    let pending = state
        .db
        .list_pending_join_requests(&room_id.to_string())
        .map_err(ApiError::Internal)?;

    let response: Vec<PendingJoinRequestResponse> = pending
        .into_iter()
        .map(|req| PendingJoinRequestResponse {
            room_id,
            user_id: req.user_id.parse().unwrap_or_default(),
            username: req.username,
            requested_at: parse_timestamp(&req.created_at),
        })
        .collect();

    Ok(Json(response))
}

pub async fn accept_join_request(
    state: State<AppState>,
    path: Path<(Uuid, Uuid)>,
    claims: Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    decide_join_request(state, path, claims, true).await
}

pub async fn reject_join_request(
    state: State<AppState>,
    path: Path<(Uuid, Uuid)>,
    claims: Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    decide_join_request(state, path, claims, false).await
}

async fn decide_join_request(
    State(state): State<AppState>,
    Path((room_id, target_user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    accept: bool,
) -> Result<impl IntoResponse, ApiError> {
    let room = state
        .db
        .get_room(&room_id.to_string())
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound("room"))?;
    crate::authz::ensure_pod_owner(&state.db, &room.pod_id, &claims.sub.to_string())?;

    let outcome = state
        .db
        .resolve_join_request(&room_id.to_string(), &target_user_id.to_string(), accept)
        .map_err(ApiError::Internal)?;

    let status = match outcome {
        ResolveOutcome::Accepted => JoinRequestStatus::Accepted,
        ResolveOutcome::Rejected => JoinRequestStatus::Rejected,
        ResolveOutcome::NotFound => return Err(ApiError::NotFound("join request")),
        ResolveOutcome::NotPending => return Err(ApiError::Conflict("request already decided")),
    };

    let kind = if accept {
        NotificationKind::JoinRequestAccepted { room_id }
    } else {
        NotificationKind::JoinRequestRejected { room_id }
    };
    let (title, body) = if accept {
        (
            "Request accepted",
            format!("you can now post in {}", room.name),
        )
    } else {
        (
            "Request declined",
            format!("your request to join {} was declined", room.name),
        )
    };
    if let Err(e) = state.notifier.notify(target_user_id, kind, title, &body).await {
        warn!("join-request decision notification failed: {}", e);
    }

    Ok(Json(JoinRequestResponse { room_id, status }))
}

async fn notify_owner_of_request(
    state: &AppState,
    pod_id: &str,
    room_id: Uuid,
    room_name: &str,
    claims: &Claims,
) {
    let owner_id = match state.db.get_pod(pod_id) {
        Ok(Some(pod)) => pod.owner_id,
        Ok(None) => return,
        Err(e) => {
            warn!("pod lookup for join-request notification failed: {}", e);
            return;
        }
    };
    let Ok(owner_id) = owner_id.parse::<Uuid>() else {
        return;
    };

    if let Err(e) = state
        .notifier
        .notify(
            owner_id,
            NotificationKind::JoinRequestReceived { room_id },
            "Join request",
            &format!("{} asked to join {}", claims.username, room_name),
        )
        .await
    {
        warn!("join-request notification failed: {}", e);
    }
}
