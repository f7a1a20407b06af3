use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use arbor_types::api::{Claims, CreatePodRequest, PodResponse, SetMemberRoleRequest};
use arbor_types::notify::NotificationKind;

use crate::authz::ensure_pod_owner;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_pod(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePodRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim();
    if name.is_empty() || name.len() > 80 {
        return Err(ApiError::invalid("name", "must be 1-80 characters"));
    }

    let pod_id = Uuid::new_v4();
    state
        .db
        .create_pod(&pod_id.to_string(), name, &claims.sub.to_string())
        .map_err(ApiError::Internal)?;

    let pod = state
        .db
        .get_pod(&pod_id.to_string())
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("created pod missing")))?;

    Ok((
        StatusCode::CREATED,
        Json(PodResponse {
            id: pod_id,
            name: pod.name,
            owner_id: claims.sub,
            is_approved: pod.is_approved,
            created_at: arbor_db::models::parse_timestamp(&pod.created_at),
        }),
    ))
}

/// Join an approved pod. Fans a member-joined notification out to the owner.
pub async fn join_pod(
    State(state): State<AppState>,
    Path(pod_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pod = state
        .db
        .get_pod(&pod_id.to_string())
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound("pod"))?;

    // Unapproved pods are invisible to everyone but their owner.
    if !pod.is_approved && pod.owner_id != claims.sub.to_string() {
        return Err(ApiError::NotFound("pod"));
    }

    let added = state
        .db
        .add_pod_member(
            &Uuid::new_v4().to_string(),
            &pod_id.to_string(),
            &claims.sub.to_string(),
        )
        .map_err(ApiError::Internal)?;
    if !added {
        return Err(ApiError::Conflict("already a member"));
    }

    if pod.owner_id != claims.sub.to_string() {
        if let Ok(owner_id) = pod.owner_id.parse::<Uuid>() {
            if let Err(e) = state
                .notifier
                .notify(
                    owner_id,
                    NotificationKind::MemberJoined { pod_id },
                    "New member",
                    &format!("{} joined {}", claims.username, pod.name),
                )
                .await
            {
                warn!("member-joined notification failed: {}", e);
            }
        }
    }

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "joined": true }))))
}

/// Leave a pod. The owner cannot leave their own pod (ownership transfer is
/// not a thing here).
pub async fn leave_pod(
    State(state): State<AppState>,
    Path(pod_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pod = state
        .db
        .get_pod(&pod_id.to_string())
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound("pod"))?;
    if pod.owner_id == claims.sub.to_string() {
        return Err(ApiError::Conflict("the owner cannot leave their own pod"));
    }

    let removed = state
        .db
        .remove_pod_member(&pod_id.to_string(), &claims.sub.to_string())
        .map_err(ApiError::Internal)?;
    if !removed {
        return Err(ApiError::NotFound("membership"));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Owner-only role change. Exactly one flag per request; the co-owner and
/// team-member roles are mutually exclusive in both directions.
pub async fn set_member_role(
    State(state): State<AppState>,
    Path((pod_id, target_user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetMemberRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pod = ensure_pod_owner(&state.db, &pod_id.to_string(), &claims.sub.to_string())?;

    if target_user_id.to_string() == pod.owner_id {
        return Err(ApiError::invalid("user_id", "cannot change the owner's role"));
    }

    state
        .db
        .get_pod_member(&pod_id.to_string(), &target_user_id.to_string())
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound("member"))?;

    let result = match (req.co_owner, req.team_member) {
        (Some(value), None) => {
            state
                .db
                .set_co_owner(&pod_id.to_string(), &target_user_id.to_string(), value)
        }
        (None, Some(value)) => {
            state
                .db
                .set_team_member(&pod_id.to_string(), &target_user_id.to_string(), value)
        }
        _ => {
            return Err(ApiError::invalid(
                "role",
                "set exactly one of co_owner / team_member",
            ));
        }
    };

    // Membership was verified above, so a refusal here is the exclusivity rule.
    result.map_err(|_| ApiError::Conflict("co-owner and team-member roles are exclusive"))?;

    Ok(Json(serde_json::json!({ "updated": true })))
}
