//! Authorization helpers: pure checks over the persistence layer, shared by
//! the REST handlers. The gateway runs the same underlying queries at
//! command time.

use arbor_db::Database;
use arbor_db::models::PodRow;

use crate::error::ApiError;

/// Room read/write access per privacy rules: pod owner or co-owner, room
/// member, or pod member when the room is public.
pub fn ensure_room_read(db: &Database, room_id: &str, user_id: &str) -> Result<(), ApiError> {
    match db.room_access(room_id, user_id).map_err(ApiError::Internal)? {
        None => Err(ApiError::NotFound("room")),
        Some(true) => Ok(()),
        Some(false) => Err(ApiError::Forbidden),
    }
}

pub fn ensure_pod_owner(db: &Database, pod_id: &str, user_id: &str) -> Result<PodRow, ApiError> {
    let pod = db
        .get_pod(pod_id)
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound("pod"))?;
    if pod.owner_id != user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(pod)
}

pub fn ensure_chat_participant(db: &Database, chat_id: &str, user_id: &str) -> Result<(), ApiError> {
    let participants = db
        .get_chat_participants(chat_id)
        .map_err(ApiError::Internal)?;
    if participants.is_empty() {
        return Err(ApiError::NotFound("chat"));
    }
    if !participants.iter().any(|p| p == user_id) {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}
