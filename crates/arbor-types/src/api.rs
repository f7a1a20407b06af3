use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{JoinRequestStatus, RoomKind, RoomPrivacy};

// -- JWT Claims --

/// JWT claims shared across arbor-api (REST middleware) and arbor-gateway
/// (WebSocket authentication). Canonical definition lives here in arbor-types
/// to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Pods --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePodRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct PodResponse {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
}

/// Exactly one of the two flags must be present.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetMemberRoleRequest {
    pub co_owner: Option<bool>,
    pub team_member: Option<bool>,
}

// -- Rooms --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoomRequest {
    pub name: String,
    pub kind: RoomKind,
    pub privacy: RoomPrivacy,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub id: Uuid,
    pub pod_id: Uuid,
    pub name: String,
    pub kind: RoomKind,
    pub privacy: RoomPrivacy,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a join request. For PUBLIC rooms membership is immediate and
/// `status` is ACCEPTED with no stored request.
#[derive(Debug, Serialize)]
pub struct JoinRequestResponse {
    pub room_id: Uuid,
    pub status: JoinRequestStatus,
}

#[derive(Debug, Serialize)]
pub struct PendingJoinRequestResponse {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub requested_at: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    pub reply_to_id: Option<Uuid>,
}

/// One level of quoting: the quoted message's id, author, and content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub id: Uuid,
    pub sender_username: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub room_id: Option<Uuid>,
    pub chat_id: Option<Uuid>,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub content: String,
    pub reply_to: Option<ReplyPreview>,
    pub created_at: DateTime<Utc>,
}

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChatRequest {
    pub other_user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: Uuid,
    pub participant_ids: Vec<Uuid>,
}

// -- Notifications --

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub linked_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: u64,
}

// -- Push subscriptions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscribePushRequest {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Serialize)]
pub struct PushSubscriptionResponse {
    pub id: Uuid,
    pub endpoint: String,
    pub created_at: DateTime<Utc>,
}

/// Payload handed to the push provider for each subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
