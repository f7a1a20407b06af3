//! Database row types — these map directly to SQLite rows.
//! Distinct from arbor-types API models to keep the DB layer independent.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

pub struct PodRow {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub is_approved: bool,
    pub created_at: String,
}

pub struct PodMemberRow {
    pub id: String,
    pub pod_id: String,
    pub user_id: String,
    pub is_co_owner: bool,
    pub is_team_member: bool,
    pub created_at: String,
}

pub struct RoomRow {
    pub id: String,
    pub pod_id: String,
    pub name: String,
    pub kind: String,
    pub privacy: String,
    pub created_at: String,
}

/// Join request joined with the requester's username for owner-facing lists.
pub struct JoinRequestRow {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub username: String,
    pub status: String,
    pub created_at: String,
}

/// Message joined with sender username and the quoted message's preview
/// fields, so callers never do a second lookup per row.
pub struct MessageRow {
    pub id: String,
    pub room_id: Option<String>,
    pub chat_id: Option<String>,
    pub sender_id: String,
    pub sender_username: String,
    pub content: String,
    pub reply_to_id: Option<String>,
    pub reply_to_sender_id: Option<String>,
    pub reply_to_username: Option<String>,
    pub reply_to_content: Option<String>,
    pub created_at: String,
}

#[derive(Clone)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub linked_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Clone)]
pub struct PushSubscriptionRow {
    pub id: String,
    pub user_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: String,
}

/// Outcome of `request_join`: the full state machine, resolved in one
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Public room: membership created (or already present), no request row.
    JoinedPublic,
    /// Private room: a new PENDING request was created.
    Pending,
    /// Private room: a prior REJECTED request was reset to PENDING.
    Resubmitted,
    /// A PENDING request already exists.
    AlreadyPending,
    /// A prior request was ACCEPTED.
    AlreadyAccepted,
    /// The user is already a member of the room.
    AlreadyMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Accepted,
    Rejected,
    /// No request exists for that (room, user).
    NotFound,
    /// The request is not in PENDING state.
    NotPending,
}

/// Parse a SQLite TEXT timestamp. SQLite's datetime('now') stores
/// \"YYYY-MM-DD HH:MM:SS\" without timezone; treat it as UTC.
pub fn parse_timestamp(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", s, e);
            DateTime::default()
        })
}
