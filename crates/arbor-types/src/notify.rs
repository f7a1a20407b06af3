use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a notification is about. Each variant carries the id of its subject,
/// replacing the loose `type` string + untyped `linked_id` pair at the API
/// boundary. `Other` keeps forward compatibility with kinds written by newer
/// servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    MemberJoined { pod_id: Uuid },
    PodApproved { pod_id: Uuid },
    JoinRequestReceived { room_id: Uuid },
    JoinRequestAccepted { room_id: Uuid },
    JoinRequestRejected { room_id: Uuid },
    MessageReply { message_id: Uuid },
    Other {
        #[serde(rename = "other_kind")]
        kind: String,
        linked_id: Option<Uuid>,
    },
}

impl NotificationKind {
    /// Wire/storage name of the kind.
    pub fn kind_str(&self) -> &str {
        match self {
            Self::MemberJoined { .. } => "member_joined",
            Self::PodApproved { .. } => "pod_approved",
            Self::JoinRequestReceived { .. } => "join_request_received",
            Self::JoinRequestAccepted { .. } => "join_request_accepted",
            Self::JoinRequestRejected { .. } => "join_request_rejected",
            Self::MessageReply { .. } => "message_reply",
            Self::Other { kind, .. } => kind,
        }
    }

    /// The id of the linked subject, if any.
    pub fn linked_id(&self) -> Option<Uuid> {
        match self {
            Self::MemberJoined { pod_id } | Self::PodApproved { pod_id } => Some(*pod_id),
            Self::JoinRequestReceived { room_id }
            | Self::JoinRequestAccepted { room_id }
            | Self::JoinRequestRejected { room_id } => Some(*room_id),
            Self::MessageReply { message_id } => Some(*message_id),
            Self::Other { linked_id, .. } => *linked_id,
        }
    }

    /// Rebuild a kind from its stored (kind, linked_id) parts. Unknown kinds
    /// fall back to `Other` instead of failing.
    pub fn from_parts(kind: &str, linked_id: Option<Uuid>) -> Self {
        match (kind, linked_id) {
            ("member_joined", Some(id)) => Self::MemberJoined { pod_id: id },
            ("pod_approved", Some(id)) => Self::PodApproved { pod_id: id },
            ("join_request_received", Some(id)) => Self::JoinRequestReceived { room_id: id },
            ("join_request_accepted", Some(id)) => Self::JoinRequestAccepted { room_id: id },
            ("join_request_rejected", Some(id)) => Self::JoinRequestRejected { room_id: id },
            ("message_reply", Some(id)) => Self::MessageReply { message_id: id },
            _ => Self::Other {
                kind: kind.to_string(),
                linked_id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_roundtrip() {
        let pod_id = Uuid::new_v4();
        let kind = NotificationKind::MemberJoined { pod_id };

        let rebuilt = NotificationKind::from_parts(kind.kind_str(), kind.linked_id());
        assert_eq!(rebuilt, kind);
    }

    #[test]
    fn unknown_kind_falls_back_to_other() {
        let id = Uuid::new_v4();
        let kind = NotificationKind::from_parts("pitch_replied", Some(id));

        assert_eq!(
            kind,
            NotificationKind::Other {
                kind: "pitch_replied".to_string(),
                linked_id: Some(id),
            }
        );
        assert_eq!(kind.kind_str(), "pitch_replied");
        assert_eq!(kind.linked_id(), Some(id));
    }
}
