//! Closed domain enums shared by the API surface and the persistence layer.
//! SQLite stores them as their `as_str` names; `parse` is the one way back,
//! so unknown strings surface as `None` instead of panicking.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomKind {
    General,
    Qa,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "GENERAL",
            Self::Qa => "QA",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GENERAL" => Some(Self::General),
            "QA" => Some(Self::Qa),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomPrivacy {
    Public,
    Private,
}

impl RoomPrivacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Private => "PRIVATE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PUBLIC" => Some(Self::Public),
            "PRIVATE" => Some(Self::Private),
            _ => None,
        }
    }
}

/// Lifecycle of a private-room join request. The only backward transition is
/// REJECTED -> PENDING on resubmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl JoinRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "ACCEPTED" => Some(Self::Accepted),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_names_roundtrip() {
        for status in [
            JoinRequestStatus::Pending,
            JoinRequestStatus::Accepted,
            JoinRequestStatus::Rejected,
        ] {
            assert_eq!(JoinRequestStatus::parse(status.as_str()), Some(status));
        }
        for privacy in [RoomPrivacy::Public, RoomPrivacy::Private] {
            assert_eq!(RoomPrivacy::parse(privacy.as_str()), Some(privacy));
        }
        for kind in [RoomKind::General, RoomKind::Qa] {
            assert_eq!(RoomKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(JoinRequestStatus::parse("EXPIRED"), None);
    }

    #[test]
    fn wire_format_matches_storage_format() {
        let json = serde_json::to_value(RoomPrivacy::Private).unwrap();
        assert_eq!(json, "PRIVATE");

        let parsed: RoomKind = serde_json::from_value(serde_json::json!("QA")).unwrap();
        assert_eq!(parsed, RoomKind::Qa);
    }
}
