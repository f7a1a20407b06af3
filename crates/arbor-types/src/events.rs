use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ReplyPreview;

/// Events sent over the WebSocket gateway, server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// The caller was admitted to a room's broadcast group
    RoomJoined { room_id: Uuid },

    /// Another member joined the room group
    UserJoined {
        room_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    /// A member left the room group (or disconnected)
    UserLeft {
        room_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    /// A message was posted to a room
    NewMessage {
        id: Uuid,
        room_id: Uuid,
        sender_id: Uuid,
        sender_username: String,
        content: String,
        reply_to: Option<ReplyPreview>,
        created_at: DateTime<Utc>,
    },

    UserTyping {
        room_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    UserStoppedTyping {
        room_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    /// A message was posted to a direct chat
    NewDm {
        id: Uuid,
        chat_id: Uuid,
        sender_id: Uuid,
        sender_username: String,
        content: String,
        reply_to: Option<ReplyPreview>,
        created_at: DateTime<Utc>,
    },

    DmUserTyping {
        chat_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    DmUserTypingStopped {
        chat_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    /// Delivered on the private per-user channel by the notification fan-out
    Notification {
        id: Uuid,
        kind: String,
        title: String,
        body: String,
        linked_id: Option<Uuid>,
        is_read: bool,
        created_at: DateTime<Utc>,
    },

    /// A command was refused (authorization, unknown target, bad input)
    Error { code: String, message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayCommand {
    /// Ask to be admitted to a room's broadcast group
    JoinRoom { room_id: Uuid },

    /// Leave a room's broadcast group (always succeeds)
    LeaveRoom { room_id: Uuid },

    /// Persist a message and broadcast it to the room group
    SendMessage {
        room_id: Uuid,
        content: String,
        reply_to_id: Option<Uuid>,
    },

    TypingStart { room_id: Uuid },

    TypingStop { room_id: Uuid },

    /// Ask to be admitted to a chat's broadcast group
    JoinChat { chat_id: Uuid },

    LeaveChat { chat_id: Uuid },

    /// Persist a direct message and broadcast it to the chat group
    SendDm {
        chat_id: Uuid,
        content: String,
        reply_to_id: Option<Uuid>,
    },

    DmTypingStart { chat_id: Uuid },

    DmTypingStop { chat_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_kebab_case_wire_names() {
        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"send-message","data":{"room_id":"00000000-0000-0000-0000-000000000001","content":"hi","reply_to_id":null}}"#,
        )
        .unwrap();

        match cmd {
            GatewayCommand::SendMessage { content, .. } => assert_eq!(content, "hi"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn events_use_kebab_case_wire_names() {
        let event = GatewayEvent::UserStoppedTyping {
            room_id: Uuid::nil(),
            user_id: Uuid::nil(),
            username: "ada".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user-stopped-typing");
    }
}
