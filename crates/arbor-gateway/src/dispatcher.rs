use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use arbor_notify::RealtimeSink;
use arbor_types::events::GatewayEvent;

/// One live WebSocket connection.
struct ConnHandle {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// Manages all connected clients and the in-memory routing tables:
/// connection registry, per-user index, and room/chat broadcast groups.
///
/// Everything here is ephemeral: rebuilt as clients reconnect, never
/// persisted. The database remains the single source of truth.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// conn_id -> connection handle
    conns: RwLock<HashMap<Uuid, ConnHandle>>,

    /// user_id -> every live conn_id of that user (multi-device)
    users: RwLock<HashMap<Uuid, HashSet<Uuid>>>,

    /// room_id -> conn_ids admitted to the room's broadcast group
    rooms: RwLock<HashMap<Uuid, HashSet<Uuid>>>,

    /// chat_id -> conn_ids admitted to the chat's broadcast group
    chats: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                conns: RwLock::new(HashMap::new()),
                users: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
                chats: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a connection and subscribe it to its user's private channel.
    /// Returns (conn_id, receiver).
    pub async fn register_connection(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        self.inner
            .conns
            .write()
            .await
            .insert(conn_id, ConnHandle { user_id, tx });
        self.inner
            .users
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id);

        (conn_id, rx)
    }

    /// Remove a connection from every table. Returns the rooms it was in so
    /// the caller can announce the departure.
    pub async fn unregister_connection(&self, conn_id: Uuid) -> Vec<Uuid> {
        let handle = self.inner.conns.write().await.remove(&conn_id);

        if let Some(handle) = &handle {
            let mut users = self.inner.users.write().await;
            if let Some(conns) = users.get_mut(&handle.user_id) {
                conns.remove(&conn_id);
                if conns.is_empty() {
                    users.remove(&handle.user_id);
                }
            }
        }

        let mut left_rooms = Vec::new();
        {
            let mut rooms = self.inner.rooms.write().await;
            rooms.retain(|room_id, members| {
                if members.remove(&conn_id) {
                    left_rooms.push(*room_id);
                }
                !members.is_empty()
            });
        }
        {
            let mut chats = self.inner.chats.write().await;
            chats.retain(|_, members| {
                members.remove(&conn_id);
                !members.is_empty()
            });
        }

        left_rooms
    }

    /// Send a targeted event to one connection.
    pub async fn send_to_conn(&self, conn_id: Uuid, event: GatewayEvent) {
        let conns = self.inner.conns.read().await;
        if let Some(handle) = conns.get(&conn_id) {
            let _ = handle.tx.send(event);
        }
    }

    /// Send a targeted event to every live connection of a user.
    /// A user with no connections is a silent no-op.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let users = self.inner.users.read().await;
        let Some(conn_ids) = users.get(&user_id) else {
            return;
        };

        let conns = self.inner.conns.read().await;
        for conn_id in conn_ids {
            if let Some(handle) = conns.get(conn_id) {
                let _ = handle.tx.send(event.clone());
            }
        }
    }

    pub async fn join_room(&self, room_id: Uuid, conn_id: Uuid) {
        self.inner
            .rooms
            .write()
            .await
            .entry(room_id)
            .or_default()
            .insert(conn_id);
    }

    /// Returns true if the connection was in the group.
    pub async fn leave_room(&self, room_id: Uuid, conn_id: Uuid) -> bool {
        let mut rooms = self.inner.rooms.write().await;
        let Some(members) = rooms.get_mut(&room_id) else {
            return false;
        };
        let removed = members.remove(&conn_id);
        if members.is_empty() {
            rooms.remove(&room_id);
        }
        removed
    }

    /// Broadcast to every connection in the room group, including the
    /// sender's own other connections.
    pub async fn broadcast_room(&self, room_id: Uuid, event: GatewayEvent) {
        self.broadcast_group(&self.inner.rooms, room_id, None, event)
            .await;
    }

    /// Broadcast to the room group, excluding every connection belonging to
    /// `except_user` (used for typing indicators).
    pub async fn broadcast_room_except(
        &self,
        room_id: Uuid,
        except_user: Uuid,
        event: GatewayEvent,
    ) {
        self.broadcast_group(&self.inner.rooms, room_id, Some(except_user), event)
            .await;
    }

    pub async fn join_chat(&self, chat_id: Uuid, conn_id: Uuid) {
        self.inner
            .chats
            .write()
            .await
            .entry(chat_id)
            .or_default()
            .insert(conn_id);
    }

    pub async fn leave_chat(&self, chat_id: Uuid, conn_id: Uuid) -> bool {
        let mut chats = self.inner.chats.write().await;
        let Some(members) = chats.get_mut(&chat_id) else {
            return false;
        };
        let removed = members.remove(&conn_id);
        if members.is_empty() {
            chats.remove(&chat_id);
        }
        removed
    }

    pub async fn broadcast_chat(&self, chat_id: Uuid, event: GatewayEvent) {
        self.broadcast_group(&self.inner.chats, chat_id, None, event)
            .await;
    }

    pub async fn broadcast_chat_except(
        &self,
        chat_id: Uuid,
        except_user: Uuid,
        event: GatewayEvent,
    ) {
        self.broadcast_group(&self.inner.chats, chat_id, Some(except_user), event)
            .await;
    }

    async fn broadcast_group(
        &self,
        groups: &RwLock<HashMap<Uuid, HashSet<Uuid>>>,
        group_id: Uuid,
        except_user: Option<Uuid>,
        event: GatewayEvent,
    ) {
        let groups = groups.read().await;
        let Some(members) = groups.get(&group_id) else {
            return;
        };

        let conns = self.inner.conns.read().await;
        for conn_id in members {
            let Some(handle) = conns.get(conn_id) else {
                continue;
            };
            if except_user == Some(handle.user_id) {
                continue;
            }
            let _ = handle.tx.send(event.clone());
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeSink for Dispatcher {
    async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        Dispatcher::send_to_user(self, user_id, event).await;
    }
}
