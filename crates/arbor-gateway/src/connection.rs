use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use arbor_db::Database;
use arbor_db::models::{MessageRow, parse_timestamp};
use arbor_notify::Notifier;
use arbor_types::api::ReplyPreview;
use arbor_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const MAX_MESSAGE_LEN: usize = 4000;

/// Everything a connection needs, injected at upgrade time.
#[derive(Clone)]
pub struct GatewayContext {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub notifier: Notifier,
}

/// Handle a pre-authenticated WebSocket connection. The bearer token was
/// already validated at the HTTP upgrade layer with the same claims as REST
/// auth, so the connection goes straight to Ready + event loop.
pub async fn handle_connection(
    socket: WebSocket,
    ctx: GatewayContext,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    // Register and auto-subscribe to the per-user channel so the
    // notification fan-out can reach this connection.
    let (conn_id, mut user_rx) = ctx.dispatcher.register_connection(user_id).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted + group events -> client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client.
    let ctx_recv = ctx.clone();
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&ctx_recv, conn_id, user_id, &username_recv, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                        ctx_recv
                            .dispatcher
                            .send_to_conn(
                                conn_id,
                                error_event("bad_request", "unrecognized command"),
                            )
                            .await;
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Announce the departure to every room group this connection was in.
    let left_rooms = ctx.dispatcher.unregister_connection(conn_id).await;
    for room_id in left_rooms {
        ctx.dispatcher
            .broadcast_room(
                room_id,
                GatewayEvent::UserLeft {
                    room_id,
                    user_id,
                    username: username.clone(),
                },
            )
            .await;
    }

    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn handle_command(
    ctx: &GatewayContext,
    conn_id: Uuid,
    user_id: Uuid,
    username: &str,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::JoinRoom { room_id } => {
            match check_room_access(ctx, room_id, user_id).await {
                Ok(Some(true)) => {
                    ctx.dispatcher.join_room(room_id, conn_id).await;
                    ctx.dispatcher
                        .send_to_conn(conn_id, GatewayEvent::RoomJoined { room_id })
                        .await;
                    ctx.dispatcher
                        .broadcast_room_except(
                            room_id,
                            user_id,
                            GatewayEvent::UserJoined {
                                room_id,
                                user_id,
                                username: username.to_string(),
                            },
                        )
                        .await;
                }
                Ok(Some(false)) => {
                    ctx.dispatcher
                        .send_to_conn(conn_id, error_event("forbidden", "not a member of this room"))
                        .await;
                }
                Ok(None) => {
                    ctx.dispatcher
                        .send_to_conn(conn_id, error_event("not_found", "room not found"))
                        .await;
                }
                Err(e) => {
                    warn!("room access check failed: {}", e);
                    ctx.dispatcher
                        .send_to_conn(conn_id, error_event("internal", "room access check failed"))
                        .await;
                }
            }
        }

        GatewayCommand::LeaveRoom { room_id } => {
            if ctx.dispatcher.leave_room(room_id, conn_id).await {
                ctx.dispatcher
                    .broadcast_room(
                        room_id,
                        GatewayEvent::UserLeft {
                            room_id,
                            user_id,
                            username: username.to_string(),
                        },
                    )
                    .await;
            }
        }

        GatewayCommand::SendMessage {
            room_id,
            content,
            reply_to_id,
        } => {
            send_room_message(ctx, conn_id, user_id, username, room_id, content, reply_to_id)
                .await;
        }

        GatewayCommand::TypingStart { room_id } => {
            ctx.dispatcher
                .broadcast_room_except(
                    room_id,
                    user_id,
                    GatewayEvent::UserTyping {
                        room_id,
                        user_id,
                        username: username.to_string(),
                    },
                )
                .await;
        }

        GatewayCommand::TypingStop { room_id } => {
            ctx.dispatcher
                .broadcast_room_except(
                    room_id,
                    user_id,
                    GatewayEvent::UserStoppedTyping {
                        room_id,
                        user_id,
                        username: username.to_string(),
                    },
                )
                .await;
        }

        GatewayCommand::JoinChat { chat_id } => {
            match check_chat_participant(ctx, chat_id, user_id).await {
                Ok(true) => {
                    ctx.dispatcher.join_chat(chat_id, conn_id).await;
                }
                Ok(false) => {
                    ctx.dispatcher
                        .send_to_conn(
                            conn_id,
                            error_event("forbidden", "not a participant of this chat"),
                        )
                        .await;
                }
                Err(e) => {
                    warn!("chat participant check failed: {}", e);
                    ctx.dispatcher
                        .send_to_conn(conn_id, error_event("internal", "chat check failed"))
                        .await;
                }
            }
        }

        GatewayCommand::LeaveChat { chat_id } => {
            ctx.dispatcher.leave_chat(chat_id, conn_id).await;
        }

        GatewayCommand::SendDm {
            chat_id,
            content,
            reply_to_id,
        } => {
            send_chat_message(ctx, conn_id, user_id, username, chat_id, content, reply_to_id)
                .await;
        }

        GatewayCommand::DmTypingStart { chat_id } => {
            ctx.dispatcher
                .broadcast_chat_except(
                    chat_id,
                    user_id,
                    GatewayEvent::DmUserTyping {
                        chat_id,
                        user_id,
                        username: username.to_string(),
                    },
                )
                .await;
        }

        GatewayCommand::DmTypingStop { chat_id } => {
            ctx.dispatcher
                .broadcast_chat_except(
                    chat_id,
                    user_id,
                    GatewayEvent::DmUserTypingStopped {
                        chat_id,
                        user_id,
                        username: username.to_string(),
                    },
                )
                .await;
        }
    }
}

async fn send_room_message(
    ctx: &GatewayContext,
    conn_id: Uuid,
    user_id: Uuid,
    username: &str,
    room_id: Uuid,
    content: String,
    reply_to_id: Option<Uuid>,
) {
    if content.trim().is_empty() || content.len() > MAX_MESSAGE_LEN {
        ctx.dispatcher
            .send_to_conn(conn_id, error_event("bad_request", "invalid message content"))
            .await;
        return;
    }

    // Authorization is re-checked at send time, never cached on the
    // connection: a revoked membership takes effect immediately.
    match check_room_access(ctx, room_id, user_id).await {
        Ok(Some(true)) => {}
        Ok(Some(false)) => {
            ctx.dispatcher
                .send_to_conn(conn_id, error_event("forbidden", "not a member of this room"))
                .await;
            return;
        }
        Ok(None) => {
            ctx.dispatcher
                .send_to_conn(conn_id, error_event("not_found", "room not found"))
                .await;
            return;
        }
        Err(e) => {
            warn!("room access check failed: {}", e);
            ctx.dispatcher
                .send_to_conn(conn_id, error_event("internal", "room access check failed"))
                .await;
            return;
        }
    }

    if let Some(reply_id) = reply_to_id {
        if !reply_target_in_room(ctx, reply_id, room_id).await {
            ctx.dispatcher
                .send_to_conn(conn_id, error_event("bad_request", "reply target not in this room"))
                .await;
            return;
        }
    }

    let db = ctx.db.clone();
    let message_id = Uuid::new_v4();
    let mid = message_id.to_string();
    let rid = room_id.to_string();
    let uid = user_id.to_string();
    let reply = reply_to_id.map(|r| r.to_string());
    let body = content.clone();

    let row = match tokio::task::spawn_blocking(move || {
        db.insert_room_message(&mid, &rid, &uid, &body, reply.as_deref())
    })
    .await
    {
        Ok(Ok(row)) => row,
        Ok(Err(e)) => {
            warn!("persisting room message failed: {}", e);
            ctx.dispatcher
                .send_to_conn(conn_id, error_event("internal", "message not saved"))
                .await;
            return;
        }
        Err(e) => {
            warn!("spawn_blocking join error: {}", e);
            ctx.dispatcher
                .send_to_conn(conn_id, error_event("internal", "message not saved"))
                .await;
            return;
        }
    };

    // DB write happens before the broadcast: subscribers observe messages in
    // persistence order within a room.
    ctx.dispatcher
        .broadcast_room(room_id, room_message_event(&row))
        .await;

    ctx.notifier.notify_reply(&row, user_id, username).await;
}

async fn send_chat_message(
    ctx: &GatewayContext,
    conn_id: Uuid,
    user_id: Uuid,
    username: &str,
    chat_id: Uuid,
    content: String,
    reply_to_id: Option<Uuid>,
) {
    if content.trim().is_empty() || content.len() > MAX_MESSAGE_LEN {
        ctx.dispatcher
            .send_to_conn(conn_id, error_event("bad_request", "invalid message content"))
            .await;
        return;
    }

    match check_chat_participant(ctx, chat_id, user_id).await {
        Ok(true) => {}
        Ok(false) => {
            ctx.dispatcher
                .send_to_conn(
                    conn_id,
                    error_event("forbidden", "not a participant of this chat"),
                )
                .await;
            return;
        }
        Err(e) => {
            warn!("chat participant check failed: {}", e);
            ctx.dispatcher
                .send_to_conn(conn_id, error_event("internal", "chat check failed"))
                .await;
            return;
        }
    }

    if let Some(reply_id) = reply_to_id {
        if !reply_target_in_chat(ctx, reply_id, chat_id).await {
            ctx.dispatcher
                .send_to_conn(conn_id, error_event("bad_request", "reply target not in this chat"))
                .await;
            return;
        }
    }

    let db = ctx.db.clone();
    let message_id = Uuid::new_v4();
    let mid = message_id.to_string();
    let cid = chat_id.to_string();
    let uid = user_id.to_string();
    let reply = reply_to_id.map(|r| r.to_string());
    let body = content.clone();

    let row = match tokio::task::spawn_blocking(move || {
        db.insert_chat_message(&mid, &cid, &uid, &body, reply.as_deref())
    })
    .await
    {
        Ok(Ok(row)) => row,
        Ok(Err(e)) => {
            warn!("persisting chat message failed: {}", e);
            ctx.dispatcher
                .send_to_conn(conn_id, error_event("internal", "message not saved"))
                .await;
            return;
        }
        Err(e) => {
            warn!("spawn_blocking join error: {}", e);
            ctx.dispatcher
                .send_to_conn(conn_id, error_event("internal", "message not saved"))
                .await;
            return;
        }
    };

    ctx.dispatcher
        .broadcast_chat(chat_id, chat_message_event(&row))
        .await;

    ctx.notifier.notify_reply(&row, user_id, username).await;
}

async fn check_room_access(
    ctx: &GatewayContext,
    room_id: Uuid,
    user_id: Uuid,
) -> Result<Option<bool>> {
    let db = ctx.db.clone();
    let rid = room_id.to_string();
    let uid = user_id.to_string();
    tokio::task::spawn_blocking(move || db.room_access(&rid, &uid)).await?
}

async fn check_chat_participant(
    ctx: &GatewayContext,
    chat_id: Uuid,
    user_id: Uuid,
) -> Result<bool> {
    let db = ctx.db.clone();
    let cid = chat_id.to_string();
    let uid = user_id.to_string();
    tokio::task::spawn_blocking(move || db.is_chat_participant(&cid, &uid)).await?
}

async fn reply_target_in_room(ctx: &GatewayContext, reply_id: Uuid, room_id: Uuid) -> bool {
    let db = ctx.db.clone();
    let mid = reply_id.to_string();
    match tokio::task::spawn_blocking(move || db.get_message(&mid)).await {
        Ok(Ok(Some(row))) => row.room_id.as_deref() == Some(room_id.to_string().as_str()),
        _ => false,
    }
}

async fn reply_target_in_chat(ctx: &GatewayContext, reply_id: Uuid, chat_id: Uuid) -> bool {
    let db = ctx.db.clone();
    let mid = reply_id.to_string();
    match tokio::task::spawn_blocking(move || db.get_message(&mid)).await {
        Ok(Ok(Some(row))) => row.chat_id.as_deref() == Some(chat_id.to_string().as_str()),
        _ => false,
    }
}

/// Build the one-level quote preview carried on message events and responses.
pub fn reply_preview(row: &MessageRow) -> Option<ReplyPreview> {
    let id = row.reply_to_id.as_deref()?.parse().ok()?;
    Some(ReplyPreview {
        id,
        sender_username: row
            .reply_to_username
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        content: row.reply_to_content.clone().unwrap_or_default(),
    })
}

/// Event broadcast for a freshly persisted room message; shared with the
/// REST send path.
pub fn room_message_event(row: &MessageRow) -> GatewayEvent {
    GatewayEvent::NewMessage {
        id: row.id.parse().unwrap_or_default(),
        room_id: row
            .room_id
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or_default(),
        sender_id: row.sender_id.parse().unwrap_or_default(),
        sender_username: row.sender_username.clone(),
        content: row.content.clone(),
        reply_to: reply_preview(row),
        created_at: parse_timestamp(&row.created_at),
    }
}

/// Chat counterpart of `room_message_event`.
pub fn chat_message_event(row: &MessageRow) -> GatewayEvent {
    GatewayEvent::NewDm {
        id: row.id.parse().unwrap_or_default(),
        chat_id: row
            .chat_id
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or_default(),
        sender_id: row.sender_id.parse().unwrap_or_default(),
        sender_username: row.sender_username.clone(),
        content: row.content.clone(),
        reply_to: reply_preview(row),
        created_at: parse_timestamp(&row.created_at),
    }
}

fn error_event(code: &str, message: &str) -> GatewayEvent {
    GatewayEvent::Error {
        code: code.to_string(),
        message: message.to_string(),
    }
}
