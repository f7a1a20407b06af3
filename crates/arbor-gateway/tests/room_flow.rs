//! End-to-end walk through the private room workflow at the service level:
//! a pod member is denied access, requests to join, the owner accepts, and
//! the member's messages then reach every connected member of the room.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use arbor_db::Database;
use arbor_db::models::{JoinOutcome, PushSubscriptionRow, ResolveOutcome};
use arbor_gateway::dispatcher::Dispatcher;
use arbor_notify::push::{PushOutcome, PushTransport};
use arbor_notify::Notifier;
use arbor_types::api::PushPayload;
use arbor_types::events::GatewayEvent;
use arbor_types::notify::NotificationKind;

struct NoopTransport;

#[async_trait]
impl PushTransport for NoopTransport {
    async fn deliver(
        &self,
        _sub: &PushSubscriptionRow,
        _payload: &PushPayload,
    ) -> anyhow::Result<PushOutcome> {
        Ok(PushOutcome::Delivered)
    }
}

#[tokio::test]
async fn private_room_join_request_lifecycle() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let dispatcher = Dispatcher::new();
    let notifier = Notifier::new(
        db.clone(),
        Arc::new(dispatcher.clone()),
        Arc::new(NoopTransport),
    );

    // Owner A with a private room, pod member B.
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    db.create_user(&owner.to_string(), "alice").unwrap();
    db.create_user(&member.to_string(), "bob").unwrap();

    let pod_id = Uuid::new_v4().to_string();
    db.create_pod(&pod_id, "builders", &owner.to_string()).unwrap();
    db.approve_pod(&pod_id).unwrap();
    db.add_pod_member(&Uuid::new_v4().to_string(), &pod_id, &member.to_string())
        .unwrap();

    let room_id = Uuid::new_v4().to_string();
    db.create_room(&room_id, &pod_id, "war room", "GENERAL", "PRIVATE")
        .unwrap();

    // B is a pod member but not a room member: sending would be rejected.
    assert_eq!(
        db.room_access(&room_id, &member.to_string()).unwrap(),
        Some(false)
    );

    // B asks to join; exactly one PENDING request exists.
    let outcome = db.request_join(&room_id, &member.to_string()).unwrap().unwrap();
    assert_eq!(outcome, JoinOutcome::Pending);
    let pending = db.list_pending_join_requests(&room_id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].username, "bob");

    // Both users are connected; B should see the acceptance notification
    // arrive on the private per-user channel.
    let (owner_conn, mut owner_rx) = dispatcher.register_connection(owner).await;
    let (member_conn, mut member_rx) = dispatcher.register_connection(member).await;

    // A (the pod owner) accepts: membership row appears, status flips.
    assert!(db.is_pod_owner(&pod_id, &owner.to_string()).unwrap());
    let outcome = db
        .resolve_join_request(&room_id, &member.to_string(), true)
        .unwrap();
    assert_eq!(outcome, ResolveOutcome::Accepted);
    assert!(db.is_room_member(&room_id, &member.to_string()).unwrap());

    let row = notifier
        .notify(
            member,
            NotificationKind::JoinRequestAccepted {
                room_id: room_id.parse().unwrap(),
            },
            "Request accepted",
            "you can now post in war room",
        )
        .await
        .unwrap();
    notifier.deliver(&row).await;

    let mut saw_notification = false;
    while let Ok(event) = member_rx.try_recv() {
        if let GatewayEvent::Notification { kind, is_read, .. } = event {
            assert_eq!(kind, "join_request_accepted");
            assert!(!is_read);
            saw_notification = true;
        }
    }
    assert!(saw_notification);

    // B retries: now authorized. The message is persisted first, then
    // broadcast to every connection in the room group, including A.
    assert_eq!(
        db.room_access(&room_id, &member.to_string()).unwrap(),
        Some(true)
    );

    let room_uuid: Uuid = room_id.parse().unwrap();
    dispatcher.join_room(room_uuid, owner_conn).await;
    dispatcher.join_room(room_uuid, member_conn).await;

    let message_id = Uuid::new_v4().to_string();
    let stored = db
        .insert_room_message(&message_id, &room_id, &member.to_string(), "hello!", None)
        .unwrap();
    dispatcher
        .broadcast_room(
            room_uuid,
            GatewayEvent::NewMessage {
                id: stored.id.parse().unwrap(),
                room_id: room_uuid,
                sender_id: member,
                sender_username: stored.sender_username.clone(),
                content: stored.content.clone(),
                reply_to: None,
                created_at: chrono::Utc::now(),
            },
        )
        .await;

    for rx in [&mut owner_rx, &mut member_rx] {
        let mut saw_message = false;
        while let Ok(event) = rx.try_recv() {
            if let GatewayEvent::NewMessage { content, sender_username, .. } = event {
                assert_eq!(content, "hello!");
                assert_eq!(sender_username, "bob");
                saw_message = true;
            }
        }
        assert!(saw_message);
    }
}
