pub mod push;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use arbor_db::Database;
use arbor_db::models::{MessageRow, NotificationRow, parse_timestamp};
use arbor_types::api::PushPayload;
use arbor_types::events::GatewayEvent;
use arbor_types::notify::NotificationKind;

use crate::push::{PushOutcome, PushTransport};

/// Hands targeted events to the real-time layer. Implemented by the gateway
/// dispatcher; delivery to an offline user is a silent no-op.
#[async_trait]
pub trait RealtimeSink: Send + Sync {
    async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent);
}

/// The notification fan-out helper.
///
/// `notify` persists the row (the only step allowed to fail the caller),
/// then hands socket emission and per-subscription push delivery to a
/// detached task so the triggering request is never delayed or failed by
/// delivery problems.
#[derive(Clone)]
pub struct Notifier {
    db: Arc<Database>,
    sink: Arc<dyn RealtimeSink>,
    transport: Arc<dyn PushTransport>,
}

impl Notifier {
    pub fn new(
        db: Arc<Database>,
        sink: Arc<dyn RealtimeSink>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        Self {
            db,
            sink,
            transport,
        }
    }

    /// Create a notification for `user_id` and fan it out.
    ///
    /// Two calls create two rows; deduplication is the caller's concern.
    pub async fn notify(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        title: &str,
        body: &str,
    ) -> Result<NotificationRow> {
        let db = self.db.clone();
        let id = Uuid::new_v4().to_string();
        let uid = user_id.to_string();
        let kind_str = kind.kind_str().to_string();
        let linked = kind.linked_id().map(|l| l.to_string());
        let title = title.to_string();
        let body = body.to_string();

        let row = tokio::task::spawn_blocking(move || {
            db.insert_notification(&id, &uid, &kind_str, &title, &body, linked.as_deref())
        })
        .await??;

        // Delivery is fire-and-forget from the caller's point of view.
        let this = self.clone();
        let delivered = row.clone();
        tokio::spawn(async move {
            this.deliver(&delivered).await;
        });

        Ok(row)
    }

    /// When a stored message quotes someone else's message, fan a reply
    /// notification out to the quoted author. Failures are logged, never
    /// surfaced to the sender: the message itself already succeeded.
    pub async fn notify_reply(&self, row: &MessageRow, sender_id: Uuid, sender_username: &str) {
        let Some(target) = row.reply_to_sender_id.as_deref() else {
            return;
        };
        let Ok(target_id) = target.parse::<Uuid>() else {
            return;
        };
        if target_id == sender_id {
            return;
        }
        let Ok(message_id) = row.id.parse::<Uuid>() else {
            return;
        };

        if let Err(e) = self
            .notify(
                target_id,
                NotificationKind::MessageReply { message_id },
                "New reply",
                &format!("{} replied to your message", sender_username),
            )
            .await
        {
            warn!("reply notification failed: {}", e);
        }
    }

    /// Socket emission plus best-effort push to every registered
    /// subscription. Never returns an error: failures here must not reach
    /// the request that triggered the notification.
    pub async fn deliver(&self, row: &NotificationRow) {
        let Ok(user_id) = row.user_id.parse::<Uuid>() else {
            warn!("notification {} has corrupt user id", row.id);
            return;
        };

        self.sink
            .send_to_user(user_id, notification_event(row))
            .await;

        let db = self.db.clone();
        let uid = row.user_id.clone();
        let subscriptions =
            match tokio::task::spawn_blocking(move || db.list_push_subscriptions(&uid)).await {
                Ok(Ok(subs)) => subs,
                Ok(Err(e)) => {
                    warn!("listing push subscriptions for {}: {}", row.user_id, e);
                    return;
                }
                Err(e) => {
                    warn!("subscription lookup task failed: {}", e);
                    return;
                }
            };

        if subscriptions.is_empty() {
            return;
        }

        let payload = PushPayload {
            title: row.title.clone(),
            body: row.body.clone(),
            icon: None,
            badge: None,
            data: Some(serde_json::json!({
                "kind": row.kind,
                "linked_id": row.linked_id,
            })),
        };

        // Each subscription is attempted independently; one failing endpoint
        // must not block the rest.
        for sub in subscriptions {
            match self.transport.deliver(&sub, &payload).await {
                Ok(PushOutcome::Delivered) => {}
                Ok(PushOutcome::Gone) => {
                    debug!("pruning gone push endpoint {}", sub.endpoint);
                    let db = self.db.clone();
                    let endpoint = sub.endpoint.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        db.delete_push_subscription_by_endpoint(&endpoint)
                    })
                    .await;
                    match result {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!("pruning push subscription {}: {}", sub.endpoint, e),
                        Err(e) => warn!("pruning task failed: {}", e),
                    }
                }
                Err(e) => {
                    warn!("push to {} failed: {}", sub.endpoint, e);
                }
            }
        }
    }
}

fn notification_event(row: &NotificationRow) -> GatewayEvent {
    GatewayEvent::Notification {
        id: row.id.parse().unwrap_or_default(),
        kind: row.kind.clone(),
        title: row.title.clone(),
        body: row.body.clone(),
        linked_id: row.linked_id.as_deref().and_then(|l| l.parse().ok()),
        is_read: row.is_read,
        created_at: parse_timestamp(&row.created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<(Uuid, GatewayEvent)>>,
    }

    #[async_trait]
    impl RealtimeSink for RecordingSink {
        async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
            self.events.lock().unwrap().push((user_id, event));
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<String>>,
        gone: HashSet<String>,
        failing: HashSet<String>,
    }

    #[async_trait]
    impl PushTransport for RecordingTransport {
        async fn deliver(
            &self,
            sub: &arbor_db::models::PushSubscriptionRow,
            _payload: &PushPayload,
        ) -> Result<PushOutcome> {
            self.calls.lock().unwrap().push(sub.endpoint.clone());
            if self.gone.contains(&sub.endpoint) {
                return Ok(PushOutcome::Gone);
            }
            if self.failing.contains(&sub.endpoint) {
                anyhow::bail!("provider unavailable");
            }
            Ok(PushOutcome::Delivered)
        }
    }

    struct Harness {
        db: Arc<Database>,
        sink: Arc<RecordingSink>,
        transport: Arc<RecordingTransport>,
        notifier: Notifier,
        user_id: Uuid,
    }

    fn harness(transport: RecordingTransport) -> Harness {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user_id = Uuid::new_v4();
        db.create_user(&user_id.to_string(), "ada").unwrap();

        let sink = Arc::new(RecordingSink::default());
        let transport = Arc::new(transport);
        let notifier = Notifier::new(db.clone(), sink.clone(), transport.clone());

        Harness {
            db,
            sink,
            transport,
            notifier,
            user_id,
        }
    }

    fn subscribe(h: &Harness, endpoint: &str) {
        h.db.upsert_push_subscription(
            &Uuid::new_v4().to_string(),
            &h.user_id.to_string(),
            endpoint,
            "p256dh",
            "auth",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn notify_creates_exactly_one_unread_row() {
        let h = harness(RecordingTransport::default());

        let row = h
            .notifier
            .notify(
                h.user_id,
                NotificationKind::MemberJoined {
                    pod_id: Uuid::new_v4(),
                },
                "New member",
                "bob joined your pod",
            )
            .await
            .unwrap();

        assert!(!row.is_read);
        let stored = h.db.list_notifications(&h.user_id.to_string(), 10).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, "member_joined");
    }

    #[tokio::test]
    async fn zero_subscriptions_means_zero_push_calls() {
        let h = harness(RecordingTransport::default());
        let row = h
            .db
            .insert_notification(
                &Uuid::new_v4().to_string(),
                &h.user_id.to_string(),
                "pod_approved",
                "Approved",
                "your pod is live",
                None,
            )
            .unwrap();

        h.notifier.deliver(&row).await;

        assert!(h.transport.calls.lock().unwrap().is_empty());
        // The socket emission still happens.
        let events = h.sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, h.user_id);
    }

    #[tokio::test]
    async fn gone_subscription_is_pruned_and_never_reattempted() {
        let transport = RecordingTransport {
            gone: HashSet::from(["https://push.example/dead".to_string()]),
            ..Default::default()
        };
        let h = harness(transport);
        subscribe(&h, "https://push.example/dead");
        subscribe(&h, "https://push.example/alive");

        let row = h
            .db
            .insert_notification(
                &Uuid::new_v4().to_string(),
                &h.user_id.to_string(),
                "message_reply",
                "Reply",
                "someone replied",
                None,
            )
            .unwrap();

        h.notifier.deliver(&row).await;

        let remaining = h
            .db
            .list_push_subscriptions(&h.user_id.to_string())
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].endpoint, "https://push.example/alive");

        h.notifier.deliver(&row).await;

        let calls = h.transport.calls.lock().unwrap();
        let dead_attempts = calls
            .iter()
            .filter(|e| e.as_str() == "https://push.example/dead")
            .count();
        assert_eq!(dead_attempts, 1);
    }

    #[tokio::test]
    async fn one_failing_endpoint_does_not_block_the_rest() {
        let transport = RecordingTransport {
            failing: HashSet::from(["https://push.example/flaky".to_string()]),
            ..Default::default()
        };
        let h = harness(transport);
        subscribe(&h, "https://push.example/flaky");
        subscribe(&h, "https://push.example/solid");

        let row = h
            .db
            .insert_notification(
                &Uuid::new_v4().to_string(),
                &h.user_id.to_string(),
                "message_reply",
                "Reply",
                "someone replied",
                None,
            )
            .unwrap();

        h.notifier.deliver(&row).await;

        let calls = h.transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&"https://push.example/solid".to_string()));

        // The failure never pruned the flaky subscription.
        let remaining = h
            .db
            .list_push_subscriptions(&h.user_id.to_string())
            .unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
