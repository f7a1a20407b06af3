use crate::Database;
use crate::models::PushSubscriptionRow;
use anyhow::Result;

impl Database {
    /// Register a device. The endpoint is the natural key: re-registering an
    /// existing endpoint refreshes its keys (and owner) instead of duplicating.
    pub fn upsert_push_subscription(
        &self,
        id: &str,
        user_id: &str,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<PushSubscriptionRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(endpoint) DO UPDATE SET
                     user_id = excluded.user_id,
                     p256dh = excluded.p256dh,
                     auth = excluded.auth",
                (id, user_id, endpoint, p256dh, auth),
            )?;

            let mut stmt = conn.prepare(
                "SELECT id, user_id, endpoint, p256dh, auth, created_at
                 FROM push_subscriptions WHERE endpoint = ?1",
            )?;
            let row = stmt.query_row([endpoint], map_subscription)?;
            Ok(row)
        })
    }

    pub fn list_push_subscriptions(&self, user_id: &str) -> Result<Vec<PushSubscriptionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, endpoint, p256dh, auth, created_at
                 FROM push_subscriptions WHERE user_id = ?1
                 ORDER BY created_at ASC",
            )?;

            let rows = stmt
                .query_map([user_id], map_subscription)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Prune a subscription the push provider reported as gone.
    pub fn delete_push_subscription_by_endpoint(&self, endpoint: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM push_subscriptions WHERE endpoint = ?1",
                [endpoint],
            )?;
            Ok(changed > 0)
        })
    }

    /// Owner-initiated unsubscribe.
    pub fn delete_push_subscription(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM push_subscriptions WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok(changed > 0)
        })
    }
}

fn map_subscription(row: &rusqlite::Row<'_>) -> rusqlite::Result<PushSubscriptionRow> {
    Ok(PushSubscriptionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        endpoint: row.get(2)?,
        p256dh: row.get(3)?,
        auth: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, user};
    use uuid::Uuid;

    #[test]
    fn endpoint_upsert_does_not_duplicate() {
        let db = db();
        let uid = user(&db, "ada");

        let first = db
            .upsert_push_subscription(
                &Uuid::new_v4().to_string(),
                &uid,
                "https://push.example/abc",
                "key1",
                "auth1",
            )
            .unwrap();

        let second = db
            .upsert_push_subscription(
                &Uuid::new_v4().to_string(),
                &uid,
                "https://push.example/abc",
                "key2",
                "auth2",
            )
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.p256dh, "key2");
        assert_eq!(db.list_push_subscriptions(&uid).unwrap().len(), 1);
    }

    #[test]
    fn multi_device_and_pruning() {
        let db = db();
        let uid = user(&db, "ada");

        for i in 0..3 {
            db.upsert_push_subscription(
                &Uuid::new_v4().to_string(),
                &uid,
                &format!("https://push.example/{i}"),
                "key",
                "auth",
            )
            .unwrap();
        }
        assert_eq!(db.list_push_subscriptions(&uid).unwrap().len(), 3);

        assert!(
            db.delete_push_subscription_by_endpoint("https://push.example/1")
                .unwrap()
        );
        assert!(
            !db.delete_push_subscription_by_endpoint("https://push.example/1")
                .unwrap()
        );

        let remaining = db.list_push_subscriptions(&uid).unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|s| s.endpoint != "https://push.example/1"));
    }
}
