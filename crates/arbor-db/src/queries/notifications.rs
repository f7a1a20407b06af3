use crate::Database;
use crate::models::NotificationRow;
use crate::queries::OptionalExt;
use anyhow::{Result, anyhow};
use rusqlite::Connection;

impl Database {
    pub fn insert_notification(
        &self,
        id: &str,
        user_id: &str,
        kind: &str,
        title: &str,
        body: &str,
        linked_id: Option<&str>,
    ) -> Result<NotificationRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, kind, title, body, linked_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (id, user_id, kind, title, body, linked_id),
            )?;
            query_notification(conn, id)?
                .ok_or_else(|| anyhow!("inserted notification {} missing", id))
        })
    }

    /// Newest first.
    pub fn list_notifications(&self, user_id: &str, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, title, body, linked_id, is_read, created_at
                 FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], map_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Owner-scoped mark-read. Read state only moves false -> true; marking
    /// an already-read notification is a no-op. Returns false when the row
    /// does not exist or belongs to someone else.
    pub fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    /// Bulk counterpart of `mark_notification_read`. Returns rows updated.
    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id],
            )?;
            Ok(changed)
        })
    }

    pub fn delete_notification(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn unread_notification_count(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

fn query_notification(conn: &Connection, id: &str) -> Result<Option<NotificationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, title, body, linked_id, is_read, created_at
         FROM notifications WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], map_notification).optional()?;
    Ok(row)
}

fn map_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        linked_id: row.get(5)?,
        is_read: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, user};
    use uuid::Uuid;

    #[test]
    fn insert_starts_unread() {
        let db = db();
        let uid = user(&db, "ada");
        let id = Uuid::new_v4().to_string();

        let row = db
            .insert_notification(&id, &uid, "member_joined", "New member", "bob joined", None)
            .unwrap();
        assert!(!row.is_read);
        assert_eq!(db.unread_notification_count(&uid).unwrap(), 1);
    }

    #[test]
    fn mark_read_is_owner_scoped_and_one_way() {
        let db = db();
        let owner = user(&db, "owner");
        let other = user(&db, "other");
        let id = Uuid::new_v4().to_string();
        db.insert_notification(&id, &owner, "pod_approved", "Approved", "your pod", None)
            .unwrap();

        assert!(!db.mark_notification_read(&id, &other).unwrap());
        assert_eq!(db.unread_notification_count(&owner).unwrap(), 1);

        assert!(db.mark_notification_read(&id, &owner).unwrap());
        assert_eq!(db.unread_notification_count(&owner).unwrap(), 0);

        // Marking again stays read and is still reported as owned.
        assert!(db.mark_notification_read(&id, &owner).unwrap());
        let rows = db.list_notifications(&owner, 10).unwrap();
        assert!(rows[0].is_read);
    }

    #[test]
    fn mark_all_and_delete_are_owner_scoped() {
        let db = db();
        let owner = user(&db, "owner");
        let other = user(&db, "other");
        for _ in 0..3 {
            db.insert_notification(
                &Uuid::new_v4().to_string(),
                &owner,
                "message_reply",
                "Reply",
                "someone replied",
                None,
            )
            .unwrap();
        }
        let foreign = Uuid::new_v4().to_string();
        db.insert_notification(&foreign, &other, "message_reply", "Reply", "x", None)
            .unwrap();

        assert_eq!(db.mark_all_notifications_read(&owner).unwrap(), 3);
        assert_eq!(db.unread_notification_count(&other).unwrap(), 1);

        assert!(!db.delete_notification(&foreign, &owner).unwrap());
        assert!(db.delete_notification(&foreign, &other).unwrap());
    }
}
