use crate::Database;
use crate::models::MessageRow;
use crate::queries::OptionalExt;
use anyhow::{Result, anyhow};
use rusqlite::Connection;

const MESSAGE_SELECT_BASE: &str = "m.id, m.room_id, m.chat_id, m.sender_id, u.username, m.content,
     m.reply_to_id, r.sender_id, ru.username, r.content, m.created_at
     FROM messages m
     LEFT JOIN users u ON m.sender_id = u.id
     LEFT JOIN messages r ON m.reply_to_id = r.id
     LEFT JOIN users ru ON r.sender_id = ru.id";

impl Database {
    pub fn insert_room_message(
        &self,
        id: &str,
        room_id: &str,
        sender_id: &str,
        content: &str,
        reply_to_id: Option<&str>,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, room_id, sender_id, content, reply_to_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, room_id, sender_id, content, reply_to_id),
            )?;
            query_message(conn, id)?.ok_or_else(|| anyhow!("inserted message {} missing", id))
        })
    }

    pub fn insert_chat_message(
        &self,
        id: &str,
        chat_id: &str,
        sender_id: &str,
        content: &str,
        reply_to_id: Option<&str>,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, sender_id, content, reply_to_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, chat_id, sender_id, content, reply_to_id),
            )?;
            query_message(conn, id)?.ok_or_else(|| anyhow!("inserted message {} missing", id))
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Page of room messages, returned oldest-first. `before` is a message id
    /// cursor: only messages strictly older (insert order breaks timestamp
    /// ties) are eligible, so concurrent inserts never shift the window.
    pub fn list_room_messages(
        &self,
        room_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| list_messages(conn, "m.room_id", room_id, limit, before))
    }

    /// Chat counterpart of `list_room_messages`.
    pub fn list_chat_messages(
        &self,
        chat_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| list_messages(conn, "m.chat_id", chat_id, limit, before))
    }

    /// Sender-only delete. Returns false when the message does not exist or
    /// belongs to someone else.
    pub fn delete_message(&self, id: &str, sender_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND sender_id = ?2",
                (id, sender_id),
            )?;
            Ok(changed > 0)
        })
    }
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {} WHERE m.id = ?1", MESSAGE_SELECT_BASE);
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt.query_row([id], map_message).optional()?;
    Ok(row)
}

fn list_messages(
    conn: &Connection,
    container_column: &str,
    container_id: &str,
    limit: u32,
    before: Option<&str>,
) -> Result<Vec<MessageRow>> {
    // Newest first for the LIMIT, reversed to ascending below. The cursor
    // compares (created_at, rowid) so two messages in the same second still
    // page in insert order.
    let sql = format!(
        "SELECT {cols}
         WHERE {container} = ?1
           AND (?2 IS NULL OR (m.created_at, m.rowid) <
                (SELECT created_at, rowid FROM messages WHERE id = ?2))
         ORDER BY m.created_at DESC, m.rowid DESC
         LIMIT ?3",
        cols = MESSAGE_SELECT_BASE,
        container = container_column,
    );
    let mut stmt = conn.prepare(&sql)?;

    let mut rows = stmt
        .query_map(rusqlite::params![container_id, before, limit], map_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.reverse();
    Ok(rows)
}

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        room_id: row.get(1)?,
        chat_id: row.get(2)?,
        sender_id: row.get(3)?,
        sender_username: row
            .get::<_, Option<String>>(4)?
            .unwrap_or_else(|| "unknown".to_string()),
        content: row.get(5)?,
        reply_to_id: row.get(6)?,
        reply_to_sender_id: row.get(7)?,
        reply_to_username: row.get(8)?,
        reply_to_content: row.get(9)?,
        created_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{db, pod, room, user};
    use uuid::Uuid;

    fn send(db: &Database, room_id: &str, sender: &str, content: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_room_message(&id, room_id, sender, content, None)
            .unwrap();
        id
    }

    #[test]
    fn pagination_window_is_newest_page_in_ascending_order() {
        let db = db();
        let owner = user(&db, "owner");
        let pod_id = pod(&db, &owner);
        let room_id = room(&db, &pod_id, "PUBLIC");

        let m1 = send(&db, &room_id, &owner, "m1");
        let m2 = send(&db, &room_id, &owner, "m2");
        let m3 = send(&db, &room_id, &owner, "m3");

        let page = db.list_room_messages(&room_id, 2, None).unwrap();
        let ids: Vec<&str> = page.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![m2.as_str(), m3.as_str()]);

        let page = db.list_room_messages(&room_id, 2, Some(&m3)).unwrap();
        let ids: Vec<&str> = page.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![m1.as_str(), m2.as_str()]);

        let page = db.list_room_messages(&room_id, 2, Some(&m1)).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn reply_preview_is_joined_in() {
        let db = db();
        let owner = user(&db, "owner");
        let pod_id = pod(&db, &owner);
        let room_id = room(&db, &pod_id, "PUBLIC");

        let original = send(&db, &room_id, &owner, "original");
        let reply_id = Uuid::new_v4().to_string();
        let reply = db
            .insert_room_message(&reply_id, &room_id, &owner, "reply", Some(&original))
            .unwrap();

        assert_eq!(reply.reply_to_id.as_deref(), Some(original.as_str()));
        assert_eq!(reply.reply_to_username.as_deref(), Some("owner"));
        assert_eq!(reply.reply_to_content.as_deref(), Some("original"));
    }

    #[test]
    fn deleting_a_quoted_message_degrades_the_preview() {
        let db = db();
        let owner = user(&db, "owner");
        let pod_id = pod(&db, &owner);
        let room_id = room(&db, &pod_id, "PUBLIC");

        let original = send(&db, &room_id, &owner, "original");
        let reply_id = Uuid::new_v4().to_string();
        db.insert_room_message(&reply_id, &room_id, &owner, "reply", Some(&original))
            .unwrap();

        assert!(db.delete_message(&original, &owner).unwrap());

        let reply = db.get_message(&reply_id).unwrap().unwrap();
        assert!(reply.reply_to_id.is_none());
    }

    #[test]
    fn delete_is_sender_only() {
        let db = db();
        let owner = user(&db, "owner");
        let other = user(&db, "other");
        let pod_id = pod(&db, &owner);
        let room_id = room(&db, &pod_id, "PUBLIC");

        let id = send(&db, &room_id, &owner, "mine");
        assert!(!db.delete_message(&id, &other).unwrap());
        assert!(db.get_message(&id).unwrap().is_some());
        assert!(db.delete_message(&id, &owner).unwrap());
    }

    #[test]
    fn room_and_chat_streams_are_isolated() {
        let db = db();
        let owner = user(&db, "owner");
        let peer = user(&db, "peer");
        let pod_id = pod(&db, &owner);
        let room_id = room(&db, &pod_id, "PUBLIC");
        let (chat_id, _) = db.get_or_create_chat(&owner, &peer).unwrap();

        send(&db, &room_id, &owner, "room message");
        db.insert_chat_message(&Uuid::new_v4().to_string(), &chat_id, &owner, "dm", None)
            .unwrap();

        assert_eq!(db.list_room_messages(&room_id, 50, None).unwrap().len(), 1);
        let dms = db.list_chat_messages(&chat_id, 50, None).unwrap();
        assert_eq!(dms.len(), 1);
        assert_eq!(dms[0].content, "dm");
    }
}
