use crate::Database;
use anyhow::{Result, bail};
use rusqlite::Connection;
use uuid::Uuid;

impl Database {
    /// Get or create the chat for an unordered pair of users.
    ///
    /// Idempotent: the same pair (in either order) always resolves to the
    /// same chat id. Returns (chat_id, created).
    pub fn get_or_create_chat(&self, user_a: &str, user_b: &str) -> Result<(String, bool)> {
        if user_a == user_b {
            bail!("a chat needs two distinct participants");
        }

        // Canonical order so lookups and logs are deterministic.
        let (first, second) = if user_a <= user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(existing) = query_chat_for_pair(&tx, first, second)? {
                return Ok((existing, false));
            }

            let chat_id = Uuid::new_v4().to_string();
            tx.execute("INSERT INTO chats (id) VALUES (?1)", [&chat_id])?;
            for user_id in [first, second] {
                tx.execute(
                    "INSERT INTO chat_participants (id, chat_id, user_id) VALUES (?1, ?2, ?3)",
                    (Uuid::new_v4().to_string(), &chat_id, user_id),
                )?;
            }

            tx.commit()?;
            Ok((chat_id, true))
        })
    }

    pub fn is_chat_participant(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
                (chat_id, user_id),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Participant user ids, or an empty vec for an unknown chat.
    pub fn get_chat_participants(&self, chat_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM chat_participants WHERE chat_id = ?1 ORDER BY user_id",
            )?;

            let rows = stmt
                .query_map([chat_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_chat_for_pair(conn: &Connection, first: &str, second: &str) -> Result<Option<String>> {
    // Every chat has exactly two participants, so a chat containing both
    // users is the pair's chat.
    let mut stmt = conn.prepare(
        "SELECT chat_id FROM chat_participants
         WHERE user_id IN (?1, ?2)
         GROUP BY chat_id
         HAVING COUNT(DISTINCT user_id) = 2
         LIMIT 1",
    )?;

    let mut rows = stmt.query((first, second))?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, user};

    #[test]
    fn get_or_create_is_idempotent_for_unordered_pair() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");

        let (chat_id, created) = db.get_or_create_chat(&a, &b).unwrap();
        assert!(created);

        let (same_id, created) = db.get_or_create_chat(&a, &b).unwrap();
        assert_eq!(same_id, chat_id);
        assert!(!created);

        // Reverse order resolves to the same chat.
        let (same_id, created) = db.get_or_create_chat(&b, &a).unwrap();
        assert_eq!(same_id, chat_id);
        assert!(!created);

        let participants = db.get_chat_participants(&chat_id).unwrap();
        assert_eq!(participants.len(), 2);
        assert!(participants.contains(&a));
        assert!(participants.contains(&b));
    }

    #[test]
    fn distinct_pairs_get_distinct_chats() {
        let db = db();
        let a = user(&db, "a");
        let b = user(&db, "b");
        let c = user(&db, "c");

        let (ab, _) = db.get_or_create_chat(&a, &b).unwrap();
        let (ac, _) = db.get_or_create_chat(&a, &c).unwrap();
        assert_ne!(ab, ac);

        assert!(db.is_chat_participant(&ab, &a).unwrap());
        assert!(db.is_chat_participant(&ab, &b).unwrap());
        assert!(!db.is_chat_participant(&ab, &c).unwrap());
    }

    #[test]
    fn self_chat_is_rejected() {
        let db = db();
        let a = user(&db, "a");

        assert!(db.get_or_create_chat(&a, &a).is_err());
    }
}
