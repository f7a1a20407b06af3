use crate::Database;
use crate::models::UserRow;
use crate::queries::OptionalExt;
use anyhow::{Result, anyhow};
use rusqlite::Connection;

impl Database {
    pub fn create_user(&self, id: &str, username: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username) VALUES (?1, ?2)",
                (id, username),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_username_by_id(&self, id: &str) -> Result<String> {
        self.with_conn(|conn| {
            conn.query_row("SELECT username FROM users WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .map_err(|_| anyhow!("User not found: {}", id))
        })
    }
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT id, username, created_at FROM users WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                created_at: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, user};

    #[test]
    fn duplicate_username_is_rejected() {
        let db = db();
        user(&db, "ada");

        let result = db.create_user("other-id", "ada");
        assert!(result.is_err());
    }

    #[test]
    fn lookup_by_id() {
        let db = db();
        let id = user(&db, "ada");

        let row = db.get_user_by_id(&id).unwrap().unwrap();
        assert_eq!(row.username, "ada");
        assert_eq!(db.get_username_by_id(&id).unwrap(), "ada");
        assert!(db.get_user_by_id("missing").unwrap().is_none());
    }
}
