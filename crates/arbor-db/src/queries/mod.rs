mod chats;
mod messages;
mod notifications;
mod pods;
mod push;
mod rooms;
mod users;

use anyhow::Result;

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::Database;
    use uuid::Uuid;

    pub fn db() -> Database {
        Database::open_in_memory().expect("in-memory db")
    }

    pub fn user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(&id, username).expect("create user");
        id
    }

    pub fn pod(db: &Database, owner_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_pod(&id, "test pod", owner_id).expect("create pod");
        db.approve_pod(&id).expect("approve pod");
        id
    }

    pub fn room(db: &Database, pod_id: &str, privacy: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_room(&id, pod_id, "test room", "GENERAL", privacy)
            .expect("create room");
        id
    }
}
