use crate::Database;
use crate::models::{JoinOutcome, JoinRequestRow, ResolveOutcome, RoomRow};
use crate::queries::OptionalExt;
use crate::queries::pods::exists_pod_member;
use anyhow::Result;
use arbor_types::models::{JoinRequestStatus, RoomPrivacy};
use rusqlite::Connection;
use uuid::Uuid;

impl Database {
    pub fn create_room(
        &self,
        id: &str,
        pod_id: &str,
        name: &str,
        kind: &str,
        privacy: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rooms (id, pod_id, name, kind, privacy) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, pod_id, name, kind, privacy),
            )?;
            Ok(())
        })
    }

    pub fn get_room(&self, id: &str) -> Result<Option<RoomRow>> {
        self.with_conn(|conn| query_room(conn, id))
    }

    /// Returns false if the user was already a room member.
    pub fn add_room_member(&self, id: &str, room_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| insert_room_member(conn, id, room_id, user_id))
    }

    pub fn is_room_member(&self, room_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| exists_room_member(conn, room_id, user_id))
    }

    /// May `user_id` read (and write to) this room?
    ///
    /// Returns `None` when the room does not exist. Pod owner and co-owners
    /// always have access; otherwise a PUBLIC room needs pod membership and a
    /// PRIVATE room needs room membership.
    pub fn room_access(&self, room_id: &str, user_id: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            let Some(room) = query_room(conn, room_id)? else {
                return Ok(None);
            };

            if query_owner_or_co_owner(conn, &room.pod_id, user_id)? {
                return Ok(Some(true));
            }
            if exists_room_member(conn, room_id, user_id)? {
                return Ok(Some(true));
            }
            if room.privacy == RoomPrivacy::Public.as_str() {
                return Ok(Some(exists_pod_member(conn, &room.pod_id, user_id)?));
            }
            Ok(Some(false))
        })
    }

    pub fn get_join_request(&self, room_id: &str, user_id: &str) -> Result<Option<JoinRequestRow>> {
        self.with_conn(|conn| query_join_request(conn, room_id, user_id))
    }

    /// Run the join-request state machine for one (room, user) pair.
    ///
    /// PUBLIC rooms skip the request entirely: membership is immediate.
    /// PRIVATE rooms create a PENDING request, reset a REJECTED one back to
    /// PENDING (same row), and refuse duplicates. Returns `None` when the
    /// room does not exist.
    pub fn request_join(&self, room_id: &str, user_id: &str) -> Result<Option<JoinOutcome>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(room) = query_room(&tx, room_id)? else {
                return Ok(None);
            };

            if room.privacy == RoomPrivacy::Public.as_str() {
                insert_room_member(&tx, &Uuid::new_v4().to_string(), room_id, user_id)?;
                tx.commit()?;
                return Ok(Some(JoinOutcome::JoinedPublic));
            }

            if exists_room_member(&tx, room_id, user_id)? {
                return Ok(Some(JoinOutcome::AlreadyMember));
            }

            let outcome = match query_join_request(&tx, room_id, user_id)? {
                None => {
                    tx.execute(
                        "INSERT INTO room_join_requests (id, room_id, user_id) VALUES (?1, ?2, ?3)",
                        (Uuid::new_v4().to_string(), room_id, user_id),
                    )?;
                    JoinOutcome::Pending
                }
                Some(req) => match JoinRequestStatus::parse(&req.status) {
                    Some(JoinRequestStatus::Pending) => JoinOutcome::AlreadyPending,
                    Some(JoinRequestStatus::Accepted) => JoinOutcome::AlreadyAccepted,
                    // REJECTED: resubmission reuses the existing row
                    _ => {
                        tx.execute(
                            "UPDATE room_join_requests
                             SET status = 'PENDING', updated_at = datetime('now')
                             WHERE id = ?1",
                            [&req.id],
                        )?;
                        JoinOutcome::Resubmitted
                    }
                },
            };

            tx.commit()?;
            Ok(Some(outcome))
        })
    }

    /// Owner decision on a PENDING request. Accepting also creates the
    /// RoomMember row (idempotent).
    pub fn resolve_join_request(
        &self,
        room_id: &str,
        user_id: &str,
        accept: bool,
    ) -> Result<ResolveOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(req) = query_join_request(&tx, room_id, user_id)? else {
                return Ok(ResolveOutcome::NotFound);
            };
            if JoinRequestStatus::parse(&req.status) != Some(JoinRequestStatus::Pending) {
                return Ok(ResolveOutcome::NotPending);
            }

            let status = if accept {
                JoinRequestStatus::Accepted
            } else {
                JoinRequestStatus::Rejected
            };
            tx.execute(
                "UPDATE room_join_requests
                 SET status = ?2, updated_at = datetime('now')
                 WHERE id = ?1",
                (&req.id, status.as_str()),
            )?;

            if accept {
                insert_room_member(&tx, &Uuid::new_v4().to_string(), room_id, user_id)?;
            }

            tx.commit()?;
            Ok(if accept {
                ResolveOutcome::Accepted
            } else {
                ResolveOutcome::Rejected
            })
        })
    }

    pub fn list_pending_join_requests(&self, room_id: &str) -> Result<Vec<JoinRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.room_id, r.user_id, u.username, r.status, r.created_at
                 FROM room_join_requests r
                 LEFT JOIN users u ON r.user_id = u.id
                 WHERE r.room_id = ?1 AND r.status = 'PENDING'
                 ORDER BY r.created_at ASC",
            )?;

            let rows = stmt
                .query_map([room_id], map_join_request)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_room(conn: &Connection, id: &str) -> Result<Option<RoomRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, pod_id, name, kind, privacy, created_at FROM rooms WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(RoomRow {
                id: row.get(0)?,
                pod_id: row.get(1)?,
                name: row.get(2)?,
                kind: row.get(3)?,
                privacy: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_owner_or_co_owner(conn: &Connection, pod_id: &str, user_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pods p
         LEFT JOIN pod_members m ON m.pod_id = p.id AND m.user_id = ?2
         WHERE p.id = ?1 AND (p.owner_id = ?2 OR m.is_co_owner = 1)",
        (pod_id, user_id),
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn insert_room_member(conn: &Connection, id: &str, room_id: &str, user_id: &str) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO room_members (id, room_id, user_id) VALUES (?1, ?2, ?3)",
        (id, room_id, user_id),
    )?;
    Ok(changed > 0)
}

fn exists_room_member(conn: &Connection, room_id: &str, user_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM room_members WHERE room_id = ?1 AND user_id = ?2",
        (room_id, user_id),
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn query_join_request(
    conn: &Connection,
    room_id: &str,
    user_id: &str,
) -> Result<Option<JoinRequestRow>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.room_id, r.user_id, u.username, r.status, r.created_at
         FROM room_join_requests r
         LEFT JOIN users u ON r.user_id = u.id
         WHERE r.room_id = ?1 AND r.user_id = ?2",
    )?;

    let row = stmt
        .query_row((room_id, user_id), map_join_request)
        .optional()?;

    Ok(row)
}

fn map_join_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<JoinRequestRow> {
    Ok(JoinRequestRow {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
        status: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{db, pod, room, user};

    #[test]
    fn public_room_join_is_immediate_membership() {
        let db = db();
        let owner = user(&db, "owner");
        let member = user(&db, "member");
        let pod_id = pod(&db, &owner);
        let room_id = room(&db, &pod_id, "PUBLIC");

        let outcome = db.request_join(&room_id, &member).unwrap().unwrap();
        assert_eq!(outcome, JoinOutcome::JoinedPublic);
        assert!(db.is_room_member(&room_id, &member).unwrap());
        assert!(db.get_join_request(&room_id, &member).unwrap().is_none());
    }

    #[test]
    fn private_room_join_creates_single_pending_request() {
        let db = db();
        let owner = user(&db, "owner");
        let member = user(&db, "member");
        let pod_id = pod(&db, &owner);
        let room_id = room(&db, &pod_id, "PRIVATE");

        let outcome = db.request_join(&room_id, &member).unwrap().unwrap();
        assert_eq!(outcome, JoinOutcome::Pending);
        assert!(!db.is_room_member(&room_id, &member).unwrap());

        // A second request while PENDING is refused and adds no row.
        let outcome = db.request_join(&room_id, &member).unwrap().unwrap();
        assert_eq!(outcome, JoinOutcome::AlreadyPending);
        assert_eq!(request_count(&db, &room_id, &member), 1);
    }

    #[test]
    fn rejected_request_is_reset_in_place_on_resubmit() {
        let db = db();
        let owner = user(&db, "owner");
        let member = user(&db, "member");
        let pod_id = pod(&db, &owner);
        let room_id = room(&db, &pod_id, "PRIVATE");

        db.request_join(&room_id, &member).unwrap();
        let first_id = db.get_join_request(&room_id, &member).unwrap().unwrap().id;

        let outcome = db.resolve_join_request(&room_id, &member, false).unwrap();
        assert_eq!(outcome, ResolveOutcome::Rejected);

        let outcome = db.request_join(&room_id, &member).unwrap().unwrap();
        assert_eq!(outcome, JoinOutcome::Resubmitted);

        let req = db.get_join_request(&room_id, &member).unwrap().unwrap();
        assert_eq!(req.id, first_id);
        assert_eq!(req.status, "PENDING");
        assert_eq!(request_count(&db, &room_id, &member), 1);
    }

    #[test]
    fn accept_creates_membership_and_blocks_rerequest() {
        let db = db();
        let owner = user(&db, "owner");
        let member = user(&db, "member");
        let pod_id = pod(&db, &owner);
        let room_id = room(&db, &pod_id, "PRIVATE");

        db.request_join(&room_id, &member).unwrap();
        let outcome = db.resolve_join_request(&room_id, &member, true).unwrap();
        assert_eq!(outcome, ResolveOutcome::Accepted);
        assert!(db.is_room_member(&room_id, &member).unwrap());

        let outcome = db.request_join(&room_id, &member).unwrap().unwrap();
        assert_eq!(outcome, JoinOutcome::AlreadyMember);

        // Deciding an already-decided request is refused.
        let outcome = db.resolve_join_request(&room_id, &member, true).unwrap();
        assert_eq!(outcome, ResolveOutcome::NotPending);
    }

    #[test]
    fn access_rules_by_privacy() {
        let db = db();
        let owner = user(&db, "owner");
        let member = user(&db, "member");
        let outsider = user(&db, "outsider");
        let pod_id = pod(&db, &owner);
        db.add_pod_member(&uuid::Uuid::new_v4().to_string(), &pod_id, &member)
            .unwrap();

        let public_id = room(&db, &pod_id, "PUBLIC");
        let private_id = room(&db, &pod_id, "PRIVATE");

        assert_eq!(db.room_access(&public_id, &member).unwrap(), Some(true));
        assert_eq!(db.room_access(&public_id, &outsider).unwrap(), Some(false));

        // Pod membership alone is not enough for a private room
        assert_eq!(db.room_access(&private_id, &member).unwrap(), Some(false));
        assert_eq!(db.room_access(&private_id, &owner).unwrap(), Some(true));

        db.request_join(&private_id, &member).unwrap();
        db.resolve_join_request(&private_id, &member, true).unwrap();
        assert_eq!(db.room_access(&private_id, &member).unwrap(), Some(true));

        assert_eq!(db.room_access("missing", &member).unwrap(), None);
    }

    fn request_count(db: &Database, room_id: &str, user_id: &str) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM room_join_requests WHERE room_id = ?1 AND user_id = ?2",
                (room_id, user_id),
                |row| row.get(0),
            )?)
        })
        .unwrap()
    }
}
