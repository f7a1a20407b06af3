use crate::Database;
use crate::models::{PodMemberRow, PodRow};
use crate::queries::OptionalExt;
use anyhow::{Result, bail};
use rusqlite::Connection;
use uuid::Uuid;

impl Database {
    /// Create a pod. The owner is inserted as its first member in the same
    /// transaction.
    pub fn create_pod(&self, id: &str, name: &str, owner_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO pods (id, name, owner_id) VALUES (?1, ?2, ?3)",
                (id, name, owner_id),
            )?;
            tx.execute(
                "INSERT INTO pod_members (id, pod_id, user_id) VALUES (?1, ?2, ?3)",
                (Uuid::new_v4().to_string(), id, owner_id),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_pod(&self, id: &str) -> Result<Option<PodRow>> {
        self.with_conn(|conn| query_pod(conn, id))
    }

    pub fn approve_pod(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE pods SET is_approved = 1 WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    /// Returns false if the user was already a member.
    pub fn add_pod_member(&self, id: &str, pod_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO pod_members (id, pod_id, user_id) VALUES (?1, ?2, ?3)",
                (id, pod_id, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn remove_pod_member(&self, pod_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM pod_members WHERE pod_id = ?1 AND user_id = ?2",
                (pod_id, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_pod_member(&self, pod_id: &str, user_id: &str) -> Result<Option<PodMemberRow>> {
        self.with_conn(|conn| query_pod_member(conn, pod_id, user_id))
    }

    pub fn is_pod_member(&self, pod_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| exists_pod_member(conn, pod_id, user_id))
    }

    pub fn is_pod_owner(&self, pod_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM pods WHERE id = ?1 AND owner_id = ?2",
                (pod_id, user_id),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn is_owner_or_co_owner(&self, pod_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM pods p
                 LEFT JOIN pod_members m ON m.pod_id = p.id AND m.user_id = ?2
                 WHERE p.id = ?1 AND (p.owner_id = ?2 OR m.is_co_owner = 1)",
                (pod_id, user_id),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Set or clear the co-owner flag. Refuses to promote a team member;
    /// demote first.
    pub fn set_co_owner(&self, pod_id: &str, user_id: &str, value: bool) -> Result<()> {
        self.with_conn(|conn| {
            let member = query_pod_member(conn, pod_id, user_id)?;
            let Some(member) = member else {
                bail!("not a member of pod {}", pod_id);
            };
            if value && member.is_team_member {
                bail!("member is a team member; co-owner and team-member flags are exclusive");
            }
            conn.execute(
                "UPDATE pod_members SET is_co_owner = ?3 WHERE pod_id = ?1 AND user_id = ?2",
                (pod_id, user_id, value as i64),
            )?;
            Ok(())
        })
    }

    /// Set or clear the team-member flag. Refuses to assign it to a co-owner;
    /// demote first.
    pub fn set_team_member(&self, pod_id: &str, user_id: &str, value: bool) -> Result<()> {
        self.with_conn(|conn| {
            let member = query_pod_member(conn, pod_id, user_id)?;
            let Some(member) = member else {
                bail!("not a member of pod {}", pod_id);
            };
            if value && member.is_co_owner {
                bail!("member is a co-owner; co-owner and team-member flags are exclusive");
            }
            conn.execute(
                "UPDATE pod_members SET is_team_member = ?3 WHERE pod_id = ?1 AND user_id = ?2",
                (pod_id, user_id, value as i64),
            )?;
            Ok(())
        })
    }
}

fn query_pod(conn: &Connection, id: &str) -> Result<Option<PodRow>> {
    let mut stmt = conn
        .prepare("SELECT id, name, owner_id, is_approved, created_at FROM pods WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(PodRow {
                id: row.get(0)?,
                name: row.get(1)?,
                owner_id: row.get(2)?,
                is_approved: row.get::<_, i64>(3)? != 0,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_pod_member(conn: &Connection, pod_id: &str, user_id: &str) -> Result<Option<PodMemberRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, pod_id, user_id, is_co_owner, is_team_member, created_at
         FROM pod_members WHERE pod_id = ?1 AND user_id = ?2",
    )?;

    let row = stmt
        .query_row((pod_id, user_id), |row| {
            Ok(PodMemberRow {
                id: row.get(0)?,
                pod_id: row.get(1)?,
                user_id: row.get(2)?,
                is_co_owner: row.get::<_, i64>(3)? != 0,
                is_team_member: row.get::<_, i64>(4)? != 0,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

pub(crate) fn exists_pod_member(conn: &Connection, pod_id: &str, user_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pod_members WHERE pod_id = ?1 AND user_id = ?2",
        (pod_id, user_id),
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, pod, user};
    use uuid::Uuid;

    #[test]
    fn owner_becomes_first_member() {
        let db = db();
        let owner = user(&db, "owner");
        let pod_id = pod(&db, &owner);

        assert!(db.is_pod_member(&pod_id, &owner).unwrap());
        assert!(db.is_pod_owner(&pod_id, &owner).unwrap());
        assert!(db.is_owner_or_co_owner(&pod_id, &owner).unwrap());
    }

    #[test]
    fn join_is_idempotent_on_membership() {
        let db = db();
        let owner = user(&db, "owner");
        let member = user(&db, "member");
        let pod_id = pod(&db, &owner);

        let added = db
            .add_pod_member(&Uuid::new_v4().to_string(), &pod_id, &member)
            .unwrap();
        assert!(added);

        let added_again = db
            .add_pod_member(&Uuid::new_v4().to_string(), &pod_id, &member)
            .unwrap();
        assert!(!added_again);
    }

    #[test]
    fn co_owner_and_team_member_are_exclusive_both_ways() {
        let db = db();
        let owner = user(&db, "owner");
        let member = user(&db, "member");
        let pod_id = pod(&db, &owner);
        db.add_pod_member(&Uuid::new_v4().to_string(), &pod_id, &member)
            .unwrap();

        db.set_team_member(&pod_id, &member, true).unwrap();
        assert!(db.set_co_owner(&pod_id, &member, true).is_err());

        db.set_team_member(&pod_id, &member, false).unwrap();
        db.set_co_owner(&pod_id, &member, true).unwrap();
        assert!(db.set_team_member(&pod_id, &member, true).is_err());

        assert!(db.is_owner_or_co_owner(&pod_id, &member).unwrap());
    }

    #[test]
    fn role_change_requires_membership() {
        let db = db();
        let owner = user(&db, "owner");
        let stranger = user(&db, "stranger");
        let pod_id = pod(&db, &owner);

        assert!(db.set_co_owner(&pod_id, &stranger, true).is_err());
    }
}
