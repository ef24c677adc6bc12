use std::collections::{HashMap, HashSet};

use anyhow::Result;
use catalog_types::models::{Role, SubscriptionSummary, User};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::attachments::attachments_by_ids;
use super::{ListQuery, fetch_in, new_id, now};
use crate::Database;
use crate::models::{USER_COLUMNS, UserRow, aliased};

pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub is_manually_created: bool,
    pub expiration_date: Option<DateTime<Utc>>,
}

/// Partial update; `None` leaves the column unchanged.
#[derive(Debug, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub avatar_id: Option<String>,
    pub first_access: Option<bool>,
    pub role: Option<Role>,
}

impl Database {
    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        self.with_conn(|conn| insert_user(conn, new))
    }

    pub fn get_user_row(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_row(conn, "id", id))
    }

    pub fn get_user_row_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_row(conn, "email", email))
    }

    /// True when another account already uses `email`.
    pub fn email_taken(&self, email: &str, except_user: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let owner: Option<String> = conn
                .query_row("SELECT id FROM users WHERE email = ?1", [email], |r| r.get(0))
                .optional()?;
            Ok(owner.is_some_and(|id| Some(id.as_str()) != except_user))
        })
    }

    /// A user with avatar, latest order status and subscription summary.
    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let Some(row) = query_user_row(conn, "id", id)? else {
                return Ok(None);
            };
            let mut users = vec![row.into_user()];
            enrich_users(conn, &mut users)?;
            Ok(users.pop())
        })
    }

    pub fn list_users(&self, query: &ListQuery<'_>, role: Option<Role>) -> Result<(Vec<User>, u64)> {
        self.with_conn(|conn| {
            let pattern = query.like_pattern();
            let role = role.map(|r| r.as_str());
            let filter = "(t.name LIKE ?1 ESCAPE '\\' OR t.email LIKE ?1 ESCAPE '\\') \
                          AND (?2 IS NULL OR t.role = ?2)";

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM users t WHERE {}", filter),
                params![pattern, role],
                |r| r.get(0),
            )?;

            let sql = format!(
                "SELECT {} FROM users t WHERE {} ORDER BY {} LIMIT ?3 OFFSET ?4",
                aliased(USER_COLUMNS, "t"),
                filter,
                query.order_by("t")
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut users = stmt
                .query_map(
                    params![pattern, role, query.page.limit() as i64, query.page.offset() as i64],
                    UserRow::from_row,
                )?
                .map(|r| r.map(UserRow::into_user))
                .collect::<rusqlite::Result<Vec<_>>>()?;

            enrich_users(conn, &mut users)?;
            Ok((users, total as u64))
        })
    }

    pub fn update_user(&self, id: &str, update: &UserUpdate) -> Result<Option<User>> {
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    name = COALESCE(?2, name),
                    email = COALESCE(?3, email),
                    password = COALESCE(?4, password),
                    avatar_id = COALESCE(?5, avatar_id),
                    first_access = COALESCE(?6, first_access),
                    role = COALESCE(?7, role),
                    updated_at = ?8
                 WHERE id = ?1",
                params![
                    id,
                    update.name,
                    update.email,
                    update.password_hash,
                    update.avatar_id,
                    update.first_access,
                    update.role.map(|r| r.as_str()),
                    now()
                ],
            )?;
            Ok(changed)
        })?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_user(id)
    }

    pub fn set_user_status(&self, id: &str, status: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status, now()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_user_password(&self, id: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, password_hash, now()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn mark_email_verified(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_email_verified = 1, updated_at = ?2 WHERE id = ?1",
                params![id, now()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Deletes the user with its favorites, tokens, stickers, orders and
    /// attachments in one transaction. Returns the object keys of the removed
    /// attachments, or `None` when the user does not exist.
    pub fn delete_user(&self, id: &str) -> Result<Option<Vec<String>>> {
        self.transaction(|tx| {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [id],
                |r| r.get(0),
            )?;
            if !exists {
                return Ok(None);
            }

            let keys = {
                let mut stmt = tx.prepare("SELECT object_key FROM attachments WHERE user_id = ?1")?;
                stmt.query_map([id], |r| r.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };

            tx.execute("DELETE FROM favorite_stickers WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM tokens WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM stickers WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM orders WHERE user_id = ?1", [id])?;
            tx.execute("UPDATE users SET avatar_id = NULL WHERE id = ?1", [id])?;
            tx.execute("DELETE FROM attachments WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM users WHERE id = ?1", [id])?;

            Ok(Some(keys))
        })
    }
}

pub(crate) fn insert_user(conn: &Connection, new: &NewUser) -> Result<User> {
    let id = new_id();
    let now = now();
    conn.execute(
        "INSERT INTO users (id, email, name, password, role, is_manually_created, expiration_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            id,
            new.email,
            new.name,
            new.password_hash,
            new.role.as_str(),
            new.is_manually_created,
            new.expiration_date,
            now
        ],
    )?;
    query_user_row(conn, "id", &id)?
        .map(UserRow::into_user)
        .ok_or_else(|| anyhow::anyhow!("User vanished after insert: {}", id))
}

/// `column` is either `id` or `email`.
pub(crate) fn query_user_row(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let row = conn.query_row(&sql, [value], UserRow::from_row).optional()?;
    Ok(row)
}

/// Fills avatar, latest order status and the subscription of the most
/// recent order that has one.
fn enrich_users(conn: &Connection, users: &mut [User]) -> Result<()> {
    if users.is_empty() {
        return Ok(());
    }

    let avatar_ids: Vec<String> = users.iter().filter_map(|u| u.avatar_id.clone()).collect();
    let mut avatars = attachments_by_ids(conn, &avatar_ids)?;

    let user_ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();
    let rows = fetch_in(
        conn,
        "SELECT o.user_id, o.order_status, s.status, s.start_date, s.next_payment, p.name, p.frequency
         FROM orders o
         LEFT JOIN subscriptions s ON s.id = o.subscription_id
         LEFT JOIN plans p ON p.id = s.plan_id
         WHERE o.user_id IN ({})
         ORDER BY o.created_at DESC",
        &user_ids,
        |r| {
            let status: Option<String> = r.get(2)?;
            let summary = match status {
                Some(status) => Some(SubscriptionSummary {
                    status,
                    start_date: r.get(3)?,
                    next_payment: r.get(4)?,
                    plan_name: r.get(5)?,
                    frequency: r.get(6)?,
                }),
                None => None,
            };
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, summary))
        },
    )?;

    let mut order_status: HashMap<String, String> = HashMap::new();
    let mut subscriptions: HashMap<String, SubscriptionSummary> = HashMap::new();
    let mut seen: HashSet<String> = HashSet::new();
    for (user_id, status, summary) in rows {
        if seen.insert(user_id.clone()) {
            order_status.insert(user_id.clone(), status);
        }
        if let Some(summary) = summary {
            subscriptions.entry(user_id).or_insert(summary);
        }
    }

    for user in users.iter_mut() {
        user.avatar = user.avatar_id.as_ref().and_then(|id| avatars.remove(id));
        user.order_status = order_status.remove(&user.id);
        user.subscription = subscriptions.remove(&user.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;
    use catalog_types::pagination::{PageRequest, SortOrder};

    #[test]
    fn create_and_fetch_user() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "ana@example.com");
        assert_eq!(user.role, Role::User);
        assert!(user.status);
        assert!(user.first_access);

        let row = db.get_user_row_by_email("ana@example.com").unwrap().unwrap();
        assert_eq!(row.id, user.id);
        assert_eq!(row.password, "hash");
        assert!(db.get_user_row_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_violates_constraint() {
        let db = fixtures::db();
        fixtures::user(&db, "ana@example.com");
        let err = db
            .create_user(&NewUser {
                email: "ana@example.com".into(),
                name: None,
                password_hash: "x".into(),
                role: Role::User,
                is_manually_created: false,
                expiration_date: None,
            })
            .unwrap_err();
        assert!(err.downcast_ref::<rusqlite::Error>().is_some());
    }

    #[test]
    fn email_taken_ignores_own_account() {
        let db = fixtures::db();
        let ana = fixtures::user(&db, "ana@example.com");
        assert!(db.email_taken("ana@example.com", None).unwrap());
        assert!(!db.email_taken("ana@example.com", Some(&ana.id)).unwrap());
        assert!(!db.email_taken("bia@example.com", None).unwrap());
    }

    #[test]
    fn list_filters_by_search_and_role() {
        let db = fixtures::db();
        fixtures::user(&db, "ana@example.com");
        fixtures::user(&db, "bia@example.com");
        let admin = fixtures::user(&db, "root@corp.com");
        db.update_user(
            &admin.id,
            &UserUpdate {
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .unwrap();

        let query = ListQuery {
            search: "example",
            ..Default::default()
        };
        let (users, total) = db.list_users(&query, None).unwrap();
        assert_eq!(total, 2);
        assert_eq!(users.len(), 2);

        let (admins, total) = db.list_users(&ListQuery::default(), Some(Role::Admin)).unwrap();
        assert_eq!(total, 1);
        assert_eq!(admins[0].email, "root@corp.com");
    }

    #[test]
    fn list_pages_and_sorts() {
        let db = fixtures::db();
        for email in ["c@x.com", "a@x.com", "b@x.com"] {
            fixtures::user(&db, email);
        }
        let query = ListQuery {
            page: PageRequest::new(2, 2),
            sort_column: "email",
            order: SortOrder::Asc,
            ..Default::default()
        };
        let (users, total) = db.list_users(&query, None).unwrap();
        assert_eq!(total, 3);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "c@x.com");
    }

    #[test]
    fn update_is_partial() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "ana@example.com");
        let updated = db
            .update_user(
                &user.id,
                &UserUpdate {
                    name: Some("Ana".into()),
                    first_access: Some(false),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("Ana"));
        assert!(!updated.first_access);
        assert_eq!(updated.email, "ana@example.com");

        assert!(db.update_user("missing", &UserUpdate::default()).unwrap().is_none());
    }

    #[test]
    fn status_and_verification_flags() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "ana@example.com");
        assert!(db.set_user_status(&user.id, false).unwrap());
        assert!(db.mark_email_verified(&user.id).unwrap());
        let row = db.get_user_row(&user.id).unwrap().unwrap();
        assert!(!row.status);
        assert!(row.is_email_verified);
        assert!(!db.set_user_status("missing", true).unwrap());
    }

    #[test]
    fn delete_cascades_owned_rows() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "ana@example.com");
        let attachment = fixtures::attachment(&db, Some(&user.id), "owned.png");
        db.update_user(
            &user.id,
            &UserUpdate {
                avatar_id: Some(attachment.id.clone()),
                ..Default::default()
            },
        )
        .unwrap();

        let keys = db.delete_user(&user.id).unwrap().unwrap();
        assert_eq!(keys, vec!["owned.png".to_string()]);
        assert!(db.get_user_row(&user.id).unwrap().is_none());
        assert!(db.get_attachment(&attachment.id).unwrap().is_none());
        assert!(db.delete_user(&user.id).unwrap().is_none());
    }
}
