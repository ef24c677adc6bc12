mod assets;
mod attachments;
mod catalog;
mod favorites;
mod orders;
mod search;
mod stickers;
mod tokens;
mod users;

pub use assets::{AssetUpdate, NewAsset};
pub use attachments::NewAttachment;
pub use orders::OrderIngest;
pub use search::SearchResults;
pub use stickers::{NewSticker, StickerScope, StickerUpdate};
pub use tokens::hash_token;
pub use users::{NewUser, UserUpdate};

use anyhow::Result;
use catalog_types::pagination::{PageQuery, PageRequest, SortOrder};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params_from_iter};

/// Sort keys accepted by user listings, mapped to columns.
pub const USER_SORTS: &[(&str, &str)] = &[
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
    ("name", "name"),
    ("email", "email"),
];

/// Sort keys for categories, subniches, fonts, icons and tutorials.
pub const CATALOG_SORTS: &[(&str, &str)] = &[
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
    ("name", "name"),
    ("displayOrder", "display_order"),
];

pub const STICKER_SORTS: &[(&str, &str)] = &[
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
    ("name", "name"),
];

/// `category` sorts subniches by their category's name.
pub const SEARCH_SORTS: &[(&str, &str)] = &[
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
    ("name", "name"),
    ("category", "category"),
];

pub fn resolve_sort(field: &str, allowed: &[(&str, &'static str)]) -> Option<&'static str> {
    allowed
        .iter()
        .find(|(key, _)| *key == field)
        .map(|(_, column)| *column)
}

/// Validated listing parameters. `sort_column` always comes from a whitelist,
/// so it is safe to splice into SQL.
#[derive(Debug, Clone)]
pub struct ListQuery<'a> {
    pub search: &'a str,
    pub page: PageRequest,
    pub sort_column: &'static str,
    pub order: SortOrder,
    pub important_first: bool,
}

impl<'a> ListQuery<'a> {
    pub fn from_page_query(
        query: &'a PageQuery,
        allowed: &[(&str, &'static str)],
    ) -> Result<Self, String> {
        let field = query.sort_field();
        let sort_column =
            resolve_sort(field, allowed).ok_or_else(|| format!("Invalid sortField: {}", field))?;
        Ok(Self {
            search: query.search_term(),
            page: query.page_request(),
            sort_column,
            order: query.sort_order(),
            important_first: query.important_first(),
        })
    }

    /// `ORDER BY` body for a table aliased as `alias`. Rows without a display
    /// order sort after the ordered ones.
    pub fn order_by(&self, alias: &str) -> String {
        let primary = format!("{}.{} {}", alias, self.sort_column, self.order.as_sql());
        self.order_with(alias, &primary)
    }

    /// Like `order_by`, with a caller-built primary sort.
    pub fn order_with(&self, alias: &str, primary: &str) -> String {
        if self.important_first {
            format!(
                "{a}.is_important DESC, {a}.display_order IS NULL, {a}.display_order ASC, {p}, {a}.id",
                a = alias,
                p = primary
            )
        } else {
            format!("{}, {}.id", primary, alias)
        }
    }

    pub fn like_pattern(&self) -> String {
        like_pattern(self.search)
    }
}

impl Default for ListQuery<'_> {
    fn default() -> Self {
        Self {
            search: "",
            page: PageRequest::default(),
            sort_column: "created_at",
            order: SortOrder::Desc,
            important_first: false,
        }
    }
}

/// `%term%` with LIKE wildcards escaped; pair with `ESCAPE '\'`.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

pub(crate) fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Runs `SELECT ... WHERE <key> IN (<ids>)`; `sql` must contain one `{}`
/// where the placeholder list goes.
pub(crate) fn fetch_in<T, F>(conn: &Connection, sql: &str, ids: &[String], map: F) -> Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let sql = sql.replacen("{}", &placeholders(ids.len()), 1);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), map)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

pub(crate) fn count(conn: &Connection, table: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    let total: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
    Ok(total as u64)
}

/// Sets the important flag. Either way the display order is cleared.
pub(crate) fn set_importance(conn: &Connection, table: &str, id: &str, important: bool) -> Result<bool> {
    let sql = format!(
        "UPDATE {} SET is_important = ?2, display_order = NULL, updated_at = ?3 WHERE id = ?1",
        table
    );
    let changed = conn.execute(&sql, rusqlite::params![id, important, now()])?;
    Ok(changed > 0)
}

pub(crate) fn set_display_order(conn: &Connection, table: &str, id: &str, order: i64) -> Result<bool> {
    let sql = format!(
        "UPDATE {} SET display_order = ?2, updated_at = ?3 WHERE id = ?1",
        table
    );
    let changed = conn.execute(&sql, rusqlite::params![id, order, now()])?;
    Ok(changed > 0)
}

pub(crate) fn delete_by_id(conn: &Connection, table: &str, id: &str) -> Result<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", table);
    Ok(conn.execute(&sql, [id])? > 0)
}

/// Test fixtures shared by the query modules.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::Database;
    use catalog_types::models::{Attachment, Role, User};

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn user(db: &Database, email: &str) -> User {
        db.create_user(&NewUser {
            email: email.into(),
            name: Some("Test".into()),
            password_hash: "hash".into(),
            role: Role::User,
            is_manually_created: false,
            expiration_date: None,
        })
        .unwrap()
    }

    pub fn attachment(db: &Database, owner: Option<&str>, key: &str) -> Attachment {
        db.insert_attachment(&NewAttachment {
            filename: format!("{}.png", key),
            filetype: "image/png".into(),
            filesize: 10,
            url: format!("http://localhost/public/catalog/{}", key),
            object_key: key.into(),
            user_id: owner.map(str::to_string),
        })
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(""), "%%");
        assert_eq!(like_pattern("cat"), "%cat%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let query = PageQuery {
            sort_field: Some("password".into()),
            ..Default::default()
        };
        assert!(ListQuery::from_page_query(&query, USER_SORTS).is_err());

        let query = PageQuery {
            sort_field: Some("email".into()),
            sort_order: Some("asc".into()),
            ..Default::default()
        };
        let list = ListQuery::from_page_query(&query, USER_SORTS).unwrap();
        assert_eq!(list.order_by("t"), "t.email ASC, t.id");
    }

    #[test]
    fn important_first_orders_by_flag_then_display_order() {
        let list = ListQuery {
            important_first: true,
            ..Default::default()
        };
        assert_eq!(
            list.order_by("c"),
            "c.is_important DESC, c.display_order IS NULL, c.display_order ASC, c.created_at DESC, c.id"
        );
    }
}
