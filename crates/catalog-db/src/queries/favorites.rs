use std::collections::HashMap;

use anyhow::Result;
use catalog_types::models::FavoriteSticker;
use rusqlite::{Connection, params};

use super::stickers::attach_sticker_relations;
use super::{fetch_in, new_id, now};
use crate::Database;
use crate::models::{STICKER_COLUMNS, sticker_from_row};

impl Database {
    /// The user's favorites, newest first, each with its full sticker.
    pub fn list_favorites(&self, user_id: &str) -> Result<Vec<FavoriteSticker>> {
        self.with_conn(|conn| favorites_for_user(conn, user_id))
    }

    /// Fails with a unique-constraint error when already a favorite.
    pub fn add_favorite(&self, user_id: &str, sticker_id: &str) -> Result<FavoriteSticker> {
        self.with_conn(|conn| {
            let id = new_id();
            let now = now();
            conn.execute(
                "INSERT INTO favorite_stickers (id, user_id, sticker_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, user_id, sticker_id, now],
            )?;
            Ok(FavoriteSticker {
                id,
                user_id: user_id.to_string(),
                sticker_id: sticker_id.to_string(),
                created_at: now,
                sticker: None,
            })
        })
    }

    pub fn remove_favorite(&self, user_id: &str, sticker_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM favorite_stickers WHERE user_id = ?1 AND sticker_id = ?2",
                params![user_id, sticker_id],
            )?;
            Ok(removed > 0)
        })
    }
}

pub(crate) fn favorites_for_user(conn: &Connection, user_id: &str) -> Result<Vec<FavoriteSticker>> {
    let mut stmt = conn.prepare(
        "SELECT f.id, f.user_id, f.sticker_id, f.created_at FROM favorite_stickers f
         JOIN stickers s ON s.id = f.sticker_id
         WHERE f.user_id = ?1 AND (s.is_user_created = 0 OR s.user_id = ?1)
         ORDER BY f.created_at DESC",
    )?;
    let mut favorites = stmt
        .query_map([user_id], |r| {
            Ok(FavoriteSticker {
                id: r.get(0)?,
                user_id: r.get(1)?,
                sticker_id: r.get(2)?,
                created_at: r.get(3)?,
                sticker: None,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let sticker_ids: Vec<String> = favorites.iter().map(|f| f.sticker_id.clone()).collect();
    let sql = format!("SELECT {} FROM stickers WHERE id IN ({{}})", STICKER_COLUMNS);
    let mut stickers = fetch_in(conn, &sql, &sticker_ids, sticker_from_row)?;
    attach_sticker_relations(conn, &mut stickers, Some(user_id))?;

    let mut by_id: HashMap<String, _> = stickers.into_iter().map(|s| (s.id.clone(), s)).collect();
    for favorite in favorites.iter_mut() {
        favorite.sticker = by_id.remove(&favorite.sticker_id);
    }
    Ok(favorites)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::super::NewSticker;
    use super::*;

    fn sticker(db: &Database) -> String {
        let attachment = fixtures::attachment(db, None, &uuid::Uuid::new_v4().to_string());
        db.create_sticker(&NewSticker {
            name: Some("cat".into()),
            attachment_id: attachment.id,
            category_id: None,
            subniche_id: None,
            user_id: None,
            is_user_created: false,
            translations: vec![],
        })
        .unwrap()
        .id
    }

    #[test]
    fn add_list_remove() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "ana@example.com");
        let sticker_id = sticker(&db);

        db.add_favorite(&user.id, &sticker_id).unwrap();
        let favorites = db.list_favorites(&user.id).unwrap();
        assert_eq!(favorites.len(), 1);
        let sticker = favorites[0].sticker.as_ref().unwrap();
        assert_eq!(sticker.id, sticker_id);
        assert_eq!(sticker.is_favorite, Some(true));

        assert!(db.remove_favorite(&user.id, &sticker_id).unwrap());
        assert!(!db.remove_favorite(&user.id, &sticker_id).unwrap());
        assert!(db.list_favorites(&user.id).unwrap().is_empty());
    }

    #[test]
    fn duplicate_favorite_is_a_constraint_error() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "ana@example.com");
        let sticker_id = sticker(&db);

        db.add_favorite(&user.id, &sticker_id).unwrap();
        let err = db.add_favorite(&user.id, &sticker_id).unwrap_err();
        let sqlite = err.downcast_ref::<rusqlite::Error>().unwrap();
        assert_eq!(
            sqlite.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        );
    }

    #[test]
    fn other_users_private_stickers_are_not_listed() {
        let db = fixtures::db();
        let owner = fixtures::user(&db, "ana@example.com");
        let other = fixtures::user(&db, "bob@example.com");
        let attachment = fixtures::attachment(&db, Some(&owner.id), "private");
        let private = db
            .create_sticker(&NewSticker {
                name: Some("Private".into()),
                attachment_id: attachment.id,
                category_id: None,
                subniche_id: None,
                user_id: Some(owner.id.clone()),
                is_user_created: true,
                translations: vec![],
            })
            .unwrap();
        let curated = sticker(&db);

        db.add_favorite(&other.id, &private.id).unwrap();
        db.add_favorite(&other.id, &curated).unwrap();
        db.add_favorite(&owner.id, &private.id).unwrap();

        let listed = db.list_favorites(&other.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].sticker_id, curated);
        assert_eq!(db.list_favorites(&owner.id).unwrap().len(), 1);
    }

    #[test]
    fn deleting_sticker_drops_favorites() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "ana@example.com");
        let sticker_id = sticker(&db);
        db.add_favorite(&user.id, &sticker_id).unwrap();

        db.delete_sticker(&sticker_id).unwrap();
        assert!(db.list_favorites(&user.id).unwrap().is_empty());
    }
}
