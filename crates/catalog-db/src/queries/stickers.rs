use std::collections::{HashMap, HashSet};

use anyhow::Result;
use catalog_types::api::TranslationInput;
use catalog_types::models::{Sticker, StickerTranslation};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, params};

use super::attachments::{attachments_by_ids, delete_if_unused};
use super::catalog::{categories_by_ids, subniches_by_ids};
use super::{ListQuery, fetch_in, new_id, now};
use crate::Database;
use crate::models::{STICKER_COLUMNS, aliased, sticker_from_row};

pub struct NewSticker {
    pub name: Option<String>,
    pub attachment_id: String,
    pub category_id: Option<String>,
    pub subniche_id: Option<String>,
    pub user_id: Option<String>,
    pub is_user_created: bool,
    pub translations: Vec<TranslationInput>,
}

/// Partial update. `translations`, when present, replaces the whole set.
#[derive(Default)]
pub struct StickerUpdate {
    pub name: Option<String>,
    pub attachment_id: Option<String>,
    pub category_id: Option<String>,
    pub subniche_id: Option<String>,
    pub user_id: Option<String>,
    pub translations: Option<Vec<TranslationInput>>,
}

/// Which stickers a listing covers. Curated scopes never include
/// user-created stickers.
#[derive(Debug, Clone, Copy)]
pub enum StickerScope<'a> {
    Curated,
    Category(&'a str),
    Subniche(&'a str),
    Owner(&'a str),
}

impl StickerScope<'_> {
    fn clause(&self) -> &'static str {
        match self {
            StickerScope::Curated => "t.is_user_created = 0",
            StickerScope::Category(_) => "t.is_user_created = 0 AND t.category_id = ?3",
            StickerScope::Subniche(_) => "t.is_user_created = 0 AND t.subniche_id = ?3",
            StickerScope::Owner(_) => "t.is_user_created = 1 AND t.user_id = ?3",
        }
    }

    fn key(&self) -> Option<&str> {
        match self {
            StickerScope::Curated => None,
            StickerScope::Category(id) | StickerScope::Subniche(id) | StickerScope::Owner(id) => {
                Some(id)
            }
        }
    }
}

impl Database {
    pub fn create_sticker(&self, new: &NewSticker) -> Result<Sticker> {
        self.transaction(|tx| {
            let id = new_id();
            let now = now();
            tx.execute(
                "INSERT INTO stickers (id, name, attachment_id, category_id, subniche_id, user_id, is_user_created, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    id,
                    new.name,
                    new.attachment_id,
                    new.category_id,
                    new.subniche_id,
                    new.user_id,
                    new.is_user_created,
                    now
                ],
            )?;
            insert_translations(tx, &id, &new.translations)?;
            query_sticker(tx, &id, None)?.ok_or_else(|| anyhow::anyhow!("Sticker vanished: {}", id))
        })
    }

    /// Stickers in `scope` whose name matches. With a `viewer`, each sticker
    /// carries `isFavorite` for that user.
    pub fn list_stickers(
        &self,
        query: &ListQuery<'_>,
        scope: StickerScope<'_>,
        viewer: Option<&str>,
    ) -> Result<(Vec<Sticker>, u64)> {
        self.with_conn(|conn| {
            let pattern = query.like_pattern();
            let filter = format!(
                "(?1 = '' OR t.name LIKE ?2 ESCAPE '\\') AND {}",
                scope.clause()
            );
            let key = scope.key();
            let limit = query.page.limit() as i64;
            let offset = query.page.offset() as i64;

            let mut params: Vec<&dyn ToSql> = vec![&query.search, &pattern];
            if let Some(key) = &key {
                params.push(key);
            }

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM stickers t WHERE {}", filter),
                params.as_slice(),
                |r| r.get(0),
            )?;

            let n = params.len();
            let sql = format!(
                "SELECT {} FROM stickers t WHERE {} ORDER BY {} LIMIT ?{} OFFSET ?{}",
                aliased(STICKER_COLUMNS, "t"),
                filter,
                query.order_by("t"),
                n + 1,
                n + 2
            );
            params.push(&limit);
            params.push(&offset);

            let mut stmt = conn.prepare(&sql)?;
            let mut stickers = stmt
                .query_map(params.as_slice(), sticker_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            attach_sticker_relations(conn, &mut stickers, viewer)?;
            Ok((stickers, total as u64))
        })
    }

    pub fn count_stickers(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM stickers WHERE is_user_created = 0",
                [],
                |r| r.get(0),
            )?;
            Ok(total as u64)
        })
    }

    pub fn get_sticker(&self, id: &str, viewer: Option<&str>) -> Result<Option<Sticker>> {
        self.with_conn(|conn| query_sticker(conn, id, viewer))
    }

    pub fn update_sticker(&self, id: &str, update: &StickerUpdate) -> Result<Option<Sticker>> {
        self.transaction(|tx| {
            let changed = tx.execute(
                "UPDATE stickers SET
                    name = COALESCE(?2, name),
                    attachment_id = COALESCE(?3, attachment_id),
                    category_id = COALESCE(?4, category_id),
                    subniche_id = COALESCE(?5, subniche_id),
                    user_id = COALESCE(?6, user_id),
                    updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    update.name,
                    update.attachment_id,
                    update.category_id,
                    update.subniche_id,
                    update.user_id,
                    now()
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            if let Some(translations) = &update.translations {
                tx.execute("DELETE FROM sticker_translations WHERE sticker_id = ?1", [id])?;
                insert_translations(tx, id, translations)?;
            }
            query_sticker(tx, id, None)
        })
    }

    pub fn delete_sticker(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM stickers WHERE id = ?1", [id])? > 0))
    }

    /// Deletes the sticker, then its attachment if no longer referenced.
    /// Returns the object key of a removed attachment.
    pub fn delete_sticker_and_orphan(&self, id: &str) -> Result<Option<String>> {
        self.transaction(|tx| {
            let attachment_id: Option<String> = tx
                .query_row("SELECT attachment_id FROM stickers WHERE id = ?1", [id], |r| r.get(0))
                .optional()?;
            let Some(attachment_id) = attachment_id else {
                return Ok(None);
            };
            tx.execute("DELETE FROM stickers WHERE id = ?1", [id])?;
            delete_if_unused(tx, &attachment_id)
        })
    }
}

fn insert_translations(conn: &Connection, sticker_id: &str, translations: &[TranslationInput]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO sticker_translations (id, sticker_id, language, name) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for t in translations {
        stmt.execute(params![new_id(), sticker_id, t.language, t.name])?;
    }
    Ok(())
}

pub(crate) fn query_sticker(conn: &Connection, id: &str, viewer: Option<&str>) -> Result<Option<Sticker>> {
    let sql = format!("SELECT {} FROM stickers WHERE id = ?1", STICKER_COLUMNS);
    let Some(sticker) = conn.query_row(&sql, [id], sticker_from_row).optional()? else {
        return Ok(None);
    };
    let mut stickers = vec![sticker];
    attach_sticker_relations(conn, &mut stickers, viewer)?;
    Ok(stickers.pop())
}

/// Batch-fetch attachment, category, subniche, translations and (with a
/// viewer) the favorite flag for each sticker.
pub(crate) fn attach_sticker_relations(
    conn: &Connection,
    stickers: &mut [Sticker],
    viewer: Option<&str>,
) -> Result<()> {
    if stickers.is_empty() {
        return Ok(());
    }

    let ids: Vec<String> = stickers.iter().map(|s| s.id.clone()).collect();
    let attachment_ids: Vec<String> = stickers.iter().map(|s| s.attachment_id.clone()).collect();
    let category_ids: Vec<String> = stickers.iter().filter_map(|s| s.category_id.clone()).collect();
    let subniche_ids: Vec<String> = stickers.iter().filter_map(|s| s.subniche_id.clone()).collect();

    let attachments = attachments_by_ids(conn, &attachment_ids)?;
    let categories = categories_by_ids(conn, &category_ids)?;
    let subniches = subniches_by_ids(conn, &subniche_ids)?;

    let mut translations: HashMap<String, Vec<StickerTranslation>> = HashMap::new();
    let rows = fetch_in(
        conn,
        "SELECT sticker_id, id, language, name FROM sticker_translations
         WHERE sticker_id IN ({}) ORDER BY language ASC",
        &ids,
        |r| {
            Ok((
                r.get::<_, String>(0)?,
                StickerTranslation {
                    id: r.get(1)?,
                    language: r.get(2)?,
                    name: r.get(3)?,
                },
            ))
        },
    )?;
    for (sticker_id, translation) in rows {
        translations.entry(sticker_id).or_default().push(translation);
    }

    let favorites: Option<HashSet<String>> = match viewer {
        Some(user_id) => {
            let mut stmt =
                conn.prepare("SELECT sticker_id FROM favorite_stickers WHERE user_id = ?1")?;
            let set = stmt
                .query_map([user_id], |r| r.get::<_, String>(0))?
                .collect::<rusqlite::Result<HashSet<_>>>()?;
            Some(set)
        }
        None => None,
    };

    for sticker in stickers.iter_mut() {
        sticker.attachment = attachments.get(&sticker.attachment_id).cloned();
        sticker.category = sticker
            .category_id
            .as_ref()
            .and_then(|id| categories.get(id).cloned());
        sticker.subniche = sticker
            .subniche_id
            .as_ref()
            .and_then(|id| subniches.get(id).cloned());
        sticker.translations = translations.remove(&sticker.id).unwrap_or_default();
        sticker.is_favorite = favorites.as_ref().map(|f| f.contains(&sticker.id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;

    fn translation(language: &str, name: &str) -> TranslationInput {
        TranslationInput {
            language: language.into(),
            name: name.into(),
        }
    }

    fn curated(db: &Database, name: &str, category_id: &str) -> Sticker {
        let attachment = fixtures::attachment(db, None, &format!("{}.png", name));
        db.create_sticker(&NewSticker {
            name: Some(name.into()),
            attachment_id: attachment.id,
            category_id: Some(category_id.into()),
            subniche_id: None,
            user_id: None,
            is_user_created: false,
            translations: vec![translation("pt", name), translation("en", name)],
        })
        .unwrap()
    }

    #[test]
    fn create_loads_relations() {
        let db = fixtures::db();
        let category = db.create_category("Pets", None).unwrap();
        let sticker = curated(&db, "cat", &category.id);

        assert_eq!(sticker.category.as_ref().unwrap().name, "Pets");
        assert!(sticker.attachment.is_some());
        assert_eq!(sticker.translations.len(), 2);
        assert_eq!(sticker.translations[0].language, "en");
        assert_eq!(sticker.is_favorite, None);
    }

    #[test]
    fn update_replaces_translations_only_when_given() {
        let db = fixtures::db();
        let category = db.create_category("Pets", None).unwrap();
        let sticker = curated(&db, "cat", &category.id);

        let renamed = db
            .update_sticker(
                &sticker.id,
                &StickerUpdate {
                    name: Some("kitten".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(renamed.name.as_deref(), Some("kitten"));
        assert_eq!(renamed.translations.len(), 2);

        let replaced = db
            .update_sticker(
                &sticker.id,
                &StickerUpdate {
                    translations: Some(vec![translation("es", "gato")]),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(replaced.translations.len(), 1);
        assert_eq!(replaced.translations[0].name, "gato");

        assert!(db.update_sticker("missing", &StickerUpdate::default()).unwrap().is_none());
    }

    #[test]
    fn listing_scopes_and_favorites() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "ana@example.com");
        let pets = db.create_category("Pets", None).unwrap();
        let food = db.create_category("Food", None).unwrap();
        let cat = curated(&db, "cat", &pets.id);
        curated(&db, "dog", &pets.id);
        curated(&db, "apple", &food.id);

        let own = fixtures::attachment(&db, Some(&user.id), "mine.png");
        db.create_sticker(&NewSticker {
            name: Some("mine".into()),
            attachment_id: own.id,
            category_id: None,
            subniche_id: None,
            user_id: Some(user.id.clone()),
            is_user_created: true,
            translations: vec![],
        })
        .unwrap();

        db.add_favorite(&user.id, &cat.id).unwrap();

        let (all, total) = db
            .list_stickers(&ListQuery::default(), StickerScope::Curated, Some(&user.id))
            .unwrap();
        assert_eq!(total, 3);
        let fav: Vec<_> = all.iter().filter(|s| s.is_favorite == Some(true)).collect();
        assert_eq!(fav.len(), 1);
        assert_eq!(fav[0].id, cat.id);

        let (in_pets, total) = db
            .list_stickers(&ListQuery::default(), StickerScope::Category(&pets.id), None)
            .unwrap();
        assert_eq!(total, 2);
        assert!(in_pets.iter().all(|s| s.is_favorite.is_none()));

        let query = ListQuery {
            search: "DO",
            ..Default::default()
        };
        let (found, _) = db.list_stickers(&query, StickerScope::Curated, None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name.as_deref(), Some("dog"));

        let (mine, total) = db
            .list_stickers(&ListQuery::default(), StickerScope::Owner(&user.id), None)
            .unwrap();
        assert_eq!(total, 1);
        assert!(mine[0].is_user_created);

        assert_eq!(db.count_stickers().unwrap(), 3);
    }

    #[test]
    fn unnamed_stickers_show_up_without_search() {
        let db = fixtures::db();
        let attachment = fixtures::attachment(&db, None, "blank.png");
        db.create_sticker(&NewSticker {
            name: None,
            attachment_id: attachment.id,
            category_id: None,
            subniche_id: None,
            user_id: None,
            is_user_created: false,
            translations: vec![],
        })
        .unwrap();

        let (all, _) = db
            .list_stickers(&ListQuery::default(), StickerScope::Curated, None)
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn deleting_removes_orphaned_attachment_only() {
        let db = fixtures::db();
        let shared = fixtures::attachment(&db, None, "shared.png");
        let make = |db: &Database| {
            db.create_sticker(&NewSticker {
                name: None,
                attachment_id: shared.id.clone(),
                category_id: None,
                subniche_id: None,
                user_id: None,
                is_user_created: false,
                translations: vec![translation("en", "x")],
            })
            .unwrap()
        };
        let first = make(&db);
        let second = make(&db);

        assert_eq!(db.delete_sticker_and_orphan(&first.id).unwrap(), None);
        assert!(db.get_attachment(&shared.id).unwrap().is_some());

        assert_eq!(
            db.delete_sticker_and_orphan(&second.id).unwrap().as_deref(),
            Some("shared.png")
        );
        assert!(db.get_attachment(&shared.id).unwrap().is_none());
        assert!(db.get_sticker(&second.id, None).unwrap().is_none());
    }
}
