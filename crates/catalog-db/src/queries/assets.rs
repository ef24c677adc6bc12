use anyhow::Result;
use catalog_types::models::{Asset, AssetKind};
use rusqlite::{Connection, OptionalExtension, params};

use super::attachments::attachments_by_ids;
use super::{ListQuery, count, delete_by_id, new_id, now, set_display_order, set_importance};
use crate::Database;
use crate::models::{aliased, asset_columns, asset_from_row};

pub struct NewAsset {
    pub name: String,
    pub attachment_id: Option<String>,
    /// Only stored for tutorials.
    pub youtube_link: Option<String>,
}

#[derive(Default)]
pub struct AssetUpdate {
    pub name: Option<String>,
    pub attachment_id: Option<String>,
    pub youtube_link: Option<String>,
}

impl Database {
    pub fn create_asset(&self, kind: AssetKind, new: &NewAsset) -> Result<Asset> {
        self.with_conn(|conn| {
            let id = new_id();
            let now = now();
            let sql = format!(
                "INSERT INTO {} (id, name, attachment_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                kind.table()
            );
            conn.execute(&sql, params![id, new.name, new.attachment_id, now])?;
            if kind == AssetKind::Tutorial {
                conn.execute(
                    "UPDATE tutorials SET youtube_link = ?2 WHERE id = ?1",
                    params![id, new.youtube_link],
                )?;
            }
            query_asset(conn, kind, &id)?
                .ok_or_else(|| anyhow::anyhow!("{} vanished: {}", kind.label(), id))
        })
    }

    pub fn list_assets(&self, kind: AssetKind, query: &ListQuery<'_>) -> Result<(Vec<Asset>, u64)> {
        self.with_conn(|conn| {
            let pattern = query.like_pattern();
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE name LIKE ?1 ESCAPE '\\'", kind.table()),
                [&pattern],
                |r| r.get(0),
            )?;

            let sql = format!(
                "SELECT {} FROM {} t WHERE t.name LIKE ?1 ESCAPE '\\' ORDER BY {} LIMIT ?2 OFFSET ?3",
                aliased(asset_columns(kind), "t"),
                kind.table(),
                query.order_by("t")
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut assets = stmt
                .query_map(
                    params![pattern, query.page.limit() as i64, query.page.offset() as i64],
                    |r| asset_from_row(kind, r),
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            attach_attachments(conn, &mut assets)?;
            Ok((assets, total as u64))
        })
    }

    pub fn count_assets(&self, kind: AssetKind) -> Result<u64> {
        self.with_conn(|conn| count(conn, kind.table()))
    }

    /// Important entries by display order, unordered ones last.
    pub fn important_assets(&self, kind: AssetKind) -> Result<Vec<Asset>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM {} WHERE is_important = 1
                 ORDER BY display_order IS NULL, display_order ASC, created_at DESC",
                asset_columns(kind),
                kind.table()
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut assets = stmt
                .query_map([], |r| asset_from_row(kind, r))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            attach_attachments(conn, &mut assets)?;
            Ok(assets)
        })
    }

    pub fn get_asset(&self, kind: AssetKind, id: &str) -> Result<Option<Asset>> {
        self.with_conn(|conn| query_asset(conn, kind, id))
    }

    pub fn update_asset(&self, kind: AssetKind, id: &str, update: &AssetUpdate) -> Result<Option<Asset>> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE {} SET
                    name = COALESCE(?2, name),
                    attachment_id = COALESCE(?3, attachment_id),
                    updated_at = ?4
                 WHERE id = ?1",
                kind.table()
            );
            let changed = conn.execute(&sql, params![id, update.name, update.attachment_id, now()])?;
            if changed == 0 {
                return Ok(None);
            }
            if kind == AssetKind::Tutorial && update.youtube_link.is_some() {
                conn.execute(
                    "UPDATE tutorials SET youtube_link = ?2 WHERE id = ?1",
                    params![id, update.youtube_link],
                )?;
            }
            query_asset(conn, kind, id)
        })
    }

    pub fn delete_asset(&self, kind: AssetKind, id: &str) -> Result<bool> {
        self.with_conn(|conn| delete_by_id(conn, kind.table(), id))
    }

    pub fn set_asset_importance(&self, kind: AssetKind, id: &str, important: bool) -> Result<bool> {
        self.with_conn(|conn| set_importance(conn, kind.table(), id, important))
    }

    pub fn set_asset_order(&self, kind: AssetKind, id: &str, order: i64) -> Result<bool> {
        self.with_conn(|conn| set_display_order(conn, kind.table(), id, order))
    }
}

fn query_asset(conn: &Connection, kind: AssetKind, id: &str) -> Result<Option<Asset>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?1",
        asset_columns(kind),
        kind.table()
    );
    let Some(asset) = conn.query_row(&sql, [id], |r| asset_from_row(kind, r)).optional()? else {
        return Ok(None);
    };
    let mut assets = vec![asset];
    attach_attachments(conn, &mut assets)?;
    Ok(assets.pop())
}

fn attach_attachments(conn: &Connection, assets: &mut [Asset]) -> Result<()> {
    let ids: Vec<String> = assets.iter().filter_map(|a| a.attachment_id.clone()).collect();
    let attachments = attachments_by_ids(conn, &ids)?;
    for asset in assets.iter_mut() {
        asset.attachment = asset
            .attachment_id
            .as_ref()
            .and_then(|id| attachments.get(id).cloned());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;

    fn new(name: &str) -> NewAsset {
        NewAsset {
            name: name.into(),
            attachment_id: None,
            youtube_link: Some("https://youtube.com/watch?v=x".into()),
        }
    }

    #[test]
    fn each_kind_uses_its_own_table() {
        let db = fixtures::db();
        db.create_asset(AssetKind::Font, &new("Roboto")).unwrap();
        db.create_asset(AssetKind::Icon, &new("Star")).unwrap();
        db.create_asset(AssetKind::Icon, &new("Heart")).unwrap();

        assert_eq!(db.count_assets(AssetKind::Font).unwrap(), 1);
        assert_eq!(db.count_assets(AssetKind::Icon).unwrap(), 2);
        assert_eq!(db.count_assets(AssetKind::Tutorial).unwrap(), 0);
    }

    #[test]
    fn only_tutorials_keep_the_video_link() {
        let db = fixtures::db();
        let font = db.create_asset(AssetKind::Font, &new("Roboto")).unwrap();
        assert_eq!(font.youtube_link, None);

        let tutorial = db.create_asset(AssetKind::Tutorial, &new("Intro")).unwrap();
        assert_eq!(
            tutorial.youtube_link.as_deref(),
            Some("https://youtube.com/watch?v=x")
        );

        let updated = db
            .update_asset(
                AssetKind::Tutorial,
                &tutorial.id,
                &AssetUpdate {
                    youtube_link: Some("https://youtu.be/y".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.youtube_link.as_deref(), Some("https://youtu.be/y"));
        assert_eq!(updated.name, "Intro");
    }

    #[test]
    fn importance_and_order() {
        let db = fixtures::db();
        let a = db.create_asset(AssetKind::Font, &new("A")).unwrap();
        let b = db.create_asset(AssetKind::Font, &new("B")).unwrap();
        db.create_asset(AssetKind::Font, &new("C")).unwrap();

        assert!(db.set_asset_importance(AssetKind::Font, &a.id, true).unwrap());
        assert!(db.set_asset_importance(AssetKind::Font, &b.id, true).unwrap());
        assert!(db.set_asset_order(AssetKind::Font, &b.id, 0).unwrap());
        assert!(db.set_asset_order(AssetKind::Font, &a.id, 1).unwrap());

        let important = db.important_assets(AssetKind::Font).unwrap();
        let names: Vec<&str> = important.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);

        assert!(db.set_asset_importance(AssetKind::Font, &a.id, false).unwrap());
        let removed = db.get_asset(AssetKind::Font, &a.id).unwrap().unwrap();
        assert!(!removed.is_important);
        assert_eq!(removed.display_order, None);

        assert!(!db.set_asset_order(AssetKind::Font, "missing", 3).unwrap());
    }

    #[test]
    fn list_search_and_delete() {
        let db = fixtures::db();
        let roboto = db.create_asset(AssetKind::Font, &new("Roboto")).unwrap();
        db.create_asset(AssetKind::Font, &new("Lato")).unwrap();

        let query = ListQuery {
            search: "rob",
            ..Default::default()
        };
        let (fonts, total) = db.list_assets(AssetKind::Font, &query).unwrap();
        assert_eq!(total, 1);
        assert_eq!(fonts[0].id, roboto.id);

        assert!(db.delete_asset(AssetKind::Font, &roboto.id).unwrap());
        assert!(db.get_asset(AssetKind::Font, &roboto.id).unwrap().is_none());
    }
}
