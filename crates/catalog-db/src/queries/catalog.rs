use std::collections::HashMap;

use anyhow::Result;
use catalog_types::models::{Category, Subniche};
use rusqlite::{Connection, OptionalExtension, params};

use super::attachments::attachments_by_ids;
use super::{ListQuery, count, delete_by_id, fetch_in, new_id, now, set_display_order, set_importance};
use crate::Database;
use crate::models::{
    CATEGORY_COLUMNS, SUBNICHE_COLUMNS, aliased, category_from_row, subniche_from_row,
};

impl Database {
    // -- Categories --

    pub fn create_category(&self, name: &str, attachment_id: Option<&str>) -> Result<Category> {
        self.with_conn(|conn| {
            let id = new_id();
            let now = now();
            conn.execute(
                "INSERT INTO categories (id, name, attachment_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id, name, attachment_id, now],
            )?;
            query_category(conn, &id)?.ok_or_else(|| anyhow::anyhow!("Category vanished: {}", id))
        })
    }

    /// Categories whose name matches, each with its attachment and subniches.
    pub fn list_categories(&self, query: &ListQuery<'_>) -> Result<(Vec<Category>, u64)> {
        self.with_conn(|conn| {
            let pattern = query.like_pattern();
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM categories WHERE name LIKE ?1 ESCAPE '\\'",
                [&pattern],
                |r| r.get(0),
            )?;

            let sql = format!(
                "SELECT {} FROM categories t WHERE t.name LIKE ?1 ESCAPE '\\' ORDER BY {} LIMIT ?2 OFFSET ?3",
                aliased(CATEGORY_COLUMNS, "t"),
                query.order_by("t")
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut categories = stmt
                .query_map(
                    params![pattern, query.page.limit() as i64, query.page.offset() as i64],
                    category_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            attach_category_relations(conn, &mut categories, true)?;
            Ok((categories, total as u64))
        })
    }

    pub fn count_categories(&self) -> Result<u64> {
        self.with_conn(|conn| count(conn, "categories"))
    }

    pub fn important_categories(&self) -> Result<Vec<Category>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM categories WHERE is_important = 1
                 ORDER BY display_order IS NULL, display_order ASC, created_at DESC",
                CATEGORY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut categories = stmt
                .query_map([], category_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            attach_category_relations(conn, &mut categories, false)?;
            Ok(categories)
        })
    }

    pub fn get_category(&self, id: &str) -> Result<Option<Category>> {
        self.with_conn(|conn| query_category(conn, id))
    }

    pub fn category_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| exists(conn, "categories", id))
    }

    pub fn update_category(
        &self,
        id: &str,
        name: Option<&str>,
        attachment_id: Option<&str>,
    ) -> Result<Option<Category>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE categories SET
                    name = COALESCE(?2, name),
                    attachment_id = COALESCE(?3, attachment_id),
                    updated_at = ?4
                 WHERE id = ?1",
                params![id, name, attachment_id, now()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_category(conn, id)
        })
    }

    pub fn delete_category(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| delete_by_id(conn, "categories", id))
    }

    pub fn set_category_importance(&self, id: &str, important: bool) -> Result<bool> {
        self.with_conn(|conn| set_importance(conn, "categories", id, important))
    }

    pub fn set_category_order(&self, id: &str, order: i64) -> Result<bool> {
        self.with_conn(|conn| set_display_order(conn, "categories", id, order))
    }

    // -- Subniches --

    pub fn create_subniche(
        &self,
        name: &str,
        category_id: &str,
        attachment_id: Option<&str>,
    ) -> Result<Subniche> {
        self.with_conn(|conn| {
            let id = new_id();
            let now = now();
            conn.execute(
                "INSERT INTO subniches (id, name, category_id, attachment_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, name, category_id, attachment_id, now],
            )?;
            query_subniche(conn, &id)?.ok_or_else(|| anyhow::anyhow!("Subniche vanished: {}", id))
        })
    }

    /// Subniches whose name matches, optionally within one category, each
    /// with its category and attachment.
    pub fn list_subniches(
        &self,
        query: &ListQuery<'_>,
        category_id: Option<&str>,
    ) -> Result<(Vec<Subniche>, u64)> {
        self.with_conn(|conn| {
            let pattern = query.like_pattern();
            let filter = "t.name LIKE ?1 ESCAPE '\\' AND (?2 IS NULL OR t.category_id = ?2)";

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM subniches t WHERE {}", filter),
                params![pattern, category_id],
                |r| r.get(0),
            )?;

            let sql = format!(
                "SELECT {} FROM subniches t WHERE {} ORDER BY {} LIMIT ?3 OFFSET ?4",
                aliased(SUBNICHE_COLUMNS, "t"),
                filter,
                query.order_by("t")
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut subniches = stmt
                .query_map(
                    params![pattern, category_id, query.page.limit() as i64, query.page.offset() as i64],
                    subniche_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            attach_subniche_relations(conn, &mut subniches)?;
            Ok((subniches, total as u64))
        })
    }

    pub fn count_subniches(&self) -> Result<u64> {
        self.with_conn(|conn| count(conn, "subniches"))
    }

    pub fn important_subniches(&self) -> Result<Vec<Subniche>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM subniches WHERE is_important = 1
                 ORDER BY display_order IS NULL, display_order ASC, created_at DESC",
                SUBNICHE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut subniches = stmt
                .query_map([], subniche_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            attach_subniche_relations(conn, &mut subniches)?;
            Ok(subniches)
        })
    }

    pub fn get_subniche(&self, id: &str) -> Result<Option<Subniche>> {
        self.with_conn(|conn| query_subniche(conn, id))
    }

    pub fn subniche_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| exists(conn, "subniches", id))
    }

    pub fn update_subniche(
        &self,
        id: &str,
        name: Option<&str>,
        category_id: Option<&str>,
        attachment_id: Option<&str>,
    ) -> Result<Option<Subniche>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE subniches SET
                    name = COALESCE(?2, name),
                    category_id = COALESCE(?3, category_id),
                    attachment_id = COALESCE(?4, attachment_id),
                    updated_at = ?5
                 WHERE id = ?1",
                params![id, name, category_id, attachment_id, now()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_subniche(conn, id)
        })
    }

    pub fn delete_subniche(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| delete_by_id(conn, "subniches", id))
    }

    pub fn set_subniche_importance(&self, id: &str, important: bool) -> Result<bool> {
        self.with_conn(|conn| set_importance(conn, "subniches", id, important))
    }

    pub fn set_subniche_order(&self, id: &str, order: i64) -> Result<bool> {
        self.with_conn(|conn| set_display_order(conn, "subniches", id, order))
    }
}

pub(crate) fn exists(conn: &Connection, table: &str, id: &str) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table);
    Ok(conn.query_row(&sql, [id], |r| r.get(0))?)
}

fn query_category(conn: &Connection, id: &str) -> Result<Option<Category>> {
    let sql = format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS);
    let Some(category) = conn.query_row(&sql, [id], category_from_row).optional()? else {
        return Ok(None);
    };
    let mut categories = vec![category];
    attach_category_relations(conn, &mut categories, false)?;
    Ok(categories.pop())
}

fn query_subniche(conn: &Connection, id: &str) -> Result<Option<Subniche>> {
    let sql = format!("SELECT {} FROM subniches WHERE id = ?1", SUBNICHE_COLUMNS);
    let Some(subniche) = conn.query_row(&sql, [id], subniche_from_row).optional()? else {
        return Ok(None);
    };
    let mut subniches = vec![subniche];
    attach_subniche_relations(conn, &mut subniches)?;
    Ok(subniches.pop())
}

/// Fills attachments, and the subniche lists when `with_subniches` is set.
pub(crate) fn attach_category_relations(
    conn: &Connection,
    categories: &mut [Category],
    with_subniches: bool,
) -> Result<()> {
    let attachment_ids: Vec<String> = categories
        .iter()
        .filter_map(|c| c.attachment_id.clone())
        .collect();
    let attachments = attachments_by_ids(conn, &attachment_ids)?;

    let mut subniches: HashMap<String, Vec<Subniche>> = HashMap::new();
    if with_subniches {
        let ids: Vec<String> = categories.iter().map(|c| c.id.clone()).collect();
        let sql = format!(
            "SELECT {} FROM subniches WHERE category_id IN ({{}}) ORDER BY name ASC",
            SUBNICHE_COLUMNS
        );
        for subniche in fetch_in(conn, &sql, &ids, subniche_from_row)? {
            subniches
                .entry(subniche.category_id.clone())
                .or_default()
                .push(subniche);
        }
    }

    for category in categories.iter_mut() {
        category.attachment = category
            .attachment_id
            .as_ref()
            .and_then(|id| attachments.get(id).cloned());
        if with_subniches {
            category.subniches = Some(subniches.remove(&category.id).unwrap_or_default());
        }
    }
    Ok(())
}

/// Fills the parent category (without its own relations) and the attachment.
pub(crate) fn attach_subniche_relations(conn: &Connection, subniches: &mut [Subniche]) -> Result<()> {
    let category_ids: Vec<String> = subniches.iter().map(|s| s.category_id.clone()).collect();
    let categories = categories_by_ids(conn, &category_ids)?;

    let attachment_ids: Vec<String> = subniches
        .iter()
        .filter_map(|s| s.attachment_id.clone())
        .collect();
    let attachments = attachments_by_ids(conn, &attachment_ids)?;

    for subniche in subniches.iter_mut() {
        subniche.category = categories.get(&subniche.category_id).cloned().map(Box::new);
        subniche.attachment = subniche
            .attachment_id
            .as_ref()
            .and_then(|id| attachments.get(id).cloned());
    }
    Ok(())
}

pub(crate) fn categories_by_ids(conn: &Connection, ids: &[String]) -> Result<HashMap<String, Category>> {
    let mut ids = ids.to_vec();
    ids.sort();
    ids.dedup();
    let sql = format!("SELECT {} FROM categories WHERE id IN ({{}})", CATEGORY_COLUMNS);
    let rows = fetch_in(conn, &sql, &ids, category_from_row)?;
    Ok(rows.into_iter().map(|c| (c.id.clone(), c)).collect())
}

pub(crate) fn subniches_by_ids(conn: &Connection, ids: &[String]) -> Result<HashMap<String, Subniche>> {
    let mut ids = ids.to_vec();
    ids.sort();
    ids.dedup();
    let sql = format!("SELECT {} FROM subniches WHERE id IN ({{}})", SUBNICHE_COLUMNS);
    let rows = fetch_in(conn, &sql, &ids, subniche_from_row)?;
    Ok(rows.into_iter().map(|s| (s.id.clone(), s)).collect())
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;
    use catalog_types::pagination::{PageRequest, SortOrder};

    #[test]
    fn category_crud() {
        let db = fixtures::db();
        let attachment = fixtures::attachment(&db, None, "cover.png");
        let category = db.create_category("Animals", Some(&attachment.id)).unwrap();
        assert_eq!(category.name, "Animals");
        assert_eq!(category.attachment.as_ref().unwrap().id, attachment.id);
        assert!(!category.is_important);

        let updated = db
            .update_category(&category.id, Some("Pets"), None)
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Pets");
        assert_eq!(updated.attachment_id.as_deref(), Some(attachment.id.as_str()));

        assert!(db.update_category("missing", Some("x"), None).unwrap().is_none());
        assert!(db.delete_category(&category.id).unwrap());
        assert!(db.get_category(&category.id).unwrap().is_none());
        assert!(!db.delete_category(&category.id).unwrap());
    }

    #[test]
    fn list_searches_and_includes_subniches() {
        let db = fixtures::db();
        let pets = db.create_category("Pets", None).unwrap();
        db.create_category("Food", None).unwrap();
        db.create_subniche("Cats", &pets.id, None).unwrap();
        db.create_subniche("Dogs", &pets.id, None).unwrap();

        let query = ListQuery {
            search: "pe",
            ..Default::default()
        };
        let (categories, total) = db.list_categories(&query).unwrap();
        assert_eq!(total, 1);
        let subniches = categories[0].subniches.as_ref().unwrap();
        assert_eq!(subniches.len(), 2);
        assert_eq!(subniches[0].name, "Cats");

        assert_eq!(db.count_categories().unwrap(), 2);
    }

    #[test]
    fn important_first_then_display_order() {
        let db = fixtures::db();
        db.create_category("A", None).unwrap();
        let b = db.create_category("B", None).unwrap();
        let c = db.create_category("C", None).unwrap();
        db.set_category_importance(&b.id, true).unwrap();
        db.set_category_importance(&c.id, true).unwrap();
        db.set_category_order(&c.id, 1).unwrap();

        let query = ListQuery {
            important_first: true,
            sort_column: "name",
            order: SortOrder::Asc,
            page: PageRequest::new(1, 10),
            ..Default::default()
        };
        let (categories, _) = db.list_categories(&query).unwrap();
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["C", "B", "A"]);

        let important = db.important_categories().unwrap();
        assert_eq!(important.len(), 2);
        assert_eq!(important[0].id, c.id);

        // Marking again clears the display order.
        db.set_category_importance(&c.id, true).unwrap();
        assert_eq!(db.get_category(&c.id).unwrap().unwrap().display_order, None);

        db.set_category_importance(&b.id, false).unwrap();
        assert!(!db.get_category(&b.id).unwrap().unwrap().is_important);
        assert!(!db.set_category_importance("missing", true).unwrap());
    }

    #[test]
    fn subniches_carry_category_and_filter_by_it() {
        let db = fixtures::db();
        let pets = db.create_category("Pets", None).unwrap();
        let food = db.create_category("Food", None).unwrap();
        db.create_subniche("Cats", &pets.id, None).unwrap();
        db.create_subniche("Fruit", &food.id, None).unwrap();

        let (all, total) = db.list_subniches(&ListQuery::default(), None).unwrap();
        assert_eq!(total, 2);
        assert!(all.iter().all(|s| s.category.is_some()));

        let (in_pets, total) = db.list_subniches(&ListQuery::default(), Some(&pets.id)).unwrap();
        assert_eq!(total, 1);
        assert_eq!(in_pets[0].name, "Cats");
        assert_eq!(in_pets[0].category.as_ref().unwrap().name, "Pets");
    }

    #[test]
    fn subniche_needs_existing_category() {
        let db = fixtures::db();
        assert!(db.create_subniche("Orphan", "missing", None).is_err());
    }

    #[test]
    fn deleting_category_removes_its_subniches() {
        let db = fixtures::db();
        let pets = db.create_category("Pets", None).unwrap();
        let cats = db.create_subniche("Cats", &pets.id, None).unwrap();
        db.delete_category(&pets.id).unwrap();
        assert!(db.get_subniche(&cats.id).unwrap().is_none());
    }
}
