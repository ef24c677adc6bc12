use anyhow::Result;
use catalog_types::models::{Category, Subniche};
use rusqlite::params;

use super::ListQuery;
use super::catalog::{attach_category_relations, attach_subniche_relations};
use crate::Database;
use crate::models::{CATEGORY_COLUMNS, SUBNICHE_COLUMNS, aliased, category_from_row, subniche_from_row};

/// One page of each result set; both share the same page and page size.
#[derive(Debug)]
pub struct SearchResults {
    pub categories: Vec<Category>,
    pub subniches: Vec<Subniche>,
    pub total_categories: u64,
    pub total_subniches: u64,
}

impl Database {
    /// Categories whose name matches, and subniches whose own name or
    /// category name matches.
    pub fn search_catalog(&self, query: &ListQuery<'_>) -> Result<SearchResults> {
        self.with_conn(|conn| {
            let pattern = query.like_pattern();
            let limit = query.page.limit() as i64;
            let offset = query.page.offset() as i64;
            let by_category = query.sort_column == "category";

            let total_categories: i64 = conn.query_row(
                "SELECT COUNT(*) FROM categories WHERE name LIKE ?1 ESCAPE '\\'",
                [&pattern],
                |r| r.get(0),
            )?;
            let category_order = if by_category {
                query.order_with("c", &format!("c.name {}", query.order.as_sql()))
            } else {
                query.order_by("c")
            };
            let sql = format!(
                "SELECT {} FROM categories c WHERE c.name LIKE ?1 ESCAPE '\\' ORDER BY {} LIMIT ?2 OFFSET ?3",
                aliased(CATEGORY_COLUMNS, "c"),
                category_order
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut categories = stmt
                .query_map(params![pattern, limit, offset], category_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            attach_category_relations(conn, &mut categories, false)?;

            let filter = "s.name LIKE ?1 ESCAPE '\\' OR c.name LIKE ?1 ESCAPE '\\'";
            let total_subniches: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM subniches s JOIN categories c ON c.id = s.category_id WHERE {}",
                    filter
                ),
                [&pattern],
                |r| r.get(0),
            )?;
            let subniche_order = if by_category {
                query.order_with("s", &format!("c.name {}, s.name ASC", query.order.as_sql()))
            } else {
                query.order_by("s")
            };
            let sql = format!(
                "SELECT {} FROM subniches s JOIN categories c ON c.id = s.category_id
                 WHERE {} ORDER BY {} LIMIT ?2 OFFSET ?3",
                aliased(SUBNICHE_COLUMNS, "s"),
                filter,
                subniche_order
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut subniches = stmt
                .query_map(params![pattern, limit, offset], subniche_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            attach_subniche_relations(conn, &mut subniches)?;

            Ok(SearchResults {
                categories,
                subniches,
                total_categories: total_categories as u64,
                total_subniches: total_subniches as u64,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;
    use catalog_types::pagination::{PageRequest, SortOrder};

    #[test]
    fn matches_subniches_through_their_category() {
        let db = fixtures::db();
        let animals = db.create_category("Animals", None).unwrap();
        let food = db.create_category("Food", None).unwrap();
        db.create_subniche("Cats", &animals.id, None).unwrap();
        db.create_subniche("Dogs", &animals.id, None).unwrap();
        db.create_subniche("Animal crackers", &food.id, None).unwrap();
        db.create_subniche("Fruit", &food.id, None).unwrap();

        let query = ListQuery {
            search: "animal",
            ..Default::default()
        };
        let results = db.search_catalog(&query).unwrap();
        assert_eq!(results.total_categories, 1);
        assert_eq!(results.total_subniches, 3);
        assert!(results.subniches.iter().all(|s| s.category.is_some()));
    }

    #[test]
    fn sorts_subniches_by_category_name() {
        let db = fixtures::db();
        let zoo = db.create_category("Zoo", None).unwrap();
        let art = db.create_category("Art", None).unwrap();
        db.create_subniche("Lions", &zoo.id, None).unwrap();
        db.create_subniche("Paint", &art.id, None).unwrap();

        let query = ListQuery {
            sort_column: "category",
            order: SortOrder::Asc,
            ..Default::default()
        };
        let results = db.search_catalog(&query).unwrap();
        let names: Vec<&str> = results.subniches.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Paint", "Lions"]);
        let names: Vec<&str> = results.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Art", "Zoo"]);
    }

    #[test]
    fn category_sort_keeps_important_first() {
        let db = fixtures::db();
        let zoo = db.create_category("Zoo", None).unwrap();
        let art = db.create_category("Art", None).unwrap();
        let lions = db.create_subniche("Lions", &zoo.id, None).unwrap();
        db.create_subniche("Paint", &art.id, None).unwrap();
        db.set_category_importance(&zoo.id, true).unwrap();
        db.set_subniche_importance(&lions.id, true).unwrap();

        let query = ListQuery {
            sort_column: "category",
            order: SortOrder::Asc,
            important_first: true,
            ..Default::default()
        };
        let results = db.search_catalog(&query).unwrap();
        let names: Vec<&str> = results.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Zoo", "Art"]);
        let names: Vec<&str> = results.subniches.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Lions", "Paint"]);
    }

    #[test]
    fn both_sets_share_the_page() {
        let db = fixtures::db();
        let category = db.create_category("Only", None).unwrap();
        for name in ["a", "b", "c"] {
            db.create_subniche(name, &category.id, None).unwrap();
        }

        let query = ListQuery {
            page: PageRequest::new(2, 2),
            ..Default::default()
        };
        let results = db.search_catalog(&query).unwrap();
        assert!(results.categories.is_empty());
        assert_eq!(results.subniches.len(), 1);
        assert_eq!(results.total_subniches, 3);
    }
}
