use std::collections::HashMap;

use anyhow::Result;
use catalog_types::models::Attachment;
use rusqlite::{Connection, OptionalExtension, params};

use super::{fetch_in, new_id, now};
use crate::Database;
use crate::models::{ATTACHMENT_COLUMNS, attachment_from_row};

pub struct NewAttachment {
    pub filename: String,
    pub filetype: String,
    pub filesize: i64,
    pub url: String,
    pub object_key: String,
    pub user_id: Option<String>,
}

impl Database {
    pub fn insert_attachment(&self, new: &NewAttachment) -> Result<Attachment> {
        self.with_conn(|conn| insert_attachment(conn, new))
    }

    /// All-or-nothing insert for multi-file uploads.
    pub fn insert_attachments(&self, new: &[NewAttachment]) -> Result<Vec<Attachment>> {
        self.transaction(|tx| new.iter().map(|a| insert_attachment(tx, a)).collect())
    }

    pub fn get_attachment(&self, id: &str) -> Result<Option<Attachment>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM attachments WHERE id = ?1", ATTACHMENT_COLUMNS);
            Ok(conn.query_row(&sql, [id], attachment_from_row).optional()?)
        })
    }

    /// The record together with the key of its stored object.
    pub fn get_attachment_with_key(&self, id: &str) -> Result<Option<(Attachment, String)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {}, object_key FROM attachments WHERE id = ?1",
                ATTACHMENT_COLUMNS
            );
            let key_index = ATTACHMENT_COLUMNS.split(',').count();
            let found = conn
                .query_row(&sql, [id], |r| Ok((attachment_from_row(r)?, r.get(key_index)?)))
                .optional()?;
            Ok(found)
        })
    }

    pub fn attachment_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM attachments WHERE id = ?1)",
                [id],
                |r| r.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Removes the record and returns its object key so the caller can drop
    /// the stored bytes.
    pub fn delete_attachment(&self, id: &str) -> Result<Option<String>> {
        self.transaction(|tx| {
            let key = object_key(tx, id)?;
            if key.is_some() {
                tx.execute("UPDATE users SET avatar_id = NULL WHERE avatar_id = ?1", [id])?;
                tx.execute("DELETE FROM attachments WHERE id = ?1", [id])?;
            }
            Ok(key)
        })
    }
}

pub(crate) fn insert_attachment(conn: &Connection, new: &NewAttachment) -> Result<Attachment> {
    let id = new_id();
    let now = now();
    conn.execute(
        "INSERT INTO attachments (id, filename, filetype, filesize, url, object_key, user_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            id,
            new.filename,
            new.filetype,
            new.filesize,
            new.url,
            new.object_key,
            new.user_id,
            now
        ],
    )?;
    Ok(Attachment {
        id,
        filename: new.filename.clone(),
        filetype: new.filetype.clone(),
        filesize: new.filesize,
        url: new.url.clone(),
        user_id: new.user_id.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub(crate) fn object_key(conn: &Connection, id: &str) -> Result<Option<String>> {
    let key = conn
        .query_row("SELECT object_key FROM attachments WHERE id = ?1", [id], |r| r.get(0))
        .optional()?;
    Ok(key)
}

/// Batch-fetch attachments keyed by id.
pub(crate) fn attachments_by_ids(conn: &Connection, ids: &[String]) -> Result<HashMap<String, Attachment>> {
    let mut ids = ids.to_vec();
    ids.sort();
    ids.dedup();
    let sql = format!("SELECT {} FROM attachments WHERE id IN ({{}})", ATTACHMENT_COLUMNS);
    let rows = fetch_in(conn, &sql, &ids, attachment_from_row)?;
    Ok(rows.into_iter().map(|a| (a.id.clone(), a)).collect())
}

/// Deletes the attachment when nothing references it any more. Returns the
/// object key of a deleted attachment.
pub(crate) fn delete_if_unused(conn: &Connection, id: &str) -> Result<Option<String>> {
    let in_use: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM stickers WHERE attachment_id = ?1)
             OR EXISTS(SELECT 1 FROM categories WHERE attachment_id = ?1)
             OR EXISTS(SELECT 1 FROM subniches WHERE attachment_id = ?1)
             OR EXISTS(SELECT 1 FROM fonts WHERE attachment_id = ?1)
             OR EXISTS(SELECT 1 FROM icons WHERE attachment_id = ?1)
             OR EXISTS(SELECT 1 FROM tutorials WHERE attachment_id = ?1)
             OR EXISTS(SELECT 1 FROM users WHERE avatar_id = ?1)",
        [id],
        |r| r.get(0),
    )?;
    if in_use {
        return Ok(None);
    }
    let key = object_key(conn, id)?;
    if key.is_some() {
        conn.execute("DELETE FROM attachments WHERE id = ?1", [id])?;
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;

    #[test]
    fn insert_get_delete() {
        let db = fixtures::db();
        let attachment = fixtures::attachment(&db, None, "abc-cat.png");
        assert_eq!(attachment.filetype, "image/png");

        let fetched = db.get_attachment(&attachment.id).unwrap().unwrap();
        assert_eq!(fetched.url, attachment.url);
        assert!(db.attachment_exists(&attachment.id).unwrap());
        let (_, key) = db.get_attachment_with_key(&attachment.id).unwrap().unwrap();
        assert_eq!(key, "abc-cat.png");

        let key = db.delete_attachment(&attachment.id).unwrap();
        assert_eq!(key.as_deref(), Some("abc-cat.png"));
        assert!(db.get_attachment(&attachment.id).unwrap().is_none());
        assert!(db.delete_attachment(&attachment.id).unwrap().is_none());
    }

    #[test]
    fn batch_insert_is_atomic() {
        let db = fixtures::db();
        let make = |key: &str| NewAttachment {
            filename: "f.png".into(),
            filetype: "image/png".into(),
            filesize: 1,
            url: format!("http://x/{}", key),
            object_key: key.into(),
            user_id: None,
        };

        let inserted = db.insert_attachments(&[make("a"), make("b")]).unwrap();
        assert_eq!(inserted.len(), 2);

        // Duplicate object key rolls back the whole batch.
        assert!(db.insert_attachments(&[make("c"), make("a")]).is_err());
        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM attachments", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn batch_lookup_skips_unknown_ids() {
        let db = fixtures::db();
        let a = fixtures::attachment(&db, None, "a");
        let found = db
            .with_conn(|conn| attachments_by_ids(conn, &[a.id.clone(), "nope".into(), a.id.clone()]))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&a.id));
    }
}
