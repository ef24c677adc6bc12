use anyhow::Result;
use catalog_types::api::TokenKind;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use sha2::{Digest, Sha256};

use super::{new_id, now};
use crate::Database;
use crate::models::TokenRow;

/// Stored tokens are looked up by the hex SHA-256 of the raw JWT.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

impl Database {
    pub fn store_token(
        &self,
        token: &str,
        user_id: &str,
        kind: TokenKind,
        expires: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tokens (id, token_hash, user_id, kind, expires, blacklisted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![new_id(), hash_token(token), user_id, kind.as_str(), expires, now()],
            )?;
            Ok(())
        })
    }

    /// A non-blacklisted token of the given kind owned by `user_id`.
    pub fn find_token(&self, token: &str, kind: TokenKind, user_id: &str) -> Result<Option<TokenRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, kind, expires, blacklisted FROM tokens \
                     WHERE token_hash = ?1 AND kind = ?2 AND user_id = ?3 AND blacklisted = 0",
                    params![hash_token(token), kind.as_str(), user_id],
                    TokenRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Any stored token of `kind` matching the raw value, whoever owns it.
    pub fn find_token_any_user(&self, token: &str, kind: TokenKind) -> Result<Option<TokenRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, kind, expires, blacklisted FROM tokens \
                     WHERE token_hash = ?1 AND kind = ?2 AND blacklisted = 0",
                    params![hash_token(token), kind.as_str()],
                    TokenRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_token(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM tokens WHERE id = ?1", [id])? > 0))
    }

    pub fn delete_user_tokens(&self, user_id: &str, kind: TokenKind) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM tokens WHERE user_id = ?1 AND kind = ?2",
                params![user_id, kind.as_str()],
            )?;
            Ok(n)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;
    use chrono::Duration;

    #[test]
    fn hash_is_hex_sha256() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn stored_token_is_found_by_raw_value() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "ana@example.com");
        let expires = Utc::now() + Duration::days(30);
        db.store_token("raw.jwt.value", &user.id, TokenKind::Refresh, expires)
            .unwrap();

        let row = db
            .find_token("raw.jwt.value", TokenKind::Refresh, &user.id)
            .unwrap()
            .unwrap();
        assert_eq!(row.user_id, user.id);
        assert_eq!(row.kind, "REFRESH");
        assert!(!row.blacklisted);

        assert!(db
            .find_token("raw.jwt.value", TokenKind::ResetPassword, &user.id)
            .unwrap()
            .is_none());
        assert!(db
            .find_token_any_user("raw.jwt.value", TokenKind::Refresh)
            .unwrap()
            .is_some());

        assert!(db.delete_token(&row.id).unwrap());
        assert!(db
            .find_token("raw.jwt.value", TokenKind::Refresh, &user.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn delete_user_tokens_by_kind() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "ana@example.com");
        let expires = Utc::now() + Duration::minutes(10);
        db.store_token("a", &user.id, TokenKind::ResetPassword, expires).unwrap();
        db.store_token("b", &user.id, TokenKind::ResetPassword, expires).unwrap();
        db.store_token("c", &user.id, TokenKind::Refresh, expires).unwrap();

        assert_eq!(db.delete_user_tokens(&user.id, TokenKind::ResetPassword).unwrap(), 2);
        assert!(db.find_token("c", TokenKind::Refresh, &user.id).unwrap().is_some());
    }
}
