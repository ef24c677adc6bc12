use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                email               TEXT NOT NULL UNIQUE,
                name                TEXT,
                password            TEXT NOT NULL,
                role                TEXT NOT NULL DEFAULT 'USER',
                is_email_verified   INTEGER NOT NULL DEFAULT 0,
                first_access        INTEGER NOT NULL DEFAULT 1,
                status              INTEGER NOT NULL DEFAULT 1,
                is_manually_created INTEGER NOT NULL DEFAULT 0,
                expiration_date     TEXT,
                avatar_id           TEXT REFERENCES attachments(id) ON DELETE SET NULL,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE TABLE tokens (
                id          TEXT PRIMARY KEY,
                token_hash  TEXT NOT NULL UNIQUE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                kind        TEXT NOT NULL,
                expires     TEXT NOT NULL,
                blacklisted INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_tokens_user ON tokens(user_id, kind);

            CREATE TABLE attachments (
                id          TEXT PRIMARY KEY,
                filename    TEXT NOT NULL,
                filetype    TEXT NOT NULL,
                filesize    INTEGER NOT NULL,
                url         TEXT NOT NULL,
                object_key  TEXT NOT NULL UNIQUE,
                user_id     TEXT REFERENCES users(id) ON DELETE SET NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE categories (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                attachment_id   TEXT REFERENCES attachments(id) ON DELETE SET NULL,
                is_important    INTEGER NOT NULL DEFAULT 0,
                display_order   INTEGER,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE subniches (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                category_id     TEXT NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                attachment_id   TEXT REFERENCES attachments(id) ON DELETE SET NULL,
                is_important    INTEGER NOT NULL DEFAULT 0,
                display_order   INTEGER,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_subniches_category ON subniches(category_id);

            CREATE TABLE stickers (
                id              TEXT PRIMARY KEY,
                name            TEXT,
                attachment_id   TEXT NOT NULL REFERENCES attachments(id) ON DELETE CASCADE,
                category_id     TEXT REFERENCES categories(id) ON DELETE SET NULL,
                subniche_id     TEXT REFERENCES subniches(id) ON DELETE SET NULL,
                user_id         TEXT REFERENCES users(id) ON DELETE CASCADE,
                is_user_created INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_stickers_category ON stickers(category_id, created_at);
            CREATE INDEX idx_stickers_subniche ON stickers(subniche_id, created_at);
            CREATE INDEX idx_stickers_user ON stickers(user_id, created_at);

            CREATE TABLE sticker_translations (
                id          TEXT PRIMARY KEY,
                sticker_id  TEXT NOT NULL REFERENCES stickers(id) ON DELETE CASCADE,
                language    TEXT NOT NULL,
                name        TEXT NOT NULL
            );

            CREATE INDEX idx_translations_sticker ON sticker_translations(sticker_id);

            CREATE TABLE favorite_stickers (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                sticker_id  TEXT NOT NULL REFERENCES stickers(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                UNIQUE(user_id, sticker_id)
            );

            CREATE TABLE fonts (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                attachment_id   TEXT REFERENCES attachments(id) ON DELETE SET NULL,
                is_important    INTEGER NOT NULL DEFAULT 0,
                display_order   INTEGER,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE icons (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                attachment_id   TEXT REFERENCES attachments(id) ON DELETE SET NULL,
                is_important    INTEGER NOT NULL DEFAULT 0,
                display_order   INTEGER,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE tutorials (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                attachment_id   TEXT REFERENCES attachments(id) ON DELETE SET NULL,
                is_important    INTEGER NOT NULL DEFAULT 0,
                display_order   INTEGER,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                youtube_link    TEXT
            );

            CREATE TABLE customers (
                email       TEXT PRIMARY KEY,
                full_name   TEXT NOT NULL,
                first_name  TEXT,
                mobile      TEXT,
                cpf         TEXT NOT NULL,
                ip          TEXT
            );

            CREATE TABLE products (
                id      TEXT PRIMARY KEY,
                name    TEXT NOT NULL
            );

            CREATE TABLE plans (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                frequency   TEXT NOT NULL,
                qty_charges INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE subscriptions (
                id              TEXT PRIMARY KEY,
                start_date      TEXT NOT NULL,
                next_payment    TEXT NOT NULL,
                status          TEXT NOT NULL,
                plan_id         TEXT NOT NULL REFERENCES plans(id)
            );

            CREATE TABLE commissions (
                id                      TEXT PRIMARY KEY,
                charge_amount           REAL NOT NULL,
                product_base_price      REAL NOT NULL,
                platform_fee            REAL NOT NULL,
                my_commission           REAL NOT NULL,
                currency                TEXT NOT NULL,
                funds_status            TEXT,
                estimated_deposit_date  TEXT,
                deposit_date            TEXT
            );

            CREATE TABLE orders (
                id                      TEXT PRIMARY KEY,
                order_ref               TEXT NOT NULL UNIQUE,
                order_status            TEXT NOT NULL,
                product_type            TEXT,
                payment_method          TEXT,
                store_id                TEXT,
                payment_merchant_id     TEXT,
                installments            INTEGER,
                card_type               TEXT,
                card_last4_digits       TEXT,
                card_rejection_reason   TEXT,
                boleto_url              TEXT,
                boleto_barcode          TEXT,
                boleto_expiry_date      TEXT,
                pix_code                TEXT,
                pix_expiration          TEXT,
                sale_type               TEXT,
                approved_date           TEXT,
                refunded_at             TEXT,
                webhook_event_type      TEXT,
                user_id                 TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                product_id              TEXT NOT NULL REFERENCES products(id),
                customer_email          TEXT NOT NULL REFERENCES customers(email),
                subscription_id         TEXT REFERENCES subscriptions(id),
                commission_id           TEXT REFERENCES commissions(id),
                created_at              TEXT NOT NULL,
                updated_at              TEXT NOT NULL
            );

            CREATE INDEX idx_orders_user ON orders(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }
}
