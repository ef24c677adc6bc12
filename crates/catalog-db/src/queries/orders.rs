use std::collections::HashMap;

use anyhow::Result;
use catalog_types::models::{Order, PaymentStatus, Role, Subscription, UserDetail};
use catalog_types::webhook::{OrderDates, OrderEvent};
use rusqlite::{Connection, params};
use tracing::debug;

use super::favorites::favorites_for_user;
use super::stickers::attach_sticker_relations;
use super::users::{NewUser, insert_user, query_user_row};
use super::{fetch_in, new_id};
use crate::Database;
use crate::models::{
    COMMISSION_COLUMNS, CUSTOMER_COLUMNS, ORDER_COLUMNS, PLAN_COLUMNS, STICKER_COLUMNS,
    SUBSCRIPTION_COLUMNS, aliased, commission_from_row, customer_from_row, order_from_row,
    plan_from_row, product_from_row, sticker_from_row, subscription_from_row,
};

/// Outcome of ingesting one order event.
#[derive(Debug)]
pub struct OrderIngest {
    pub order_id: String,
    pub user_id: String,
    /// Set when the buyer had no account and one was created.
    pub created_user: bool,
}

impl Database {
    /// Applies an order event atomically: user, customer, product,
    /// subscription with plan, commission and finally the order itself,
    /// matched by `order_ref` so replays update instead of duplicating.
    ///
    /// `password_hash` is only called when a new user must be created.
    pub fn ingest_order<F>(&self, event: &OrderEvent, password_hash: F) -> Result<OrderIngest>
    where
        F: FnOnce() -> Result<String>,
    {
        let dates = event.dates().map_err(anyhow::Error::msg)?;
        let subscription = event.subscription_update().map_err(anyhow::Error::msg)?;

        self.transaction(|tx| {
            let email = event.customer.email.as_str();

            let (user_id, created_user) = match query_user_row(tx, "email", email)? {
                Some(user) => (user.id, false),
                None => {
                    let user = insert_user(
                        tx,
                        &NewUser {
                            email: email.to_string(),
                            name: Some(event.customer.full_name.clone()),
                            password_hash: password_hash()?,
                            role: Role::User,
                            is_manually_created: false,
                            expiration_date: None,
                        },
                    )?;
                    debug!("Created user {} for order {}", user.id, event.order_ref);
                    (user.id, true)
                }
            };

            tx.execute(
                "INSERT OR IGNORE INTO customers (email, full_name, first_name, mobile, cpf, ip)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    email,
                    event.customer.full_name,
                    event.customer.first_name,
                    event.customer.mobile,
                    event.customer.cpf.clone().unwrap_or_default(),
                    event.customer.ip
                ],
            )?;

            tx.execute(
                "INSERT OR IGNORE INTO products (id, name) VALUES (?1, ?2)",
                params![event.product.product_id, event.product.product_name],
            )?;

            if let Some(sub) = &subscription {
                tx.execute(
                    "INSERT OR IGNORE INTO plans (id, name, frequency, qty_charges) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        sub.plan.id,
                        sub.plan.name,
                        sub.plan.frequency,
                        sub.plan.qty_charges.unwrap_or(0)
                    ],
                )?;
                tx.execute(
                    "INSERT INTO subscriptions (id, start_date, next_payment, status, plan_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                        start_date = excluded.start_date,
                        next_payment = excluded.next_payment,
                        status = excluded.status,
                        plan_id = excluded.plan_id",
                    params![sub.id, sub.start_date, sub.next_payment, sub.status, sub.plan.id],
                )?;
            }

            let commission_id = event.commission_id();
            if let (Some(id), Some(c)) = (commission_id, event.commissions.as_ref()) {
                tx.execute(
                    "INSERT OR IGNORE INTO commissions
                        (id, charge_amount, product_base_price, platform_fee, my_commission, currency,
                         funds_status, estimated_deposit_date, deposit_date)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        id,
                        c.charge_amount,
                        c.product_base_price,
                        c.kiwify_fee,
                        c.my_commission,
                        c.currency,
                        c.funds_status,
                        dates.estimated_deposit_date,
                        dates.deposit_date
                    ],
                )?;
            }

            let order_id = upsert_order(
                tx,
                event,
                &dates,
                &user_id,
                subscription.as_ref().map(|s| s.id),
                commission_id,
            )?;

            Ok(OrderIngest {
                order_id,
                user_id,
                created_user,
            })
        })
    }

    /// Subscriptions reached through the user's orders.
    pub fn payment_status(&self, user_id: &str) -> Result<Vec<PaymentStatus>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.start_date, s.next_payment, s.status, p.frequency, p.qty_charges
                 FROM subscriptions s
                 JOIN plans p ON p.id = s.plan_id
                 WHERE s.id IN (SELECT subscription_id FROM orders WHERE user_id = ?1)
                 ORDER BY s.start_date DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |r| {
                    Ok(PaymentStatus {
                        start_date: r.get(0)?,
                        next_payment: r.get(1)?,
                        status: r.get(2)?,
                        plan_type: r.get(3)?,
                        total_charges: r.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Everything attached to a user: avatar, orders with their relations,
    /// favorites and own stickers.
    pub fn get_user_detail(&self, user_id: &str) -> Result<Option<UserDetail>> {
        let Some(user) = self.get_user(user_id)? else {
            return Ok(None);
        };
        self.with_conn(|conn| {
            let orders = orders_for_user(conn, user_id)?;
            let favorites = favorites_for_user(conn, user_id)?;

            let sql = format!(
                "SELECT {} FROM stickers WHERE user_id = ?1 ORDER BY created_at DESC",
                STICKER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut stickers = stmt
                .query_map([user_id], sticker_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            attach_sticker_relations(conn, &mut stickers, Some(user_id))?;

            Ok(Some(UserDetail {
                user,
                orders,
                favorites,
                stickers,
            }))
        })
    }

    pub fn get_order_by_ref(&self, order_ref: &str) -> Result<Option<Order>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM orders WHERE order_ref = ?1", ORDER_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let mut orders = stmt
                .query_map([order_ref], order_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            attach_order_relations(conn, &mut orders)?;
            Ok(orders.pop())
        })
    }
}

fn upsert_order(
    conn: &Connection,
    event: &OrderEvent,
    dates: &OrderDates,
    user_id: &str,
    subscription_id: Option<&str>,
    commission_id: Option<&str>,
) -> Result<String> {
    let id = conn.query_row(
        "INSERT INTO orders (
            id, order_ref, order_status, product_type, payment_method, store_id, payment_merchant_id,
            installments, card_type, card_last4_digits, card_rejection_reason, boleto_url,
            boleto_barcode, boleto_expiry_date, pix_code, pix_expiration, sale_type, approved_date,
            refunded_at, webhook_event_type, user_id, product_id, customer_email, subscription_id,
            commission_id, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
                   ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)
         ON CONFLICT(order_ref) DO UPDATE SET
            order_status = excluded.order_status,
            product_type = excluded.product_type,
            payment_method = excluded.payment_method,
            store_id = excluded.store_id,
            payment_merchant_id = excluded.payment_merchant_id,
            installments = excluded.installments,
            card_type = excluded.card_type,
            card_last4_digits = excluded.card_last4_digits,
            card_rejection_reason = excluded.card_rejection_reason,
            boleto_url = excluded.boleto_url,
            boleto_barcode = excluded.boleto_barcode,
            boleto_expiry_date = excluded.boleto_expiry_date,
            pix_code = excluded.pix_code,
            pix_expiration = excluded.pix_expiration,
            sale_type = excluded.sale_type,
            approved_date = excluded.approved_date,
            refunded_at = excluded.refunded_at,
            webhook_event_type = excluded.webhook_event_type,
            user_id = excluded.user_id,
            product_id = excluded.product_id,
            customer_email = excluded.customer_email,
            subscription_id = excluded.subscription_id,
            commission_id = excluded.commission_id,
            updated_at = excluded.updated_at
         RETURNING id",
        params![
            new_id(),
            event.order_ref,
            event.order_status,
            event.product_type,
            event.payment_method,
            event.store_id,
            event.payment_merchant_id,
            event.installments,
            event.card_type,
            event.card_last4digits,
            event.card_rejection_reason,
            event.boleto_url,
            event.boleto_barcode,
            dates.boleto_expiry_date,
            event.pix_code,
            dates.pix_expiration,
            event.sale_type,
            dates.approved_date,
            dates.refunded_at,
            event.webhook_event_type,
            user_id,
            event.product.product_id,
            event.customer.email,
            subscription_id,
            commission_id,
            dates.created_at,
            dates.updated_at
        ],
        |r| r.get(0),
    )?;
    Ok(id)
}

fn orders_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Order>> {
    let sql = format!(
        "SELECT {} FROM orders WHERE user_id = ?1 ORDER BY created_at DESC",
        ORDER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut orders = stmt
        .query_map([user_id], order_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    attach_order_relations(conn, &mut orders)?;
    Ok(orders)
}

/// Batch-fetch product, customer, commission and subscription with plan.
fn attach_order_relations(conn: &Connection, orders: &mut [Order]) -> Result<()> {
    if orders.is_empty() {
        return Ok(());
    }
    let product_ids = distinct(orders.iter().map(|o| &o.product_id));
    let emails = distinct(orders.iter().map(|o| &o.customer_email));
    let commission_ids = distinct(orders.iter().filter_map(|o| o.commission_id.as_ref()));
    let subscription_ids = distinct(orders.iter().filter_map(|o| o.subscription_id.as_ref()));

    let products: HashMap<_, _> = fetch_in(
        conn,
        "SELECT id, name FROM products WHERE id IN ({})",
        &product_ids,
        product_from_row,
    )?
    .into_iter()
    .map(|p| (p.id.clone(), p))
    .collect();

    let customers: HashMap<_, _> = fetch_in(
        conn,
        &format!("SELECT {} FROM customers WHERE email IN ({{}})", CUSTOMER_COLUMNS),
        &emails,
        customer_from_row,
    )?
    .into_iter()
    .map(|c| (c.email.clone(), c))
    .collect();

    let commissions: HashMap<_, _> = fetch_in(
        conn,
        &format!("SELECT {} FROM commissions WHERE id IN ({{}})", COMMISSION_COLUMNS),
        &commission_ids,
        commission_from_row,
    )?
    .into_iter()
    .map(|c| (c.id.clone(), c))
    .collect();

    let subscriptions: HashMap<String, Subscription> = fetch_in(
        conn,
        &format!(
            "SELECT {}, {} FROM subscriptions s JOIN plans p ON p.id = s.plan_id WHERE s.id IN ({{}})",
            aliased(SUBSCRIPTION_COLUMNS, "s"),
            aliased(PLAN_COLUMNS, "p")
        ),
        &subscription_ids,
        |r| {
            let mut subscription = subscription_from_row(r)?;
            subscription.plan = Some(plan_from_row(r, 5)?);
            Ok(subscription)
        },
    )?
    .into_iter()
    .map(|s| (s.id.clone(), s))
    .collect();

    for order in orders.iter_mut() {
        order.product = products.get(&order.product_id).cloned();
        order.customer = customers.get(&order.customer_email).cloned();
        order.commission = order
            .commission_id
            .as_ref()
            .and_then(|id| commissions.get(id).cloned());
        order.subscription = order
            .subscription_id
            .as_ref()
            .and_then(|id| subscriptions.get(id).cloned());
    }
    Ok(())
}

fn distinct<'a>(ids: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut ids: Vec<String> = ids.cloned().collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;

    const EVENT: &str = r#"{
        "order_ref": "Qx7Lp2",
        "order_status": "paid",
        "payment_method": "credit_card",
        "store_id": "AbCdEf",
        "installments": 1,
        "card_last4digits": "4321",
        "created_at": "2024-03-01 10:20",
        "updated_at": "2024-03-01 10:21",
        "approved_date": "2024-03-01 10:21",
        "webhook_event_type": "order_approved",
        "Product": { "product_id": "prod-1", "product_name": "Sticker Club" },
        "Customer": { "full_name": "Ana Souza", "first_name": "Ana", "email": "ana@example.com", "CPF": "123" },
        "Commissions": {
            "charge_amount": "4990",
            "product_base_price": 4990,
            "kiwify_fee": "499",
            "commissioned_stores": [{ "commissionId": "com-1" }],
            "currency": "BRL",
            "my_commission": 4491
        },
        "Subscription": {
            "id": "sub-1",
            "start_date": "2024-03-01T10:21:00Z",
            "next_payment": "2024-04-01T10:21:00Z",
            "status": "active",
            "plan": { "id": "plan-1", "name": "Mensal", "frequency": "monthly", "qty_charges": 12 }
        },
        "subscription_id": "sub-1"
    }"#;

    fn event() -> OrderEvent {
        serde_json::from_str(EVENT).unwrap()
    }

    #[test]
    fn ingest_creates_everything_once() {
        let db = fixtures::db();
        let first = db.ingest_order(&event(), || Ok("hash".into())).unwrap();
        assert!(first.created_user);

        let user = db.get_user_row_by_email("ana@example.com").unwrap().unwrap();
        assert_eq!(user.id, first.user_id);
        assert_eq!(user.name.as_deref(), Some("Ana Souza"));

        let order = db.get_order_by_ref("Qx7Lp2").unwrap().unwrap();
        assert_eq!(order.order_status, "paid");
        assert_eq!(order.product.as_ref().unwrap().name, "Sticker Club");
        assert_eq!(order.customer.as_ref().unwrap().cpf, "123");
        assert_eq!(order.commission.as_ref().unwrap().platform_fee, 499.0);
        let subscription = order.subscription.as_ref().unwrap();
        assert_eq!(subscription.plan.as_ref().unwrap().qty_charges, 12);
    }

    #[test]
    fn replaying_an_order_updates_it() {
        let db = fixtures::db();
        let first = db.ingest_order(&event(), || Ok("hash".into())).unwrap();

        let mut refunded = event();
        refunded.order_status = "refunded".into();
        refunded.refunded_at = Some("2024-03-05 09:00".into());
        let second = db
            .ingest_order(&refunded, || panic!("user already exists"))
            .unwrap();

        assert!(!second.created_user);
        assert_eq!(second.order_id, first.order_id);
        assert_eq!(second.user_id, first.user_id);

        let count: i64 = db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM orders", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
        let order = db.get_order_by_ref("Qx7Lp2").unwrap().unwrap();
        assert_eq!(order.order_status, "refunded");
        assert!(order.refunded_at.is_some());
    }

    #[test]
    fn failed_ingest_leaves_no_trace() {
        let db = fixtures::db();
        let result = db.ingest_order(&event(), || anyhow::bail!("hashing failed"));
        assert!(result.is_err());
        assert!(db.get_user_row_by_email("ana@example.com").unwrap().is_none());
    }

    #[test]
    fn single_purchase_without_subscription() {
        let db = fixtures::db();
        let mut single = event();
        single.subscription_id = None;
        single.subscription = None;
        let ingest = db.ingest_order(&single, || Ok("hash".into())).unwrap();

        let order = db.get_order_by_ref("Qx7Lp2").unwrap().unwrap();
        assert!(order.subscription.is_none());
        assert!(db.payment_status(&ingest.user_id).unwrap().is_empty());
    }

    #[test]
    fn payment_status_and_user_summary() {
        let db = fixtures::db();
        let ingest = db.ingest_order(&event(), || Ok("hash".into())).unwrap();

        let status = db.payment_status(&ingest.user_id).unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].plan_type, "monthly");
        assert_eq!(status[0].total_charges, 12);
        assert_eq!(status[0].status, "active");

        let user = db.get_user(&ingest.user_id).unwrap().unwrap();
        assert_eq!(user.order_status.as_deref(), Some("paid"));
        assert_eq!(user.subscription.as_ref().unwrap().frequency, "monthly");

        let detail = db.get_user_detail(&ingest.user_id).unwrap().unwrap();
        assert_eq!(detail.orders.len(), 1);
        assert!(detail.favorites.is_empty());
    }

    #[test]
    fn existing_user_is_reused() {
        let db = fixtures::db();
        let existing = fixtures::user(&db, "ana@example.com");
        let ingest = db
            .ingest_order(&event(), || panic!("should not create"))
            .unwrap();
        assert_eq!(ingest.user_id, existing.id);
        assert!(!ingest.created_user);
    }
}
