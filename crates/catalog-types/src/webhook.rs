//! Order lifecycle payload posted by the payment platform.
//!
//! Field names follow the platform's JSON verbatim (`Customer`, `boleto_URL`,
//! `CPF`, ...). Numeric fields are accepted as numbers or numeric strings,
//! since the platform is not consistent about it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, de};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct OrderEvent {
    pub order_ref: String,
    pub order_status: String,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub store_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_merchant_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub installments: Option<i64>,
    #[serde(default)]
    pub card_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub card_last4digits: Option<String>,
    #[serde(default)]
    pub card_rejection_reason: Option<String>,
    #[serde(default, rename = "boleto_URL")]
    pub boleto_url: Option<String>,
    #[serde(default)]
    pub boleto_barcode: Option<String>,
    #[serde(default)]
    pub boleto_expiry_date: Option<String>,
    #[serde(default)]
    pub pix_code: Option<String>,
    #[serde(default)]
    pub pix_expiration: Option<String>,
    #[serde(default)]
    pub sale_type: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub approved_date: Option<String>,
    #[serde(default)]
    pub refunded_at: Option<String>,
    #[serde(default)]
    pub webhook_event_type: Option<String>,
    #[serde(rename = "Product")]
    pub product: EventProduct,
    #[serde(rename = "Customer")]
    pub customer: EventCustomer,
    #[serde(rename = "Commissions", default)]
    pub commissions: Option<EventCommissions>,
    #[serde(rename = "Subscription", default)]
    pub subscription: Option<EventSubscription>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub access_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventProduct {
    #[serde(deserialize_with = "required_string")]
    pub product_id: String,
    pub product_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventCustomer {
    pub full_name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mobile: Option<String>,
    #[serde(rename = "CPF", default, deserialize_with = "lenient_string")]
    pub cpf: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventCommissions {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub charge_amount: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub product_base_price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub kiwify_fee: f64,
    #[serde(default)]
    pub commissioned_stores: Vec<CommissionedStore>,
    #[serde(default)]
    pub currency: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub my_commission: f64,
    #[serde(default)]
    pub funds_status: Option<String>,
    #[serde(default)]
    pub estimated_deposit_date: Option<String>,
    #[serde(default)]
    pub deposit_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionedStore {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub custom_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
    #[serde(default)]
    pub commission_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSubscription {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub next_payment: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub plan: Option<EventPlan>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventPlan {
    pub id: String,
    pub name: String,
    pub frequency: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub qty_charges: Option<i64>,
}

/// Timestamps normalized out of an [`OrderEvent`].
#[derive(Debug, Clone)]
pub struct OrderDates {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_date: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub boleto_expiry_date: Option<DateTime<Utc>>,
    pub pix_expiration: Option<DateTime<Utc>>,
    pub estimated_deposit_date: Option<DateTime<Utc>>,
    pub deposit_date: Option<DateTime<Utc>>,
}

/// Subscription part of an event once all required fields are known present.
#[derive(Debug, Clone)]
pub struct SubscriptionUpdate<'a> {
    pub id: &'a str,
    pub start_date: DateTime<Utc>,
    pub next_payment: DateTime<Utc>,
    pub status: &'a str,
    pub plan: &'a EventPlan,
}

impl OrderEvent {
    /// Parses every date field. Fails on the first malformed one.
    pub fn dates(&self) -> Result<OrderDates, String> {
        let commissions = self.commissions.as_ref();
        Ok(OrderDates {
            created_at: required_date("created_at", &self.created_at)?,
            updated_at: required_date("updated_at", &self.updated_at)?,
            approved_date: optional_date("approved_date", self.approved_date.as_deref())?,
            refunded_at: optional_date("refunded_at", self.refunded_at.as_deref())?,
            boleto_expiry_date: optional_date(
                "boleto_expiry_date",
                self.boleto_expiry_date.as_deref(),
            )?,
            pix_expiration: optional_date("pix_expiration", self.pix_expiration.as_deref())?,
            estimated_deposit_date: optional_date(
                "estimated_deposit_date",
                commissions.and_then(|c| c.estimated_deposit_date.as_deref()),
            )?,
            deposit_date: optional_date(
                "deposit_date",
                commissions.and_then(|c| c.deposit_date.as_deref()),
            )?,
        })
    }

    /// The subscription to upsert, when the event belongs to one.
    pub fn subscription_update(&self) -> Result<Option<SubscriptionUpdate<'_>>, String> {
        let Some(id) = self.subscription_id.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let sub = self
            .subscription
            .as_ref()
            .ok_or("subscription_id given without Subscription")?;
        let plan = sub.plan.as_ref().ok_or("Subscription.plan is required")?;
        let start_date = required_date(
            "Subscription.start_date",
            sub.start_date.as_deref().unwrap_or_default(),
        )?;
        let next_payment = required_date(
            "Subscription.next_payment",
            sub.next_payment.as_deref().unwrap_or_default(),
        )?;
        let status = sub
            .status
            .as_deref()
            .ok_or("Subscription.status is required")?;

        Ok(Some(SubscriptionUpdate {
            id,
            start_date,
            next_payment,
            status,
            plan,
        }))
    }

    /// Commission id named by the first commissioned store, if any.
    pub fn commission_id(&self) -> Option<&str> {
        self.commissions
            .as_ref()?
            .commissioned_stores
            .first()?
            .commission_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// Full check run before any database work.
    pub fn validate(&self) -> Result<(), String> {
        if self.order_ref.is_empty() {
            return Err("order_ref is required".into());
        }
        if self.customer.email.is_empty() {
            return Err("Customer.email is required".into());
        }
        self.dates()?;
        self.subscription_update()?;
        Ok(())
    }
}

/// Accepts RFC 3339 plus the bare `YYYY-MM-DD HH:MM[:SS]` and `YYYY-MM-DD`
/// forms the platform sends, all read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

fn required_date(field: &str, raw: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(raw).ok_or_else(|| format!("{} is not a valid date: {:?}", field, raw))
}

fn optional_date(field: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    match raw.filter(|r| !r.is_empty()) {
        Some(raw) => required_date(field, raw).map(Some),
        None => Ok(None),
    }
}

// -- lenient scalars --

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(de::Error::custom(format!("expected string, got {}", other))),
    }
}

fn required_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    lenient_string(d)?.ok_or_else(|| de::Error::custom("expected string, got null"))
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(0.0),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom("number out of range")),
        Value::String(s) if s.trim().is_empty() => Ok(0.0),
        Value::String(s) => s.trim().parse().map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("expected number, got {}", other))),
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| de::Error::custom("expected integer")),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse().map(Some).map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("expected integer, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub const SAMPLE: &str = r#"{
        "order_id": "a1b2",
        "order_ref": "Qx7Lp2",
        "order_status": "paid",
        "product_type": "membership",
        "payment_method": "credit_card",
        "store_id": "AbCdEf",
        "payment_merchant_id": 1234567,
        "installments": 1,
        "card_type": "mastercard",
        "card_last4digits": "4321",
        "card_rejection_reason": null,
        "boleto_URL": null,
        "boleto_barcode": null,
        "boleto_expiry_date": null,
        "pix_code": null,
        "pix_expiration": null,
        "sale_type": "producer",
        "created_at": "2024-03-01 10:20",
        "updated_at": "2024-03-01 10:21",
        "approved_date": "2024-03-01 10:21",
        "refunded_at": null,
        "webhook_event_type": "order_approved",
        "Product": { "product_id": "prod-1", "product_name": "Sticker Club" },
        "Customer": {
            "full_name": "Ana Souza",
            "first_name": "Ana",
            "email": "ana@example.com",
            "mobile": "+5511999999999",
            "CPF": "12345678900",
            "ip": "10.0.0.1"
        },
        "Commissions": {
            "charge_amount": "4990",
            "product_base_price": 4990,
            "kiwify_fee": "499",
            "commissioned_stores": [
                { "id": "st1", "type": "producer", "custom_name": "Me", "email": "me@x.com", "value": "4491", "commissionId": "com-1" }
            ],
            "currency": "BRL",
            "my_commission": 4491,
            "funds_status": null,
            "estimated_deposit_date": null,
            "deposit_date": null
        },
        "TrackingParameters": { "src": null, "utm_source": null },
        "Subscription": {
            "id": "sub-1",
            "start_date": "2024-03-01T10:21:00.000Z",
            "next_payment": "2024-04-01T10:21:00.000Z",
            "status": "active",
            "plan": { "id": "plan-1", "name": "Mensal", "frequency": "monthly", "qty_charges": 0 },
            "charges": { "completed": [], "future": [] }
        },
        "subscription_id": "sub-1",
        "access_url": null
    }"#;

    #[test]
    fn parses_platform_payload() {
        let event: OrderEvent = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(event.order_ref, "Qx7Lp2");
        assert_eq!(event.payment_merchant_id.as_deref(), Some("1234567"));
        assert_eq!(event.customer.cpf.as_deref(), Some("12345678900"));

        let commissions = event.commissions.as_ref().unwrap();
        assert_eq!(commissions.charge_amount, 4990.0);
        assert_eq!(commissions.kiwify_fee, 499.0);
        assert_eq!(event.commission_id(), Some("com-1"));

        event.validate().unwrap();
        let sub = event.subscription_update().unwrap().unwrap();
        assert_eq!(sub.id, "sub-1");
        assert_eq!(sub.plan.frequency, "monthly");
    }

    #[test]
    fn single_purchase_has_no_subscription() {
        let mut event: OrderEvent = serde_json::from_str(SAMPLE).unwrap();
        event.subscription_id = None;
        assert!(event.subscription_update().unwrap().is_none());
    }

    #[test]
    fn malformed_dates_fail_validation() {
        let mut event: OrderEvent = serde_json::from_str(SAMPLE).unwrap();
        event.created_at = "yesterday".into();
        assert!(event.validate().is_err());
    }

    #[test]
    fn timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 20, 0)
            .unwrap()
            .and_utc();
        assert_eq!(parse_timestamp("2024-03-01 10:20"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 10:20:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T10:20:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T07:20:00-03:00"), Some(expected));
        assert!(parse_timestamp("2024-03-01").is_some());
        assert!(parse_timestamp("01/03/2024").is_none());
    }
}
