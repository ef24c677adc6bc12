use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Users --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    /// Case-insensitive: `?role=admin` and `ADMIN` both resolve.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("Invalid role: {}", other)),
        }
    }
}

/// A user as exposed over the API. The password hash never leaves the DB layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub is_email_verified: bool,
    pub first_access: bool,
    pub status: bool,
    pub is_manually_created: bool,
    pub expiration_date: Option<DateTime<Utc>>,
    pub avatar_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<String>,
}

/// Subscription state derived from a user's orders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub status: String,
    pub start_date: DateTime<Utc>,
    pub next_payment: DateTime<Utc>,
    pub plan_name: String,
    pub frequency: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub orders: Vec<Order>,
    pub favorites: Vec<FavoriteSticker>,
    pub stickers: Vec<Sticker>,
}

// -- Attachments --

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub filetype: String,
    pub filesize: i64,
    pub url: String,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Catalog hierarchy --

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub attachment_id: Option<String>,
    pub is_important: bool,
    pub display_order: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subniches: Option<Vec<Subniche>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subniche {
    pub id: String,
    pub name: String,
    pub category_id: String,
    pub attachment_id: Option<String>,
    pub is_important: bool,
    pub display_order: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Box<Category>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StickerTranslation {
    pub id: String,
    pub language: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sticker {
    pub id: String,
    pub name: Option<String>,
    pub attachment_id: String,
    pub category_id: Option<String>,
    pub subniche_id: Option<String>,
    pub user_id: Option<String>,
    pub is_user_created: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subniche: Option<Subniche>,
    pub translations: Vec<StickerTranslation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteSticker {
    pub id: String,
    pub user_id: String,
    pub sticker_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sticker: Option<Sticker>,
}

// -- Fonts, icons, tutorials --

/// The three flat asset collections share one shape; tutorials add a video link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Font,
    Icon,
    Tutorial,
}

impl AssetKind {
    pub fn table(&self) -> &'static str {
        match self {
            AssetKind::Font => "fonts",
            AssetKind::Icon => "icons",
            AssetKind::Tutorial => "tutorials",
        }
    }

    /// Key under which paged listings are returned.
    pub fn plural(&self) -> &'static str {
        self.table()
    }

    pub fn label(&self) -> &'static str {
        match self {
            AssetKind::Font => "Font",
            AssetKind::Icon => "Icon",
            AssetKind::Tutorial => "Tutorial",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_link: Option<String>,
    pub attachment_id: Option<String>,
    pub is_important: bool,
    pub display_order: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

// -- Commerce --

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub email: String,
    pub full_name: String,
    pub first_name: Option<String>,
    pub mobile: Option<String>,
    pub cpf: String,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub frequency: String,
    pub qty_charges: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub start_date: DateTime<Utc>,
    pub next_payment: DateTime<Utc>,
    pub status: String,
    pub plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub id: String,
    pub charge_amount: f64,
    pub product_base_price: f64,
    pub platform_fee: f64,
    pub my_commission: f64,
    pub currency: String,
    pub funds_status: Option<String>,
    pub estimated_deposit_date: Option<DateTime<Utc>>,
    pub deposit_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_ref: String,
    pub order_status: String,
    pub product_type: Option<String>,
    pub payment_method: Option<String>,
    pub store_id: Option<String>,
    pub payment_merchant_id: Option<String>,
    pub installments: Option<i64>,
    pub card_type: Option<String>,
    pub card_last4_digits: Option<String>,
    pub card_rejection_reason: Option<String>,
    #[serde(rename = "boletoURL")]
    pub boleto_url: Option<String>,
    pub boleto_barcode: Option<String>,
    pub boleto_expiry_date: Option<DateTime<Utc>>,
    pub pix_code: Option<String>,
    pub pix_expiration: Option<DateTime<Utc>>,
    pub sale_type: Option<String>,
    pub approved_date: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub webhook_event_type: Option<String>,
    pub user_id: String,
    pub product_id: String,
    pub customer_email: String,
    pub subscription_id: Option<String>,
    pub commission_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<Commission>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatus {
    pub start_date: DateTime<Utc>,
    pub next_payment: DateTime<Utc>,
    pub status: String,
    pub plan_type: String,
    pub total_charges: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("USER".parse::<Role>(), Ok(Role::User));
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn user_serializes_camel_case_without_empty_relations() {
        let now = Utc::now();
        let user = User {
            id: "u1".into(),
            email: "a@b.com".into(),
            name: None,
            role: Role::Admin,
            is_email_verified: false,
            first_access: true,
            status: true,
            is_manually_created: false,
            expiration_date: None,
            avatar_id: None,
            created_at: now,
            updated_at: now,
            avatar: None,
            subscription: None,
            order_status: Some("paid".into()),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["role"], "ADMIN");
        assert_eq!(json["isEmailVerified"], false);
        assert_eq!(json["orderStatus"], "paid");
        assert!(json.get("avatar").is_none());
        assert!(json.get("password").is_none());
    }
}
