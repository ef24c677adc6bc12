//! Row types and column lists. Each `*_COLUMNS` constant matches the index
//! order read by the corresponding `from_row` function.

use catalog_types::models::{
    Asset, AssetKind, Attachment, Category, Commission, Customer, Order, Plan, Product, Role,
    Sticker, Subniche, Subscription, User,
};
use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

/// Prefixes every column of a `*_COLUMNS` list with a table alias.
pub fn aliased(columns: &str, alias: &str) -> String {
    columns
        .split(", ")
        .map(|c| format!("{}.{}", alias, c))
        .collect::<Vec<_>>()
        .join(", ")
}

// -- Users --

pub const USER_COLUMNS: &str = "id, email, name, password, role, is_email_verified, first_access, \
status, is_manually_created, expiration_date, avatar_id, created_at, updated_at";

/// A user row including the password hash, which never leaves this crate's callers
/// except for verification.
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub password: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub first_access: bool,
    pub status: bool,
    pub is_manually_created: bool,
    pub expiration_date: Option<DateTime<Utc>>,
    pub avatar_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let role: String = row.get(4)?;
        let role = role
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?;
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            password: row.get(3)?,
            role,
            is_email_verified: row.get(5)?,
            first_access: row.get(6)?,
            status: row.get(7)?,
            is_manually_created: row.get(8)?,
            expiration_date: row.get(9)?,
            avatar_id: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    /// Active and not past its expiration date.
    pub fn can_sign_in(&self, now: DateTime<Utc>) -> bool {
        self.status && self.expiration_date.is_none_or(|exp| exp > now)
    }

    pub fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            role: self.role,
            is_email_verified: self.is_email_verified,
            first_access: self.first_access,
            status: self.status,
            is_manually_created: self.is_manually_created,
            expiration_date: self.expiration_date,
            avatar_id: self.avatar_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            avatar: None,
            subscription: None,
            order_status: None,
        }
    }
}

// -- Tokens --

pub struct TokenRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub expires: DateTime<Utc>,
    pub blacklisted: bool,
}

impl TokenRow {
    /// Reads `id, user_id, kind, expires, blacklisted`.
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            expires: row.get(3)?,
            blacklisted: row.get(4)?,
        })
    }
}

// -- Attachments --

pub const ATTACHMENT_COLUMNS: &str =
    "id, filename, filetype, filesize, url, user_id, created_at, updated_at";

pub fn attachment_from_row(row: &Row) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        filename: row.get(1)?,
        filetype: row.get(2)?,
        filesize: row.get(3)?,
        url: row.get(4)?,
        user_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

// -- Catalog --

pub const CATEGORY_COLUMNS: &str =
    "id, name, attachment_id, is_important, display_order, created_at, updated_at";

pub fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        attachment_id: row.get(2)?,
        is_important: row.get(3)?,
        display_order: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        attachment: None,
        subniches: None,
    })
}

pub const SUBNICHE_COLUMNS: &str =
    "id, name, category_id, attachment_id, is_important, display_order, created_at, updated_at";

pub fn subniche_from_row(row: &Row) -> rusqlite::Result<Subniche> {
    Ok(Subniche {
        id: row.get(0)?,
        name: row.get(1)?,
        category_id: row.get(2)?,
        attachment_id: row.get(3)?,
        is_important: row.get(4)?,
        display_order: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        category: None,
        attachment: None,
    })
}

pub const STICKER_COLUMNS: &str = "id, name, attachment_id, category_id, subniche_id, user_id, \
is_user_created, created_at, updated_at";

pub fn sticker_from_row(row: &Row) -> rusqlite::Result<Sticker> {
    Ok(Sticker {
        id: row.get(0)?,
        name: row.get(1)?,
        attachment_id: row.get(2)?,
        category_id: row.get(3)?,
        subniche_id: row.get(4)?,
        user_id: row.get(5)?,
        is_user_created: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        attachment: None,
        category: None,
        subniche: None,
        translations: Vec::new(),
        is_favorite: None,
    })
}

// -- Assets --

pub fn asset_columns(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Tutorial => {
            "id, name, attachment_id, is_important, display_order, created_at, updated_at, youtube_link"
        }
        _ => "id, name, attachment_id, is_important, display_order, created_at, updated_at",
    }
}

pub fn asset_from_row(kind: AssetKind, row: &Row) -> rusqlite::Result<Asset> {
    let youtube_link = match kind {
        AssetKind::Tutorial => row.get(7)?,
        _ => None,
    };
    Ok(Asset {
        id: row.get(0)?,
        name: row.get(1)?,
        youtube_link,
        attachment_id: row.get(2)?,
        is_important: row.get(3)?,
        display_order: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        attachment: None,
    })
}

// -- Commerce --

pub const CUSTOMER_COLUMNS: &str = "email, full_name, first_name, mobile, cpf, ip";

pub fn customer_from_row(row: &Row) -> rusqlite::Result<Customer> {
    Ok(Customer {
        email: row.get(0)?,
        full_name: row.get(1)?,
        first_name: row.get(2)?,
        mobile: row.get(3)?,
        cpf: row.get(4)?,
        ip: row.get(5)?,
    })
}

pub fn product_from_row(row: &Row) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

pub const PLAN_COLUMNS: &str = "id, name, frequency, qty_charges";

/// Reads a plan whose columns start at `offset`, for use after a join.
pub fn plan_from_row(row: &Row, offset: usize) -> rusqlite::Result<Plan> {
    Ok(Plan {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        frequency: row.get(offset + 2)?,
        qty_charges: row.get(offset + 3)?,
    })
}

pub const SUBSCRIPTION_COLUMNS: &str = "id, start_date, next_payment, status, plan_id";

pub fn subscription_from_row(row: &Row) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        start_date: row.get(1)?,
        next_payment: row.get(2)?,
        status: row.get(3)?,
        plan_id: row.get(4)?,
        plan: None,
    })
}

pub const COMMISSION_COLUMNS: &str = "id, charge_amount, product_base_price, platform_fee, \
my_commission, currency, funds_status, estimated_deposit_date, deposit_date";

pub fn commission_from_row(row: &Row) -> rusqlite::Result<Commission> {
    Ok(Commission {
        id: row.get(0)?,
        charge_amount: row.get(1)?,
        product_base_price: row.get(2)?,
        platform_fee: row.get(3)?,
        my_commission: row.get(4)?,
        currency: row.get(5)?,
        funds_status: row.get(6)?,
        estimated_deposit_date: row.get(7)?,
        deposit_date: row.get(8)?,
    })
}

pub const ORDER_COLUMNS: &str = "id, order_ref, order_status, product_type, payment_method, \
store_id, payment_merchant_id, installments, card_type, card_last4_digits, card_rejection_reason, \
boleto_url, boleto_barcode, boleto_expiry_date, pix_code, pix_expiration, sale_type, \
approved_date, refunded_at, webhook_event_type, user_id, product_id, customer_email, \
subscription_id, commission_id, created_at, updated_at";

pub fn order_from_row(row: &Row) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        order_ref: row.get(1)?,
        order_status: row.get(2)?,
        product_type: row.get(3)?,
        payment_method: row.get(4)?,
        store_id: row.get(5)?,
        payment_merchant_id: row.get(6)?,
        installments: row.get(7)?,
        card_type: row.get(8)?,
        card_last4_digits: row.get(9)?,
        card_rejection_reason: row.get(10)?,
        boleto_url: row.get(11)?,
        boleto_barcode: row.get(12)?,
        boleto_expiry_date: row.get(13)?,
        pix_code: row.get(14)?,
        pix_expiration: row.get(15)?,
        sale_type: row.get(16)?,
        approved_date: row.get(17)?,
        refunded_at: row.get(18)?,
        webhook_event_type: row.get(19)?,
        user_id: row.get(20)?,
        product_id: row.get(21)?,
        customer_email: row.get(22)?,
        subscription_id: row.get(23)?,
        commission_id: row.get(24)?,
        created_at: row.get(25)?,
        updated_at: row.get(26)?,
        product: None,
        customer: None,
        commission: None,
        subscription: None,
    })
}
