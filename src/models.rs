use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// User id recorded on orders placed without a bearer token.
pub const GUEST_USER: &str = "guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Shape {
    Guitar,
    Piano,
    Cassette,
}

/// A purchasable lyric design. Immutable once the catalog is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Design {
    pub id: String,
    pub artist: String,
    pub song: String,
    pub shape: Shape,
    pub price: Decimal,
    pub formats: BTreeSet<String>,
    #[serde(default)]
    pub asset_paths: BTreeMap<String, String>,
}

impl Design {
    pub fn offers(&self, format: &str) -> bool {
        self.formats.contains(format)
    }

    /// Name shown to the customer and the payment processor.
    pub fn display_name(&self, format: &str) -> String {
        format!("{} - {} ({format})", self.artist, self.song)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub design_id: String,
    pub format: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartLineItem {
    pub fn matches(&self, design_id: &str, format: &str) -> bool {
        self.design_id == design_id && self.format == format
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Snapshot of an external checkout started from the session's cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCheckout {
    pub external_order_id: String,
    pub correlation_id: Uuid,
    pub items: Vec<CartLineItem>,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Everything kept for one session id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub items: Vec<CartLineItem>,
    #[serde(default)]
    pub checkout: Option<PendingCheckout>,
    /// External order ids this session has captured, newest last.
    #[serde(default)]
    pub captured: Vec<String>,
}

impl SessionData {
    const REMEMBERED_CAPTURES: usize = 8;

    /// Whether this session began the external checkout `external_order_id`.
    pub fn started_checkout(&self, external_order_id: &str) -> bool {
        self.checkout
            .as_ref()
            .is_some_and(|c| c.external_order_id == external_order_id)
            || self.captured.iter().any(|id| id == external_order_id)
    }

    pub fn remember_capture(&mut self, external_order_id: &str) {
        self.captured.retain(|id| id != external_order_id);
        self.captured.push(external_order_id.to_string());
        let overflow = self.captured.len().saturating_sub(Self::REMEMBERED_CAPTURES);
        self.captured.drain(..overflow);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub session_id: String,
    pub items: Vec<CartLineItem>,
    pub total: Decimal,
    pub item_count: u32,
}

impl Cart {
    /// Builds a cart view; totals are always derived from the lines.
    pub fn from_items(session_id: impl Into<String>, items: Vec<CartLineItem>) -> Self {
        let (total, item_count) = totals(&items);
        Self {
            session_id: session_id.into(),
            items,
            total,
            item_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Non-negative and representable in whole cents.
pub fn is_money(amount: Decimal) -> bool {
    amount >= Decimal::ZERO && amount.normalize().scale() <= 2
}

pub fn totals(items: &[CartLineItem]) -> (Decimal, u32) {
    items.iter().fold((Decimal::ZERO, 0), |(total, count), item| {
        (total + item.line_total(), count + item.quantity)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Fulfilled,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Forward-only: pending -> paid -> fulfilled, and pending|paid -> cancelled.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Paid, OrderStatus::Fulfilled)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Paid, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "fulfilled" => Ok(OrderStatus::Fulfilled),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("invalid order status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub items: Vec<CartLineItem>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub payment_method: String,
    pub payment_transaction_id: Option<String>,
    pub external_order_id: Option<String>,
    pub customer_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Permission to download one purchased (design, format) unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadGrant {
    pub id: Uuid,
    pub design_id: String,
    pub format: String,
    pub order_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl DownloadGrant {
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && now < self.expires_at
    }
}

/// Everything needed to record an order from a captured payment.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: String,
    pub items: Vec<CartLineItem>,
    pub status: OrderStatus,
    pub payment_method: String,
    pub payment_transaction_id: String,
    pub external_order_id: Option<String>,
    pub customer_email: Option<String>,
}

/// A registered account. Guests never get a row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}
