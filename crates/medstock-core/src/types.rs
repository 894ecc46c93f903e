//! # Domain Types
//!
//! Core record types shared by the ledger, the loyalty rules and the store.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    Purchase     │   │      Sale       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  product_id     │   │  lines[]        │       │
//! │  │  name           │   │  quantity  (+)  │   │  quantity  (−)  │       │
//! │  │  price          │   │  total_amount   │   │  source_type    │       │
//! │  │  cost_price     │   │  date           │   │  source_id      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ CustomerProfile │   │ SettingsConfig  │   │ DeliveryDetails │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  loyalty_level  │   │  vip_tiers[3]   │   │  method         │       │
//! │  │  purchases_count│   │  delivery svc   │   │  service        │       │
//! │  │  total_spent    │   │  form fields    │   │  city           │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Purchases, sale lines and order items copy the product name at the time
//! of the event. The ledger uses it as a display name when the product has
//! since been deleted from the catalog.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A sensor (or accessory) listed in the storefront catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown in the catalog and on orders.
    pub name: String,

    /// Unit price before the product discount.
    pub price: Money,

    /// Product-level discount in whole percent (0-100).
    pub discount_percent: u8,

    /// What one unit costs the business to buy.
    pub cost_price: Money,

    /// Whether the product is listed in the catalog.
    pub is_active: bool,

    /// Storefront availability flag set by catalog management.
    pub in_stock: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Unit price after the product discount.
    #[inline]
    pub fn discounted_price(&self) -> Money {
        self.price.apply_percent_discount(self.discount_percent)
    }

    /// Gross margin of one unit at the discounted price.
    #[inline]
    pub fn unit_margin(&self) -> Money {
        self.discounted_price() - self.cost_price
    }
}

// =============================================================================
// Purchase (stock-in)
// =============================================================================

/// A stock-in event entered by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Purchase {
    pub id: String,
    pub product_id: String,
    /// Product name at time of entry (frozen).
    pub product_name: String,
    /// Units received, always positive.
    pub quantity: i64,
    /// What the whole batch cost.
    pub total_amount: Money,
    /// Business date (Moscow calendar day). Back-dating is common.
    #[ts(as = "Option<String>")]
    pub date: Option<NaiveDate>,
    pub comment: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Sale (stock-out)
// =============================================================================

/// Where a sale record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleSource {
    /// Entered by an operator; freely editable.
    Manual,
    /// Generated by an order reaching `delivered`; owned by that order.
    Order,
}

impl SaleSource {
    /// Returns the storage/wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleSource::Manual => "manual",
            SaleSource::Order => "order",
        }
    }
}

impl std::fmt::Display for SaleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One product line of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub product_name: String,
    pub quantity: i64,
}

/// A stock-out event.
///
/// Manual sales always have exactly one line. A sale generated by an order
/// has one line per distinct product of that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub lines: Vec<SaleLine>,
    pub total_amount: Money,
    #[ts(as = "Option<String>")]
    pub date: Option<NaiveDate>,
    pub source_type: SaleSource,
    /// Originating order id when `source_type` is `order`.
    pub source_id: Option<String>,
    pub comment: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    /// Total units across all lines.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Whether the sale was generated by an order.
    #[inline]
    pub fn is_order_sourced(&self) -> bool {
        self.source_type == SaleSource::Order
    }
}

// =============================================================================
// Delivery
// =============================================================================

/// How an order reaches the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// Customer collects the order.
    #[default]
    Pickup,
    /// Own courier within the city.
    Courier,
    /// A third-party delivery service listed in settings.
    Service,
}

/// Delivery fields of an order. Frozen once the order is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeliveryDetails {
    pub method: DeliveryMethod,
    /// Delivery service name, required when `method` is `service`.
    pub service: Option<String>,
    pub city: Option<String>,
}

// =============================================================================
// Customer Profile
// =============================================================================

/// A storefront customer with cached loyalty fields.
///
/// ## Cached Fields
/// `loyalty_level`, `loyalty_discount`, `purchases_count` and `total_spent`
/// are derived from delivered orders. They are persisted for fast reads and
/// recomputed only by the delivered transition (or on operator request).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerProfile {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    /// VIP level 0-3.
    pub loyalty_level: u8,
    /// Discount percent granted by the level (or pinned by an operator).
    pub loyalty_discount: u8,
    /// Set when an operator pinned `loyalty_discount` by hand.
    pub discount_overridden: bool,
    /// Orders that reached `delivered`.
    pub purchases_count: i64,
    /// Sum of delivered order totals.
    pub total_spent: Money,
    pub is_banned: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Settings
// =============================================================================

/// One VIP tier threshold row.
///
/// A customer qualifies when EITHER threshold is reached. An unset
/// threshold never qualifies anyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VipTier {
    /// 1, 2 or 3.
    pub level: u8,
    /// Delivered orders needed.
    pub orders_from: Option<i64>,
    /// Cumulative spend needed.
    pub spent_from: Option<Money>,
    pub discount_percent: u8,
    pub label: String,
}

/// A field shown on the storefront order form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderFormField {
    pub key: String,
    pub label: String,
    pub required: bool,
}

/// The singleton settings record, edited by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettingsConfig {
    pub vip_tiers: Vec<VipTier>,
    pub delivery_services: Vec<String>,
    pub order_form_fields: Vec<OrderFormField>,
    /// Keep an operator-pinned discount across automatic tier recomputes.
    #[serde(default)]
    pub keep_manual_discount: bool,
}

impl SettingsConfig {
    /// Returns the tier row for a level, if configured.
    pub fn tier(&self, level: u8) -> Option<&VipTier> {
        self.vip_tiers.iter().find(|t| t.level == level)
    }

    /// Whether `name` is one of the configured delivery services.
    pub fn has_delivery_service(&self, name: &str) -> bool {
        self.delivery_services.iter().any(|s| s == name)
    }
}

impl Default for SettingsConfig {
    /// Tier thresholds the storefront launched with.
    fn default() -> Self {
        SettingsConfig {
            vip_tiers: vec![
                VipTier {
                    level: 1,
                    orders_from: Some(3),
                    spent_from: Some(Money::from_major_minor(30_000, 0)),
                    discount_percent: 5,
                    label: "VIP 1".to_string(),
                },
                VipTier {
                    level: 2,
                    orders_from: Some(6),
                    spent_from: Some(Money::from_major_minor(70_000, 0)),
                    discount_percent: 10,
                    label: "VIP 2".to_string(),
                },
                VipTier {
                    level: 3,
                    orders_from: Some(12),
                    spent_from: Some(Money::from_major_minor(150_000, 0)),
                    discount_percent: 15,
                    label: "VIP 3".to_string(),
                },
            ],
            delivery_services: vec![
                "CDEK".to_string(),
                "Russian Post".to_string(),
                "Boxberry".to_string(),
            ],
            order_form_fields: vec![
                OrderFormField {
                    key: "name".to_string(),
                    label: "Full name".to_string(),
                    required: true,
                },
                OrderFormField {
                    key: "phone".to_string(),
                    label: "Phone".to_string(),
                    required: true,
                },
                OrderFormField {
                    key: "telegram".to_string(),
                    label: "Telegram".to_string(),
                    required: false,
                },
                OrderFormField {
                    key: "city".to_string(),
                    label: "City".to_string(),
                    required: false,
                },
            ],
            keep_manual_discount: false,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
