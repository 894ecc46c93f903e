//! # medstock-core: Pure Bookkeeping Rules for MedStock
//!
//! This crate holds the bookkeeping rules of the MedStock storefront as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        MedStock Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              admin-cli / admin console / storefront             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    medstock-engine                              │   │
//! │  │    set_order_status, create_purchase, get_monthly_finance ...   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ medstock-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │ ledger  │ │  order  │ │ loyalty │ │ finance │ │  money  │  │   │
//! │  │   │  stock  │ │  state  │ │  tiers  │ │ monthly │ │  Money  │  │   │
//! │  │   │  fold   │ │ machine │ │         │ │ buckets │ │         │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK READS • PURE FUNCTIONS        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  medstock-db (Database Layer)                   │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, Purchase, Sale, CustomerProfile, settings)
//! - [`order`] - Order types and the status transition table
//! - [`ledger`] - Stock derived from purchases and sales
//! - [`loyalty`] - VIP tier resolution
//! - [`finance`] - Monthly aggregates in the business timezone
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input rules
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: callers pass `now` and the timezone in
//! 2. **Derived, not stored**: stock is always recomputed from the ledger
//! 3. **Integer Money**: all amounts are kopecks (i64)
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use medstock_core::ledger::{check_order_against_stock, compute_stock};
//! use medstock_core::order::OrderItem;
//!
//! let stock = compute_stock(&[], &[], &[]);
//! let items = vec![OrderItem {
//!     product_id: "libre-2".to_string(),
//!     quantity: 1,
//!     name_snapshot: "FreeStyle Libre 2".to_string(),
//! }];
//! let shortages = check_order_against_stock(&items, &stock);
//! assert_eq!(shortages[0].available, 0);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod finance;
pub mod ledger;
pub mod loyalty;
pub mod money;
pub mod order;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use finance::{MonthKey, MonthlySummary};
pub use ledger::{Shortage, StockEntry, StockReport};
pub use loyalty::LoyaltyTier;
pub use money::Money;
pub use order::{Order, OrderEvent, OrderItem, OrderStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Timezone that defines business days and months.
pub const DEFAULT_BUSINESS_TZ: chrono_tz::Tz = chrono_tz::Europe::Moscow;

/// Default number of months in the finance series.
pub const DEFAULT_FINANCE_WINDOW: u32 = 6;

/// Longest finance series an operator may request (ten years).
pub const MAX_FINANCE_WINDOW: u32 = 120;

/// Maximum quantity of a single order item.
///
/// ## Business Reason
/// Catches typos at checkout (1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum quantity of one purchase or sale record.
pub const MAX_EVENT_QUANTITY: i64 = 100_000;

/// Largest amount one record may carry (1 000 000 000 ₽ in kopecks).
///
/// ## Business Reason
/// Keeps monthly and lifetime sums far from the i64 limit.
pub const MAX_AMOUNT: Money = Money::from_major_minor(1_000_000_000, 0);

/// Maximum line items in one order.
pub const MAX_ORDER_ITEMS: usize = 100;

/// Maximum length of a ledger comment.
pub const MAX_COMMENT_LEN: usize = 500;
