//! # Order State Machine
//!
//! Order types plus the single table that decides which status changes are
//! legal and what each one does.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │            start_processing                deliver                      │
//! │    ┌─────┐ ─────────────────► ┌────────────┐ ─────────► ┌───────────┐  │
//! │    │ new │                    │ processing │            │ delivered │  │
//! │    └─────┘ ──────────────────────────────────────────►  └───────────┘  │
//! │       │               deliver      │                      (terminal)    │
//! │       │ cancel                     │ cancel                             │
//! │       ▼                            ▼                                    │
//! │    ┌──────────────────────────────────┐                                │
//! │    │ cancelled  (record is deleted)   │  (terminal)                    │
//! │    └──────────────────────────────────┘                                │
//! │                                                                         │
//! │  deliver side effects: one order-sourced Sale, deliveredAt, loyalty     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Illegal transitions are rejected in exactly one place: [`transition`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{DeliveryDetails, SaleLine};

// =============================================================================
// Order Status
// =============================================================================

/// The status of an order.
///
/// `Cancelled` is only ever a transition target: cancelling deletes the
/// order, so no stored order carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Processing,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Returns the storage/wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Processing => "processing",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::New
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(OrderStatus::New),
            "processing" => Ok(OrderStatus::Processing),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            _ => Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: vec![
                    "new".to_string(),
                    "processing".to_string(),
                    "delivered".to_string(),
                    "cancelled".to_string(),
                ],
            }),
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// A line item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: i64,
    /// Product name at time of ordering (frozen).
    pub name_snapshot: String,
}

/// A storefront order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub telegram: Option<String>,
    pub items: Vec<OrderItem>,
    pub total_price: Money,
    pub status: OrderStatus,
    pub delivery: DeliveryDetails,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Collapses the items into one sale line per product.
    ///
    /// Lines keep the order in which each product first appears.
    pub fn sale_lines(&self) -> Vec<SaleLine> {
        let mut lines: Vec<SaleLine> = Vec::new();
        for item in &self.items {
            match lines.iter_mut().find(|l| l.product_id == item.product_id) {
                Some(line) => line.quantity += item.quantity,
                None => lines.push(SaleLine {
                    product_id: item.product_id.clone(),
                    product_name: item.name_snapshot.clone(),
                    quantity: item.quantity,
                }),
            }
        }
        lines
    }

    /// Total units across all items.
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

// =============================================================================
// Transition Table
// =============================================================================

/// Something an operator can do to an order's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    StartProcessing,
    Deliver,
    Cancel,
}

impl OrderEvent {
    /// Maps a requested target status onto the event that reaches it.
    ///
    /// `new` is never a valid target.
    pub fn for_target(order_id: &str, from: OrderStatus, to: OrderStatus) -> CoreResult<Self> {
        match to {
            OrderStatus::Processing => Ok(OrderEvent::StartProcessing),
            OrderStatus::Delivered => Ok(OrderEvent::Deliver),
            OrderStatus::Cancelled => Ok(OrderEvent::Cancel),
            OrderStatus::New => Err(CoreError::InvalidTransition {
                order_id: order_id.to_string(),
                from,
                to,
            }),
        }
    }
}

/// What the engine must do when a transition fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    /// Only the status field changes.
    StatusOnly,
    /// Consume stock through one order-sourced sale and update loyalty.
    RecordSale,
    /// Remove the order record.
    DeleteOrder,
}

/// One edge of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub event: OrderEvent,
    pub to: OrderStatus,
    pub effect: TransitionEffect,
}

/// Every legal edge. Anything not listed is an `InvalidTransition`.
pub const TRANSITIONS: &[Transition] = &[
    Transition {
        from: OrderStatus::New,
        event: OrderEvent::StartProcessing,
        to: OrderStatus::Processing,
        effect: TransitionEffect::StatusOnly,
    },
    Transition {
        from: OrderStatus::New,
        event: OrderEvent::Deliver,
        to: OrderStatus::Delivered,
        effect: TransitionEffect::RecordSale,
    },
    Transition {
        from: OrderStatus::Processing,
        event: OrderEvent::Deliver,
        to: OrderStatus::Delivered,
        effect: TransitionEffect::RecordSale,
    },
    Transition {
        from: OrderStatus::New,
        event: OrderEvent::Cancel,
        to: OrderStatus::Cancelled,
        effect: TransitionEffect::DeleteOrder,
    },
    Transition {
        from: OrderStatus::Processing,
        event: OrderEvent::Cancel,
        to: OrderStatus::Cancelled,
        effect: TransitionEffect::DeleteOrder,
    },
];

/// Looks up the edge for `event` fired at an order in status `from`.
///
/// ## Example
/// ```rust
/// use medstock_core::order::{transition, OrderEvent, OrderStatus, TransitionEffect};
///
/// let t = transition("o-1", OrderStatus::New, OrderEvent::Deliver).unwrap();
/// assert_eq!(t.to, OrderStatus::Delivered);
/// assert_eq!(t.effect, TransitionEffect::RecordSale);
///
/// assert!(transition("o-1", OrderStatus::Delivered, OrderEvent::Cancel).is_err());
/// ```
pub fn transition(order_id: &str, from: OrderStatus, event: OrderEvent) -> CoreResult<Transition> {
    TRANSITIONS
        .iter()
        .find(|t| t.from == from && t.event == event)
        .copied()
        .ok_or_else(|| CoreError::InvalidTransition {
            order_id: order_id.to_string(),
            from,
            to: target_of(event),
        })
}

/// Statuses from which `event` may fire, used to key conditional writes.
pub fn sources_of(event: OrderEvent) -> Vec<OrderStatus> {
    TRANSITIONS
        .iter()
        .filter(|t| t.event == event)
        .map(|t| t.from)
        .collect()
}

fn target_of(event: OrderEvent) -> OrderStatus {
    match event {
        OrderEvent::StartProcessing => OrderStatus::Processing,
        OrderEvent::Deliver => OrderStatus::Delivered,
        OrderEvent::Cancel => OrderStatus::Cancelled,
    }
}

/// Rejects edits to an order that has been delivered.
pub fn ensure_editable(order: &Order, field: &str) -> CoreResult<()> {
    if order.status == OrderStatus::Delivered {
        return Err(CoreError::immutable(
            "Order",
            &order.id,
            field,
            "cannot modify a delivered order",
        ));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
