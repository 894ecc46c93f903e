//! # Error Types
//!
//! Domain-specific error types for medstock-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  medstock-core errors (this file)                                       │
//! │  ├── CoreError        - Business rule violations                        │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  medstock-db errors (separate crate)                                    │
//! │  └── DbError          - Storage failures (retryable by the caller)      │
//! │                                                                         │
//! │  medstock-engine errors                                                 │
//! │  └── EngineError      - Rule(CoreError) | Storage(DbError)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → ErrorReport → UI     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Carry the offending entity so a UI can render a specific message
//! 3. Errors are enum variants, never String
//! 4. Every variant here is recoverable and caller-facing

use thiserror::Error;

use crate::ledger::Shortage;
use crate::order::OrderStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business rule errors.
///
/// These are recoverable: the engine reports them to the operator and the
/// record store is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Delivery blocked because stock does not cover the order.
    ///
    /// ## User Workflow
    /// ```text
    /// Operator clicks "Delivered" on order #A1
    ///      │
    ///      ▼
    /// Stock check (inside the delivery transaction)
    ///      │
    ///      ▼
    /// InsufficientStock { shortages: [Libre 2: need 5, have 2] }
    ///      │
    ///      ▼
    /// UI lists every short product with its available quantity
    /// ```
    #[error("Insufficient stock for order {order_id}: {}", format_shortages(.shortages))]
    InsufficientStock {
        order_id: String,
        shortages: Vec<Shortage>,
    },

    /// The order status machine has no edge for the requested change.
    ///
    /// ## When This Occurs
    /// - Cancelling a delivered order
    /// - Any transition out of a terminal state
    /// - Moving a processing order back to processing
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The record may not be changed.
    ///
    /// ## When This Occurs
    /// - Editing a delivered order
    /// - Editing or deleting a sale generated by an order
    #[error("{entity} {id}: {field} cannot change: {reason}")]
    ImmutableRecord {
        entity: String,
        id: String,
        field: String,
        reason: String,
    },

    /// Unknown order/product/customer/purchase/sale id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Banned customers cannot place orders.
    #[error("Customer {customer_id} is banned")]
    CustomerBanned { customer_id: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates an ImmutableRecord error.
    pub fn immutable(
        entity: impl Into<String>,
        id: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::ImmutableRecord {
            entity: entity.into(),
            id: id.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}

fn format_shortages(shortages: &[Shortage]) -> String {
    shortages
        .iter()
        .map(|s| {
            format!(
                "{} (required {}, available {})",
                s.product_name, s.required, s.available
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when operator or checkout input doesn't meet
/// requirements. Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., duplicate delivery service name).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_lists_every_product() {
        let err = CoreError::InsufficientStock {
            order_id: "o-1".to_string(),
            shortages: vec![
                Shortage {
                    product_id: "p-1".to_string(),
                    product_name: "Libre 2".to_string(),
                    required: 5,
                    available: 2,
                },
                Shortage {
                    product_id: "p-2".to_string(),
                    product_name: "Dexcom G6".to_string(),
                    required: 1,
                    available: 0,
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for order o-1: Libre 2 (required 5, available 2); \
             Dexcom G6 (required 1, available 0)"
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = CoreError::InvalidTransition {
            order_id: "o-9".to_string(),
            from: OrderStatus::Delivered,
            to: OrderStatus::Cancelled,
        };
        assert_eq!(err.to_string(), "Order o-9 cannot move from delivered to cancelled");
    }

    #[test]
    fn test_immutable_message() {
        let err = CoreError::immutable("Order", "o-1", "items", "order has been delivered");
        assert_eq!(
            err.to_string(),
            "Order o-1: items cannot change: order has been delivered"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "product_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
