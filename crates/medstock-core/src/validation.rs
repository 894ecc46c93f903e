//! # Validation Module
//!
//! Input validation for operator and checkout input.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Admin console / storefront form                               │
//! │  ├── Basic format checks (empty, length)                                │
//! │  └── Immediate user feedback                                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engine operation (Rust)                                       │
//! │  ├── Type validation (deserialization)                                  │
//! │  └── THIS MODULE: field rules, settings consistency                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── NOT NULL / CHECK constraints                                       │
//! │  └── One order-sourced sale per order (partial UNIQUE index)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use medstock_core::validation::{validate_product_name, validate_quantity};
//!
//! validate_product_name("FreeStyle Libre 2").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use chrono::NaiveDate;
use std::collections::HashSet;

use crate::error::ValidationError;
use crate::loyalty::MAX_LOYALTY_LEVEL;
use crate::money::Money;
use crate::order::OrderItem;
use crate::types::{DeliveryDetails, DeliveryMethod, SettingsConfig};
use crate::{
    MAX_AMOUNT, MAX_COMMENT_LEN, MAX_EVENT_QUANTITY, MAX_FINANCE_WINDOW, MAX_ITEM_QUANTITY, MAX_ORDER_ITEMS,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product name.
///
/// ## Rules
/// - Must not be empty
/// - Must be between 1 and 200 characters
///
/// ## Example
/// ```rust
/// use medstock_core::validation::validate_product_name;
///
/// assert!(validate_product_name("Dexcom G7").is_ok());
/// assert!(validate_product_name("").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    validate_text("name", name, 200)
}

/// Validates a customer name.
pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    validate_text("customer name", name, 200)
}

/// Validates a free-text comment. Absent comments are fine.
pub fn validate_comment(comment: Option<&str>) -> ValidationResult<()> {
    match comment {
        Some(c) if c.chars().count() > MAX_COMMENT_LEN => Err(ValidationError::TooLong {
            field: "comment".to_string(),
            max: MAX_COMMENT_LEN,
        }),
        _ => Ok(()),
    }
}

/// Validates an optional Telegram contact (`@handle` or bare handle).
///
/// ## Rules
/// - 5 to 32 characters after the optional leading `@`
/// - Latin letters, digits and underscores only
pub fn validate_telegram(contact: Option<&str>) -> ValidationResult<()> {
    let Some(raw) = contact else {
        return Ok(());
    };
    let handle = raw.trim().trim_start_matches('@');
    let len = handle.chars().count();
    if !(5..=32).contains(&len) {
        return Err(ValidationError::InvalidFormat {
            field: "telegram".to_string(),
            reason: "handle must be 5 to 32 characters".to_string(),
        });
    }
    if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidFormat {
            field: "telegram".to_string(),
            reason: "only letters, digits and underscores".to_string(),
        });
    }
    Ok(())
}

/// Validates a required identifier that refers to another record.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates the quantity of one order item.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    validate_positive_bounded("quantity", qty, MAX_ITEM_QUANTITY)
}

/// Validates the quantity of a purchase or sale line.
///
/// Stock-in batches can be larger than anything a customer orders.
pub fn validate_event_quantity(qty: i64) -> ValidationResult<()> {
    validate_positive_bounded("quantity", qty, MAX_EVENT_QUANTITY)
}

fn validate_positive_bounded(field: &str, value: i64, max: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    if value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max,
        });
    }

    Ok(())
}

/// Validates a money amount. Zero is allowed (gifted units, free samples).
///
/// ## Rules
/// - Must not be negative
/// - Must not exceed MAX_AMOUNT (1 000 000 000 ₽)
///
/// ## Example
/// ```rust
/// use medstock_core::money::Money;
/// use medstock_core::validation::validate_amount;
///
/// assert!(validate_amount("total_amount", Money::zero()).is_ok());
/// assert!(validate_amount("total_amount", Money::from_minor(-1)).is_err());
/// ```
pub fn validate_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    if amount > MAX_AMOUNT {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT.minor(),
        });
    }
    Ok(())
}

/// Validates a whole percent (0-100).
pub fn validate_percent(field: &str, percent: u8) -> ValidationResult<()> {
    if percent > 100 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 100,
        });
    }
    Ok(())
}

/// Validates a VIP level (0-3).
pub fn validate_loyalty_level(level: u8) -> ValidationResult<()> {
    if level > MAX_LOYALTY_LEVEL {
        return Err(ValidationError::OutOfRange {
            field: "loyalty_level".to_string(),
            min: 0,
            max: MAX_LOYALTY_LEVEL as i64,
        });
    }
    Ok(())
}

/// Validates the length of a finance window in months.
pub fn validate_months_back(months: u32) -> ValidationResult<()> {
    if months == 0 || months > MAX_FINANCE_WINDOW {
        return Err(ValidationError::OutOfRange {
            field: "months_back".to_string(),
            min: 1,
            max: MAX_FINANCE_WINDOW as i64,
        });
    }
    Ok(())
}

// =============================================================================
// Date Validators
// =============================================================================

/// Rejects business dates after `today` (both in the business timezone).
pub fn validate_business_date(date: Option<NaiveDate>, today: NaiveDate) -> ValidationResult<()> {
    match date {
        Some(d) if d > today => Err(ValidationError::InvalidFormat {
            field: "date".to_string(),
            reason: format!("{} is in the future", d),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Order Validators
// =============================================================================

/// Validates an order's item list.
///
/// ## Rules
/// - At least one item, at most MAX_ORDER_ITEMS
/// - Every item names a product and has a valid quantity
pub fn validate_order_items(items: &[OrderItem]) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if items.len() > MAX_ORDER_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_ORDER_ITEMS as i64,
        });
    }

    for item in items {
        validate_id("product_id", &item.product_id)?;
        validate_quantity(item.quantity)?;
    }

    Ok(())
}

/// Validates delivery details against the configured services.
pub fn validate_delivery(delivery: &DeliveryDetails, settings: &SettingsConfig) -> ValidationResult<()> {
    if delivery.method == DeliveryMethod::Service {
        let service = delivery.service.as_deref().map(str::trim).unwrap_or("");
        if service.is_empty() {
            return Err(ValidationError::Required {
                field: "delivery service".to_string(),
            });
        }
        if !settings.has_delivery_service(service) {
            return Err(ValidationError::NotAllowed {
                field: "delivery service".to_string(),
                allowed: settings.delivery_services.clone(),
            });
        }
    }

    if let Some(city) = delivery.city.as_deref() {
        if city.chars().count() > 100 {
            return Err(ValidationError::TooLong {
                field: "city".to_string(),
                max: 100,
            });
        }
    }

    Ok(())
}

// =============================================================================
// Settings Validators
// =============================================================================

/// Validates an operator-edited settings document.
///
/// ## Rules
/// - Exactly three VIP tiers with levels 1, 2, 3
/// - Discounts within 0-100 and non-decreasing by level
/// - Delivery service names non-empty and unique
/// - Order form field keys non-empty and unique
pub fn validate_settings(settings: &SettingsConfig) -> ValidationResult<()> {
    let mut levels: Vec<u8> = settings.vip_tiers.iter().map(|t| t.level).collect();
    levels.sort_unstable();
    if levels != [1, 2, 3] {
        return Err(ValidationError::InvalidFormat {
            field: "vip_tiers".to_string(),
            reason: "exactly one tier per level 1, 2 and 3 is required".to_string(),
        });
    }

    let mut previous_discount = 0u8;
    for level in 1..=MAX_LOYALTY_LEVEL {
        let Some(tier) = settings.tier(level) else {
            continue;
        };
        validate_percent("discount_percent", tier.discount_percent)?;
        if let Some(orders) = tier.orders_from {
            if orders < 0 {
                return Err(ValidationError::MustNotBeNegative {
                    field: "orders_from".to_string(),
                });
            }
        }
        if let Some(spent) = tier.spent_from {
            validate_amount("spent_from", spent)?;
        }
        if tier.discount_percent < previous_discount {
            return Err(ValidationError::InvalidFormat {
                field: "vip_tiers".to_string(),
                reason: format!(
                    "level {} discount {}% is below the previous level's {}%",
                    level, tier.discount_percent, previous_discount
                ),
            });
        }
        previous_discount = tier.discount_percent;
    }

    let mut seen = HashSet::new();
    for service in &settings.delivery_services {
        let name = service.trim();
        if name.is_empty() {
            return Err(ValidationError::Required {
                field: "delivery service".to_string(),
            });
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(ValidationError::Duplicate {
                field: "delivery service".to_string(),
                value: name.to_string(),
            });
        }
    }

    let mut keys = HashSet::new();
    for field in &settings.order_form_fields {
        validate_text("order form field key", &field.key, 50)?;
        if !keys.insert(field.key.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "order form field".to_string(),
                value: field.key.clone(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: &str, quantity: i64) -> OrderItem {
        OrderItem {
            product_id: product_id.to_string(),
            quantity,
            name_snapshot: String::new(),
        }
    }

    #[test]
    fn test_validate_product_name() {
        assert!(validate_product_name("FreeStyle Libre 3").is_ok());
        assert!(validate_product_name("   ").is_err());
        assert!(validate_product_name(&"Д".repeat(200)).is_ok());
        assert!(validate_product_name(&"Д".repeat(201)).is_err());
    }

    #[test]
    fn test_validate_telegram() {
        assert!(validate_telegram(None).is_ok());
        assert!(validate_telegram(Some("@sensor_buyer")).is_ok());
        assert!(validate_telegram(Some("abc")).is_err());
        assert!(validate_telegram(Some("@bad handle")).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
        assert!(validate_event_quantity(1000).is_ok());
    }

    #[test]
    fn test_validate_amount_allows_zero() {
        assert!(validate_amount("total_amount", Money::zero()).is_ok());
        assert_eq!(
            validate_amount("total_amount", Money::from_minor(-1)),
            Err(ValidationError::MustNotBeNegative {
                field: "total_amount".to_string()
            })
        );
    }

    #[test]
    fn test_validate_amount_upper_bound() {
        assert!(validate_amount("total_amount", MAX_AMOUNT).is_ok());
        assert_eq!(
            validate_amount("total_amount", Money::from_minor(i64::MAX / 2 + 1)),
            Err(ValidationError::OutOfRange {
                field: "total_amount".to_string(),
                min: 0,
                max: MAX_AMOUNT.minor(),
            })
        );
    }

    #[test]
    fn test_future_business_date_rejected() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert!(validate_business_date(None, today).is_ok());
        assert!(validate_business_date(Some(today), today).is_ok());
        assert!(validate_business_date(today.pred_opt(), today).is_ok());
        assert!(validate_business_date(today.succ_opt(), today).is_err());
    }

    #[test]
    fn test_validate_months_back() {
        assert!(validate_months_back(1).is_ok());
        assert!(validate_months_back(120).is_ok());
        assert!(validate_months_back(0).is_err());
        assert!(validate_months_back(121).is_err());
    }

    #[test]
    fn test_validate_order_items() {
        assert!(validate_order_items(&[item("p", 2)]).is_ok());
        assert!(validate_order_items(&[]).is_err());
        assert!(validate_order_items(&[item("", 2)]).is_err());
        assert!(validate_order_items(&[item("p", 0)]).is_err());
    }

    #[test]
    fn test_validate_delivery_service() {
        let settings = SettingsConfig::default();
        let mut delivery = DeliveryDetails {
            method: DeliveryMethod::Service,
            service: Some("CDEK".to_string()),
            city: None,
        };
        assert!(validate_delivery(&delivery, &settings).is_ok());
        delivery.service = Some("DHL".to_string());
        assert!(matches!(
            validate_delivery(&delivery, &settings),
            Err(ValidationError::NotAllowed { .. })
        ));
        delivery.service = None;
        assert!(validate_delivery(&delivery, &settings).is_err());
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(validate_settings(&SettingsConfig::default()).is_ok());
    }

    #[test]
    fn test_settings_reject_decreasing_discounts() {
        let mut settings = SettingsConfig::default();
        settings.vip_tiers[2].discount_percent = 3;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_settings_reject_missing_tier_and_duplicates() {
        let mut settings = SettingsConfig::default();
        settings.vip_tiers.pop();
        assert!(validate_settings(&settings).is_err());

        let mut settings = SettingsConfig::default();
        settings.delivery_services.push("cdek ".to_string());
        assert!(matches!(
            validate_settings(&settings),
            Err(ValidationError::Duplicate { .. })
        ));

        let mut settings = SettingsConfig::default();
        settings.vip_tiers[0].discount_percent = 101;
        assert!(validate_settings(&settings).is_err());
    }
}
