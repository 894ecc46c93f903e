//! # Repository Module
//!
//! Database repository implementations for MedStock.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways In                                          │
//! │                                                                         │
//! │  Pool methods (&self)              Connection helpers (*_in)            │
//! │  ─────────────────────             ─────────────────────────            │
//! │  db.orders().get_by_id(id)         OrderRepository::get_in(&mut tx, id) │
//! │  db.sales().list_all()             SaleRepository::insert_in(&mut tx,…) │
//! │       │                                   │                             │
//! │       │ acquire a pooled connection       │ run on the caller's         │
//! │       ▼                                   ▼ open transaction            │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                    SQLite Database                               │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Multi-step writes (deliver, cancel, edit) use the *_in helpers so      │
//! │  every step commits or rolls back together.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog CRUD
//! - [`PurchaseRepository`](purchase::PurchaseRepository) - Stock-in events
//! - [`SaleRepository`](sale::SaleRepository) - Stock-out events and lines
//! - [`OrderRepository`](order::OrderRepository) - Orders, items, conditional status writes
//! - [`CustomerRepository`](customer::CustomerRepository) - Profiles and loyalty cache
//! - [`SettingsRepository`](settings::SettingsRepository) - Singleton settings document

pub mod customer;
pub mod order;
pub mod product;
pub mod purchase;
pub mod sale;
pub mod settings;

use crate::error::{DbError, DbResult};

/// Narrows a stored percent or level column.
pub(crate) fn narrow_u8(entity: &str, id: &str, field: &str, value: i64) -> DbResult<u8> {
    u8::try_from(value)
        .map_err(|_| DbError::corrupt(entity, id, format!("{} out of range: {}", field, value)))
}

/// `?, ?, ?` for an `IN (...)` list of `n` bound values.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Fresh UUID v4 for a new record.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_narrow_u8() {
        assert_eq!(narrow_u8("Product", "p", "discount", 15).unwrap(), 15);
        assert!(matches!(
            narrow_u8("Product", "p", "discount", 300),
            Err(DbError::Corrupt { .. })
        ));
    }
}
