//! # Inventory Ledger
//!
//! Derives stock from the purchase/sale history. Stock is never stored:
//! it is always `Σ purchased − Σ sold` over the records that exist right now.
//!
//! ## Fold
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products ──► entry per product (purchased = sold = 0)                  │
//! │  purchases ─► purchased[product_id] += quantity                         │
//! │  sales ─────► sold[line.product_id]  += line.quantity                   │
//! │                                                                         │
//! │  stock = purchased − sold      (may go negative: reported, not fatal)   │
//! │                                                                         │
//! │  Unknown product ids still get an entry, named from the event snapshot, │
//! │  so a deleted product's history stays visible.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::order::OrderItem;
use crate::types::{Product, Purchase, Sale};

// =============================================================================
// Stock Entry
// =============================================================================

/// Derived stock figures for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockEntry {
    pub product_id: String,
    pub name: String,
    pub purchased: i64,
    pub sold: i64,
    pub stock: i64,
    /// False when the product is no longer in the catalog.
    pub in_catalog: bool,
}

impl StockEntry {
    fn empty(product_id: &str, name: &str, in_catalog: bool) -> Self {
        StockEntry {
            product_id: product_id.to_string(),
            name: name.to_string(),
            purchased: 0,
            sold: 0,
            stock: 0,
            in_catalog,
        }
    }

    /// Negative stock means more was sold than was ever bought.
    #[inline]
    pub fn is_oversold(&self) -> bool {
        self.stock < 0
    }
}

/// Stock for every product that has a catalog entry or ledger history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockReport {
    entries: BTreeMap<String, StockEntry>,
}

impl StockReport {
    /// Stock entry for a product.
    pub fn get(&self, product_id: &str) -> Option<&StockEntry> {
        self.entries.get(product_id)
    }

    /// Available units; zero for products the ledger has never seen.
    pub fn available(&self, product_id: &str) -> i64 {
        self.entries.get(product_id).map(|e| e.stock).unwrap_or(0)
    }

    /// Entries ordered by product id.
    pub fn entries(&self) -> impl Iterator<Item = &StockEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with negative stock.
    pub fn anomalies(&self) -> Vec<&StockEntry> {
        self.entries.values().filter(|e| e.is_oversold()).collect()
    }

    fn entry(&mut self, product_id: &str, fallback_name: &str) -> &mut StockEntry {
        self.entries
            .entry(product_id.to_string())
            .or_insert_with(|| StockEntry::empty(product_id, fallback_name, false))
    }
}

/// Computes stock from the full catalog and event history.
///
/// ## Example
/// ```rust
/// use medstock_core::ledger::compute_stock;
///
/// let report = compute_stock(&[], &[], &[]);
/// assert!(report.is_empty());
/// ```
pub fn compute_stock(products: &[Product], purchases: &[Purchase], sales: &[Sale]) -> StockReport {
    let mut report = StockReport::default();

    for product in products {
        report.entries.insert(
            product.id.clone(),
            StockEntry::empty(&product.id, &product.name, true),
        );
    }

    for purchase in purchases {
        report
            .entry(&purchase.product_id, &purchase.product_name)
            .purchased += purchase.quantity;
    }

    for sale in sales {
        for line in &sale.lines {
            report.entry(&line.product_id, &line.product_name).sold += line.quantity;
        }
    }

    for entry in report.entries.values_mut() {
        entry.stock = entry.purchased - entry.sold;
    }

    report
}

// =============================================================================
// Shortage Check
// =============================================================================

/// A product the order needs more of than the ledger holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Shortage {
    pub product_id: String,
    pub product_name: String,
    pub required: i64,
    pub available: i64,
}

/// Compares an order's needs against stock.
///
/// Items are grouped by product first, so two lines of the same sensor are
/// checked against stock together. Returns an empty list when the order is
/// fulfillable.
pub fn check_order_against_stock(items: &[OrderItem], stock: &StockReport) -> Vec<Shortage> {
    let mut required: Vec<(&str, &str, i64)> = Vec::new();
    for item in items {
        match required.iter_mut().find(|(id, _, _)| *id == item.product_id) {
            Some(slot) => slot.2 += item.quantity,
            None => required.push((&item.product_id, &item.name_snapshot, item.quantity)),
        }
    }

    required
        .into_iter()
        .filter_map(|(product_id, snapshot, qty)| {
            let available = stock.available(product_id);
            if qty <= available {
                return None;
            }
            let product_name = stock
                .get(product_id)
                .map(|e| e.name.clone())
                .unwrap_or_else(|| snapshot.to_string());
            Some(Shortage {
                product_id: product_id.to_string(),
                product_name,
                required: qty,
                available,
            })
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::{SaleLine, SaleSource};
    use chrono::Utc;
    use proptest::prelude::*;

    fn product(id: &str, name: &str) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            name: name.to_string(),
            price: Money::from_minor(500_000),
            discount_percent: 0,
            cost_price: Money::from_minor(300_000),
            is_active: true,
            in_stock: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn purchase(product_id: &str, qty: i64) -> Purchase {
        let now = Utc::now();
        Purchase {
            id: format!("pu-{}-{}", product_id, qty),
            product_id: product_id.to_string(),
            product_name: format!("snapshot {}", product_id),
            quantity: qty,
            total_amount: Money::from_minor(qty * 300_000),
            date: None,
            comment: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sale(product_id: &str, qty: i64) -> Sale {
        let now = Utc::now();
        Sale {
            id: format!("sa-{}-{}", product_id, qty),
            lines: vec![SaleLine {
                product_id: product_id.to_string(),
                product_name: format!("snapshot {}", product_id),
                quantity: qty,
            }],
            total_amount: Money::from_minor(qty * 500_000),
            date: None,
            source_type: SaleSource::Manual,
            source_id: None,
            comment: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(product_id: &str, qty: i64) -> OrderItem {
        OrderItem {
            product_id: product_id.to_string(),
            quantity: qty,
            name_snapshot: format!("ordered {}", product_id),
        }
    }

    #[test]
    fn test_every_catalog_product_gets_an_entry() {
        let report = compute_stock(&[product("p", "Libre 2"), product("q", "G6")], &[], &[]);
        assert_eq!(report.len(), 2);
        let e = report.get("q").unwrap();
        assert_eq!((e.purchased, e.sold, e.stock), (0, 0, 0));
        assert!(e.in_catalog);
    }

    #[test]
    fn test_stock_is_purchased_minus_sold() {
        let report = compute_stock(
            &[product("p", "Libre 2")],
            &[purchase("p", 6), purchase("p", 4)],
            &[sale("p", 3)],
        );
        let e = report.get("p").unwrap();
        assert_eq!(e.purchased, 10);
        assert_eq!(e.sold, 3);
        assert_eq!(e.stock, 7);
        assert!(report.anomalies().is_empty());
    }

    #[test]
    fn test_orphaned_history_uses_snapshot_name() {
        let report = compute_stock(&[], &[purchase("gone", 2)], &[sale("gone", 5)]);
        let e = report.get("gone").unwrap();
        assert_eq!(e.name, "snapshot gone");
        assert!(!e.in_catalog);
        assert_eq!(e.stock, -3);
        assert_eq!(report.anomalies().len(), 1);
    }

    #[test]
    fn test_shortage_groups_items_per_product() {
        let report = compute_stock(&[product("p", "Libre 2")], &[purchase("p", 4)], &[]);
        let items = vec![item("p", 3), item("p", 2)];
        let shortages = check_order_against_stock(&items, &report);
        assert_eq!(
            shortages,
            vec![Shortage {
                product_id: "p".to_string(),
                product_name: "Libre 2".to_string(),
                required: 5,
                available: 4,
            }]
        );
    }

    #[test]
    fn test_exact_stock_is_fulfillable() {
        let report = compute_stock(&[product("p", "Libre 2")], &[purchase("p", 5)], &[]);
        assert!(check_order_against_stock(&[item("p", 5)], &report).is_empty());
    }

    #[test]
    fn test_unknown_product_has_nothing_available() {
        let report = StockReport::default();
        let shortages = check_order_against_stock(&[item("x", 1)], &report);
        assert_eq!(shortages.len(), 1);
        assert_eq!(shortages[0].available, 0);
        assert_eq!(shortages[0].product_name, "ordered x");
    }

    #[test]
    fn test_report_serializes_as_map() {
        let report = compute_stock(&[product("p", "Libre 2")], &[purchase("p", 1)], &[]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["p"]["stock"], 1);
    }

    proptest! {
        #[test]
        fn prop_fold_is_order_independent(
            events in proptest::collection::vec((0usize..3, 1i64..50, any::<bool>()), 0..40),
            rotate in 0usize..40,
        ) {
            let ids = ["a", "b", "c"];
            let mut purchases = Vec::new();
            let mut sales = Vec::new();
            for (idx, qty, is_purchase) in &events {
                if *is_purchase {
                    purchases.push(purchase(ids[*idx], *qty));
                } else {
                    sales.push(sale(ids[*idx], *qty));
                }
            }
            let forward = compute_stock(&[], &purchases, &sales);

            purchases.reverse();
            if !sales.is_empty() {
                let k = rotate % sales.len();
                sales.rotate_left(k);
            }
            let shuffled = compute_stock(&[], &purchases, &sales);

            prop_assert_eq!(&forward, &shuffled);
            for entry in forward.entries() {
                prop_assert_eq!(entry.stock, entry.purchased - entry.sold);
            }
        }
    }
}
