//! # Inventory Operations
//!
//! Stock is never stored. Operators record purchases (stock-in) and manual
//! sales (stock-out); every read of stock folds the full ledger again.
//!
//! ```text
//!   purchases ──┐
//!               ├──► compute_stock ──► StockReport { product_id → entry }
//!   sales ──────┘         ▲
//!   products ─────────────┘  (names, zero entries for unsold items)
//! ```
//!
//! Sales generated by delivered orders belong to the order: they are listed
//! here but [`Engine::update_sale`] and [`Engine::delete_sale`] refuse them.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ts_rs::TS;

use chrono::NaiveDate;
use medstock_core::ledger::compute_stock;
use medstock_core::validation::{
    validate_amount, validate_business_date, validate_comment, validate_event_quantity, validate_id,
};
use medstock_core::{CoreError, Money, Purchase, Sale, SaleLine, SaleSource, StockEntry, StockReport};
use medstock_db::{generate_id, ProductRepository, PurchaseRepository, SaleRepository, SqliteConnection};

use crate::error::EngineResult;
use crate::notify::Collection;
use crate::Engine;

/// Fields of a purchase as entered by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseInput {
    pub product_id: String,
    pub quantity: i64,
    pub total_amount: Money,
    /// Business date; defaults to the creation day when absent.
    #[ts(as = "Option<String>")]
    pub date: Option<NaiveDate>,
    pub comment: Option<String>,
}

/// Fields of a manual (single-line) sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleInput {
    pub product_id: String,
    pub quantity: i64,
    pub total_amount: Money,
    #[ts(as = "Option<String>")]
    pub date: Option<NaiveDate>,
    pub comment: Option<String>,
}

fn validate_event(
    product_id: &str,
    quantity: i64,
    total_amount: Money,
    date: Option<NaiveDate>,
    comment: Option<&str>,
    today: NaiveDate,
) -> EngineResult<()> {
    validate_id("product_id", product_id)?;
    validate_event_quantity(quantity)?;
    validate_amount("total_amount", total_amount)?;
    validate_business_date(date, today)?;
    validate_comment(comment)?;
    Ok(())
}

/// Folds the full ledger as seen by `conn`.
///
/// Called on an open transaction so the result matches what that
/// transaction will write against.
pub(crate) async fn load_stock(conn: &mut SqliteConnection) -> EngineResult<StockReport> {
    let products = ProductRepository::list_all_in(conn).await?;
    let purchases = PurchaseRepository::list_all_in(conn).await?;
    let sales = SaleRepository::list_all_in(conn).await?;
    Ok(compute_stock(&products, &purchases, &sales))
}

impl Engine {
    // =========================================================================
    // Purchases
    // =========================================================================

    /// Records a stock-in event and returns its id.
    pub async fn create_purchase(&self, input: PurchaseInput) -> EngineResult<String> {
        validate_event(
            &input.product_id,
            input.quantity,
            input.total_amount,
            input.date,
            input.comment.as_deref(),
            self.today(),
        )?;
        let product = self.get_product(&input.product_id).await?;

        let now = self.now();
        let purchase = Purchase {
            id: generate_id(),
            product_id: product.id,
            product_name: product.name,
            quantity: input.quantity,
            total_amount: input.total_amount,
            date: input.date,
            comment: input.comment,
            created_at: now,
            updated_at: now,
        };
        self.db.purchases().insert(&purchase).await?;

        info!(
            id = %purchase.id,
            product = %purchase.product_name,
            quantity = purchase.quantity,
            amount = %purchase.total_amount,
            "Purchase recorded"
        );
        self.notifier.created(Collection::Purchases, &purchase.id);
        Ok(purchase.id)
    }

    pub async fn get_purchase(&self, id: &str) -> EngineResult<Purchase> {
        self.db
            .purchases()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Purchase", id).into())
    }

    /// Replaces a purchase's fields. The name snapshot is refreshed only when
    /// the product changes.
    pub async fn update_purchase(&self, id: &str, input: PurchaseInput) -> EngineResult<Purchase> {
        validate_event(
            &input.product_id,
            input.quantity,
            input.total_amount,
            input.date,
            input.comment.as_deref(),
            self.today(),
        )?;
        let existing = self.get_purchase(id).await?;

        let product_name = if existing.product_id == input.product_id {
            existing.product_name.clone()
        } else {
            self.get_product(&input.product_id).await?.name
        };

        let purchase = Purchase {
            product_id: input.product_id,
            product_name,
            quantity: input.quantity,
            total_amount: input.total_amount,
            date: input.date,
            comment: input.comment,
            updated_at: self.now(),
            ..existing
        };
        self.db.purchases().update(&purchase).await?;

        info!(id = %id, quantity = purchase.quantity, "Purchase updated");
        self.notifier.updated(Collection::Purchases, id);
        Ok(purchase)
    }

    pub async fn delete_purchase(&self, id: &str) -> EngineResult<()> {
        self.db.purchases().delete(id).await?;

        info!(id = %id, "Purchase deleted");
        self.notifier.deleted(Collection::Purchases, id);
        Ok(())
    }

    /// All purchases, newest first.
    pub async fn list_purchases(&self) -> EngineResult<Vec<Purchase>> {
        Ok(self.db.purchases().list_all().await?)
    }

    // =========================================================================
    // Sales
    // =========================================================================

    /// Records a manual stock-out event and returns its id.
    ///
    /// Manual sales are not checked against stock; overselling shows up in
    /// [`Engine::stock_anomalies`].
    pub async fn create_sale(&self, input: SaleInput) -> EngineResult<String> {
        validate_event(
            &input.product_id,
            input.quantity,
            input.total_amount,
            input.date,
            input.comment.as_deref(),
            self.today(),
        )?;
        let product = self.get_product(&input.product_id).await?;

        let now = self.now();
        let sale = Sale {
            id: generate_id(),
            lines: vec![SaleLine {
                product_id: product.id,
                product_name: product.name,
                quantity: input.quantity,
            }],
            total_amount: input.total_amount,
            date: input.date,
            source_type: SaleSource::Manual,
            source_id: None,
            comment: input.comment,
            created_at: now,
            updated_at: now,
        };
        self.db.sales().insert(&sale).await?;

        info!(id = %sale.id, quantity = sale.total_quantity(), amount = %sale.total_amount, "Manual sale recorded");
        self.notifier.created(Collection::Sales, &sale.id);
        Ok(sale.id)
    }

    pub async fn get_sale(&self, id: &str) -> EngineResult<Sale> {
        self.db
            .sales()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Sale", id).into())
    }

    /// Replaces a manual sale's fields.
    ///
    /// Order-sourced sales are rejected with `ImmutableRecord`.
    pub async fn update_sale(&self, id: &str, input: SaleInput) -> EngineResult<Sale> {
        validate_event(
            &input.product_id,
            input.quantity,
            input.total_amount,
            input.date,
            input.comment.as_deref(),
            self.today(),
        )?;
        let existing = self.get_sale(id).await?;
        ensure_manual(&existing, "lines")?;

        let product_name = match existing.lines.first() {
            Some(line) if line.product_id == input.product_id => line.product_name.clone(),
            _ => self.get_product(&input.product_id).await?.name,
        };

        let sale = Sale {
            lines: vec![SaleLine {
                product_id: input.product_id,
                product_name,
                quantity: input.quantity,
            }],
            total_amount: input.total_amount,
            date: input.date,
            comment: input.comment,
            updated_at: self.now(),
            ..existing
        };
        self.db.sales().update_manual(&sale).await?;

        info!(id = %id, quantity = sale.total_quantity(), "Manual sale updated");
        self.notifier.updated(Collection::Sales, id);
        Ok(sale)
    }

    /// Deletes a manual sale. Order-sourced sales are rejected.
    pub async fn delete_sale(&self, id: &str) -> EngineResult<()> {
        let existing = self.get_sale(id).await?;
        ensure_manual(&existing, "sale")?;

        self.db.sales().delete_manual(id).await?;

        info!(id = %id, "Manual sale deleted");
        self.notifier.deleted(Collection::Sales, id);
        Ok(())
    }

    /// All sales (manual and order-sourced), newest first.
    pub async fn list_sales(&self) -> EngineResult<Vec<Sale>> {
        Ok(self.db.sales().list_all().await?)
    }

    // =========================================================================
    // Stock
    // =========================================================================

    /// Current stock per product, derived from the full ledger.
    ///
    /// Reads run in one transaction so a concurrent write is seen entirely
    /// or not at all. Oversold products are logged at `warn`.
    pub async fn get_stock_report(&self) -> EngineResult<StockReport> {
        let mut tx = self.db.begin().await?;
        let report = load_stock(&mut tx).await?;
        tx.rollback().await.map_err(medstock_db::DbError::from)?;

        for entry in report.anomalies() {
            warn!(
                product_id = %entry.product_id,
                name = %entry.name,
                stock = entry.stock,
                "Negative stock: more sold than purchased"
            );
        }
        Ok(report)
    }

    /// Products whose sales exceed their purchases.
    pub async fn stock_anomalies(&self) -> EngineResult<Vec<StockEntry>> {
        let report = self.get_stock_report().await?;
        Ok(report.anomalies().into_iter().cloned().collect())
    }
}

fn ensure_manual(sale: &Sale, field: &str) -> EngineResult<()> {
    if let Some(order_id) = sale.source_id.as_deref().filter(|_| sale.is_order_sourced()) {
        return Err(CoreError::immutable(
            "Sale",
            &sale.id,
            field,
            format!("generated by order {}; change the order instead", order_id),
        )
        .into());
    }
    Ok(())
}
