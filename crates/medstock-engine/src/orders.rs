//! # Order Operations
//!
//! Checkout, the status machine and edits.
//!
//! ## Status Changes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   ┌─────┐ start_processing ┌────────────┐                               │
//! │   │ new │ ───────────────► │ processing │                               │
//! │   └──┬──┘                  └─────┬──────┘                               │
//! │      │ deliver                   │ deliver                              │
//! │      ├───────────────────────────┴──────► delivered (sale + loyalty)    │
//! │      │ cancel                    │ cancel                               │
//! │      └───────────────────────────┴──────► cancelled (order deleted)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every status write is conditional on the status the decision was made
//! against. If a concurrent caller moved the order first, the write matches
//! no row and the caller gets `InvalidTransition` (or `NotFound` if the
//! order was cancelled meanwhile).

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ts_rs::TS;

use medstock_core::finance::business_date;
use medstock_core::ledger::check_order_against_stock;
use medstock_core::loyalty::apply_delivery;
use medstock_core::order::{ensure_editable, sources_of, transition, TransitionEffect};
use medstock_core::validation::{
    validate_amount, validate_delivery, validate_id, validate_order_items, validate_telegram,
};
use medstock_core::{
    CoreError, CustomerProfile, DeliveryDetails, Money, Order, OrderEvent, OrderItem, OrderStatus, Product, Sale,
    SaleSource, SettingsConfig, ValidationError,
};
use medstock_db::{
    generate_id, CustomerRepository, DbError, OrderRepository, SaleRepository, SettingsRepository,
};

use crate::error::{EngineError, EngineResult};
use crate::inventory::load_stock;
use crate::notify::Collection;
use crate::Engine;

// =============================================================================
// Inputs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewOrderItem {
    pub product_id: String,
    pub quantity: i64,
}

/// A checkout submitted by the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewOrder {
    pub customer_id: String,
    pub telegram: Option<String>,
    pub items: Vec<NewOrderItem>,
    #[serde(default)]
    pub delivery: DeliveryDetails,
}

/// Replacement items, delivery details and contact for an open order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderEdit {
    pub items: Vec<NewOrderItem>,
    #[serde(default)]
    pub delivery: DeliveryDetails,
    pub telegram: Option<String>,
}

impl Engine {
    // =========================================================================
    // Checkout
    // =========================================================================

    /// Places a new order.
    ///
    /// Item names are snapshotted from the catalog. The total is the sum of
    /// discounted product prices, less the customer's loyalty discount.
    pub async fn create_order(&self, input: NewOrder) -> EngineResult<Order> {
        validate_id("customer_id", &input.customer_id)?;
        validate_telegram(input.telegram.as_deref())?;

        let customer = self.get_customer(&input.customer_id).await?;
        if customer.is_banned {
            warn!(customer_id = %customer.id, "Order refused for banned customer");
            return Err(CoreError::CustomerBanned {
                customer_id: customer.id,
            }
            .into());
        }

        let settings = self.settings().await?;
        validate_delivery(&input.delivery, &settings)?;

        let (items, total_price) = self.price_items(&input.items, &customer, &[]).await?;

        let now = self.now();
        let order = Order {
            id: generate_id(),
            customer_id: customer.id,
            telegram: normalize_contact(input.telegram),
            items,
            total_price,
            status: OrderStatus::New,
            delivery: input.delivery,
            created_at: now,
            updated_at: now,
            delivered_at: None,
        };
        self.db.orders().insert(&order).await?;

        info!(
            id = %order.id,
            customer_id = %order.customer_id,
            items = order.items.len(),
            total = %order.total_price,
            "Order placed"
        );
        self.notifier.created(Collection::Orders, &order.id);
        Ok(order)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_order(&self, order_id: &str) -> EngineResult<Order> {
        self.db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", order_id).into())
    }

    /// Orders, newest first, optionally filtered by status.
    pub async fn list_orders(&self, status: Option<OrderStatus>) -> EngineResult<Vec<Order>> {
        Ok(self.db.orders().list(status).await?)
    }

    // =========================================================================
    // Status Machine
    // =========================================================================

    /// Moves an order to `status`, applying the transition's side effects.
    ///
    /// Returns the updated order, or `None` when the order was cancelled
    /// (cancelled orders are deleted).
    pub async fn set_order_status(&self, order_id: &str, status: OrderStatus) -> EngineResult<Option<Order>> {
        let order = self.get_order(order_id).await?;
        let event = OrderEvent::for_target(order_id, order.status, status)?;
        let step = transition(order_id, order.status, event)?;
        debug!(id = %order_id, from = %step.from, to = %step.to, "Order transition");

        match step.effect {
            TransitionEffect::StatusOnly => {
                let changed = self
                    .db
                    .orders()
                    .set_status_if(order_id, &[step.from], step.to, self.now())
                    .await?;
                if !changed {
                    return Err(self.lost_race(order_id, status).await);
                }

                info!(id = %order_id, status = %step.to, "Order status changed");
                self.notifier.updated(Collection::Orders, order_id);
                Ok(Some(self.get_order(order_id).await?))
            }
            TransitionEffect::RecordSale => self.deliver(order_id).await.map(Some),
            TransitionEffect::DeleteOrder => {
                let deleted = self
                    .db
                    .orders()
                    .delete_if(order_id, &sources_of(OrderEvent::Cancel))
                    .await?;
                if !deleted {
                    return Err(self.lost_race(order_id, status).await);
                }

                info!(id = %order_id, from = %step.from, "Order cancelled and removed");
                self.notifier.deleted(Collection::Orders, order_id);
                Ok(None)
            }
        }
    }

    /// The atomic delivered transition.
    ///
    /// Claim, stock check, sale, status and loyalty share one transaction.
    /// Dropping `tx` on any early return rolls everything back.
    async fn deliver(&self, order_id: &str) -> EngineResult<Order> {
        let now = self.now();
        let mut tx = self.db.begin().await?;

        let claimed =
            OrderRepository::claim_in(&mut tx, order_id, &sources_of(OrderEvent::Deliver), now).await?;
        if !claimed {
            drop(tx);
            return Err(self.lost_race(order_id, OrderStatus::Delivered).await);
        }

        let order = OrderRepository::get_in(&mut tx, order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        let stock = load_stock(&mut tx).await?;
        let shortages = check_order_against_stock(&order.items, &stock);
        if !shortages.is_empty() {
            warn!(id = %order_id, short = shortages.len(), "Delivery refused: insufficient stock");
            return Err(CoreError::InsufficientStock {
                order_id: order_id.to_string(),
                shortages,
            }
            .into());
        }

        let sale = Sale {
            id: generate_id(),
            lines: order.sale_lines(),
            total_amount: order.total_price,
            date: Some(business_date(now, self.tz)),
            source_type: SaleSource::Order,
            source_id: Some(order.id.clone()),
            comment: None,
            created_at: now,
            updated_at: now,
        };
        SaleRepository::insert_in(&mut tx, &sale).await?;
        OrderRepository::mark_delivered_in(&mut tx, order_id, now).await?;

        let settings = SettingsRepository::get_in(&mut tx).await?.unwrap_or_default();
        let mut customer = CustomerRepository::get_in(&mut tx, &order.customer_id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", &order.customer_id))?;
        apply_delivery(&mut customer, order.total_price, &settings, now);
        CustomerRepository::save_loyalty_in(&mut tx, &customer).await?;

        tx.commit().await.map_err(DbError::from)?;

        info!(
            id = %order_id,
            sale_id = %sale.id,
            units = order.total_quantity(),
            total = %order.total_price,
            customer_id = %customer.id,
            level = customer.loyalty_level,
            "Order delivered"
        );
        self.notifier.updated(Collection::Orders, order_id);
        self.notifier.created(Collection::Sales, &sale.id);
        self.notifier.updated(Collection::Customers, &customer.id);

        Ok(Order {
            status: OrderStatus::Delivered,
            updated_at: now,
            delivered_at: Some(now),
            ..order
        })
    }

    /// Error for a conditional write that matched nothing.
    async fn lost_race(&self, order_id: &str, requested: OrderStatus) -> EngineError {
        match self.db.orders().get_by_id(order_id).await {
            Ok(Some(current)) => CoreError::InvalidTransition {
                order_id: order_id.to_string(),
                from: current.status,
                to: requested,
            }
            .into(),
            Ok(None) => CoreError::not_found("Order", order_id).into(),
            Err(e) => e.into(),
        }
    }

    // =========================================================================
    // Edits
    // =========================================================================

    /// Replaces items, delivery details and contact of an open order.
    ///
    /// Stock is not re-checked; that happens on delivery. Delivered orders
    /// are rejected with `ImmutableRecord`.
    pub async fn update_order(&self, order_id: &str, edit: OrderEdit) -> EngineResult<Order> {
        let existing = self.get_order(order_id).await?;
        ensure_editable(&existing, "items/delivery")?;
        validate_telegram(edit.telegram.as_deref())?;

        let settings: SettingsConfig = self.settings().await?;
        validate_delivery(&edit.delivery, &settings)?;

        let customer = self.get_customer(&existing.customer_id).await?;
        let (items, total_price) = self.price_items(&edit.items, &customer, &existing.items).await?;

        let order = Order {
            telegram: normalize_contact(edit.telegram),
            items,
            total_price,
            delivery: edit.delivery,
            updated_at: self.now(),
            ..existing
        };

        if !self.db.orders().update_details(&order).await? {
            // Delivered or cancelled since we read it
            let current = self.get_order(order_id).await?;
            ensure_editable(&current, "items/delivery")?;
            return Err(self.lost_race(order_id, current.status).await);
        }

        info!(id = %order_id, items = order.items.len(), total = %order.total_price, "Order edited");
        self.notifier.updated(Collection::Orders, order_id);
        Ok(order)
    }

    /// Resolves products, snapshots names and prices the items.
    ///
    /// Inactive products are refused unless `kept` (the order's current
    /// items) already contains them.
    async fn price_items(
        &self,
        requested: &[NewOrderItem],
        customer: &CustomerProfile,
        kept: &[OrderItem],
    ) -> EngineResult<(Vec<OrderItem>, Money)> {
        let mut items: Vec<OrderItem> = requested
            .iter()
            .map(|i| OrderItem {
                product_id: i.product_id.trim().to_string(),
                quantity: i.quantity,
                name_snapshot: String::new(),
            })
            .collect();
        validate_order_items(&items)?;

        let mut subtotal = Money::zero();
        for item in &mut items {
            let product: Product = self.get_product(&item.product_id).await?;
            let already_ordered = kept.iter().any(|k| k.product_id == product.id);
            if !product.is_active && !already_ordered {
                return Err(ValidationError::InvalidFormat {
                    field: "product_id".to_string(),
                    reason: format!("{} is not available for ordering", product.name),
                }
                .into());
            }
            item.name_snapshot = product.name.clone();
            subtotal += product.discounted_price() * item.quantity;
        }

        let total = subtotal.apply_percent_discount(customer.loyalty_discount);
        validate_amount("total_price", total)?;
        Ok((items, total))
    }
}

fn normalize_contact(contact: Option<String>) -> Option<String> {
    contact
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::{ErrorCode, PurchaseInput};
    use medstock_core::DeliveryMethod;

    fn checkout(customer: &CustomerProfile, product: &Product, quantity: i64) -> NewOrder {
        NewOrder {
            customer_id: customer.id.clone(),
            telegram: Some("@sensor_buyer".into()),
            items: vec![NewOrderItem {
                product_id: product.id.clone(),
                quantity,
            }],
            delivery: DeliveryDetails::default(),
        }
    }

    #[tokio::test]
    async fn test_deliver_consumes_stock_and_counts_purchase() {
        let engine = testing::engine().await;
        let libre = testing::product(&engine, "FreeStyle Libre 2", 4_599).await;
        let customer = testing::customer(&engine, "Maria").await;
        testing::stock_in(&engine, &libre, 7).await;

        let order = engine.create_order(checkout(&customer, &libre, 5)).await.unwrap();
        assert_eq!(order.total_price, Money::from_major_minor(4_599 * 5, 0));

        let delivered = engine
            .set_order_status(&order.id, OrderStatus::Delivered)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert!(delivered.delivered_at.is_some());

        let stock = engine.get_stock_report().await.unwrap();
        assert_eq!(stock.available(&libre.id), 2);

        let sale = engine.database().sales().get_by_source(&order.id).await.unwrap().unwrap();
        assert_eq!(sale.source_type, SaleSource::Order);
        assert_eq!(sale.total_quantity(), 5);
        assert_eq!(sale.total_amount, order.total_price);
        assert_eq!(sale.date, Some(engine.today()));

        let customer = engine.get_customer(&customer.id).await.unwrap();
        assert_eq!(customer.purchases_count, 1);
        assert_eq!(customer.total_spent, order.total_price);
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_order_untouched() {
        let engine = testing::engine().await;
        let libre = testing::product(&engine, "FreeStyle Libre 2", 4_599).await;
        let customer = testing::customer(&engine, "Maria").await;
        testing::stock_in(&engine, &libre, 2).await;

        let order = engine.create_order(checkout(&customer, &libre, 5)).await.unwrap();
        let err = engine
            .set_order_status(&order.id, OrderStatus::Delivered)
            .await
            .unwrap_err();

        match err {
            EngineError::Rule(CoreError::InsufficientStock { shortages, .. }) => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].required, 5);
                assert_eq!(shortages[0].available, 2);
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }

        assert_eq!(engine.get_order(&order.id).await.unwrap().status, OrderStatus::New);
        assert!(engine.list_sales().await.unwrap().is_empty());
        assert_eq!(engine.get_customer(&customer.id).await.unwrap().purchases_count, 0);
    }

    #[tokio::test]
    async fn test_every_short_product_is_listed() {
        let engine = testing::engine().await;
        let libre = testing::product(&engine, "FreeStyle Libre 2", 4_599).await;
        let g7 = testing::product(&engine, "Dexcom G7", 9_900).await;
        let customer = testing::customer(&engine, "Maria").await;
        testing::stock_in(&engine, &libre, 1).await;

        let mut input = checkout(&customer, &libre, 1);
        input.items.push(NewOrderItem {
            product_id: libre.id.clone(),
            quantity: 1,
        });
        input.items.push(NewOrderItem {
            product_id: g7.id.clone(),
            quantity: 1,
        });
        let order = engine.create_order(input).await.unwrap();

        let report = engine
            .set_order_status(&order.id, OrderStatus::Delivered)
            .await
            .unwrap_err()
            .report();
        assert_eq!(report.code, ErrorCode::InsufficientStock);
        let shortages = report.shortages.unwrap();
        assert_eq!(shortages.len(), 2);
        assert!(shortages.iter().any(|s| s.product_id == libre.id && s.required == 2 && s.available == 1));
    }

    #[tokio::test]
    async fn test_third_delivery_reaches_first_tier() {
        let engine = testing::engine().await;
        let patch = testing::product(&engine, "Libre overpatch", 690).await;
        let customer = testing::customer(&engine, "Maria").await;
        testing::stock_in(&engine, &patch, 10).await;

        for _ in 0..3 {
            let order = engine.create_order(checkout(&customer, &patch, 1)).await.unwrap();
            engine.set_order_status(&order.id, OrderStatus::Delivered).await.unwrap();
        }

        let customer = engine.get_customer(&customer.id).await.unwrap();
        assert_eq!(customer.purchases_count, 3);
        assert_eq!(customer.loyalty_level, 1);
        assert_eq!(
            customer.loyalty_discount,
            SettingsConfig::default().tier(1).unwrap().discount_percent
        );
    }

    #[tokio::test]
    async fn test_loyalty_discount_applies_at_checkout() {
        let engine = testing::engine().await;
        let g7 = testing::product(&engine, "Dexcom G7", 10_000).await;
        let customer = testing::customer(&engine, "Maria").await;
        engine.set_customer_loyalty(&customer.id, 2, Some(10)).await.unwrap();

        let order = engine.create_order(checkout(&customer, &g7, 1)).await.unwrap();
        assert_eq!(order.total_price, Money::from_major_minor(9_000, 0));
    }

    #[tokio::test]
    async fn test_cancel_removes_order_without_sale() {
        let engine = testing::engine().await;
        let libre = testing::product(&engine, "FreeStyle Libre 2", 4_599).await;
        let customer = testing::customer(&engine, "Maria").await;
        let order = engine.create_order(checkout(&customer, &libre, 1)).await.unwrap();

        let mut events = engine.subscribe();
        assert!(engine
            .set_order_status(&order.id, OrderStatus::Cancelled)
            .await
            .unwrap()
            .is_none());

        assert!(matches!(
            engine.get_order(&order.id).await,
            Err(EngineError::Rule(CoreError::NotFound { .. }))
        ));
        assert!(engine.list_sales().await.unwrap().is_empty());

        let event = events.recv().await.unwrap();
        assert_eq!(event.collection, Collection::Orders);
        assert_eq!(event.kind, crate::ChangeKind::Deleted);
    }

    #[tokio::test]
    async fn test_illegal_transitions() {
        let engine = testing::engine().await;
        let libre = testing::product(&engine, "FreeStyle Libre 2", 4_599).await;
        let customer = testing::customer(&engine, "Maria").await;
        testing::stock_in(&engine, &libre, 5).await;
        let order = engine.create_order(checkout(&customer, &libre, 1)).await.unwrap();

        assert!(matches!(
            engine.set_order_status(&order.id, OrderStatus::New).await,
            Err(EngineError::Rule(CoreError::InvalidTransition { .. }))
        ));

        engine.set_order_status(&order.id, OrderStatus::Processing).await.unwrap();
        assert!(matches!(
            engine.set_order_status(&order.id, OrderStatus::Processing).await,
            Err(EngineError::Rule(CoreError::InvalidTransition { .. }))
        ));

        engine.set_order_status(&order.id, OrderStatus::Delivered).await.unwrap();
        for target in [OrderStatus::Cancelled, OrderStatus::Delivered, OrderStatus::Processing] {
            assert!(matches!(
                engine.set_order_status(&order.id, target).await,
                Err(EngineError::Rule(CoreError::InvalidTransition { .. }))
            ));
        }
        // Still exactly one sale for the order
        assert_eq!(engine.list_sales().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delivered_order_cannot_be_edited() {
        let engine = testing::engine().await;
        let libre = testing::product(&engine, "FreeStyle Libre 2", 4_599).await;
        let customer = testing::customer(&engine, "Maria").await;
        testing::stock_in(&engine, &libre, 5).await;
        let order = engine.create_order(checkout(&customer, &libre, 1)).await.unwrap();
        engine.set_order_status(&order.id, OrderStatus::Delivered).await.unwrap();
        let before = engine.get_order(&order.id).await.unwrap();

        let err = engine
            .update_order(
                &order.id,
                OrderEdit {
                    items: vec![NewOrderItem {
                        product_id: libre.id.clone(),
                        quantity: 3,
                    }],
                    delivery: DeliveryDetails::default(),
                    telegram: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Rule(CoreError::ImmutableRecord { .. })));
        assert_eq!(engine.get_order(&order.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_edit_open_order() {
        let engine = testing::engine().await;
        let libre = testing::product(&engine, "FreeStyle Libre 2", 4_599).await;
        let g7 = testing::product(&engine, "Dexcom G7", 9_900).await;
        let customer = testing::customer(&engine, "Maria").await;
        let order = engine.create_order(checkout(&customer, &libre, 1)).await.unwrap();

        let edited = engine
            .update_order(
                &order.id,
                OrderEdit {
                    items: vec![NewOrderItem {
                        product_id: g7.id.clone(),
                        quantity: 2,
                    }],
                    delivery: DeliveryDetails {
                        method: DeliveryMethod::Service,
                        service: Some("CDEK".into()),
                        city: Some("Kazan".into()),
                    },
                    telegram: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.total_price, Money::from_major_minor(19_800, 0));

        let stored = engine.get_order(&order.id).await.unwrap();
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.items[0].name_snapshot, "Dexcom G7");
        assert_eq!(stored.delivery.city.as_deref(), Some("Kazan"));
        assert_eq!(stored.telegram, None);
    }

    #[tokio::test]
    async fn test_checkout_rules() {
        let engine = testing::engine().await;
        let libre = testing::product(&engine, "FreeStyle Libre 2", 4_599).await;
        let customer = testing::customer(&engine, "Maria").await;

        let mut input = checkout(&customer, &libre, 1);
        input.delivery = DeliveryDetails {
            method: DeliveryMethod::Service,
            service: Some("Pigeon Post".into()),
            city: None,
        };
        assert!(matches!(
            engine.create_order(input).await,
            Err(EngineError::Rule(CoreError::Validation(_)))
        ));

        assert!(engine.create_order(checkout(&customer, &libre, 1000)).await.is_err());

        engine.set_customer_banned(&customer.id, true).await.unwrap();
        assert!(matches!(
            engine.create_order(checkout(&customer, &libre, 1)).await,
            Err(EngineError::Rule(CoreError::CustomerBanned { .. }))
        ));
        assert!(engine.list_orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_by_status() {
        let engine = testing::engine().await;
        let libre = testing::product(&engine, "FreeStyle Libre 2", 4_599).await;
        let customer = testing::customer(&engine, "Maria").await;
        let first = engine.create_order(checkout(&customer, &libre, 1)).await.unwrap();
        engine.create_order(checkout(&customer, &libre, 2)).await.unwrap();
        engine.set_order_status(&first.id, OrderStatus::Processing).await.unwrap();

        assert_eq!(engine.list_orders(None).await.unwrap().len(), 2);
        let processing = engine.list_orders(Some(OrderStatus::Processing)).await.unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].id, first.id);
    }

    /// Stocks one unit of a product, then races one delivery per customer
    /// for it. Returns (delivered, short).
    async fn race_for_last_unit(engine: &Engine, customers: usize) -> (usize, usize) {
        let g7 = testing::product(engine, "Dexcom G7", 9_900).await;
        engine
            .create_purchase(PurchaseInput {
                product_id: g7.id.clone(),
                quantity: 1,
                total_amount: Money::from_major_minor(7_100, 0),
                date: None,
                comment: Some("last unit".into()),
            })
            .await
            .unwrap();

        let mut order_ids = Vec::new();
        for n in 0..customers {
            let customer = testing::customer(engine, &format!("Customer {}", n)).await;
            order_ids.push(engine.create_order(checkout(&customer, &g7, 1)).await.unwrap().id);
        }

        let handles: Vec<_> = order_ids
            .into_iter()
            .map(|id| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.set_order_status(&id, OrderStatus::Delivered).await })
            })
            .collect();

        let mut delivered = 0;
        let mut short = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => delivered += 1,
                Err(EngineError::Rule(CoreError::InsufficientStock { .. })) => short += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(engine.get_stock_report().await.unwrap().available(&g7.id), 0);
        assert_eq!(engine.list_sales().await.unwrap().len(), 1);
        assert_eq!(engine.list_orders(Some(OrderStatus::Delivered)).await.unwrap().len(), 1);
        (delivered, short)
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_never_oversell() {
        let engine = testing::engine().await;
        assert_eq!(race_for_last_unit(&engine, 4).await, (1, 3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_deliveries_on_shared_file_never_oversell() {
        use medstock_core::{DEFAULT_BUSINESS_TZ, DEFAULT_FINANCE_WINDOW};
        use medstock_db::{Database, DbConfig};

        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("medstock.db")).max_connections(8);
        let db = Database::new(config).await.unwrap();
        let engine = Engine::with_database(db, DEFAULT_BUSINESS_TZ, DEFAULT_FINANCE_WINDOW);

        // Each delivery holds its own connection; the claim serializes them
        assert_eq!(race_for_last_unit(&engine, 8).await, (1, 7));
        engine.close().await;
    }
}
