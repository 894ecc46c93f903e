//! # Order Repository
//!
//! Orders and their items, plus the conditional writes that make status
//! changes safe under concurrency.
//!
//! ## Conditional Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every status write is keyed on the statuses it may leave:              │
//! │                                                                         │
//! │  UPDATE orders SET ... WHERE id = ? AND status IN ('new','processing')  │
//! │                                                                         │
//! │  rows_affected = 1  → this caller owns the transition                   │
//! │  rows_affected = 0  → order is gone or already moved on                 │
//! │                                                                         │
//! │  claim_in() is the first statement of the delivery transaction, so      │
//! │  the transaction holds SQLite's write lock before it reads stock.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use super::placeholders;
use crate::error::{DbError, DbResult};
use medstock_core::{DeliveryDetails, DeliveryMethod, Money, Order, OrderItem, OrderStatus};

const SELECT_ORDER: &str = r#"
    SELECT id, customer_id, telegram, total_price_minor, status,
           delivery_method, delivery_service, delivery_city,
           created_at, updated_at, delivered_at
    FROM orders
"#;

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    customer_id: String,
    telegram: Option<String>,
    total_price_minor: i64,
    status: OrderStatus,
    delivery_method: DeliveryMethod,
    delivery_service: Option<String>,
    delivery_city: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    order_id: String,
    product_id: String,
    name_snapshot: String,
    quantity: i64,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            customer_id: self.customer_id,
            telegram: self.telegram,
            items,
            total_price: Money::from_minor(self.total_price_minor),
            status: self.status,
            delivery: DeliveryDetails {
                method: self.delivery_method,
                service: self.delivery_service,
                city: self.delivery_city,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
            delivered_at: self.delivered_at,
        }
    }
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            product_id: row.product_id,
            quantity: row.quantity,
            name_snapshot: row.name_snapshot,
        }
    }
}

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order with its items.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    /// Gets an order on the caller's transaction.
    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("{} WHERE id = ?1", SELECT_ORDER))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => {
                let items = Self::items_of(conn, &row.id).await?;
                Ok(Some(row.into_order(items)))
            }
            None => Ok(None),
        }
    }

    /// Lists orders, newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<OrderStatus>) -> DbResult<Vec<Order>> {
        debug!(status = ?status, "Listing orders");

        let mut conn = self.pool.acquire().await?;
        let rows: Vec<OrderRow> = match status {
            Some(s) => {
                sqlx::query_as(&format!("{} WHERE status = ?1 ORDER BY created_at DESC, id", SELECT_ORDER))
                    .bind(s)
                    .fetch_all(&mut *conn)
                    .await?
            }
            None => {
                sqlx::query_as(&format!("{} ORDER BY created_at DESC, id", SELECT_ORDER))
                    .fetch_all(&mut *conn)
                    .await?
            }
        };

        let item_rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT order_id, product_id, name_snapshot, quantity FROM order_items ORDER BY order_id, position",
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut items: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for item in item_rows {
            items.entry(item.order_id.clone()).or_default().push(item.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let own = items.remove(&row.id).unwrap_or_default();
                row.into_order(own)
            })
            .collect())
    }

    /// Inserts a new order with its items.
    pub async fn insert(&self, order: &Order) -> DbResult<()> {
        debug!(
            id = %order.id,
            customer_id = %order.customer_id,
            items = order.items.len(),
            "Inserting order"
        );

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, telegram, total_price_minor, status,
                delivery_method, delivery_service, delivery_city,
                created_at, updated_at, delivered_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(&order.telegram)
        .bind(order.total_price.minor())
        .bind(order.status)
        .bind(order.delivery.method)
        .bind(&order.delivery.service)
        .bind(&order.delivery.city)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.delivered_at)
        .execute(&mut *tx)
        .await?;

        Self::insert_items(&mut tx, &order.id, &order.items).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Touches the order if its status is one of `from`.
    ///
    /// Returns false when the order is missing or in another status.
    pub async fn claim_in(
        conn: &mut SqliteConnection,
        id: &str,
        from: &[OrderStatus],
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let sql = format!(
            "UPDATE orders SET updated_at = ? WHERE id = ? AND status IN ({})",
            placeholders(from.len())
        );
        let mut query = sqlx::query(&sql).bind(now).bind(id);
        for status in from {
            query = query.bind(*status);
        }
        let result = query.execute(&mut *conn).await?;

        debug!(id = %id, claimed = result.rows_affected() == 1, "Claimed order");
        Ok(result.rows_affected() == 1)
    }

    /// Marks a claimed order delivered.
    pub async fn mark_delivered_in(conn: &mut SqliteConnection, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = 'delivered', delivered_at = ?2, updated_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", id));
        }
        Ok(())
    }

    /// Moves the order to `to` if its status is one of `from`.
    pub async fn set_status_if(
        &self,
        id: &str,
        from: &[OrderStatus],
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let sql = format!(
            "UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status IN ({})",
            placeholders(from.len())
        );
        let mut query = sqlx::query(&sql).bind(to).bind(now).bind(id);
        for status in from {
            query = query.bind(*status);
        }
        let result = query.execute(&self.pool).await?;

        debug!(id = %id, to = %to, changed = result.rows_affected() == 1, "Set order status");
        Ok(result.rows_affected() == 1)
    }

    /// Deletes the order (items cascade) if its status is one of `from`.
    pub async fn delete_if(&self, id: &str, from: &[OrderStatus]) -> DbResult<bool> {
        let sql = format!(
            "DELETE FROM orders WHERE id = ? AND status IN ({})",
            placeholders(from.len())
        );
        let mut query = sqlx::query(&sql).bind(id);
        for status in from {
            query = query.bind(*status);
        }
        let result = query.execute(&self.pool).await?;

        debug!(id = %id, deleted = result.rows_affected() == 1, "Deleted order");
        Ok(result.rows_affected() == 1)
    }

    /// Replaces items, delivery details, contact and total of an order that
    /// has not been delivered. Returns false if it has been (or is gone).
    pub async fn update_details(&self, order: &Order) -> DbResult<bool> {
        debug!(id = %order.id, "Updating order details");

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                telegram = ?2,
                total_price_minor = ?3,
                delivery_method = ?4,
                delivery_service = ?5,
                delivery_city = ?6,
                updated_at = ?7
            WHERE id = ?1 AND status IN ('new', 'processing')
            "#,
        )
        .bind(&order.id)
        .bind(&order.telegram)
        .bind(order.total_price.minor())
        .bind(order.delivery.method)
        .bind(&order.delivery.service)
        .bind(&order.delivery.city)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM order_items WHERE order_id = ?1")
            .bind(&order.id)
            .execute(&mut *tx)
            .await?;
        Self::insert_items(&mut tx, &order.id, &order.items).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn items_of(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT order_id, product_id, name_snapshot, quantity FROM order_items WHERE order_id = ?1 ORDER BY position",
        )
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn insert_items(conn: &mut SqliteConnection, order_id: &str, items: &[OrderItem]) -> DbResult<()> {
        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, name_snapshot, quantity)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(order_id)
            .bind(position as i64)
            .bind(&item.product_id)
            .bind(&item.name_snapshot)
            .bind(item.quantity)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::generate_id;
    use crate::{Database, DbConfig};
    use medstock_core::CustomerProfile;

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let customer = CustomerProfile {
            id: generate_id(),
            name: "Ivan".to_string(),
            phone: None,
            loyalty_level: 0,
            loyalty_discount: 0,
            discount_overridden: false,
            purchases_count: 0,
            total_spent: Money::zero(),
            is_banned: false,
            created_at: now,
            updated_at: now,
        };
        db.customers().insert(&customer).await.unwrap();
        (db, customer.id)
    }

    fn order(customer_id: &str) -> Order {
        let now = Utc::now();
        Order {
            id: generate_id(),
            customer_id: customer_id.to_string(),
            telegram: Some("@ivan".to_string()),
            items: vec![
                OrderItem {
                    product_id: "libre-2".to_string(),
                    quantity: 2,
                    name_snapshot: "FreeStyle Libre 2".to_string(),
                },
                OrderItem {
                    product_id: "g7".to_string(),
                    quantity: 1,
                    name_snapshot: "Dexcom G7".to_string(),
                },
            ],
            total_price: Money::from_major_minor(14_000, 0),
            status: OrderStatus::New,
            delivery: DeliveryDetails {
                method: DeliveryMethod::Service,
                service: Some("CDEK".to_string()),
                city: Some("Kazan".to_string()),
            },
            created_at: now,
            updated_at: now,
            delivered_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_preserves_item_order() {
        let (db, customer_id) = setup().await;
        let o = order(&customer_id);
        db.orders().insert(&o).await.unwrap();

        let loaded = db.orders().get_by_id(&o.id).await.unwrap().unwrap();
        assert_eq!(loaded.items, o.items);
        assert_eq!(loaded.delivery, o.delivery);
        assert_eq!(loaded.status, OrderStatus::New);
    }

    #[tokio::test]
    async fn test_unknown_customer_is_rejected() {
        let (db, _) = setup().await;
        let err = db.orders().insert(&order("nobody")).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    async fn test_claim_is_keyed_on_status() {
        let (db, customer_id) = setup().await;
        let o = order(&customer_id);
        db.orders().insert(&o).await.unwrap();
        let sources = [OrderStatus::New, OrderStatus::Processing];

        let mut tx = db.begin().await.unwrap();
        assert!(OrderRepository::claim_in(&mut tx, &o.id, &sources, Utc::now()).await.unwrap());
        OrderRepository::mark_delivered_in(&mut tx, &o.id, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        assert!(!OrderRepository::claim_in(&mut tx, &o.id, &sources, Utc::now()).await.unwrap());
        drop(tx);

        let delivered = db.orders().list(Some(OrderStatus::Delivered)).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].delivered_at.is_some());
        assert_eq!(delivered[0].items.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_if_only_from_listed_statuses() {
        let (db, customer_id) = setup().await;
        let o = order(&customer_id);
        db.orders().insert(&o).await.unwrap();

        assert!(!db.orders().delete_if(&o.id, &[OrderStatus::Processing]).await.unwrap());
        assert!(db.orders().delete_if(&o.id, &[OrderStatus::New]).await.unwrap());
        assert!(db.orders().get_by_id(&o.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_details_skips_delivered_orders() {
        let (db, customer_id) = setup().await;
        let mut o = order(&customer_id);
        db.orders().insert(&o).await.unwrap();

        o.items.truncate(1);
        o.telegram = None;
        assert!(db.orders().update_details(&o).await.unwrap());
        let loaded = db.orders().get_by_id(&o.id).await.unwrap().unwrap();
        assert_eq!(loaded.items.len(), 1);
        assert!(loaded.telegram.is_none());

        assert!(db
            .orders()
            .set_status_if(&o.id, &[OrderStatus::New], OrderStatus::Processing, Utc::now())
            .await
            .unwrap());
        let mut tx = db.begin().await.unwrap();
        OrderRepository::mark_delivered_in(&mut tx, &o.id, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        o.items.clear();
        assert!(!db.orders().update_details(&o).await.unwrap());
        assert_eq!(db.orders().get_by_id(&o.id).await.unwrap().unwrap().items.len(), 1);
    }
}
