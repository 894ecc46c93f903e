//! # Product Repository
//!
//! Database operations for the sensor catalog.
//!
//! Products are only an input to the ledger: stock is never stored on the
//! product row. Deactivating a product hides it from checkout while its
//! purchase and sale history keeps counting.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::narrow_u8;
use crate::error::{DbError, DbResult};
use medstock_core::{Money, Product};

const SELECT_PRODUCT: &str = r#"
    SELECT id, name, price_minor, discount_percent, cost_price_minor,
           is_active, in_stock, created_at, updated_at
    FROM products
"#;

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    price_minor: i64,
    discount_percent: i64,
    cost_price_minor: i64,
    is_active: bool,
    in_stock: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = DbError;

    fn try_from(row: ProductRow) -> DbResult<Self> {
        let discount_percent = narrow_u8("Product", &row.id, "discount_percent", row.discount_percent)?;
        Ok(Product {
            id: row.id,
            name: row.name,
            price: Money::from_minor(row.price_minor),
            discount_percent,
            cost_price: Money::from_minor(row.cost_price_minor),
            is_active: row.is_active,
            in_stock: row.in_stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn convert(rows: Vec<ProductRow>) -> DbResult<Vec<Product>> {
    rows.into_iter().map(Product::try_from).collect()
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// repo.insert(&product).await?;
/// let active = repo.list(false).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    /// Gets a product on an already open connection or transaction.
    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(&format!("{} WHERE id = ?1", SELECT_PRODUCT))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(Product::try_from).transpose()
    }

    /// Lists catalog products sorted by name.
    pub async fn list(&self, include_inactive: bool) -> DbResult<Vec<Product>> {
        debug!(include_inactive, "Listing products");

        let sql = if include_inactive {
            format!("{} ORDER BY name", SELECT_PRODUCT)
        } else {
            format!("{} WHERE is_active = 1 ORDER BY name", SELECT_PRODUCT)
        };
        let rows: Vec<ProductRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        convert(rows)
    }

    /// Every product, active or not. Input to the stock fold.
    pub async fn list_all(&self) -> DbResult<Vec<Product>> {
        self.list(true).await
    }

    /// Every product, read on the caller's transaction.
    pub async fn list_all_in(conn: &mut SqliteConnection) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!("{} ORDER BY name", SELECT_PRODUCT))
            .fetch_all(&mut *conn)
            .await?;
        convert(rows)
    }

    /// Inserts a new product.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, price_minor, discount_percent, cost_price_minor,
                is_active, in_stock, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price.minor())
        .bind(product.discount_percent as i64)
        .bind(product.cost_price.minor())
        .bind(product.is_active)
        .bind(product.in_stock)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates catalog fields of an existing product.
    pub async fn update(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, "Updating product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                price_minor = ?3,
                discount_percent = ?4,
                cost_price_minor = ?5,
                is_active = ?6,
                in_stock = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price.minor())
        .bind(product.discount_percent as i64)
        .bind(product.cost_price.minor())
        .bind(product.is_active)
        .bind(product.in_stock)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Counts active products (for diagnostics and the seed binary).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
