//! # Sale Repository
//!
//! Database operations for sales and their lines.
//!
//! ## Sale Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Where Sales Come From                             │
//! │                                                                         │
//! │  MANUAL (operator)                 ORDER (delivered transition)         │
//! │  ──────────────────                ────────────────────────────         │
//! │  insert()        one line          insert_in(&mut tx)  line per product │
//! │  update_manual() editable          never edited here                    │
//! │  delete_manual() deletable         never deleted here                   │
//! │                                                                         │
//! │  idx_sales_order_source: at most one ORDER sale per source_id           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `*_manual` writes carry `source_type = 'manual'` in their WHERE
//! clause, so an order-sourced sale cannot be changed through them even if
//! the caller skips its own check.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{DbError, DbResult};
use medstock_core::{Money, Sale, SaleLine, SaleSource};

const SELECT_SALE: &str = r#"
    SELECT id, total_amount_minor, date, source_type, source_id, comment,
           created_at, updated_at
    FROM sales
"#;

#[derive(sqlx::FromRow)]
struct SaleRow {
    id: String,
    total_amount_minor: i64,
    date: Option<NaiveDate>,
    source_type: SaleSource,
    source_id: Option<String>,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SaleLineRow {
    sale_id: String,
    product_id: String,
    product_name: String,
    quantity: i64,
}

impl SaleRow {
    fn into_sale(self, lines: Vec<SaleLine>) -> DbResult<Sale> {
        if lines.is_empty() {
            return Err(DbError::corrupt("Sale", &self.id, "sale has no lines"));
        }
        Ok(Sale {
            id: self.id,
            lines,
            total_amount: Money::from_minor(self.total_amount_minor),
            date: self.date,
            source_type: self.source_type,
            source_id: self.source_id,
            comment: self.comment,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl From<SaleLineRow> for SaleLine {
    fn from(row: SaleLineRow) -> Self {
        SaleLine {
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
        }
    }
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale with its lines.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        let row: Option<SaleRow> = sqlx::query_as(&format!("{} WHERE id = ?1", SELECT_SALE))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => {
                let lines = Self::lines_of(&mut conn, &row.id).await?;
                Ok(Some(row.into_sale(lines)?))
            }
            None => Ok(None),
        }
    }

    /// The sale generated by an order, if the order was delivered.
    pub async fn get_by_source(&self, order_id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_by_source_in(&mut conn, order_id).await
    }

    /// Order-sourced sale lookup on the caller's transaction.
    pub async fn get_by_source_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Option<Sale>> {
        let row: Option<SaleRow> = sqlx::query_as(&format!(
            "{} WHERE source_type = 'order' AND source_id = ?1",
            SELECT_SALE
        ))
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => {
                let lines = Self::lines_of(conn, &row.id).await?;
                Ok(Some(row.into_sale(lines)?))
            }
            None => Ok(None),
        }
    }

    /// All sales with their lines, newest first.
    pub async fn list_all(&self) -> DbResult<Vec<Sale>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_all_in(&mut conn).await
    }

    /// All sales, read on the caller's transaction.
    pub async fn list_all_in(conn: &mut SqliteConnection) -> DbResult<Vec<Sale>> {
        let rows: Vec<SaleRow> = sqlx::query_as(&format!("{} ORDER BY created_at DESC, id", SELECT_SALE))
            .fetch_all(&mut *conn)
            .await?;

        let line_rows: Vec<SaleLineRow> = sqlx::query_as(
            "SELECT sale_id, product_id, product_name, quantity FROM sale_lines ORDER BY sale_id, position",
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut lines: HashMap<String, Vec<SaleLine>> = HashMap::new();
        for line in line_rows {
            lines.entry(line.sale_id.clone()).or_default().push(line.into());
        }

        debug!(count = rows.len(), "Loaded sales");
        rows.into_iter()
            .map(|row| {
                let own = lines.remove(&row.id).unwrap_or_default();
                row.into_sale(own)
            })
            .collect()
    }

    /// Inserts a manual sale.
    pub async fn insert(&self, sale: &Sale) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_in(&mut tx, sale).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Inserts a sale and its lines on the caller's transaction.
    ///
    /// A second order-sourced sale for the same order fails with
    /// `UniqueViolation`.
    pub async fn insert_in(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(
            id = %sale.id,
            source_type = %sale.source_type,
            lines = sale.lines.len(),
            "Inserting sale"
        );

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, total_amount_minor, date, source_type, source_id, comment,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&sale.id)
        .bind(sale.total_amount.minor())
        .bind(sale.date)
        .bind(sale.source_type)
        .bind(&sale.source_id)
        .bind(&sale.comment)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(&mut *conn)
        .await?;

        Self::insert_lines(conn, &sale.id, &sale.lines).await
    }

    /// Replaces a manual sale's fields and lines.
    pub async fn update_manual(&self, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, "Updating manual sale");

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                total_amount_minor = ?2,
                date = ?3,
                comment = ?4,
                updated_at = ?5
            WHERE id = ?1 AND source_type = 'manual'
            "#,
        )
        .bind(&sale.id)
        .bind(sale.total_amount.minor())
        .bind(sale.date)
        .bind(&sale.comment)
        .bind(sale.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale (manual)", &sale.id));
        }

        sqlx::query("DELETE FROM sale_lines WHERE sale_id = ?1")
            .bind(&sale.id)
            .execute(&mut *tx)
            .await?;
        Self::insert_lines(&mut tx, &sale.id, &sale.lines).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Deletes a manual sale (lines cascade).
    pub async fn delete_manual(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting manual sale");

        let result = sqlx::query("DELETE FROM sales WHERE id = ?1 AND source_type = 'manual'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale (manual)", id));
        }

        Ok(())
    }

    async fn lines_of(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let rows: Vec<SaleLineRow> = sqlx::query_as(
            "SELECT sale_id, product_id, product_name, quantity FROM sale_lines WHERE sale_id = ?1 ORDER BY position",
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(SaleLine::from).collect())
    }

    async fn insert_lines(conn: &mut SqliteConnection, sale_id: &str, lines: &[SaleLine]) -> DbResult<()> {
        for (position, line) in lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_lines (sale_id, position, product_id, product_name, quantity)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(sale_id)
            .bind(position as i64)
            .bind(&line.product_id)
            .bind(&line.product_name)
            .bind(line.quantity)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
