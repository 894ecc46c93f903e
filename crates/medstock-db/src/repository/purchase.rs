//! # Purchase Repository
//!
//! Stock-in events. Purchases are only ever entered by an operator and may
//! be edited or deleted freely; the ledger is recomputed on every read.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use medstock_core::{Money, Purchase};

const SELECT_PURCHASE: &str = r#"
    SELECT id, product_id, product_name, quantity, total_amount_minor,
           date, comment, created_at, updated_at
    FROM purchases
"#;

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    id: String,
    product_id: String,
    product_name: String,
    quantity: i64,
    total_amount_minor: i64,
    date: Option<NaiveDate>,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PurchaseRow> for Purchase {
    fn from(row: PurchaseRow) -> Self {
        Purchase {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            total_amount: Money::from_minor(row.total_amount_minor),
            date: row.date,
            comment: row.comment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for purchase database operations.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    /// Creates a new PurchaseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Gets a purchase by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Purchase>> {
        let row: Option<PurchaseRow> = sqlx::query_as(&format!("{} WHERE id = ?1", SELECT_PURCHASE))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Purchase::from))
    }

    /// All purchases, newest first.
    pub async fn list_all(&self) -> DbResult<Vec<Purchase>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_all_in(&mut conn).await
    }

    /// All purchases, read on the caller's transaction.
    pub async fn list_all_in(conn: &mut SqliteConnection) -> DbResult<Vec<Purchase>> {
        let rows: Vec<PurchaseRow> =
            sqlx::query_as(&format!("{} ORDER BY created_at DESC, id", SELECT_PURCHASE))
                .fetch_all(&mut *conn)
                .await?;

        debug!(count = rows.len(), "Loaded purchases");
        Ok(rows.into_iter().map(Purchase::from).collect())
    }

    /// Inserts a new purchase.
    pub async fn insert(&self, purchase: &Purchase) -> DbResult<()> {
        debug!(
            id = %purchase.id,
            product_id = %purchase.product_id,
            quantity = purchase.quantity,
            "Inserting purchase"
        );

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, product_id, product_name, quantity, total_amount_minor,
                date, comment, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&purchase.id)
        .bind(&purchase.product_id)
        .bind(&purchase.product_name)
        .bind(purchase.quantity)
        .bind(purchase.total_amount.minor())
        .bind(purchase.date)
        .bind(&purchase.comment)
        .bind(purchase.created_at)
        .bind(purchase.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replaces the editable fields of a purchase.
    pub async fn update(&self, purchase: &Purchase) -> DbResult<()> {
        debug!(id = %purchase.id, "Updating purchase");

        let result = sqlx::query(
            r#"
            UPDATE purchases SET
                product_id = ?2,
                product_name = ?3,
                quantity = ?4,
                total_amount_minor = ?5,
                date = ?6,
                comment = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(&purchase.id)
        .bind(&purchase.product_id)
        .bind(&purchase.product_name)
        .bind(purchase.quantity)
        .bind(purchase.total_amount.minor())
        .bind(purchase.date)
        .bind(&purchase.comment)
        .bind(purchase.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Purchase", &purchase.id));
        }

        Ok(())
    }

    /// Deletes a purchase.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting purchase");

        let result = sqlx::query("DELETE FROM purchases WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Purchase", id));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::generate_id;
    use crate::{Database, DbConfig};

    fn purchase(qty: i64, date: Option<NaiveDate>) -> Purchase {
        let now = Utc::now();
        Purchase {
            id: generate_id(),
            product_id: "libre-2".to_string(),
            product_name: "FreeStyle Libre 2".to_string(),
            quantity: qty,
            total_amount: Money::from_major_minor(3_200, 0) * qty,
            date,
            comment: Some("supplier batch".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_update_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.purchases();
        let mut p = purchase(10, NaiveDate::from_ymd_opt(2024, 2, 1));
        repo.insert(&p).await.unwrap();

        let loaded = repo.get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(loaded.date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(loaded.total_amount.minor(), 3_200_000);

        p.quantity = 12;
        p.date = None;
        repo.update(&p).await.unwrap();
        let loaded = repo.get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(loaded.quantity, 12);
        assert!(loaded.date.is_none());

        repo.delete(&p.id).await.unwrap();
        assert!(repo.get_by_id(&p.id).await.unwrap().is_none());
        assert!(matches!(repo.delete(&p.id).await, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_check_constraint_rejects_zero_quantity() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.purchases().insert(&purchase(0, None)).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }
}
