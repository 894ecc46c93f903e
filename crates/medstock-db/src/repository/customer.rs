//! # Customer Repository
//!
//! Customer profiles and their cached loyalty fields.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::narrow_u8;
use crate::error::{DbError, DbResult};
use medstock_core::{CustomerProfile, Money};

const SELECT_CUSTOMER: &str = r#"
    SELECT id, name, phone, loyalty_level, loyalty_discount, discount_overridden,
           purchases_count, total_spent_minor, is_banned, created_at, updated_at
    FROM customers
"#;

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: String,
    name: String,
    phone: Option<String>,
    loyalty_level: i64,
    loyalty_discount: i64,
    discount_overridden: bool,
    purchases_count: i64,
    total_spent_minor: i64,
    is_banned: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for CustomerProfile {
    type Error = DbError;

    fn try_from(row: CustomerRow) -> DbResult<Self> {
        let loyalty_level = narrow_u8("Customer", &row.id, "loyalty_level", row.loyalty_level)?;
        let loyalty_discount = narrow_u8("Customer", &row.id, "loyalty_discount", row.loyalty_discount)?;
        Ok(CustomerProfile {
            id: row.id,
            name: row.name,
            phone: row.phone,
            loyalty_level,
            loyalty_discount,
            discount_overridden: row.discount_overridden,
            purchases_count: row.purchases_count,
            total_spent: Money::from_minor(row.total_spent_minor),
            is_banned: row.is_banned,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets a customer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CustomerProfile>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    /// Gets a customer on the caller's transaction.
    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<CustomerProfile>> {
        let row: Option<CustomerRow> = sqlx::query_as(&format!("{} WHERE id = ?1", SELECT_CUSTOMER))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(CustomerProfile::try_from).transpose()
    }

    /// Lists customers by name.
    pub async fn list(&self) -> DbResult<Vec<CustomerProfile>> {
        let rows: Vec<CustomerRow> = sqlx::query_as(&format!("{} ORDER BY name, id", SELECT_CUSTOMER))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(CustomerProfile::try_from).collect()
    }

    /// Inserts a new customer.
    pub async fn insert(&self, customer: &CustomerProfile) -> DbResult<()> {
        debug!(id = %customer.id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, phone, loyalty_level, loyalty_discount, discount_overridden,
                purchases_count, total_spent_minor, is_banned, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.loyalty_level as i64)
        .bind(customer.loyalty_discount as i64)
        .bind(customer.discount_overridden)
        .bind(customer.purchases_count)
        .bind(customer.total_spent.minor())
        .bind(customer.is_banned)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Writes the loyalty cache and counters.
    pub async fn save_loyalty(&self, customer: &CustomerProfile) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::save_loyalty_in(&mut conn, customer).await
    }

    /// Writes the loyalty cache and counters on the caller's transaction.
    pub async fn save_loyalty_in(conn: &mut SqliteConnection, customer: &CustomerProfile) -> DbResult<()> {
        debug!(
            id = %customer.id,
            level = customer.loyalty_level,
            discount = customer.loyalty_discount,
            purchases_count = customer.purchases_count,
            "Saving loyalty"
        );

        let result = sqlx::query(
            r#"
            UPDATE customers SET
                loyalty_level = ?2,
                loyalty_discount = ?3,
                discount_overridden = ?4,
                purchases_count = ?5,
                total_spent_minor = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&customer.id)
        .bind(customer.loyalty_level as i64)
        .bind(customer.loyalty_discount as i64)
        .bind(customer.discount_overridden)
        .bind(customer.purchases_count)
        .bind(customer.total_spent.minor())
        .bind(customer.updated_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", &customer.id));
        }
        Ok(())
    }

    /// Sets or clears the banned flag.
    pub async fn set_banned(&self, id: &str, banned: bool, now: DateTime<Utc>) -> DbResult<()> {
        debug!(id = %id, banned, "Setting customer ban");

        let result = sqlx::query("UPDATE customers SET is_banned = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(banned)
            .bind(now)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::generate_id;
    use crate::{Database, DbConfig};

    fn customer(name: &str) -> CustomerProfile {
        let now = Utc::now();
        CustomerProfile {
            id: generate_id(),
            name: name.to_string(),
            phone: Some("+7 900 000-00-00".to_string()),
            loyalty_level: 0,
            loyalty_discount: 0,
            discount_overridden: false,
            purchases_count: 0,
            total_spent: Money::zero(),
            is_banned: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_loyalty_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut c = customer("Maria");
        db.customers().insert(&c).await.unwrap();

        c.purchases_count = 3;
        c.total_spent = Money::from_major_minor(12_000, 0);
        c.loyalty_level = 1;
        c.loyalty_discount = 5;
        db.customers().save_loyalty(&c).await.unwrap();

        let loaded = db.customers().get_by_id(&c.id).await.unwrap().unwrap();
        assert_eq!(loaded.purchases_count, 3);
        assert_eq!(loaded.loyalty_level, 1);
        assert_eq!(loaded.total_spent, c.total_spent);
    }

    #[tokio::test]
    async fn test_ban_flag() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer("Oleg");
        db.customers().insert(&c).await.unwrap();
        db.customers().set_banned(&c.id, true, Utc::now()).await.unwrap();
        assert!(db.customers().get_by_id(&c.id).await.unwrap().unwrap().is_banned);
        assert!(matches!(
            db.customers().set_banned("missing", true, Utc::now()).await,
            Err(DbError::NotFound { .. })
        ));
        assert_eq!(db.customers().list().await.unwrap().len(), 1);
    }
}
