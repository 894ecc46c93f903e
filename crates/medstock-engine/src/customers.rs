//! # Customer Operations
//!
//! Loyalty fields on a profile are a cache. The delivered transition is the
//! only automatic writer; the operations here let an operator pin a level
//! or discount, or ask for the tier to be re-derived from the counters.

use serde::{Deserialize, Serialize};
use tracing::info;
use ts_rs::TS;

use medstock_core::loyalty::{apply_manual, refresh_tier};
use medstock_core::validation::{validate_customer_name, validate_loyalty_level, validate_percent};
use medstock_core::{CoreError, CustomerProfile, Money, ValidationError};
use medstock_db::generate_id;

use crate::error::EngineResult;
use crate::notify::Collection;
use crate::Engine;

const MAX_PHONE_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCustomer {
    pub name: String,
    pub phone: Option<String>,
}

impl Engine {
    pub async fn create_customer(&self, input: NewCustomer) -> EngineResult<CustomerProfile> {
        validate_customer_name(&input.name)?;
        let phone = input
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if phone.as_ref().is_some_and(|p| p.chars().count() > MAX_PHONE_LEN) {
            return Err(ValidationError::TooLong {
                field: "phone".to_string(),
                max: MAX_PHONE_LEN,
            }
            .into());
        }

        let now = self.now();
        let customer = CustomerProfile {
            id: generate_id(),
            name: input.name.trim().to_string(),
            phone,
            loyalty_level: 0,
            loyalty_discount: 0,
            discount_overridden: false,
            purchases_count: 0,
            total_spent: Money::zero(),
            is_banned: false,
            created_at: now,
            updated_at: now,
        };
        self.db.customers().insert(&customer).await?;

        info!(id = %customer.id, "Customer created");
        self.notifier.created(Collection::Customers, &customer.id);
        Ok(customer)
    }

    pub async fn get_customer(&self, id: &str) -> EngineResult<CustomerProfile> {
        self.db
            .customers()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Customer", id).into())
    }

    pub async fn list_customers(&self) -> EngineResult<Vec<CustomerProfile>> {
        Ok(self.db.customers().list().await?)
    }

    /// Bans or unbans a customer. Banned customers cannot place orders;
    /// their existing orders are untouched.
    pub async fn set_customer_banned(&self, id: &str, banned: bool) -> EngineResult<CustomerProfile> {
        self.db.customers().set_banned(id, banned, self.now()).await?;

        info!(id = %id, banned, "Customer ban changed");
        self.notifier.updated(Collection::Customers, id);
        self.get_customer(id).await
    }

    /// Operator override of the loyalty level.
    ///
    /// With `discount_override` the discount is pinned; without it the
    /// discount follows the level's configured tier.
    pub async fn set_customer_loyalty(
        &self,
        customer_id: &str,
        level: u8,
        discount_override: Option<u8>,
    ) -> EngineResult<CustomerProfile> {
        validate_loyalty_level(level)?;
        if let Some(discount) = discount_override {
            validate_percent("discount", discount)?;
        }

        let settings = self.settings().await?;
        let mut customer = self.get_customer(customer_id).await?;
        apply_manual(&mut customer, level, discount_override, &settings, self.now());
        self.db.customers().save_loyalty(&customer).await?;

        info!(
            id = %customer_id,
            level = customer.loyalty_level,
            discount = customer.loyalty_discount,
            pinned = customer.discount_overridden,
            "Loyalty set by operator"
        );
        self.notifier.updated(Collection::Customers, customer_id);
        Ok(customer)
    }

    /// Re-derives the tier from the stored counters and current settings.
    pub async fn recompute_customer_loyalty(&self, customer_id: &str) -> EngineResult<CustomerProfile> {
        let settings = self.settings().await?;
        let mut customer = self.get_customer(customer_id).await?;

        if refresh_tier(&mut customer, &settings) {
            customer.updated_at = self.now();
            self.db.customers().save_loyalty(&customer).await?;
            info!(
                id = %customer_id,
                level = customer.loyalty_level,
                discount = customer.loyalty_discount,
                "Loyalty recomputed"
            );
            self.notifier.updated(Collection::Customers, customer_id);
        }
        Ok(customer)
    }
}
