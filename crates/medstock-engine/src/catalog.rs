//! # Catalog and Settings Operations
//!
//! Products are read-only inputs to the ledger: renaming a product leaves
//! the name snapshots on existing purchases, sales and orders alone.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;

use medstock_core::validation::{validate_amount, validate_percent, validate_product_name, validate_settings};
use medstock_core::{CoreError, Money, Product, SettingsConfig};
use medstock_db::generate_id;

use crate::error::EngineResult;
use crate::notify::Collection;
use crate::Engine;

/// Fields an operator sets on a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductInput {
    pub name: String,
    pub price: Money,
    pub discount_percent: u8,
    pub cost_price: Money,
    pub is_active: bool,
    pub in_stock: bool,
}

impl ProductInput {
    fn validate(&self) -> EngineResult<()> {
        validate_product_name(&self.name)?;
        validate_amount("price", self.price)?;
        validate_amount("cost_price", self.cost_price)?;
        validate_percent("discount_percent", self.discount_percent)?;
        Ok(())
    }
}

impl Engine {
    // =========================================================================
    // Products
    // =========================================================================

    pub async fn create_product(&self, input: ProductInput) -> EngineResult<Product> {
        input.validate()?;

        let now = self.now();
        let product = Product {
            id: generate_id(),
            name: input.name.trim().to_string(),
            price: input.price,
            discount_percent: input.discount_percent,
            cost_price: input.cost_price,
            is_active: input.is_active,
            in_stock: input.in_stock,
            created_at: now,
            updated_at: now,
        };
        self.db.products().insert(&product).await?;

        info!(id = %product.id, name = %product.name, price = %product.price, "Product created");
        self.notifier.created(Collection::Products, &product.id);
        Ok(product)
    }

    pub async fn update_product(&self, id: &str, input: ProductInput) -> EngineResult<Product> {
        input.validate()?;

        let existing = self.get_product(id).await?;
        let product = Product {
            name: input.name.trim().to_string(),
            price: input.price,
            discount_percent: input.discount_percent,
            cost_price: input.cost_price,
            is_active: input.is_active,
            in_stock: input.in_stock,
            updated_at: self.now(),
            ..existing
        };
        self.db.products().update(&product).await?;

        info!(id = %id, "Product updated");
        self.notifier.updated(Collection::Products, id);
        Ok(product)
    }

    pub async fn get_product(&self, id: &str) -> EngineResult<Product> {
        self.db
            .products()
            .get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", id).into())
    }

    pub async fn list_products(&self, include_inactive: bool) -> EngineResult<Vec<Product>> {
        Ok(self.db.products().list(include_inactive).await?)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// The settings document; defaults until first saved.
    pub async fn get_settings(&self) -> EngineResult<SettingsConfig> {
        self.settings().await
    }

    /// Validates and replaces the settings document (last writer wins).
    ///
    /// Existing loyalty caches are not recomputed; new thresholds apply at
    /// the next delivery or an explicit recompute.
    pub async fn update_settings(&self, settings: SettingsConfig) -> EngineResult<SettingsConfig> {
        validate_settings(&settings)?;
        debug!(tiers = settings.vip_tiers.len(), services = settings.delivery_services.len(), "Updating settings");

        self.db.settings().save(&settings, self.now()).await?;

        info!(keep_manual_discount = settings.keep_manual_discount, "Settings saved");
        self.notifier.updated(Collection::Settings, "settings");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::EngineError;

    fn input(name: &str) -> ProductInput {
        ProductInput {
            name: name.to_string(),
            price: Money::from_major_minor(4_599, 0),
            discount_percent: 0,
            cost_price: Money::from_major_minor(3_200, 0),
            is_active: true,
            in_stock: true,
        }
    }

    #[tokio::test]
    async fn test_product_lifecycle() {
        let engine = testing::engine().await;
        let product = engine.create_product(input("FreeStyle Libre 2")).await.unwrap();

        let mut changed = input("FreeStyle Libre 2 (RU)");
        changed.is_active = false;
        let updated = engine.update_product(&product.id, changed).await.unwrap();
        assert_eq!(updated.created_at, product.created_at);

        assert!(engine.list_products(false).await.unwrap().is_empty());
        assert_eq!(engine.list_products(true).await.unwrap().len(), 1);
        assert_eq!(engine.get_product(&product.id).await.unwrap().name, "FreeStyle Libre 2 (RU)");
    }

    #[tokio::test]
    async fn test_product_validation() {
        let engine = testing::engine().await;
        let mut bad = input("Dexcom G7");
        bad.discount_percent = 101;
        assert!(matches!(
            engine.create_product(bad).await,
            Err(EngineError::Rule(CoreError::Validation(_)))
        ));
        assert!(matches!(
            engine.update_product("missing", input("Dexcom G7")).await,
            Err(EngineError::Rule(CoreError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_settings_default_then_saved() {
        let engine = testing::engine().await;
        assert_eq!(engine.get_settings().await.unwrap(), SettingsConfig::default());

        let mut settings = SettingsConfig::default();
        settings.keep_manual_discount = true;
        engine.update_settings(settings.clone()).await.unwrap();
        assert!(engine.get_settings().await.unwrap().keep_manual_discount);

        settings.delivery_services.push("cdek".to_string());
        assert!(engine.update_settings(settings).await.is_err());
        assert!(engine.get_settings().await.unwrap().keep_manual_discount);
    }
}
