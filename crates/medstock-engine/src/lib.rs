//! # medstock-engine: Bookkeeping Operations
//!
//! The operation surface of MedStock. Each public method on [`Engine`] is one
//! operation the storefront or the admin tools invoke: it validates input,
//! applies the pure rules from `medstock-core`, persists through
//! `medstock-db` and publishes a change notification after commit.
//!
//! ## Module Organization
//! ```text
//! medstock_engine/
//! ├── lib.rs          ◄─── Engine handle, clock, settings access
//! ├── config.rs       ◄─── EngineConfig (env > TOML > defaults)
//! ├── error.rs        ◄─── EngineError, ErrorReport
//! ├── notify.rs       ◄─── ChangeNotifier (broadcast)
//! ├── orders.rs       ◄─── Checkout, status machine, atomic delivery, edits
//! ├── inventory.rs    ◄─── Purchases, sales, stock report
//! ├── customers.rs    ◄─── Profiles, bans, loyalty overrides
//! ├── catalog.rs      ◄─── Products and the settings document
//! └── finance.rs      ◄─── Monthly finance series
//! ```
//!
//! ## Delivery Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  set_order_status(id, Delivered)                                        │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   1. claim order  (UPDATE … WHERE status IN (new, processing))         │
//! │      └─ takes SQLite's write lock; competing deliveries wait here      │
//! │   2. recompute stock from every purchase and sale                       │
//! │   3. shortages? ── yes ──► ROLLBACK, InsufficientStock                 │
//! │   4. insert order-sourced sale (one line per product)                   │
//! │   5. status = delivered, delivered_at = now                             │
//! │   6. purchases_count + 1, total_spent + total, refresh tier             │
//! │  COMMIT ──► notify(orders, sales, customers)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use medstock_engine::{Engine, EngineConfig};
//!
//! let engine = Engine::open(&EngineConfig::load(None)?).await?;
//! let report = engine.get_stock_report().await?;
//! ```

pub mod catalog;
pub mod config;
pub mod customers;
pub mod error;
pub mod finance;
pub mod inventory;
pub mod notify;
pub mod orders;

pub use catalog::ProductInput;
pub use config::{ConfigError, EngineConfig};
pub use customers::NewCustomer;
pub use error::{EngineError, EngineResult, ErrorCode, ErrorReport};
pub use inventory::{PurchaseInput, SaleInput};
pub use notify::{ChangeEvent, ChangeKind, ChangeNotifier, Collection};
pub use orders::{NewOrder, NewOrderItem, OrderEdit};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::broadcast;
use tracing::info;

use medstock_core::finance::business_date;
use medstock_core::{SettingsConfig, DEFAULT_BUSINESS_TZ, DEFAULT_FINANCE_WINDOW};
use medstock_db::{Database, DbConfig, DbError};

/// Handle to the bookkeeping engine.
///
/// Cheap to clone; clones share the connection pool and the notifier.
#[derive(Debug, Clone)]
pub struct Engine {
    db: Database,
    tz: Tz,
    finance_window: u32,
    notifier: ChangeNotifier,
}

impl Engine {
    /// Opens the configured database (running migrations) and builds the engine.
    pub async fn open(config: &EngineConfig) -> EngineResult<Self> {
        let tz = config
            .timezone()
            .map_err(|e| DbError::Internal(e.to_string()))?;

        let db_config = config.db_config();
        if let Some(parent) = db_config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
            }
        }

        let db = Database::new(db_config).await?;
        info!(timezone = %tz, "Engine ready");

        Ok(Self::with_database(db, tz, config.business.finance_window))
    }

    /// Wraps an already open database.
    pub fn with_database(db: Database, tz: Tz, finance_window: u32) -> Self {
        Engine {
            db,
            tz,
            finance_window,
            notifier: ChangeNotifier::default(),
        }
    }

    /// Fresh in-memory engine with default business settings (for tests).
    pub async fn in_memory() -> EngineResult<Self> {
        let db = Database::new(DbConfig::in_memory()).await?;
        Ok(Self::with_database(db, DEFAULT_BUSINESS_TZ, DEFAULT_FINANCE_WINDOW))
    }

    /// Receives a [`ChangeEvent`] after every committed write.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn business_timezone(&self) -> Tz {
        self.tz
    }

    /// Today in the business timezone.
    pub fn today(&self) -> NaiveDate {
        business_date(self.now(), self.tz)
    }

    pub async fn close(&self) {
        self.db.close().await;
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Stored settings, or the defaults until an operator saves some.
    async fn settings(&self) -> EngineResult<SettingsConfig> {
        Ok(self.db.settings().get().await?.unwrap_or_default())
    }
}
