//! # medstock-db: Database Layer for MedStock
//!
//! This crate provides database access for the MedStock bookkeeping engine.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        MedStock Data Flow                               │
//! │                                                                         │
//! │  Engine operation (set_order_status, create_purchase, ...)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   medstock-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │   │   │
//! │  │   │               │    │ ProductRepo    │    │              │   │   │
//! │  │   │ SqlitePool    │◄───│ PurchaseRepo   │    │ 001_initial  │   │   │
//! │  │   │ begin()       │    │ SaleRepo       │    │ _schema.sql  │   │   │
//! │  │   │               │    │ OrderRepo      │    │              │   │   │
//! │  │   │               │    │ CustomerRepo   │    │              │   │   │
//! │  │   │               │    │ SettingsRepo   │    │              │   │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use medstock_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/medstock.db")).await?;
//! let purchases = db.purchases().list_all().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use sqlx::{Sqlite, SqliteConnection, Transaction};

// Repository re-exports for convenience
pub use repository::customer::CustomerRepository;
pub use repository::generate_id;
pub use repository::order::OrderRepository;
pub use repository::product::ProductRepository;
pub use repository::purchase::PurchaseRepository;
pub use repository::sale::SaleRepository;
pub use repository::settings::SettingsRepository;
