//! # Seed Data Generator
//!
//! Populates a database with the demo sensor catalog for development.
//!
//! ## Usage
//! ```bash
//! # Catalog only
//! cargo run -p medstock-db --bin seed
//!
//! # Catalog plus an opening stock-in per product and a demo customer
//! cargo run -p medstock-db --bin seed -- --opening-stock 20 --demo-customer
//!
//! # Specify database path
//! cargo run -p medstock-db --bin seed -- --db ./data/medstock.db
//! ```

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use medstock_core::{CustomerProfile, Money, Product, Purchase};
use medstock_db::{generate_id, Database, DbConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Demo catalog: (name, price ₽, product discount %, cost ₽).
const CATALOG: &[(&str, i64, u8, i64)] = &[
    ("FreeStyle Libre 2", 4_599, 0, 3_200),
    ("FreeStyle Libre 3", 6_490, 5, 4_700),
    ("Dexcom G6 sensor", 7_900, 0, 5_600),
    ("Dexcom G6 transmitter", 18_500, 0, 13_900),
    ("Dexcom G7", 9_900, 10, 7_100),
    ("Medtrum TouchCare Nano", 5_200, 0, 3_800),
    ("Libre overpatch (10 pcs)", 690, 0, 240),
    ("Sensor adhesive remover wipes", 450, 0, 150),
];

#[derive(Debug, Parser)]
#[command(name = "seed", about = "MedStock demo data generator")]
struct Args {
    /// Database file path
    #[arg(short, long, default_value = "./medstock_dev.db")]
    db: String,

    /// Units of opening stock recorded per product (0 = none)
    #[arg(short, long, default_value_t = 0)]
    opening_stock: i64,

    /// Also create a demo customer
    #[arg(long)]
    demo_customer: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    info!(db = %args.db, "Seeding database");

    let db = Database::new(DbConfig::new(&args.db))
        .await
        .with_context(|| format!("opening {}", args.db))?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products; skipping seed to avoid duplicates");
        return Ok(());
    }

    let now = Utc::now();
    for (name, price, discount, cost) in CATALOG {
        let product = Product {
            id: generate_id(),
            name: name.to_string(),
            price: Money::from_major_minor(*price, 0),
            discount_percent: *discount,
            cost_price: Money::from_major_minor(*cost, 0),
            is_active: true,
            in_stock: args.opening_stock > 0,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await?;

        if args.opening_stock > 0 {
            let purchase = Purchase {
                id: generate_id(),
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                quantity: args.opening_stock,
                total_amount: product.cost_price * args.opening_stock,
                date: None,
                comment: Some("opening stock".to_string()),
                created_at: now,
                updated_at: now,
            };
            db.purchases().insert(&purchase).await?;
        }
    }
    info!(products = CATALOG.len(), opening_stock = args.opening_stock, "Catalog seeded");

    if args.demo_customer {
        let customer = CustomerProfile {
            id: generate_id(),
            name: "Demo Customer".to_string(),
            phone: Some("+7 900 123-45-67".to_string()),
            loyalty_level: 0,
            loyalty_discount: 0,
            discount_overridden: false,
            purchases_count: 0,
            total_spent: Money::zero(),
            is_banned: false,
            created_at: now,
            updated_at: now,
        };
        db.customers().insert(&customer).await?;
        info!(id = %customer.id, "Demo customer created");
    }

    db.close().await;
    Ok(())
}
