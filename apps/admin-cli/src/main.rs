//! # MedStock Admin CLI
//!
//! Operator command line over the bookkeeping engine. Every subcommand maps
//! to one engine operation and prints its result as JSON on stdout. Failures
//! print an `ErrorReport` on stderr.
//!
//! ## Usage
//! ```bash
//! medstock product add --name "FreeStyle Libre 2" --price 4599 --cost 3200
//! medstock purchase add --product <id> --quantity 20 --amount 64000
//! medstock order status <order-id> delivered
//! medstock stock --anomalies
//! medstock finance --months 12
//! ```
//!
//! ## Exit Codes
//! - `0` success
//! - `1` rejected (validation, business rule, missing record)
//! - `75` temporary storage failure; the same command may be retried

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use medstock_core::{DeliveryDetails, DeliveryMethod, Money, OrderStatus, SettingsConfig};
use medstock_engine::{
    Engine, EngineConfig, EngineError, NewCustomer, NewOrder, NewOrderItem, OrderEdit, ProductInput, PurchaseInput,
    SaleInput,
};

/// EX_TEMPFAIL from sysexits.h.
const EXIT_RETRYABLE: u8 = 75;

// =============================================================================
// Command Line
// =============================================================================

#[derive(Debug, Parser)]
#[command(name = "medstock", about = "MedStock back-office tools", version)]
struct Cli {
    /// Config file (default: platform config dir / medstock.toml)
    #[arg(long, env = "MEDSTOCK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Current stock per product
    Stock {
        /// Only products sold beyond what was purchased
        #[arg(long)]
        anomalies: bool,
    },
    /// Monthly revenue, spend and profit
    Finance {
        /// Months to show, ending with the current one
        #[arg(short, long)]
        months: Option<u32>,
    },
    #[command(subcommand)]
    Order(OrderCommand),
    #[command(subcommand)]
    Purchase(PurchaseCommand),
    #[command(subcommand)]
    Sale(SaleCommand),
    #[command(subcommand)]
    Customer(CustomerCommand),
    #[command(subcommand)]
    Product(ProductCommand),
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Debug, Subcommand)]
enum OrderCommand {
    List {
        #[arg(long)]
        status: Option<OrderStatus>,
    },
    Show {
        id: String,
    },
    /// Place an order on behalf of a customer
    Create {
        #[arg(long)]
        customer: String,
        /// PRODUCT_ID:QUANTITY, repeatable
        #[arg(long = "item", required = true, value_parser = parse_item)]
        items: Vec<NewOrderItem>,
        #[arg(long)]
        telegram: Option<String>,
        #[command(flatten)]
        delivery: DeliveryArgs,
    },
    /// Move an order to processing, delivered or cancelled
    Status {
        id: String,
        status: OrderStatus,
    },
    /// Replace items, delivery and contact of an open order
    Update {
        id: String,
        #[arg(long = "item", required = true, value_parser = parse_item)]
        items: Vec<NewOrderItem>,
        #[arg(long)]
        telegram: Option<String>,
        #[command(flatten)]
        delivery: DeliveryArgs,
    },
}

#[derive(Debug, Args)]
struct DeliveryArgs {
    /// pickup | courier | service
    #[arg(long, default_value = "pickup", value_parser = parse_method)]
    method: DeliveryMethod,
    #[arg(long)]
    service: Option<String>,
    #[arg(long)]
    city: Option<String>,
}

impl From<DeliveryArgs> for DeliveryDetails {
    fn from(args: DeliveryArgs) -> Self {
        DeliveryDetails {
            method: args.method,
            service: args.service,
            city: args.city,
        }
    }
}

#[derive(Debug, Args)]
struct EventArgs {
    #[arg(long)]
    product: String,
    #[arg(long)]
    quantity: i64,
    /// Total in roubles, e.g. 4599.50
    #[arg(long, value_parser = parse_money)]
    amount: Money,
    /// Business date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long)]
    comment: Option<String>,
}

impl From<EventArgs> for PurchaseInput {
    fn from(a: EventArgs) -> Self {
        PurchaseInput {
            product_id: a.product,
            quantity: a.quantity,
            total_amount: a.amount,
            date: a.date,
            comment: a.comment,
        }
    }
}

impl From<EventArgs> for SaleInput {
    fn from(a: EventArgs) -> Self {
        SaleInput {
            product_id: a.product,
            quantity: a.quantity,
            total_amount: a.amount,
            date: a.date,
            comment: a.comment,
        }
    }
}

#[derive(Debug, Subcommand)]
enum PurchaseCommand {
    Add(EventArgs),
    Update {
        id: String,
        #[command(flatten)]
        event: EventArgs,
    },
    Delete {
        id: String,
    },
    List,
}

#[derive(Debug, Subcommand)]
enum SaleCommand {
    /// Record a manual sale
    Add(EventArgs),
    Update {
        id: String,
        #[command(flatten)]
        event: EventArgs,
    },
    Delete {
        id: String,
    },
    List,
}

#[derive(Debug, Subcommand)]
enum CustomerCommand {
    Add {
        name: String,
        #[arg(long)]
        phone: Option<String>,
    },
    Show {
        id: String,
    },
    List,
    Ban {
        id: String,
    },
    Unban {
        id: String,
    },
    /// Set the loyalty level, optionally pinning a discount
    Loyalty {
        id: String,
        #[arg(long)]
        level: u8,
        #[arg(long)]
        discount: Option<u8>,
    },
    /// Re-derive the loyalty tier from purchase counters
    Recompute {
        id: String,
    },
}

#[derive(Debug, Args)]
struct ProductArgs {
    #[arg(long)]
    name: String,
    /// Unit price in roubles
    #[arg(long, value_parser = parse_money)]
    price: Money,
    #[arg(long, default_value_t = 0)]
    discount: u8,
    /// Unit cost in roubles
    #[arg(long, value_parser = parse_money)]
    cost: Money,
    #[arg(long)]
    inactive: bool,
    #[arg(long)]
    out_of_stock: bool,
}

impl From<ProductArgs> for ProductInput {
    fn from(a: ProductArgs) -> Self {
        ProductInput {
            name: a.name,
            price: a.price,
            discount_percent: a.discount,
            cost_price: a.cost,
            is_active: !a.inactive,
            in_stock: !a.out_of_stock,
        }
    }
}

#[derive(Debug, Subcommand)]
enum ProductCommand {
    Add(ProductArgs),
    Update {
        id: String,
        #[command(flatten)]
        product: ProductArgs,
    },
    Show {
        id: String,
    },
    List {
        /// Include inactive products
        #[arg(long)]
        all: bool,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    Show,
    /// Replace the settings document with a JSON file
    Set {
        file: PathBuf,
    },
}

// =============================================================================
// Argument Parsers
// =============================================================================

fn parse_item(s: &str) -> Result<NewOrderItem, String> {
    let (product_id, quantity) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected PRODUCT_ID:QUANTITY, got '{}'", s))?;
    let quantity = quantity
        .parse::<i64>()
        .map_err(|_| format!("invalid quantity in '{}'", s))?;
    Ok(NewOrderItem {
        product_id: product_id.to_string(),
        quantity,
    })
}

fn parse_method(s: &str) -> Result<DeliveryMethod, String> {
    match s.trim().to_lowercase().as_str() {
        "pickup" => Ok(DeliveryMethod::Pickup),
        "courier" => Ok(DeliveryMethod::Courier),
        "service" => Ok(DeliveryMethod::Service),
        other => Err(format!("unknown delivery method '{}' (pickup, courier, service)", other)),
    }
}

/// Roubles with up to two decimals: `4599`, `4599.5`, `4599.50`.
fn parse_money(s: &str) -> Result<Money, String> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (major, minor) = digits.split_once('.').unwrap_or((digits, ""));
    if minor.len() > 2 {
        return Err(format!("at most two decimals allowed: '{}'", s));
    }
    let major: i64 = major.parse().map_err(|_| format!("invalid amount '{}'", s))?;
    let minor: i64 = if minor.is_empty() {
        0
    } else {
        format!("{:0<2}", minor)
            .parse()
            .map_err(|_| format!("invalid amount '{}'", s))?
    };
    let kopecks = major
        .checked_mul(100)
        .and_then(|m| m.checked_add(minor))
        .ok_or_else(|| format!("amount out of range '{}'", s))?;
    Ok(Money::from_minor(if negative { -kopecks } else { kopecks }))
}

// =============================================================================
// Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(value) => {
            print_json(&value);
            ExitCode::SUCCESS
        }
        Err(err) => match err.downcast_ref::<EngineError>() {
            Some(engine_err) => {
                let report = engine_err.report();
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => eprintln!("{}", json),
                    Err(_) => eprintln!("{}", report),
                }
                if report.retryable {
                    ExitCode::from(EXIT_RETRYABLE)
                } else {
                    ExitCode::FAILURE
                }
            }
            None => {
                eprintln!("error: {:#}", err);
                ExitCode::FAILURE
            }
        },
    }
}

/// Logs go to stderr so stdout stays machine-readable.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - Default: `info,medstock=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,medstock=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("error: cannot render output: {}", e),
    }
}

async fn run(cli: Cli) -> anyhow::Result<Value> {
    let mut config = EngineConfig::load(cli.config.clone()).context("loading configuration")?;
    if let Some(db) = cli.db {
        config.database.path = Some(db);
    }
    debug!(db = ?config.database_path(), "Opening engine");

    let engine = Engine::open(&config).await?;
    let result = dispatch(&engine, cli.command).await;
    engine.close().await;
    result
}

async fn dispatch(engine: &Engine, command: Command) -> anyhow::Result<Value> {
    let value = match command {
        Command::Stock { anomalies: true } => serde_json::to_value(engine.stock_anomalies().await?)?,
        Command::Stock { anomalies: false } => serde_json::to_value(engine.get_stock_report().await?)?,
        Command::Finance { months } => {
            let months = months.unwrap_or_else(|| engine.finance_window());
            serde_json::to_value(engine.get_monthly_finance(months).await?)?
        }

        Command::Order(cmd) => match cmd {
            OrderCommand::List { status } => serde_json::to_value(engine.list_orders(status).await?)?,
            OrderCommand::Show { id } => serde_json::to_value(engine.get_order(&id).await?)?,
            OrderCommand::Create {
                customer,
                items,
                telegram,
                delivery,
            } => {
                let order = engine
                    .create_order(NewOrder {
                        customer_id: customer,
                        telegram,
                        items,
                        delivery: delivery.into(),
                    })
                    .await?;
                serde_json::to_value(order)?
            }
            OrderCommand::Status { id, status } => match engine.set_order_status(&id, status).await? {
                Some(order) => serde_json::to_value(order)?,
                None => json!({ "id": id, "status": "cancelled", "deleted": true }),
            },
            OrderCommand::Update {
                id,
                items,
                telegram,
                delivery,
            } => {
                let edit = OrderEdit {
                    items,
                    delivery: delivery.into(),
                    telegram,
                };
                serde_json::to_value(engine.update_order(&id, edit).await?)?
            }
        },

        Command::Purchase(cmd) => match cmd {
            PurchaseCommand::Add(event) => json!({ "id": engine.create_purchase(event.into()).await? }),
            PurchaseCommand::Update { id, event } => {
                serde_json::to_value(engine.update_purchase(&id, event.into()).await?)?
            }
            PurchaseCommand::Delete { id } => {
                engine.delete_purchase(&id).await?;
                json!({ "id": id, "deleted": true })
            }
            PurchaseCommand::List => serde_json::to_value(engine.list_purchases().await?)?,
        },

        Command::Sale(cmd) => match cmd {
            SaleCommand::Add(event) => json!({ "id": engine.create_sale(event.into()).await? }),
            SaleCommand::Update { id, event } => serde_json::to_value(engine.update_sale(&id, event.into()).await?)?,
            SaleCommand::Delete { id } => {
                engine.delete_sale(&id).await?;
                json!({ "id": id, "deleted": true })
            }
            SaleCommand::List => serde_json::to_value(engine.list_sales().await?)?,
        },

        Command::Customer(cmd) => match cmd {
            CustomerCommand::Add { name, phone } => {
                serde_json::to_value(engine.create_customer(NewCustomer { name, phone }).await?)?
            }
            CustomerCommand::Show { id } => serde_json::to_value(engine.get_customer(&id).await?)?,
            CustomerCommand::List => serde_json::to_value(engine.list_customers().await?)?,
            CustomerCommand::Ban { id } => serde_json::to_value(engine.set_customer_banned(&id, true).await?)?,
            CustomerCommand::Unban { id } => serde_json::to_value(engine.set_customer_banned(&id, false).await?)?,
            CustomerCommand::Loyalty { id, level, discount } => {
                serde_json::to_value(engine.set_customer_loyalty(&id, level, discount).await?)?
            }
            CustomerCommand::Recompute { id } => {
                serde_json::to_value(engine.recompute_customer_loyalty(&id).await?)?
            }
        },

        Command::Product(cmd) => match cmd {
            ProductCommand::Add(product) => serde_json::to_value(engine.create_product(product.into()).await?)?,
            ProductCommand::Update { id, product } => {
                serde_json::to_value(engine.update_product(&id, product.into()).await?)?
            }
            ProductCommand::Show { id } => serde_json::to_value(engine.get_product(&id).await?)?,
            ProductCommand::List { all } => serde_json::to_value(engine.list_products(all).await?)?,
        },

        Command::Settings(cmd) => match cmd {
            SettingsCommand::Show => serde_json::to_value(engine.get_settings().await?)?,
            SettingsCommand::Set { file } => {
                let contents = std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                let settings: SettingsConfig = serde_json::from_str(&contents)
                    .with_context(|| format!("parsing {}", file.display()))?;
                info!(file = %file.display(), "Replacing settings");
                serde_json::to_value(engine.update_settings(settings).await?)?
            }
        },
    };
    Ok(value)
}
