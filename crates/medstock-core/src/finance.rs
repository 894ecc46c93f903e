//! # Monthly Finance
//!
//! Buckets sales and purchases into calendar months of the business
//! timezone and derives revenue, spend and profit per month.
//!
//! ## Bucketing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record.date present?  ── yes ──► month of that business date           │
//! │          │                                                              │
//! │          no                                                             │
//! │          ▼                                                              │
//! │  created_at (UTC) ──► business tz ──► calendar month                    │
//! │                                                                         │
//! │  2024-01-31T21:30Z  ==  2024-02-01 00:30 Moscow  ──►  2024-02           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::order::Order;
use crate::types::{Purchase, Sale, SaleSource};

const MONTH_LABELS: [&str; 12] = [
    "янв", "фев", "мар", "апр", "май", "июн", "июл", "авг", "сен", "окт", "ноя", "дек",
];

// =============================================================================
// Business Calendar
// =============================================================================

/// Calendar day of `instant` in the business timezone.
pub fn business_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Business date of a ledger record: its own date, else its creation day.
pub fn effective_date(date: Option<NaiveDate>, created_at: DateTime<Utc>, tz: Tz) -> NaiveDate {
    date.unwrap_or_else(|| business_date(created_at, tz))
}

/// A calendar month, `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Returns None for a month outside 1-12.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(MonthKey { year, month })
    }

    pub fn of_date(date: NaiveDate) -> Self {
        MonthKey {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn of_instant(instant: DateTime<Utc>, tz: Tz) -> Self {
        Self::of_date(business_date(instant, tz))
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The month before this one.
    pub fn prev(&self) -> Self {
        if self.month == 1 {
            MonthKey {
                year: self.year - 1,
                month: 12,
            }
        } else {
            MonthKey {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Short Russian month name for chart axes.
    pub fn label(&self) -> &'static str {
        MONTH_LABELS[(self.month - 1) as usize]
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidFormat {
            field: "month".to_string(),
            reason: format!("expected YYYY-MM, got '{}'", s),
        };
        let (y, m) = s.split_once('-').ok_or_else(invalid)?;
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        MonthKey::new(year, month).ok_or_else(invalid)
    }
}

// =============================================================================
// Monthly Summary
// =============================================================================

/// Aggregates for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MonthlySummary {
    /// `YYYY-MM`.
    pub month: String,
    /// Short month name.
    pub label: String,
    pub sales_total: Money,
    pub purchases_total: Money,
    /// `sales_total − purchases_total`; negative in heavy restock months.
    pub profit: Money,
    pub sold_qty: i64,
    pub purchased_qty: i64,
    pub delivered_orders: i64,
    pub manual_sales: i64,
    pub average_order_value: Money,
}

#[derive(Default)]
struct Bucket {
    sales_total: Money,
    purchases_total: Money,
    sold_qty: i64,
    purchased_qty: i64,
    delivered_orders: i64,
    manual_sales: i64,
}

impl Bucket {
    fn finish(self, key: MonthKey) -> MonthlySummary {
        let transactions = self.delivered_orders + self.manual_sales;
        MonthlySummary {
            month: key.to_string(),
            label: key.label().to_string(),
            sales_total: self.sales_total,
            purchases_total: self.purchases_total,
            profit: self.sales_total - self.purchases_total,
            sold_qty: self.sold_qty,
            purchased_qty: self.purchased_qty,
            delivered_orders: self.delivered_orders,
            manual_sales: self.manual_sales,
            average_order_value: self.sales_total.divide_rounded(transactions),
        }
    }
}

/// Builds the rolling monthly series ending with the current month.
///
/// Returns `months_back` points, oldest first. `orders` only contributes
/// its delivered orders, bucketed by `delivered_at`.
pub fn monthly_series(
    sales: &[Sale],
    purchases: &[Purchase],
    orders: &[Order],
    tz: Tz,
    now: DateTime<Utc>,
    months_back: u32,
) -> Vec<MonthlySummary> {
    let mut keys = Vec::with_capacity(months_back as usize);
    let mut key = MonthKey::of_instant(now, tz);
    for _ in 0..months_back {
        keys.push(key);
        key = key.prev();
    }
    keys.reverse();

    let mut buckets: Vec<Bucket> = keys.iter().map(|_| Bucket::default()).collect();
    let slot = |k: MonthKey| keys.binary_search(&k).ok();

    for sale in sales {
        let month = MonthKey::of_date(effective_date(sale.date, sale.created_at, tz));
        if let Some(i) = slot(month) {
            let b = &mut buckets[i];
            b.sales_total += sale.total_amount;
            b.sold_qty += sale.total_quantity();
            if sale.source_type == SaleSource::Manual {
                b.manual_sales += 1;
            }
        }
    }

    for purchase in purchases {
        let month = MonthKey::of_date(effective_date(purchase.date, purchase.created_at, tz));
        if let Some(i) = slot(month) {
            let b = &mut buckets[i];
            b.purchases_total += purchase.total_amount;
            b.purchased_qty += purchase.quantity;
        }
    }

    for delivered_at in orders.iter().filter_map(|o| o.delivered_at) {
        if let Some(i) = slot(MonthKey::of_instant(delivered_at, tz)) {
            buckets[i].delivered_orders += 1;
        }
    }

    keys.into_iter()
        .zip(buckets)
        .map(|(k, b)| b.finish(k))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderItem, OrderStatus};
    use crate::types::{DeliveryDetails, SaleLine};
    use chrono::TimeZone;
    use chrono_tz::Europe::Moscow;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn sale(amount: i64, qty: i64, date: Option<NaiveDate>, created_at: DateTime<Utc>, source: SaleSource) -> Sale {
        Sale {
            id: format!("s-{}", amount),
            lines: vec![SaleLine {
                product_id: "p".to_string(),
                product_name: "Libre 2".to_string(),
                quantity: qty,
            }],
            total_amount: Money::from_minor(amount),
            date,
            source_type: source,
            source_id: None,
            comment: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn purchase(amount: i64, qty: i64, date: Option<NaiveDate>, created_at: DateTime<Utc>) -> Purchase {
        Purchase {
            id: format!("pu-{}", amount),
            product_id: "p".to_string(),
            product_name: "Libre 2".to_string(),
            quantity: qty,
            total_amount: Money::from_minor(amount),
            date,
            comment: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn delivered(at: DateTime<Utc>) -> Order {
        Order {
            id: "o".to_string(),
            customer_id: "c".to_string(),
            telegram: None,
            items: vec![OrderItem {
                product_id: "p".to_string(),
                quantity: 1,
                name_snapshot: "Libre 2".to_string(),
            }],
            total_price: Money::from_minor(1000),
            status: OrderStatus::Delivered,
            delivery: DeliveryDetails::default(),
            created_at: at,
            updated_at: at,
            delivered_at: Some(at),
        }
    }

    #[test]
    fn test_month_key_parse_and_display() {
        let key: MonthKey = "2024-03".parse().unwrap();
        assert_eq!(key.to_string(), "2024-03");
        assert_eq!(key.label(), "мар");
        assert_eq!(key.prev().to_string(), "2024-02");
        assert_eq!(MonthKey::new(2024, 1).unwrap().prev().to_string(), "2023-12");
        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!("march".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_late_evening_utc_is_next_month_in_moscow() {
        let instant = at(2024, 1, 31, 21, 30);
        assert_eq!(MonthKey::of_instant(instant, Moscow).to_string(), "2024-02");
        assert_eq!(MonthKey::of_instant(at(2024, 1, 31, 20, 59), Moscow).to_string(), "2024-01");
    }

    #[test]
    fn test_series_is_oldest_first_and_ends_now() {
        let series = monthly_series(&[], &[], &[], Moscow, at(2024, 3, 10, 12, 0), 6);
        let months: Vec<&str> = series.iter().map(|s| s.month.as_str()).collect();
        assert_eq!(
            months,
            vec!["2023-10", "2023-11", "2023-12", "2024-01", "2024-02", "2024-03"]
        );
        assert_eq!(series[0].label, "окт");
        assert!(series.iter().all(|s| s.average_order_value.is_zero()));
    }

    #[test]
    fn test_explicit_date_wins_over_created_at() {
        let created = at(2024, 3, 5, 10, 0);
        let backdated = NaiveDate::from_ymd_opt(2024, 2, 20);
        let series = monthly_series(
            &[sale(10_000, 1, backdated, created, SaleSource::Manual)],
            &[purchase(4_000, 2, None, created)],
            &[],
            Moscow,
            at(2024, 3, 10, 12, 0),
            2,
        );
        assert_eq!(series[0].sales_total.minor(), 10_000);
        assert_eq!(series[1].sales_total.minor(), 0);
        assert_eq!(series[1].purchases_total.minor(), 4_000);
        assert_eq!(series[1].purchased_qty, 2);
        assert_eq!(series[1].profit.minor(), -4_000);
    }

    #[test]
    fn test_average_counts_delivered_orders_and_manual_sales() {
        let now = at(2024, 3, 20, 12, 0);
        let sales = vec![
            sale(30_000, 2, None, at(2024, 3, 2, 9, 0), SaleSource::Order),
            sale(10_001, 1, None, at(2024, 3, 3, 9, 0), SaleSource::Manual),
        ];
        let orders = vec![delivered(at(2024, 3, 2, 9, 0))];
        let series = monthly_series(&sales, &[], &orders, Moscow, now, 1);
        let march = &series[0];
        assert_eq!(march.sales_total.minor(), 40_001);
        assert_eq!(march.sold_qty, 3);
        assert_eq!(march.delivered_orders, 1);
        assert_eq!(march.manual_sales, 1);
        assert_eq!(march.average_order_value.minor(), 20_001);
    }

    #[test]
    fn test_records_outside_window_are_ignored() {
        let series = monthly_series(
            &[sale(5_000, 1, NaiveDate::from_ymd_opt(2023, 1, 1), at(2023, 1, 1, 0, 0), SaleSource::Manual)],
            &[],
            &[],
            Moscow,
            at(2024, 3, 1, 0, 0),
            3,
        );
        assert!(series.iter().all(|s| s.sales_total.is_zero()));
    }
}
