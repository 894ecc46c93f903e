//! # Finance Operations

use tracing::debug;

use medstock_core::finance::monthly_series;
use medstock_core::validation::validate_months_back;
use medstock_core::{MonthlySummary, OrderStatus};

use crate::error::EngineResult;
use crate::Engine;

impl Engine {
    /// Rolling monthly series ending with the current business month,
    /// oldest first.
    pub async fn get_monthly_finance(&self, months_back: u32) -> EngineResult<Vec<MonthlySummary>> {
        validate_months_back(months_back)?;

        let sales = self.db.sales().list_all().await?;
        let purchases = self.db.purchases().list_all().await?;
        let delivered = self.db.orders().list(Some(OrderStatus::Delivered)).await?;
        debug!(
            sales = sales.len(),
            purchases = purchases.len(),
            delivered = delivered.len(),
            months_back,
            "Aggregating finance"
        );

        Ok(monthly_series(&sales, &purchases, &delivered, self.tz, self.now(), months_back))
    }

    /// Months shown when the caller does not choose a window.
    pub fn finance_window(&self) -> u32 {
        self.finance_window
    }
}

#[cfg(test)]
mod tests {
    use crate::testing;
    use crate::SaleInput;
    use medstock_core::{Money, MonthKey};

    #[tokio::test]
    async fn test_current_month_totals() {
        let engine = testing::engine().await;
        let libre = testing::product(&engine, "FreeStyle Libre 2", 4_000).await;
        // 10 units at cost 2 000 ₽
        testing::stock_in(&engine, &libre, 10).await;
        engine
            .create_sale(SaleInput {
                product_id: libre.id.clone(),
                quantity: 3,
                total_amount: Money::from_major_minor(12_000, 0),
                date: None,
                comment: None,
            })
            .await
            .unwrap();

        let series = engine.get_monthly_finance(engine.finance_window()).await.unwrap();
        assert_eq!(series.len(), 6);

        let current = series.last().unwrap();
        assert_eq!(current.month, MonthKey::of_date(engine.today()).to_string());
        assert_eq!(current.sales_total, Money::from_major_minor(12_000, 0));
        assert_eq!(current.purchases_total, Money::from_major_minor(20_000, 0));
        assert_eq!(current.profit, Money::from_major_minor(-8_000, 0));
        assert_eq!((current.sold_qty, current.purchased_qty), (3, 10));
        assert_eq!(current.manual_sales, 1);
        assert_eq!(current.average_order_value, Money::from_major_minor(12_000, 0));

        assert!(series[..5].iter().all(|m| m.sales_total.is_zero()));
    }

    #[tokio::test]
    async fn test_window_bounds() {
        let engine = testing::engine().await;
        assert!(engine.get_monthly_finance(0).await.is_err());
        assert!(engine.get_monthly_finance(121).await.is_err());
        assert_eq!(engine.get_monthly_finance(120).await.unwrap().len(), 120);
    }
}
