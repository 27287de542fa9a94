//! # Metrics Repository
//!
//! Per-day running totals in `dailyMetrics`, keyed by `YYYY-MM-DD`.

use chrono::NaiveDate;
use tracing::debug;

use tillbox_core::{DailyMetric, SaleWithItems};

use crate::error::DbResult;
use crate::store::{tables, LocalStore, StoreBatch};

#[derive(Debug, Clone)]
pub struct MetricsRepository {
    store: LocalStore,
}

impl MetricsRepository {
    pub fn new(store: LocalStore) -> Self {
        MetricsRepository { store }
    }

    pub fn get(&self, date: NaiveDate) -> DbResult<Option<DailyMetric>> {
        self.store
            .get_record(tables::DAILY_METRICS, &date_key(date))
    }

    /// All days, oldest first.
    pub fn list(&self) -> DbResult<Vec<DailyMetric>> {
        // Row ids are ISO dates, so row order is date order.
        self.store.records(tables::DAILY_METRICS)
    }

    /// Folds a committed sale into its day's totals.
    pub fn record_sale(&self, sale: &SaleWithItems) -> DbResult<DailyMetric> {
        let metric = self.store.batch(|b| stage_sale_metrics(b, sale))?;

        debug!(
            date = %metric.date,
            transactions = metric.transaction_count,
            total_sales = %metric.total_sales,
            "Daily metrics updated"
        );
        Ok(metric)
    }
}

/// Folds a sale into its day's row inside an open batch.
pub(crate) fn stage_sale_metrics(
    b: &mut StoreBatch<'_>,
    sale: &SaleWithItems,
) -> DbResult<DailyMetric> {
    let date = sale.sale.business_date();
    let key = date_key(date);
    let mut metric = b
        .get_record::<DailyMetric>(tables::DAILY_METRICS, &key)?
        .unwrap_or_else(|| DailyMetric::empty(date));
    metric.record_sale(sale);
    b.put_record(tables::DAILY_METRICS, &key, &metric)?;
    Ok(metric)
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tillbox_core::{Money, PaymentMethod, SaleRecord, SaleStatus};

    #[test]
    fn test_record_sale_accumulates() {
        let repo = MetricsRepository::new(LocalStore::new());
        let sale = SaleWithItems {
            sale: SaleRecord {
                id: "s1".into(),
                user_id: "u1".into(),
                total_amount: Money::from_cents(1100),
                total_profit: Money::from_cents(500),
                payment_method: PaymentMethod::Card,
                status: SaleStatus::Completed,
                created_at: Utc::now(),
            },
            items: vec![],
        };

        repo.record_sale(&sale).unwrap();
        let metric = repo.record_sale(&sale).unwrap();

        assert_eq!(metric.transaction_count, 2);
        assert_eq!(metric.total_sales, Money::from_cents(2200));
        assert_eq!(
            repo.get(sale.sale.business_date()).unwrap(),
            Some(metric)
        );
        assert_eq!(repo.list().unwrap().len(), 1);
    }
}
