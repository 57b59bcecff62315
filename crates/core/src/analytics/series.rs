use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::business::BusinessId;
use crate::domain::sales::canonical_money;
use crate::errors::ApplicationError;
use crate::ledger::LedgerStore;

pub const SERIES_LABEL_FORMAT: &str = "%d-%m-%Y";
pub const SERIES_DATASET_LABEL: &str = "Sales";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDataset {
    pub label: String,
    pub data: Vec<Decimal>,
}

/// Chart-ready daily revenue: one label per date, one "Sales" dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesSeries {
    pub labels: Vec<String>,
    pub datasets: Vec<SeriesDataset>,
}

impl SalesSeries {
    /// Sums `daily` per date and orders the result ascending.
    pub fn from_daily(daily: impl IntoIterator<Item = (NaiveDate, Decimal)>) -> Self {
        let mut totals = BTreeMap::new();
        for (date, revenue) in daily {
            *totals.entry(date).or_insert(Decimal::ZERO) += revenue;
        }

        let (labels, data): (Vec<String>, Vec<Decimal>) = totals
            .into_iter()
            .map(|(date, revenue)| {
                (date.format(SERIES_LABEL_FORMAT).to_string(), canonical_money(revenue))
            })
            .unzip();

        Self {
            labels,
            datasets: vec![SeriesDataset { label: SERIES_DATASET_LABEL.to_string(), data }],
        }
    }
}

pub async fn sales_series<L: LedgerStore + ?Sized>(
    ledger: &L,
    business_id: &BusinessId,
) -> Result<SalesSeries, ApplicationError> {
    let daily = ledger.daily_revenue(business_id).await?;
    Ok(SalesSeries::from_daily(daily))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::SalesSeries;

    #[test]
    fn series_is_summed_per_date_and_sorted() {
        let date = |d| NaiveDate::from_ymd_opt(2024, 1, d).expect("date");
        let series = SalesSeries::from_daily(vec![
            (date(3), Decimal::new(500, 2)),
            (date(1), Decimal::new(5000, 2)),
            (date(1), Decimal::new(2500, 2)),
        ]);

        assert_eq!(series.labels, vec!["01-01-2024", "03-01-2024"]);
        assert_eq!(series.datasets.len(), 1);
        assert_eq!(series.datasets[0].label, "Sales");
        assert_eq!(series.datasets[0].data, vec![Decimal::new(7500, 2), Decimal::new(500, 2)]);
    }
}
