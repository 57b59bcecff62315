//! Product performance over a trailing window: revenue tiers and trends.

pub mod ranking;
pub mod series;
pub mod trend;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::business::Business;
use crate::domain::sales::{canonical_money, is_placeholder_name, LedgerRow};
use crate::errors::ApplicationError;
use crate::ledger::LedgerStore;

pub use ranking::{band_size, tier_for_rank, PerformanceTier};
pub use series::{sales_series, SalesSeries, SeriesDataset};
pub use trend::{classify, Trend, TrendSettings};

pub const DEFAULT_WINDOW_DAYS: u32 = 30;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalyticsSettings {
    pub window_days: u32,
    pub trend: TrendSettings,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self { window_days: DEFAULT_WINDOW_DAYS, trend: TrendSettings::default() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPerformance {
    pub product_id: String,
    pub product_name: String,
    pub total_revenue: Decimal,
    pub total_units: i64,
    pub tier: PerformanceTier,
    pub trend: Trend,
}

/// Dates actually covered by ledger data; both `None` when nothing was sold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceWindow {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub window: PerformanceWindow,
    pub products: Vec<ProductPerformance>,
}

impl PerformanceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Calendar range of the trailing window ending on the business-local day
/// containing `now`.
pub fn window_bounds(
    business: &Business,
    now: DateTime<Utc>,
    window_days: u32,
) -> (NaiveDate, NaiveDate) {
    let end = business.local_date(now);
    let span = i64::from(window_days.max(1)) - 1;
    (end - Duration::days(span), end)
}

pub async fn analyze<L: LedgerStore + ?Sized>(
    ledger: &L,
    business: &Business,
    settings: &AnalyticsSettings,
    now: DateTime<Utc>,
) -> Result<PerformanceSnapshot, ApplicationError> {
    let (start, end) = window_bounds(business, now, settings.window_days);
    let rows = ledger.rows_between(&business.id, start, end).await?;
    Ok(build_snapshot(&rows, &settings.trend))
}

struct ProductTotals {
    product_id: String,
    product_name: String,
    revenue: Decimal,
    units: i64,
    daily: BTreeMap<NaiveDate, Decimal>,
}

/// Ranks products in `rows` by revenue. Ties keep the order in which the
/// products first appear in `rows`.
pub fn build_snapshot(rows: &[LedgerRow], trend: &TrendSettings) -> PerformanceSnapshot {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<ProductTotals> = Vec::new();

    for row in rows {
        let position = *positions.entry(row.product_id.as_str()).or_insert_with(|| {
            totals.push(ProductTotals {
                product_id: row.product_id.clone(),
                product_name: String::new(),
                revenue: Decimal::ZERO,
                units: 0,
                daily: BTreeMap::new(),
            });
            totals.len() - 1
        });
        let entry = &mut totals[position];
        entry.revenue += row.revenue;
        entry.units += row.units_sold;
        *entry.daily.entry(row.date).or_insert(Decimal::ZERO) += row.revenue;
        if !is_placeholder_name(&row.product_name) {
            entry.product_name = row.product_name.clone();
        }
    }

    totals.sort_by(|a, b| b.revenue.cmp(&a.revenue));

    let count = totals.len();
    let products = totals
        .into_iter()
        .enumerate()
        .map(|(rank, product)| {
            let newest_first = product
                .daily
                .values()
                .rev()
                .map(|revenue| revenue.to_f64().unwrap_or_default())
                .collect::<Vec<f64>>();
            ProductPerformance {
                product_name: if product.product_name.is_empty() {
                    product.product_id.clone()
                } else {
                    product.product_name
                },
                product_id: product.product_id,
                total_revenue: canonical_money(product.revenue),
                total_units: product.units,
                tier: tier_for_rank(rank, count),
                trend: classify(&newest_first, trend),
            }
        })
        .collect();

    PerformanceSnapshot {
        window: PerformanceWindow {
            start_date: rows.iter().map(|row| row.date).min(),
            end_date: rows.iter().map(|row| row.date).max(),
        },
        products,
    }
}
