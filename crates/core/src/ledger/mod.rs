//! Sales ledger port and the merge rules every store applies.
//!
//! Rows merge on their natural key (date, product, price, origin) by adding
//! units and revenue. Re-ingesting the same data therefore counts it twice;
//! callers own the decision of what gets ingested.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::business::BusinessId;
use crate::domain::sales::{
    canonical_money, is_placeholder_name, LedgerRow, NaturalKey, SalesLine, SalesRecordBatch,
};
use crate::errors::{DomainError, StoreError};
use crate::identity::{IdentityMigration, KnownProduct};

/// Outcome of one atomic ledger commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub batch: SalesRecordBatch,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub units_sold: i64,
    pub revenue: Decimal,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Records `batch` as processed and merges `lines` into the ledger. Either
    /// everything commits or nothing does.
    async fn commit_batch(
        &self,
        batch: SalesRecordBatch,
        lines: &[SalesLine],
    ) -> Result<CommitReceipt, StoreError>;

    /// Distinct product ids and names stored for the business.
    async fn known_products(&self, business_id: &BusinessId)
        -> Result<Vec<KnownProduct>, StoreError>;

    /// Rewrites product ids in one transaction and returns the number of
    /// ledger rows touched.
    async fn migrate_identities(
        &self,
        business_id: &BusinessId,
        migrations: &[IdentityMigration],
    ) -> Result<u64, StoreError>;

    /// Rows dated within `[start, end]`, ordered by date then product id.
    async fn rows_between(
        &self,
        business_id: &BusinessId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LedgerRow>, StoreError>;

    /// Revenue summed per date over every row of the business.
    async fn daily_revenue(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<(NaiveDate, Decimal)>, StoreError>;
}

/// Pre-aggregates lines sharing a natural key, keeping first-seen order.
pub fn aggregate_lines(lines: impl IntoIterator<Item = SalesLine>) -> Vec<SalesLine> {
    let mut index: HashMap<NaturalKey, usize> = HashMap::new();
    let mut grouped: Vec<SalesLine> = Vec::new();

    for mut line in lines {
        line.unit_price = canonical_money(line.unit_price);
        let key = line.natural_key();
        match index.get(&key) {
            Some(&position) => {
                let existing = &mut grouped[position];
                existing.units_sold += line.units_sold;
                existing.revenue += line.revenue;
                if is_placeholder_name(&existing.product_name) {
                    existing.product_name = line.product_name;
                }
            }
            None => {
                index.insert(key, grouped.len());
                grouped.push(line);
            }
        }
    }

    for line in &mut grouped {
        line.revenue = canonical_money(line.revenue);
    }
    grouped
}

pub fn ensure_non_negative(lines: &[SalesLine]) -> Result<(), DomainError> {
    for line in lines {
        if line.units_sold < 0 || line.revenue < Decimal::ZERO || line.unit_price < Decimal::ZERO
        {
            return Err(DomainError::InvariantViolation(format!(
                "negative sales line for product `{}` on {}",
                line.product_id, line.date
            )));
        }
    }
    Ok(())
}

/// Folds an incoming observation into an existing row of the same key.
pub fn merge_into(row: &mut LedgerRow, line: &SalesLine) {
    row.units_sold += line.units_sold;
    row.revenue = canonical_money(row.revenue + line.revenue);
    if is_placeholder_name(&row.product_name) && !is_placeholder_name(&line.product_name) {
        row.product_name = line.product_name.clone();
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{aggregate_lines, ensure_non_negative, merge_into};
    use crate::domain::business::BusinessId;
    use crate::domain::sales::{BatchId, LedgerRow, SalesLine, SalesOrigin};

    fn line(product: &str, name: &str, price: &str, units: i64) -> SalesLine {
        let unit_price = Decimal::from_str(price).expect("price");
        SalesLine {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
            product_id: product.to_string(),
            product_name: name.to_string(),
            unit_price,
            units_sold: units,
            revenue: unit_price * Decimal::from(units),
            origin: SalesOrigin::Upload,
        }
    }

    #[test]
    fn aggregation_merges_equal_keys_and_keeps_price_points_apart() {
        let grouped = aggregate_lines(vec![
            line("gen_latte", "Latte", "4.5", 2),
            line("gen_latte", "Latte", "4.50", 1),
            line("gen_latte", "Latte", "5.00", 1),
            line("gen_muffin", "Muffin", "3.00", 4),
        ]);

        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped[0].units_sold, 3);
        assert_eq!(grouped[0].revenue.to_string(), "13.50");
        assert_eq!(grouped[1].unit_price.to_string(), "5.00");
        assert_eq!(grouped[2].product_id, "gen_muffin");
    }

    #[test]
    fn aggregation_adopts_first_real_name() {
        let grouped =
            aggregate_lines(vec![line("ITEM_1", "", "1.00", 1), line("ITEM_1", "Scone", "1.00", 1)]);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].product_name, "Scone");
    }

    #[test]
    fn merge_adds_totals_and_replaces_placeholder_names() {
        let incoming = line("ITEM_1", "Scone", "2.00", 3);
        let mut row = LedgerRow {
            business_id: BusinessId("biz-1".to_string()),
            date: incoming.date,
            product_id: "ITEM_1".to_string(),
            product_name: " ".to_string(),
            unit_price: incoming.unit_price,
            units_sold: 1,
            revenue: Decimal::new(200, 2),
            origin: SalesOrigin::Upload,
            batch_id: BatchId("batch-1".to_string()),
        };

        merge_into(&mut row, &incoming);

        assert_eq!(row.units_sold, 4);
        assert_eq!(row.revenue, Decimal::new(800, 2));
        assert_eq!(row.product_name, "Scone");
    }

    #[test]
    fn negative_lines_are_rejected() {
        let mut bad = line("gen_latte", "Latte", "4.00", 1);
        bad.units_sold = -1;
        assert!(ensure_non_negative(&[bad]).is_err());
        assert!(ensure_non_negative(&[line("gen_latte", "Latte", "4.00", 1)]).is_ok());
    }
}
