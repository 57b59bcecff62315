//! SQLite sales ledger. Rows are merged on their natural key inside one
//! transaction per batch; identity migrations fold colliding rows together.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use saleslens_core::domain::business::BusinessId;
use saleslens_core::domain::sales::{
    canonical_money, money_text, BatchId, LedgerRow, SalesLine, SalesOrigin, SalesRecordBatch,
};
use saleslens_core::errors::StoreError;
use saleslens_core::identity::{IdentityMigration, KnownProduct};
use saleslens_core::ledger::{ensure_non_negative, merge_into, CommitReceipt, LedgerStore};

use super::{date_text, parse_date, parse_decimal, RepositoryError};
use crate::DbPool;

const ROW_COLUMNS: &str =
    "id, business_id, sale_date, product_id, product_name, unit_price, units_sold, revenue, origin, batch_id";

pub struct SqlLedgerRepository {
    pool: DbPool,
}

impl SqlLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn commit(
        &self,
        mut batch: SalesRecordBatch,
        lines: &[SalesLine],
    ) -> Result<CommitReceipt, RepositoryError> {
        ensure_non_negative(lines).map_err(|error| RepositoryError::Rejected(error.to_string()))?;

        let processed_at = Utc::now();
        batch.processed = true;
        batch.processed_at = Some(processed_at);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO sales_record_batch
                (id, business_id, origin, source_label, received_at, processed, processed_at,
                 window_start, window_end)
             VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)",
        )
        .bind(&batch.id.0)
        .bind(&batch.business_id.0)
        .bind(batch.origin.as_str())
        .bind(&batch.source_label)
        .bind(batch.received_at.to_rfc3339())
        .bind(processed_at.to_rfc3339())
        .bind(batch.window.map(|window| window.start.to_rfc3339()))
        .bind(batch.window.map(|window| window.end.to_rfc3339()))
        .execute(&mut *tx)
        .await?;

        let mut rows_inserted = 0;
        let mut rows_updated = 0;
        for line in lines {
            let key = line.natural_key();
            let existing = sqlx::query(&format!(
                "SELECT {ROW_COLUMNS} FROM sales_data_point
                 WHERE business_id = ? AND sale_date = ? AND product_id = ?
                   AND unit_price = ? AND origin = ?"
            ))
            .bind(&batch.business_id.0)
            .bind(date_text(key.date))
            .bind(&key.product_id)
            .bind(key.price_text())
            .bind(key.origin.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            match existing {
                Some(row) => {
                    let id: i64 = row.try_get("id")?;
                    let mut stored = ledger_row_from_row(&row)?;
                    merge_into(&mut stored, line);
                    update_totals(&mut tx, id, &stored).await?;
                    rows_updated += 1;
                }
                None => {
                    sqlx::query(
                        "INSERT INTO sales_data_point
                            (business_id, sale_date, product_id, product_name, unit_price,
                             units_sold, revenue, origin, batch_id)
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    )
                    .bind(&batch.business_id.0)
                    .bind(date_text(key.date))
                    .bind(&key.product_id)
                    .bind(line.product_name.trim())
                    .bind(key.price_text())
                    .bind(line.units_sold)
                    .bind(money_text(line.revenue))
                    .bind(key.origin.as_str())
                    .bind(&batch.id.0)
                    .execute(&mut *tx)
                    .await?;
                    rows_inserted += 1;
                }
            }
        }

        tx.commit().await?;

        Ok(CommitReceipt {
            batch,
            rows_inserted,
            rows_updated,
            units_sold: lines.iter().map(|line| line.units_sold).sum(),
            revenue: canonical_money(lines.iter().map(|line| line.revenue).sum()),
        })
    }

    pub async fn known(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<KnownProduct>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT DISTINCT product_id, product_name FROM sales_data_point
             WHERE business_id = ?
             ORDER BY product_id ASC, product_name ASC",
        )
        .bind(&business_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(KnownProduct {
                    product_id: row.try_get("product_id")?,
                    product_name: row.try_get("product_name")?,
                })
            })
            .collect()
    }

    /// Rewrites generated ids to catalog ids. A rewritten row whose key is
    /// already taken is folded into the existing row and deleted.
    pub async fn migrate(
        &self,
        business_id: &BusinessId,
        migrations: &[IdentityMigration],
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut touched = 0;

        for migration in migrations {
            let sources = sqlx::query(&format!(
                "SELECT {ROW_COLUMNS} FROM sales_data_point
                 WHERE business_id = ? AND product_id = ?
                 ORDER BY id ASC"
            ))
            .bind(&business_id.0)
            .bind(&migration.from_product_id)
            .fetch_all(&mut *tx)
            .await?;

            for source in &sources {
                let source_id: i64 = source.try_get("id")?;
                let moved = ledger_row_from_row(source)?;

                let target = sqlx::query(&format!(
                    "SELECT {ROW_COLUMNS} FROM sales_data_point
                     WHERE business_id = ? AND sale_date = ? AND product_id = ?
                       AND unit_price = ? AND origin = ?"
                ))
                .bind(&business_id.0)
                .bind(date_text(moved.date))
                .bind(&migration.to_product_id)
                .bind(money_text(moved.unit_price))
                .bind(moved.origin.as_str())
                .fetch_optional(&mut *tx)
                .await?;

                match target {
                    Some(target) => {
                        let target_id: i64 = target.try_get("id")?;
                        let mut merged = ledger_row_from_row(&target)?;
                        merge_into(&mut merged, &as_line(&moved));
                        update_totals(&mut tx, target_id, &merged).await?;
                        sqlx::query("DELETE FROM sales_data_point WHERE id = ?")
                            .bind(source_id)
                            .execute(&mut *tx)
                            .await?;
                    }
                    None => {
                        sqlx::query("UPDATE sales_data_point SET product_id = ? WHERE id = ?")
                            .bind(&migration.to_product_id)
                            .bind(source_id)
                            .execute(&mut *tx)
                            .await?;
                    }
                }
                touched += 1;
            }
        }

        tx.commit().await?;
        Ok(touched)
    }

    pub async fn between(
        &self,
        business_id: &BusinessId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LedgerRow>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ROW_COLUMNS} FROM sales_data_point
             WHERE business_id = ? AND sale_date >= ? AND sale_date <= ?
             ORDER BY sale_date ASC, product_id ASC, id ASC"
        ))
        .bind(&business_id.0)
        .bind(date_text(start))
        .bind(date_text(end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ledger_row_from_row).collect()
    }

    pub async fn revenue_by_date(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<(NaiveDate, Decimal)>, RepositoryError> {
        let rows =
            sqlx::query("SELECT sale_date, revenue FROM sales_data_point WHERE business_id = ?")
                .bind(&business_id.0)
                .fetch_all(&self.pool)
                .await?;

        let mut totals: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for row in &rows {
            let date = parse_date("ledger sale_date", &row.try_get::<String, _>("sale_date")?)?;
            let revenue = parse_decimal("ledger revenue", &row.try_get::<String, _>("revenue")?)?;
            *totals.entry(date).or_insert(Decimal::ZERO) += revenue;
        }
        Ok(totals.into_iter().map(|(date, revenue)| (date, canonical_money(revenue))).collect())
    }
}

async fn update_totals(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
    row: &LedgerRow,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE sales_data_point SET units_sold = ?, revenue = ?, product_name = ? WHERE id = ?",
    )
    .bind(row.units_sold)
    .bind(money_text(row.revenue))
    .bind(&row.product_name)
    .bind(id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn as_line(row: &LedgerRow) -> SalesLine {
    SalesLine {
        date: row.date,
        product_id: row.product_id.clone(),
        product_name: row.product_name.clone(),
        unit_price: row.unit_price,
        units_sold: row.units_sold,
        revenue: row.revenue,
        origin: row.origin,
    }
}

fn ledger_row_from_row(row: &SqliteRow) -> Result<LedgerRow, RepositoryError> {
    let origin_raw: String = row.try_get("origin")?;
    let origin = SalesOrigin::parse(&origin_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid ledger origin: {origin_raw}")))?;

    Ok(LedgerRow {
        business_id: BusinessId(row.try_get("business_id")?),
        date: parse_date("ledger sale_date", &row.try_get::<String, _>("sale_date")?)?,
        product_id: row.try_get("product_id")?,
        product_name: row.try_get("product_name")?,
        unit_price: parse_decimal("ledger unit_price", &row.try_get::<String, _>("unit_price")?)?,
        units_sold: row.try_get("units_sold")?,
        revenue: parse_decimal("ledger revenue", &row.try_get::<String, _>("revenue")?)?,
        origin,
        batch_id: BatchId(row.try_get("batch_id")?),
    })
}

#[async_trait]
impl LedgerStore for SqlLedgerRepository {
    async fn commit_batch(
        &self,
        batch: SalesRecordBatch,
        lines: &[SalesLine],
    ) -> Result<CommitReceipt, StoreError> {
        Ok(self.commit(batch, lines).await?)
    }

    async fn known_products(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<KnownProduct>, StoreError> {
        Ok(self.known(business_id).await?)
    }

    async fn migrate_identities(
        &self,
        business_id: &BusinessId,
        migrations: &[IdentityMigration],
    ) -> Result<u64, StoreError> {
        Ok(self.migrate(business_id, migrations).await?)
    }

    async fn rows_between(
        &self,
        business_id: &BusinessId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LedgerRow>, StoreError> {
        Ok(self.between(business_id, start, end).await?)
    }

    async fn daily_revenue(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<(NaiveDate, Decimal)>, StoreError> {
        Ok(self.revenue_by_date(business_id).await?)
    }
}
