use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use tokio::sync::RwLock;

use saleslens_core::domain::business::{Business, BusinessId};
use saleslens_core::domain::sales::{
    canonical_money, LedgerRow, NaturalKey, SalesLine, SalesRecordBatch,
};
use saleslens_core::errors::StoreError;
use saleslens_core::identity::{IdentityMigration, KnownProduct};
use saleslens_core::ledger::{ensure_non_negative, merge_into, CommitReceipt, LedgerStore};
use saleslens_core::sync::SyncStateStore;

use super::{BusinessRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryBusinessRepository {
    businesses: RwLock<Vec<Business>>,
    claims: RwLock<HashMap<BusinessId, DateTime<Utc>>>,
}

#[async_trait]
impl BusinessRepository for InMemoryBusinessRepository {
    async fn create(&self, business: &Business) -> Result<(), RepositoryError> {
        business.validate().map_err(|error| RepositoryError::Rejected(error.to_string()))?;
        let mut businesses = self.businesses.write().await;
        if businesses.iter().any(|existing| existing.id == business.id) {
            return Err(RepositoryError::Rejected(format!("business {} exists", business.id)));
        }
        businesses.push(business.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError> {
        let businesses = self.businesses.read().await;
        Ok(businesses.iter().find(|business| &business.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Business>, RepositoryError> {
        Ok(self.businesses.read().await.clone())
    }

    async fn set_access_token(
        &self,
        id: &BusinessId,
        token: SecretString,
    ) -> Result<(), RepositoryError> {
        let mut businesses = self.businesses.write().await;
        let business = businesses
            .iter_mut()
            .find(|business| &business.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("business {id}")))?;
        business.commerce_access_token = Some(token);
        Ok(())
    }
}

#[async_trait]
impl SyncStateStore for InMemoryBusinessRepository {
    async fn claim(
        &self,
        business_id: &BusinessId,
        expected_cursor: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut claims = self.claims.write().await;
        let businesses = self.businesses.read().await;
        let Some(business) = businesses.iter().find(|business| &business.id == business_id) else {
            return Ok(false);
        };
        if business.last_sync_at != expected_cursor
            || claims.get(business_id).is_some_and(|held_until| *held_until > now)
        {
            return Ok(false);
        }
        claims.insert(business_id.clone(), expires_at);
        Ok(true)
    }

    async fn advance_cursor(
        &self,
        business_id: &BusinessId,
        expected_cursor: Option<DateTime<Utc>>,
        synced_through: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut claims = self.claims.write().await;
        let mut businesses = self.businesses.write().await;
        let business = businesses
            .iter_mut()
            .find(|business| &business.id == business_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("business {business_id}")))?;
        if business.last_sync_at != expected_cursor {
            return Ok(false);
        }
        business.last_sync_at = Some(synced_through);
        claims.remove(business_id);
        Ok(true)
    }

    async fn release(&self, business_id: &BusinessId) -> Result<(), StoreError> {
        self.claims.write().await.remove(business_id);
        Ok(())
    }
}

/// Ledger keyed per business by natural key, mirroring the SQL merge rules.
#[derive(Default)]
pub struct InMemoryLedgerRepository {
    rows: RwLock<HashMap<BusinessId, BTreeMap<u64, LedgerRow>>>,
    next_row: RwLock<u64>,
}

fn key_of(row: &LedgerRow) -> NaturalKey {
    NaturalKey {
        date: row.date,
        product_id: row.product_id.clone(),
        unit_price: canonical_money(row.unit_price),
        origin: row.origin,
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerRepository {
    async fn commit_batch(
        &self,
        mut batch: SalesRecordBatch,
        lines: &[SalesLine],
    ) -> Result<CommitReceipt, StoreError> {
        ensure_non_negative(lines)
            .map_err(|error| RepositoryError::Rejected(error.to_string()))?;

        let mut all_rows = self.rows.write().await;
        let mut next_row = self.next_row.write().await;
        let rows = all_rows.entry(batch.business_id.clone()).or_default();

        let mut rows_inserted = 0;
        let mut rows_updated = 0;
        for line in lines {
            let key = line.natural_key();
            match rows.values_mut().find(|row| key_of(row) == key) {
                Some(row) => {
                    merge_into(row, line);
                    rows_updated += 1;
                }
                None => {
                    *next_row += 1;
                    rows.insert(
                        *next_row,
                        LedgerRow {
                            business_id: batch.business_id.clone(),
                            date: key.date,
                            product_id: key.product_id,
                            product_name: line.product_name.trim().to_string(),
                            unit_price: key.unit_price,
                            units_sold: line.units_sold,
                            revenue: canonical_money(line.revenue),
                            origin: key.origin,
                            batch_id: batch.id.clone(),
                        },
                    );
                    rows_inserted += 1;
                }
            }
        }

        batch.processed = true;
        batch.processed_at = Some(Utc::now());
        Ok(CommitReceipt {
            batch,
            rows_inserted,
            rows_updated,
            units_sold: lines.iter().map(|line| line.units_sold).sum(),
            revenue: canonical_money(lines.iter().map(|line| line.revenue).sum()),
        })
    }

    async fn known_products(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<KnownProduct>, StoreError> {
        let all_rows = self.rows.read().await;
        let mut known = all_rows
            .get(business_id)
            .into_iter()
            .flat_map(|rows| rows.values())
            .map(|row| KnownProduct {
                product_id: row.product_id.clone(),
                product_name: row.product_name.clone(),
            })
            .collect::<Vec<_>>();
        known.sort_by(|a, b| {
            a.product_id.cmp(&b.product_id).then_with(|| a.product_name.cmp(&b.product_name))
        });
        known.dedup();
        Ok(known)
    }

    async fn migrate_identities(
        &self,
        business_id: &BusinessId,
        migrations: &[IdentityMigration],
    ) -> Result<u64, StoreError> {
        let mut all_rows = self.rows.write().await;
        let Some(rows) = all_rows.get_mut(business_id) else {
            return Ok(0);
        };

        let mut touched = 0;
        for migration in migrations {
            let sources = rows
                .iter()
                .filter(|(_, row)| row.product_id == migration.from_product_id)
                .map(|(id, _)| *id)
                .collect::<Vec<_>>();
            for source_id in sources {
                let Some(mut moved) = rows.remove(&source_id) else {
                    continue;
                };
                moved.product_id = migration.to_product_id.clone();
                let key = key_of(&moved);
                match rows.values_mut().find(|row| key_of(row) == key) {
                    Some(target) => {
                        target.units_sold += moved.units_sold;
                        target.revenue = canonical_money(target.revenue + moved.revenue);
                    }
                    None => {
                        rows.insert(source_id, moved);
                    }
                }
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn rows_between(
        &self,
        business_id: &BusinessId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LedgerRow>, StoreError> {
        let all_rows = self.rows.read().await;
        let mut selected = all_rows
            .get(business_id)
            .into_iter()
            .flat_map(|rows| rows.values())
            .filter(|row| row.date >= start && row.date <= end)
            .cloned()
            .collect::<Vec<_>>();
        selected.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.product_id.cmp(&b.product_id)));
        Ok(selected)
    }

    async fn daily_revenue(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<(NaiveDate, Decimal)>, StoreError> {
        let all_rows = self.rows.read().await;
        let mut totals: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for row in all_rows.get(business_id).into_iter().flat_map(|rows| rows.values()) {
            *totals.entry(row.date).or_insert(Decimal::ZERO) += row.revenue;
        }
        Ok(totals.into_iter().map(|(date, revenue)| (date, canonical_money(revenue))).collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use saleslens_core::domain::business::Business;
    use saleslens_core::domain::sales::{SalesLine, SalesOrigin, SalesRecordBatch};
    use saleslens_core::identity::IdentityMigration;
    use saleslens_core::ledger::LedgerStore;
    use saleslens_core::sync::SyncStateStore;

    use crate::repositories::{
        BusinessRepository, InMemoryBusinessRepository, InMemoryLedgerRepository,
    };

    fn line(product_id: &str, d: u32, units: i64) -> SalesLine {
        SalesLine {
            date: NaiveDate::from_ymd_opt(2024, 2, d).expect("date"),
            product_id: product_id.to_string(),
            product_name: "Latte".to_string(),
            unit_price: Decimal::new(400, 2),
            units_sold: units,
            revenue: Decimal::new(400 * units, 2),
            origin: SalesOrigin::Upload,
        }
    }

    #[tokio::test]
    async fn in_memory_business_repo_round_trip() {
        let repo = InMemoryBusinessRepository::default();
        let business = Business::new("Corner Cafe").expect("business");

        repo.create(&business).await.expect("create");
        assert!(repo.create(&business).await.is_err(), "duplicate id");
        repo.set_access_token(&business.id, SecretString::from("tok".to_string()))
            .await
            .expect("connect");
        let now = Utc::now();
        let until = now + Duration::minutes(15);
        assert!(repo.claim(&business.id, None, now, until).await.expect("claim"));
        assert!(!repo.claim(&business.id, None, now, now).await.expect("held"));
        assert!(repo.advance_cursor(&business.id, None, now).await.expect("cursor"));
        assert!(!repo.advance_cursor(&business.id, None, now).await.expect("stale cursor"));

        let found = repo.find_by_id(&business.id).await.expect("find").expect("present");
        assert!(found.is_commerce_connected());
        assert_eq!(found.last_sync_at, Some(now));
        assert_eq!(repo.list_connected().await.expect("connected").len(), 1);
    }

    #[tokio::test]
    async fn in_memory_ledger_follows_merge_and_migration_rules() {
        let ledger = InMemoryLedgerRepository::default();
        let business = Business::new("Corner Cafe").expect("business");
        let batch = || {
            SalesRecordBatch::start(business.id.clone(), SalesOrigin::Upload, "a.csv", Utc::now())
        };

        ledger
            .commit_batch(batch(), &[line("gen_latte", 1, 1), line("ITEM_LATTE", 1, 2)])
            .await
            .expect("commit");
        let receipt = ledger.commit_batch(batch(), &[line("gen_latte", 1, 1)]).await.expect("again");
        assert_eq!(receipt.rows_updated, 1);

        let touched = ledger
            .migrate_identities(
                &business.id,
                &[IdentityMigration {
                    from_product_id: "gen_latte".to_string(),
                    to_product_id: "ITEM_LATTE".to_string(),
                    product_name: "Latte".to_string(),
                }],
            )
            .await
            .expect("migrate");
        assert_eq!(touched, 1);

        let day = NaiveDate::from_ymd_opt(2024, 2, 1).expect("date");
        let rows = ledger.rows_between(&business.id, day, day).await.expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].units_sold, 4);
        assert_eq!(
            ledger.daily_revenue(&business.id).await.expect("daily"),
            vec![(day, Decimal::new(1600, 2))]
        );
    }
}
