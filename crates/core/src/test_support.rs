//! Port fakes shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;

use crate::domain::business::BusinessId;
use crate::domain::sales::{LedgerRow, SalesLine, SalesRecordBatch};
use crate::errors::StoreError;
use crate::identity::{IdentityMigration, KnownProduct};
use crate::ledger::{merge_into, CommitReceipt, LedgerStore};
use crate::sync::{
    CatalogObject, CommercePlatform, Location, OrderPage, OrderQuery, PlatformError,
    SyncStateStore,
};

#[derive(Default)]
pub struct FakeLedger {
    pub rows: Mutex<Vec<LedgerRow>>,
    pub batches: Mutex<Vec<SalesRecordBatch>>,
    pub fail_commits: bool,
    pub fail_migrations: bool,
}

impl FakeLedger {
    pub fn rows(&self) -> Vec<LedgerRow> {
        self.rows.lock().expect("rows lock").clone()
    }

    pub fn batches(&self) -> Vec<SalesRecordBatch> {
        self.batches.lock().expect("batches lock").clone()
    }
}

#[async_trait]
impl LedgerStore for FakeLedger {
    async fn commit_batch(
        &self,
        mut batch: SalesRecordBatch,
        lines: &[SalesLine],
    ) -> Result<CommitReceipt, StoreError> {
        if self.fail_commits {
            return Err(StoreError("disk full".to_string()));
        }
        let mut rows = self.rows.lock().expect("rows lock");
        let mut inserted = 0;
        let mut updated = 0;
        for line in lines {
            let key = line.natural_key();
            let existing = rows.iter_mut().find(|row| {
                row.business_id == batch.business_id
                    && row.date == key.date
                    && row.product_id == key.product_id
                    && row.unit_price == key.unit_price
                    && row.origin == key.origin
            });
            match existing {
                Some(row) => {
                    merge_into(row, line);
                    updated += 1;
                }
                None => {
                    rows.push(LedgerRow {
                        business_id: batch.business_id.clone(),
                        date: line.date,
                        product_id: line.product_id.clone(),
                        product_name: line.product_name.clone(),
                        unit_price: key.unit_price,
                        units_sold: line.units_sold,
                        revenue: line.revenue,
                        origin: line.origin,
                        batch_id: batch.id.clone(),
                    });
                    inserted += 1;
                }
            }
        }
        batch.processed = true;
        batch.processed_at = Some(batch.received_at);
        self.batches.lock().expect("batches lock").push(batch.clone());
        Ok(CommitReceipt {
            batch,
            rows_inserted: inserted,
            rows_updated: updated,
            units_sold: lines.iter().map(|line| line.units_sold).sum(),
            revenue: lines.iter().map(|line| line.revenue).sum(),
        })
    }

    async fn known_products(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<KnownProduct>, StoreError> {
        let rows = self.rows.lock().expect("rows lock");
        let mut known: Vec<KnownProduct> = Vec::new();
        for row in rows.iter().filter(|row| &row.business_id == business_id) {
            let product = KnownProduct {
                product_id: row.product_id.clone(),
                product_name: row.product_name.clone(),
            };
            if !known.contains(&product) {
                known.push(product);
            }
        }
        Ok(known)
    }

    async fn migrate_identities(
        &self,
        business_id: &BusinessId,
        migrations: &[IdentityMigration],
    ) -> Result<u64, StoreError> {
        if self.fail_migrations {
            return Err(StoreError("database is locked".to_string()));
        }
        let mut rows = self.rows.lock().expect("rows lock");
        let mut touched = 0;
        for migration in migrations {
            for row in rows.iter_mut().filter(|row| {
                &row.business_id == business_id && row.product_id == migration.from_product_id
            }) {
                row.product_id = migration.to_product_id.clone();
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
        let rows = self.rows.lock().expect("rows lock");
        let mut selected = rows
            .iter()
            .filter(|row| &row.business_id == business_id && row.date >= start && row.date <= end)
            .cloned()
            .collect::<Vec<_>>();
        selected.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.product_id.cmp(&b.product_id)));
        Ok(selected)
    }

    async fn daily_revenue(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<(NaiveDate, Decimal)>, StoreError> {
        let rows = self.rows.lock().expect("rows lock");
        Ok(rows
            .iter()
            .filter(|row| &row.business_id == business_id)
            .map(|row| (row.date, row.revenue))
            .collect())
    }
}

/// Cursor log plus the claims currently held, keyed by business.
#[derive(Default)]
pub struct FakeSyncState {
    pub cursors: Mutex<Vec<(BusinessId, DateTime<Utc>)>>,
    pub claims: Mutex<HashMap<BusinessId, DateTime<Utc>>>,
}

impl FakeSyncState {
    pub fn is_claimed(&self, business_id: &BusinessId) -> bool {
        self.claims.lock().expect("claim lock").contains_key(business_id)
    }
}

#[async_trait]
impl SyncStateStore for FakeSyncState {
    async fn claim(
        &self,
        business_id: &BusinessId,
        _expected_cursor: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut claims = self.claims.lock().expect("claim lock");
        if claims.get(business_id).is_some_and(|held_until| *held_until > now) {
            return Ok(false);
        }
        claims.insert(business_id.clone(), expires_at);
        Ok(true)
    }

    async fn advance_cursor(
        &self,
        business_id: &BusinessId,
        _expected_cursor: Option<DateTime<Utc>>,
        synced_through: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.cursors.lock().expect("cursor lock").push((business_id.clone(), synced_through));
        self.claims.lock().expect("claim lock").remove(business_id);
        Ok(true)
    }

    async fn release(&self, business_id: &BusinessId) -> Result<(), StoreError> {
        self.claims.lock().expect("claim lock").remove(business_id);
        Ok(())
    }
}

/// Serves canned catalog objects and order pages. Page `n > 0` is reached
/// through cursor `page-n`.
pub struct FakePlatform {
    pub catalog: Result<Vec<CatalogObject>, PlatformError>,
    pub locations: Vec<Location>,
    pub pages: Vec<OrderPage>,
    pub orders_error: Option<PlatformError>,
    pub queries: Mutex<Vec<OrderQuery>>,
}

impl FakePlatform {
    pub fn with_pages(catalog: Vec<CatalogObject>, pages: Vec<OrderPage>) -> Self {
        Self {
            catalog: Ok(catalog),
            locations: vec![Location { id: "LOC_1".to_string(), name: None }],
            pages,
            orders_error: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<OrderQuery> {
        self.queries.lock().expect("query lock").clone()
    }
}

#[async_trait]
impl CommercePlatform for FakePlatform {
    async fn list_locations(
        &self,
        _access_token: &SecretString,
    ) -> Result<Vec<Location>, PlatformError> {
        Ok(self.locations.clone())
    }

    async fn list_catalog(
        &self,
        _access_token: &SecretString,
    ) -> Result<Vec<CatalogObject>, PlatformError> {
        self.catalog.clone()
    }

    async fn search_orders(
        &self,
        _access_token: &SecretString,
        query: &OrderQuery,
    ) -> Result<OrderPage, PlatformError> {
        self.queries.lock().expect("query lock").push(query.clone());
        if let Some(error) = &self.orders_error {
            return Err(error.clone());
        }
        let index = match query.cursor.as_deref() {
            None => 0,
            Some(cursor) => cursor
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| PlatformError::Status { status: 400, body: "bad cursor".into() })?,
        };
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }
}
