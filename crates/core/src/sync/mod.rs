//! Commerce-platform order sync.
//!
//! One run walks `CLAIM → FETCH_CATALOG → FETCH_ORDERS → RESOLVE_LINES →
//! UPSERT → ADVANCE_CURSOR`. Only a successful upsert moves the business
//! cursor, so a failed run is retried from where the previous one ended.
//!
//! The claim is held in the state store, not in memory: two processes syncing
//! the same business cannot both hold it, and a claim taken against a cursor
//! that has since moved is refused.

pub mod catalog;
pub mod wire;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::business::{Business, BusinessId};
use crate::domain::sales::{SalesLine, SalesOrigin, SalesRecordBatch, SyncWindow};
use crate::errors::{ApplicationError, DomainError, StoreError};
use crate::identity::{CatalogSnapshot, ProductIdentityResolver};
use crate::ledger::{aggregate_lines, ensure_non_negative, CommitReceipt, LedgerStore};

pub use catalog::{CatalogIndex, ResolvedProduct};
pub use wire::{CatalogObject, Location, Order, OrderLineItem, OrderPage, OrderQuery};

pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;
pub const MAX_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_CLAIM_TTL_SECS: i64 = 900;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("commerce platform request failed: {0}")]
    Transport(String),
    #[error("commerce platform rejected the access token")]
    Unauthorized,
    #[error("commerce platform returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("commerce platform payload could not be decoded: {0}")]
    Decode(String),
}

/// Read-only access to a merchant account on the commerce platform.
#[async_trait]
pub trait CommercePlatform: Send + Sync {
    async fn list_locations(
        &self,
        access_token: &SecretString,
    ) -> Result<Vec<Location>, PlatformError>;

    /// Every ITEM and ITEM_VARIATION object, following pagination.
    async fn list_catalog(
        &self,
        access_token: &SecretString,
    ) -> Result<Vec<CatalogObject>, PlatformError>;

    /// One page of orders created within the query window, oldest first.
    async fn search_orders(
        &self,
        access_token: &SecretString,
        query: &OrderQuery,
    ) -> Result<OrderPage, PlatformError>;
}

/// Persists the sync cursor of a business and the claim that serializes runs.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Takes the sync claim until `expires_at`. Returns `false` when another
    /// run holds a claim that has not expired at `now`, or when the stored
    /// cursor is no longer `expected_cursor`.
    async fn claim(
        &self,
        business_id: &BusinessId,
        expected_cursor: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Moves the cursor from `expected_cursor` to `synced_through` and drops
    /// the claim. Returns `false`, leaving the cursor alone, when the stored
    /// cursor moved in the meantime.
    async fn advance_cursor(
        &self,
        business_id: &BusinessId,
        expected_cursor: Option<DateTime<Utc>>,
        synced_through: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Drops the claim without touching the cursor.
    async fn release(&self, business_id: &BusinessId) -> Result<(), StoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Claim,
    FetchCatalog,
    FetchOrders,
    ResolveLines,
    Upsert,
    AdvanceCursor,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::FetchCatalog => "fetch_catalog",
            Self::FetchOrders => "fetch_orders",
            Self::ResolveLines => "resolve_lines",
            Self::Upsert => "upsert",
            Self::AdvanceCursor => "advance_cursor",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncSettings {
    pub lookback_days: i64,
    pub page_size: u32,
    /// Lifetime of a claim left behind by a run that never finished.
    pub claim_ttl_secs: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            page_size: MAX_PAGE_SIZE,
            claim_ttl_secs: DEFAULT_CLAIM_TTL_SECS,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SyncReport {
    /// The business with its cursor advanced to `window.end`.
    pub business: Business,
    pub window: SyncWindow,
    pub receipt: CommitReceipt,
    pub catalog_degraded: bool,
    pub orders_fetched: usize,
    pub lines_resolved: usize,
    pub lines_skipped: usize,
    pub identities_migrated: u64,
}

pub struct SyncReconciler<'a, P, L, S>
where
    P: CommercePlatform + ?Sized,
    L: LedgerStore + ?Sized,
    S: SyncStateStore + ?Sized,
{
    platform: &'a P,
    ledger: &'a L,
    state: &'a S,
    settings: SyncSettings,
}

impl<'a, P, L, S> SyncReconciler<'a, P, L, S>
where
    P: CommercePlatform + ?Sized,
    L: LedgerStore + ?Sized,
    S: SyncStateStore + ?Sized,
{
    pub fn new(platform: &'a P, ledger: &'a L, state: &'a S, settings: SyncSettings) -> Self {
        Self { platform, ledger, state, settings }
    }

    /// Fetches the live catalog as a resolver snapshot, for uploads made by a
    /// connected business. `None` when the catalog cannot be read.
    pub async fn live_catalog(&self, business: &Business) -> Option<CatalogSnapshot> {
        let token = business.commerce_access_token.as_ref()?;
        match self.platform.list_catalog(token).await {
            Ok(objects) => Some(CatalogIndex::from_objects(&objects).to_snapshot()),
            Err(error) => {
                warn!(
                    event_name = "sync.catalog.unavailable",
                    correlation_id = "upload",
                    business_id = %business.id,
                    error = %error,
                    "catalog unavailable; product names resolved locally"
                );
                None
            }
        }
    }

    pub async fn run(
        &self,
        business: Business,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, ApplicationError> {
        let Some(token) = business.commerce_access_token.clone() else {
            return Err(DomainError::InvalidBusiness(
                "business is not connected to a commerce platform".to_string(),
            )
            .into());
        };
        let window = SyncWindow {
            start: business
                .last_sync_at
                .unwrap_or_else(|| now - Duration::days(self.settings.lookback_days)),
            end: now,
        };
        let correlation_id = format!("sync-{}-{}", business.id, now.timestamp());

        // CLAIM
        let expires_at = now + Duration::seconds(self.settings.claim_ttl_secs.max(1));
        let claimed = self
            .state
            .claim(&business.id, business.last_sync_at, now, expires_at)
            .await
            .map_err(|error| {
                self.failed(&business, &correlation_id, SyncPhase::Claim, error.into())
            })?;
        if !claimed {
            return Err(self.failed(
                &business,
                &correlation_id,
                SyncPhase::Claim,
                ApplicationError::SyncConflict(format!(
                    "business {} is being synced by another run; retry later",
                    business.id
                )),
            ));
        }

        let business_id = business.id.clone();
        let outcome = self.reconcile(business, token, window, &correlation_id, now).await;
        if outcome.is_err() {
            if let Err(error) = self.state.release(&business_id).await {
                warn!(
                    event_name = "sync.claim.release_failed",
                    correlation_id = %correlation_id,
                    business_id = %business_id,
                    error = %error,
                    "sync claim left to expire"
                );
            }
        }
        outcome
    }

    async fn reconcile(
        &self,
        business: Business,
        token: SecretString,
        window: SyncWindow,
        correlation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, ApplicationError> {
        info!(
            event_name = "sync.run.start",
            correlation_id,
            business_id = %business.id,
            window_start = %window.start.to_rfc3339(),
            window_end = %window.end.to_rfc3339(),
            "commerce sync started"
        );

        // FETCH_CATALOG
        let catalog = match self.platform.list_catalog(&token).await {
            Ok(objects) => Some(CatalogIndex::from_objects(&objects)),
            Err(error) => {
                warn!(
                    event_name = "sync.catalog.unavailable",
                    correlation_id,
                    business_id = %business.id,
                    phase = SyncPhase::FetchCatalog.as_str(),
                    error = %error,
                    "catalog unavailable; order lines keep their own labels"
                );
                None
            }
        };

        // FETCH_ORDERS
        let orders = self
            .fetch_orders(&token, &window)
            .await
            .map_err(|error| {
                self.failed(&business, correlation_id, SyncPhase::FetchOrders, error)
            })?;

        // RESOLVE_LINES
        let known = self.ledger.known_products(&business.id).await.map_err(|error| {
            self.failed(&business, correlation_id, SyncPhase::ResolveLines, error.into())
        })?;
        let mut snapshot = catalog.as_ref().map(CatalogIndex::to_snapshot).unwrap_or_default();
        snapshot.merge(&CatalogSnapshot::from_known_products(&known));
        let resolver = ProductIdentityResolver::new(snapshot);

        let mut identities_migrated = 0;
        if catalog.is_some() {
            let migrations = resolver.plan_migration(&known);
            if !migrations.is_empty() {
                identities_migrated = self
                    .ledger
                    .migrate_identities(&business.id, &migrations)
                    .await
                    .map_err(|error| {
                        let error = ApplicationError::from(error);
                        self.failed(&business, correlation_id, SyncPhase::ResolveLines, error)
                    })?;
                info!(
                    event_name = "sync.identity.migrated",
                    correlation_id,
                    business_id = %business.id,
                    products = migrations.len(),
                    rows = identities_migrated,
                    "generated product ids replaced by catalog ids"
                );
            }
        }

        let index = catalog.clone().unwrap_or_default();
        let mut lines = Vec::new();
        let mut lines_skipped = 0;
        for order in &orders {
            let date = business.local_date(order.created_at);
            for item in &order.line_items {
                let Some(units_sold) = whole_units(&item.quantity) else {
                    lines_skipped += 1;
                    warn!(
                        event_name = "sync.line.skipped",
                        correlation_id,
                        business_id = %business.id,
                        phase = SyncPhase::ResolveLines.as_str(),
                        quantity = %item.quantity,
                        "order line quantity is not a whole unit count"
                    );
                    continue;
                };
                let amount =
                    item.base_price_money.as_ref().and_then(|money| money.amount).unwrap_or(0);
                if amount < 0 {
                    lines_skipped += 1;
                    warn!(
                        event_name = "sync.line.skipped",
                        correlation_id,
                        business_id = %business.id,
                        phase = SyncPhase::ResolveLines.as_str(),
                        amount,
                        "order line carries a negative price"
                    );
                    continue;
                }
                let resolved = index.resolve_line(item, &resolver);
                let unit_price = minor_units_to_decimal(amount);
                lines.push(SalesLine {
                    date,
                    product_id: resolved.product_id,
                    product_name: resolved.product_name,
                    unit_price,
                    units_sold,
                    revenue: unit_price * Decimal::from(units_sold),
                    origin: SalesOrigin::PlatformSync,
                });
            }
        }
        let lines_resolved = lines.len();
        let lines = aggregate_lines(lines);
        ensure_non_negative(&lines)?;

        // UPSERT
        let label = format!("sync {} .. {}", window.start.to_rfc3339(), window.end.to_rfc3339());
        let batch = SalesRecordBatch::start(
            business.id.clone(),
            SalesOrigin::PlatformSync,
            label,
            now,
        )
        .with_window(window);
        let receipt = self.ledger.commit_batch(batch, &lines).await.map_err(|error| {
            self.failed(&business, correlation_id, SyncPhase::Upsert, error.into())
        })?;

        // ADVANCE_CURSOR
        let advanced = self
            .state
            .advance_cursor(&business.id, business.last_sync_at, window.end)
            .await
            .map_err(|error| {
                self.failed(&business, correlation_id, SyncPhase::AdvanceCursor, error.into())
            })?;
        if !advanced {
            return Err(self.failed(
                &business,
                correlation_id,
                SyncPhase::AdvanceCursor,
                ApplicationError::SyncConflict(format!(
                    "cursor of business {} moved during the run",
                    business.id
                )),
            ));
        }
        let mut business = business;
        business.last_sync_at = Some(window.end);

        info!(
            event_name = "sync.cursor.advanced",
            correlation_id,
            business_id = %business.id,
            orders = orders.len(),
            lines = lines_resolved,
            skipped = lines_skipped,
            catalog_degraded = catalog.is_none(),
            synced_through = %window.end.to_rfc3339(),
            "commerce sync completed"
        );

        Ok(SyncReport {
            business,
            window,
            receipt,
            catalog_degraded: catalog.is_none(),
            orders_fetched: orders.len(),
            lines_resolved,
            lines_skipped,
            identities_migrated,
        })
    }

    async fn fetch_orders(
        &self,
        token: &SecretString,
        window: &SyncWindow,
    ) -> Result<Vec<Order>, ApplicationError> {
        let locations = self.platform.list_locations(token).await.map_err(upstream)?;
        if locations.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = OrderQuery {
            location_ids: locations.into_iter().map(|location| location.id).collect(),
            created_from: window.start,
            created_to: window.end,
            limit: self.settings.page_size.clamp(1, MAX_PAGE_SIZE),
            cursor: None,
        };
        let mut orders = Vec::new();
        loop {
            let page = self.platform.search_orders(token, &query).await.map_err(upstream)?;
            orders.extend(page.orders);
            match page.cursor.filter(|cursor| !cursor.is_empty()) {
                Some(cursor) => query.cursor = Some(cursor),
                None => break,
            }
        }
        Ok(orders)
    }

    fn failed(
        &self,
        business: &Business,
        correlation_id: &str,
        phase: SyncPhase,
        error: ApplicationError,
    ) -> ApplicationError {
        warn!(
            event_name = "sync.run.failed",
            correlation_id,
            business_id = %business.id,
            phase = phase.as_str(),
            error = %error,
            "commerce sync failed; cursor left unchanged"
        );
        error
    }
}

fn upstream(error: PlatformError) -> ApplicationError {
    ApplicationError::UpstreamApi(error.to_string())
}

/// Converts integer minor units (cents) to major units.
pub fn minor_units_to_decimal(amount: i64) -> Decimal {
    Decimal::new(amount, 2)
}

/// Parses a decimal quantity, accepting it only when it is a whole,
/// non-negative number of units.
pub fn whole_units(quantity: &str) -> Option<i64> {
    let value = Decimal::from_str(quantity.trim()).ok()?;
    if value.is_sign_negative() || !value.fract().is_zero() {
        return None;
    }
    value.trunc().to_i64()
}
