//! Periodic commerce sync.
//!
//! Each tick walks the connected businesses one after another. Exclusion
//! across processes comes from the sync claim the reconciler takes in the
//! state store; a CLI sync that overlaps a tick is refused with a conflict.
//! The per-business lock here only makes callers inside this process wait for
//! each other instead of failing on that claim.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use saleslens_core::domain::business::{Business, BusinessId};
use saleslens_core::errors::{ApplicationError, DomainError};
use saleslens_core::ledger::LedgerStore;
use saleslens_core::sync::{
    CommercePlatform, SyncReconciler, SyncReport, SyncSettings, SyncStateStore,
};
use saleslens_db::BusinessRepository;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Outcome of one pass over the connected businesses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub businesses: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Last completed tick, shared with the health endpoint.
#[derive(Default)]
pub struct SyncStatus {
    last_tick: RwLock<Option<TickSummary>>,
}

impl SyncStatus {
    pub async fn last_tick(&self) -> Option<TickSummary> {
        self.last_tick.read().await.clone()
    }

    async fn record(&self, summary: TickSummary) {
        *self.last_tick.write().await = Some(summary);
    }
}

pub struct SyncScheduler<P, L, B> {
    platform: Arc<P>,
    ledger: Arc<L>,
    businesses: Arc<B>,
    settings: SyncSettings,
    locks: Mutex<HashMap<BusinessId, Arc<Mutex<()>>>>,
    status: Arc<SyncStatus>,
}

impl<P, L, B> SyncScheduler<P, L, B>
where
    P: CommercePlatform + 'static,
    L: LedgerStore + 'static,
    B: BusinessRepository + SyncStateStore + 'static,
{
    pub fn new(
        platform: Arc<P>,
        ledger: Arc<L>,
        businesses: Arc<B>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            platform,
            ledger,
            businesses,
            settings,
            locks: Mutex::new(HashMap::new()),
            status: Arc::new(SyncStatus::default()),
        }
    }

    pub fn status(&self) -> Arc<SyncStatus> {
        Arc::clone(&self.status)
    }

    async fn lock_for(&self, business_id: &BusinessId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(business_id.clone()).or_default())
    }

    /// Syncs one business under its lock. The business is re-read once the
    /// lock is held so the run starts from the latest stored cursor.
    pub async fn sync_business(
        &self,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, ApplicationError> {
        let lock = self.lock_for(business_id).await;
        let _guard = lock.lock().await;

        let business = self
            .businesses
            .find_by_id(business_id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?
            .ok_or_else(|| {
                DomainError::InvalidBusiness(format!("business {business_id} no longer exists"))
            })?;

        SyncReconciler::new(
            self.platform.as_ref(),
            self.ledger.as_ref(),
            self.businesses.as_ref(),
            self.settings,
        )
        .run(business, now)
        .await
    }

    /// One pass over every connected business, in registration order.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickSummary {
        let mut summary = TickSummary { started_at: Some(now), ..TickSummary::default() };
        let connected: Vec<Business> = match self.businesses.list_connected().await {
            Ok(connected) => connected,
            Err(error) => {
                warn!(
                    event_name = "sync.tick.failed",
                    correlation_id = "scheduler",
                    error = %error,
                    "could not list connected businesses"
                );
                self.status.record(summary.clone()).await;
                return summary;
            }
        };

        summary.businesses = connected.len();
        for business in connected {
            match self.sync_business(&business.id, Utc::now()).await {
                Ok(_) => summary.succeeded += 1,
                Err(error) => {
                    summary.failed += 1;
                    warn!(
                        event_name = "sync.business.failed",
                        correlation_id = "scheduler",
                        business_id = %business.id,
                        error = %error,
                        "scheduled sync failed; will retry from the stored cursor"
                    );
                }
            }
        }

        info!(
            event_name = "sync.tick.completed",
            correlation_id = "scheduler",
            businesses = summary.businesses,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "scheduled sync pass completed"
        );
        self.status.record(summary.clone()).await;
        summary
    }

    /// Runs [`Self::tick`] every `period` until the task is aborted.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.tick(Utc::now()).await;
            }
        })
    }
}
