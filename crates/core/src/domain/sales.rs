use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::business::BusinessId;

/// Fixed number of fractional digits stored for prices and revenue.
pub const MONEY_SCALE: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SalesOrigin {
    #[serde(rename = "upload")]
    Upload,
    #[serde(rename = "platform-sync")]
    PlatformSync,
}

impl SalesOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::PlatformSync => "platform-sync",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "upload" => Some(Self::Upload),
            "platform-sync" | "platform_sync" => Some(Self::PlatformSync),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub String);

impl BatchId {
    pub fn generate() -> Self {
        Self(format!("batch-{}", Uuid::new_v4().simple()))
    }
}

/// Fetch window covered by a sync batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One ingestion event: an uploaded file or one sync run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesRecordBatch {
    pub id: BatchId,
    pub business_id: BusinessId,
    pub origin: SalesOrigin,
    pub source_label: String,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub window: Option<SyncWindow>,
}

impl SalesRecordBatch {
    pub fn start(
        business_id: BusinessId,
        origin: SalesOrigin,
        source_label: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BatchId::generate(),
            business_id,
            origin,
            source_label: source_label.into(),
            received_at,
            processed: false,
            processed_at: None,
            window: None,
        }
    }

    pub fn with_window(mut self, window: SyncWindow) -> Self {
        self.window = Some(window);
        self
    }
}

/// A normalized line record on its way into the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesLine {
    pub date: NaiveDate,
    pub product_id: String,
    pub product_name: String,
    pub unit_price: Decimal,
    pub units_sold: i64,
    pub revenue: Decimal,
    pub origin: SalesOrigin,
}

impl SalesLine {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            date: self.date,
            product_id: self.product_id.clone(),
            unit_price: canonical_money(self.unit_price),
            origin: self.origin,
        }
    }
}

/// Merge identity of a ledger row within one business.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub date: NaiveDate,
    pub product_id: String,
    pub unit_price: Decimal,
    pub origin: SalesOrigin,
}

impl NaturalKey {
    /// Canonical text form of the price column, e.g. `4.50`.
    pub fn price_text(&self) -> String {
        money_text(self.unit_price)
    }
}

/// A persisted ledger row (`SalesDataPoint`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub business_id: BusinessId,
    pub date: NaiveDate,
    pub product_id: String,
    pub product_name: String,
    pub unit_price: Decimal,
    pub units_sold: i64,
    pub revenue: Decimal,
    pub origin: SalesOrigin,
    pub batch_id: BatchId,
}

pub fn is_placeholder_name(name: &str) -> bool {
    name.trim().is_empty()
}

/// Rounds half away from zero to [`MONEY_SCALE`] places and pins the scale so
/// `4.5` and `4.50` compare and print identically.
pub fn canonical_money(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

pub fn money_text(value: Decimal) -> String {
    canonical_money(value).to_string()
}
