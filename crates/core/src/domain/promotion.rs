use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::business::BusinessId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuggestionId(pub String);

impl SuggestionId {
    pub fn generate() -> Self {
        Self(format!("sugg-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromotionId(pub String);

impl PromotionId {
    pub fn generate() -> Self {
        Self(format!("promo-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionCategory {
    pub key: String,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionSuggestion {
    pub id: SuggestionId,
    pub business_id: BusinessId,
    pub title: String,
    pub description: String,
    pub category_keys: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A promotion the business is running. `sold_count` is derived from the
/// ledger whenever new sales for its products arrive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub business_id: BusinessId,
    pub description: String,
    pub product_names: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub sold_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Promotion {
    /// Whether the promotion's run overlaps `[start, end]`.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && self.end_date.map_or(true, |promo_end| promo_end >= start)
    }

    /// Intersection of the promotion's run with `[start, end]`.
    pub fn clamp_range(&self, start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
        let from = self.start_date.max(start);
        let to = self.end_date.map_or(end, |promo_end| promo_end.min(end));
        (from, to)
    }
}
