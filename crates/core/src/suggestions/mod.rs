//! Promotion suggestions
//!
//! Feeds product performance and the business profile to a text-generation
//! model and stores what comes back. The model only proposes; validation,
//! category matching and persistence happen here.

mod engine;
mod types;

pub use engine::{validate_batch, PromotionSuggestionGenerator};
pub use types::*;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::business::BusinessId;
use crate::domain::promotion::{Promotion, PromotionCategory, PromotionSuggestion};
use crate::errors::{ApplicationError, DomainError, StoreError};

/// Maximum suggestions requested from the model per call
pub const DEFAULT_MAX_SUGGESTIONS: usize = 5;

/// Longest accepted suggestion title, in characters
pub const MAX_TITLE_CHARS: usize = 255;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SuggestionError {
    #[error("suggestion model request failed: {0}")]
    Upstream(String),
    #[error("suggestion model returned an unusable response: {0}")]
    MalformedResponse(String),
    #[error("suggestion {index} is invalid: {reason}")]
    Invalid { index: usize, reason: String },
}

impl From<SuggestionError> for ApplicationError {
    fn from(value: SuggestionError) -> Self {
        match value {
            SuggestionError::Upstream(message) => Self::UpstreamApi(message),
            SuggestionError::MalformedResponse(message) => {
                Self::UpstreamApi(format!("malformed suggestion response: {message}"))
            }
            invalid @ SuggestionError::Invalid { .. } => {
                Self::Domain(DomainError::InvariantViolation(invalid.to_string()))
            }
        }
    }
}

#[async_trait]
pub trait SuggestionModel: Send + Sync {
    async fn generate(
        &self,
        request: &SuggestionRequest,
    ) -> Result<Vec<GeneratedSuggestion>, SuggestionError>;
}

#[async_trait]
pub trait PromotionStore: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<PromotionCategory>, StoreError>;

    /// Inserts every suggestion with its category links in one transaction.
    async fn insert_suggestions(&self, suggestions: &[PromotionSuggestion])
        -> Result<(), StoreError>;

    async fn list_suggestions(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<PromotionSuggestion>, StoreError>;

    async fn create_promotion(&self, promotion: &Promotion) -> Result<(), StoreError>;

    async fn list_promotions(&self, business_id: &BusinessId) -> Result<Vec<Promotion>, StoreError>;

    /// Recomputes `sold_count` for promotions touched by newly ingested
    /// sales of `product_names` within `[start, end]`. Returns the number of
    /// promotions updated.
    async fn refresh_sold_counts(
        &self,
        business_id: &BusinessId,
        product_names: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, StoreError>;
}
