use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use saleslens_core::domain::business::{Business, BusinessId};
use saleslens_core::errors::StoreError;

pub mod business;
pub mod ledger;
pub mod memory;
pub mod promotion;

pub use business::SqlBusinessRepository;
pub use ledger::SqlLedgerRepository;
pub use memory::{InMemoryBusinessRepository, InMemoryLedgerRepository};
pub use promotion::SqlPromotionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("rejected write: {0}")]
    Rejected(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        StoreError(value.to_string())
    }
}

#[async_trait]
pub trait BusinessRepository: Send + Sync {
    async fn create(&self, business: &Business) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError>;

    /// Every business, oldest first.
    async fn list(&self) -> Result<Vec<Business>, RepositoryError>;

    async fn set_access_token(
        &self,
        id: &BusinessId,
        token: SecretString,
    ) -> Result<(), RepositoryError>;

    /// Businesses holding a commerce access token, oldest first.
    async fn list_connected(&self) -> Result<Vec<Business>, RepositoryError> {
        Ok(self.list().await?.into_iter().filter(Business::is_commerce_connected).collect())
    }
}

pub(crate) fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc)).map_err(|err| {
        RepositoryError::Decode(format!("invalid {} timestamp '{}': {}", field, value, err))
    })
}

pub(crate) fn parse_date(field: &str, value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| {
        RepositoryError::Decode(format!("invalid {} date '{}': {}", field, value, err))
    })
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|err| {
        RepositoryError::Decode(format!("invalid {} decimal '{}': {}", field, value, err))
    })
}

pub(crate) fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
