pub mod analytics;
pub mod config;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod ingest;
pub mod ledger;
pub mod suggestions;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use analytics::{
    analyze, PerformanceSnapshot, PerformanceTier, ProductPerformance, SalesSeries, Trend,
};
pub use domain::business::{Business, BusinessContext, BusinessId};
pub use domain::promotion::{
    Promotion, PromotionCategory, PromotionId, PromotionSuggestion, SuggestionId,
};
pub use domain::sales::{BatchId, LedgerRow, SalesLine, SalesOrigin, SalesRecordBatch};
pub use errors::{ApplicationError, DomainError, IngestError, InterfaceError, StoreError};
pub use identity::{CatalogSnapshot, ProductIdentityResolver};
pub use ingest::{UploadReport, UploadService};
pub use ledger::{CommitReceipt, LedgerStore};
pub use suggestions::{PromotionStore, PromotionSuggestionGenerator, SuggestionModel};
pub use sync::{CommercePlatform, SyncReconciler, SyncReport, SyncStateStore};
