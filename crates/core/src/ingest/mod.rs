//! File upload ingestion: parse, normalize and commit one CSV as one batch.

pub mod dates;
pub mod upload;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::domain::business::BusinessId;
use crate::domain::sales::{SalesOrigin, SalesRecordBatch};
use crate::errors::ApplicationError;
use crate::identity::{CatalogSnapshot, ProductIdentityResolver};
use crate::ledger::{ensure_non_negative, CommitReceipt, LedgerStore};

pub use dates::DateFormat;
pub use upload::{ensure_csv_filename, normalize_csv, NormalizedUpload, UploadSchema};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub receipt: CommitReceipt,
    pub schema: UploadSchema,
    pub date_format: DateFormat,
    pub rows_read: usize,
    pub product_names: Vec<String>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

pub struct UploadService<'a, L: LedgerStore + ?Sized> {
    ledger: &'a L,
}

impl<'a, L: LedgerStore + ?Sized> UploadService<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Builds the resolver for one business. Identities already settled in
    /// the ledger are always honored; `live_catalog`, when the business is
    /// connected and the catalog could be read, takes precedence over them.
    pub async fn resolver_for(
        &self,
        business_id: &BusinessId,
        live_catalog: Option<&CatalogSnapshot>,
    ) -> Result<ProductIdentityResolver, ApplicationError> {
        let known = self.ledger.known_products(business_id).await?;
        let settled = CatalogSnapshot::from_known_products(&known);
        let catalog = match live_catalog {
            Some(live) => {
                let mut combined = live.clone();
                combined.merge(&settled);
                combined
            }
            None => settled,
        };
        Ok(ProductIdentityResolver::new(catalog))
    }

    /// Validates, normalizes and commits `content` atomically. Nothing is
    /// written when any row is rejected.
    pub async fn ingest(
        &self,
        business_id: &BusinessId,
        filename: &str,
        content: &[u8],
        live_catalog: Option<&CatalogSnapshot>,
        received_at: DateTime<Utc>,
    ) -> Result<UploadReport, ApplicationError> {
        ensure_csv_filename(filename)?;
        let resolver = self.resolver_for(business_id, live_catalog).await?;
        let normalized = normalize_csv(content, &resolver)?;
        ensure_non_negative(&normalized.lines)?;

        let batch = SalesRecordBatch::start(
            business_id.clone(),
            SalesOrigin::Upload,
            filename,
            received_at,
        );
        let receipt = self.ledger.commit_batch(batch, &normalized.lines).await?;

        let mut product_names = Vec::new();
        for line in &normalized.lines {
            if !line.product_name.is_empty() && !product_names.contains(&line.product_name) {
                product_names.push(line.product_name.clone());
            }
        }

        info!(
            event_name = "ingest.upload.completed",
            correlation_id = %receipt.batch.id.0,
            business_id = %business_id,
            filename,
            rows_read = normalized.rows_read,
            rows_inserted = receipt.rows_inserted,
            rows_updated = receipt.rows_updated,
            "sales upload committed"
        );

        Ok(UploadReport {
            date_range: normalized.date_range(),
            receipt,
            schema: normalized.schema,
            date_format: normalized.date_format,
            rows_read: normalized.rows_read,
            product_names,
        })
    }
}
