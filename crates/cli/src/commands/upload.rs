use std::fs;
use std::path::Path;

use chrono::Utc;
use saleslens_core::config::AppConfig;
use saleslens_core::ingest::UploadService;
use saleslens_core::suggestions::PromotionStore;
use saleslens_core::sync::SyncReconciler;
use saleslens_db::{SqlBusinessRepository, SqlLedgerRepository, SqlPromotionRepository};
use saleslens_square::SquareClient;
use serde_json::json;

use crate::commands::{find_business, with_database, CommandFailure, CommandResult, EXIT_INTERNAL};

pub fn run(config: &AppConfig, business_id: &str, path: &Path) -> CommandResult {
    let filename =
        path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(error) => {
            return CommandFailure::invalid_input(format!(
                "could not read {}: {error}",
                path.display()
            ))
            .into_result("upload");
        }
    };

    with_database("upload", config, |pool| async move {
        let businesses = SqlBusinessRepository::new(pool.clone());
        let ledger = SqlLedgerRepository::new(pool.clone());
        let promotions = SqlPromotionRepository::new(pool);
        let business = find_business(&businesses, business_id).await?;

        let live_catalog = if business.is_commerce_connected() {
            let platform = SquareClient::from_config(&config.commerce).map_err(|error| {
                CommandFailure::new("commerce_client", error.to_string(), EXIT_INTERNAL)
            })?;
            SyncReconciler::new(&platform, &ledger, &businesses, config.commerce.sync_settings())
                .live_catalog(&business)
                .await
        } else {
            None
        };

        let report = UploadService::new(&ledger)
            .ingest(&business.id, &filename, &content, live_catalog.as_ref(), Utc::now())
            .await?;

        let promotions_refreshed = match report.date_range {
            Some((start, end)) if !report.product_names.is_empty() => {
                promotions
                    .refresh_sold_counts(&business.id, &report.product_names, start, end)
                    .await?
            }
            _ => 0,
        };

        Ok(CommandResult::success_with_data(
            "upload",
            format!(
                "ingested {} rows from {} ({} new, {} merged)",
                report.rows_read,
                filename,
                report.receipt.rows_inserted,
                report.receipt.rows_updated
            ),
            json!({
                "report": report,
                "catalog_used": live_catalog.is_some(),
                "promotions_refreshed": promotions_refreshed,
            }),
        ))
    })
}
