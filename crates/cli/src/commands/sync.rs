use chrono::Utc;
use saleslens_core::config::AppConfig;
use saleslens_core::sync::{SyncReconciler, SyncReport};
use saleslens_db::{BusinessRepository, SqlBusinessRepository, SqlLedgerRepository};
use saleslens_square::SquareClient;
use serde::Serialize;

use crate::commands::{
    find_business, with_database, CommandFailure, CommandResult, EXIT_INTERNAL, EXIT_UNAVAILABLE,
};

#[derive(Debug, Serialize)]
struct SyncRunSummary {
    business_id: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    synced_through: Option<String>,
    orders_fetched: usize,
    lines_resolved: usize,
    lines_skipped: usize,
    rows_inserted: u64,
    rows_updated: u64,
    identities_migrated: u64,
    catalog_degraded: bool,
}

impl From<&SyncReport> for SyncRunSummary {
    fn from(report: &SyncReport) -> Self {
        Self {
            business_id: report.business.id.0.clone(),
            status: "ok",
            error: None,
            synced_through: Some(report.window.end.to_rfc3339()),
            orders_fetched: report.orders_fetched,
            lines_resolved: report.lines_resolved,
            lines_skipped: report.lines_skipped,
            rows_inserted: report.receipt.rows_inserted,
            rows_updated: report.receipt.rows_updated,
            identities_migrated: report.identities_migrated,
            catalog_degraded: report.catalog_degraded,
        }
    }
}

impl SyncRunSummary {
    fn failed(business_id: String, error: String) -> Self {
        Self {
            business_id,
            status: "error",
            error: Some(error),
            synced_through: None,
            orders_fetched: 0,
            lines_resolved: 0,
            lines_skipped: 0,
            rows_inserted: 0,
            rows_updated: 0,
            identities_migrated: 0,
            catalog_degraded: false,
        }
    }
}

/// Syncs one business, or every connected business in registration order.
pub fn run(config: &AppConfig, business_id: Option<&str>) -> CommandResult {
    with_database("sync", config, |pool| async move {
        let businesses = SqlBusinessRepository::new(pool.clone());
        let ledger = SqlLedgerRepository::new(pool);
        let platform = SquareClient::from_config(&config.commerce).map_err(|error| {
            CommandFailure::new("commerce_client", error.to_string(), EXIT_INTERNAL)
        })?;
        let reconciler =
            SyncReconciler::new(&platform, &ledger, &businesses, config.commerce.sync_settings());

        if let Some(business_id) = business_id {
            let business = find_business(&businesses, business_id).await?;
            let report = reconciler.run(business, Utc::now()).await?;
            let summary = SyncRunSummary::from(&report);
            return Ok(CommandResult::success_with_data(
                "sync",
                format!("synced business {} through {}", report.business.id, report.window.end),
                vec![summary],
            ));
        }

        let targets = businesses.list_connected().await?;
        let mut runs = Vec::with_capacity(targets.len());
        for business in targets {
            let id = business.id.0.clone();
            match reconciler.run(business, Utc::now()).await {
                Ok(report) => runs.push(SyncRunSummary::from(&report)),
                Err(error) => {
                    let failure = CommandFailure::from(error);
                    runs.push(SyncRunSummary::failed(id, failure.message));
                }
            }
        }

        let failed = runs.iter().filter(|run| run.status == "error").count();
        if failed > 0 {
            let detail = runs
                .iter()
                .filter_map(|run| {
                    run.error.as_ref().map(|error| format!("{}: {error}", run.business_id))
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CommandFailure::new(
                "sync_failed",
                format!("{failed} of {} syncs failed ({detail})", runs.len()),
                EXIT_UNAVAILABLE,
            ));
        }

        Ok(CommandResult::success_with_data(
            "sync",
            format!("synced {} connected businesses", runs.len()),
            runs,
        ))
    })
}
