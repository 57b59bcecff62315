use chrono::Utc;
use saleslens_core::analytics::{analyze, sales_series};
use saleslens_core::config::AppConfig;
use saleslens_db::{SqlBusinessRepository, SqlLedgerRepository};

use crate::commands::{find_business, with_database, CommandResult};

pub fn performance(config: &AppConfig, business_id: &str) -> CommandResult {
    with_database("performance", config, |pool| async move {
        let businesses = SqlBusinessRepository::new(pool.clone());
        let business = find_business(&businesses, business_id).await?;
        let ledger = SqlLedgerRepository::new(pool);
        let snapshot =
            analyze(&ledger, &business, &config.analytics.settings(), Utc::now()).await?;

        let message = if snapshot.is_empty() {
            format!("no sales in the last {} days", config.analytics.window_days)
        } else {
            format!("{} products ranked", snapshot.products.len())
        };
        Ok(CommandResult::success_with_data("performance", message, snapshot))
    })
}

pub fn series(config: &AppConfig, business_id: &str) -> CommandResult {
    with_database("sales-series", config, |pool| async move {
        let businesses = SqlBusinessRepository::new(pool.clone());
        let business = find_business(&businesses, business_id).await?;
        let series = sales_series(&SqlLedgerRepository::new(pool), &business.id).await?;
        Ok(CommandResult::success_with_data(
            "sales-series",
            format!("{} days with sales", series.labels.len()),
            series,
        ))
    })
}
