use chrono::Utc;
use saleslens_agent::{build_client, LlmSuggestionModel};
use saleslens_core::config::AppConfig;
use saleslens_core::suggestions::{PromotionStore, PromotionSuggestionGenerator};
use saleslens_db::{SqlBusinessRepository, SqlLedgerRepository, SqlPromotionRepository};

use crate::commands::{find_business, with_database, CommandFailure, CommandResult, EXIT_CONFIG};

/// Asks the configured model for new suggestions and stores them.
pub fn generate(config: &AppConfig, business_id: &str) -> CommandResult {
    let client = match build_client(&config.llm) {
        Ok(client) => client,
        Err(error) => {
            return CommandFailure::new("llm_client", format!("{error:#}"), EXIT_CONFIG)
                .into_result("suggest");
        }
    };
    let model = LlmSuggestionModel::new(client);

    with_database("suggest", config, |pool| async move {
        let businesses = SqlBusinessRepository::new(pool.clone());
        let business = find_business(&businesses, business_id).await?;
        let ledger = SqlLedgerRepository::new(pool.clone());
        let store = SqlPromotionRepository::new(pool);

        let generator =
            PromotionSuggestionGenerator::new(&model, &store, &ledger, config.analytics.settings());
        let suggestions = generator.generate(&business, Utc::now()).await?;
        Ok(CommandResult::success_with_data(
            "suggest",
            format!("stored {} promotion suggestions", suggestions.len()),
            suggestions,
        ))
    })
}

pub fn list(config: &AppConfig, business_id: &str) -> CommandResult {
    with_database("suggestions", config, |pool| async move {
        let businesses = SqlBusinessRepository::new(pool.clone());
        let business = find_business(&businesses, business_id).await?;
        let suggestions = SqlPromotionRepository::new(pool).list_suggestions(&business.id).await?;
        Ok(CommandResult::success_with_data(
            "suggestions",
            format!("{} stored suggestions", suggestions.len()),
            suggestions,
        ))
    })
}
