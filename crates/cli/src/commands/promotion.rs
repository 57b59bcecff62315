use chrono::{NaiveDate, Utc};
use saleslens_core::config::AppConfig;
use saleslens_core::domain::promotion::{Promotion, PromotionId};
use saleslens_core::suggestions::PromotionStore;
use saleslens_db::{SqlBusinessRepository, SqlPromotionRepository};

use crate::commands::{find_business, with_database, CommandFailure, CommandResult};

#[derive(Clone, Debug)]
pub struct NewPromotion {
    pub description: String,
    pub product_names: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// Records a running promotion. Its `sold_count` starts at zero and follows
/// later uploads of its products.
pub fn add(config: &AppConfig, business_id: &str, input: NewPromotion) -> CommandResult {
    let product_names = input
        .product_names
        .iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>();
    if product_names.is_empty() {
        return CommandFailure::invalid_input("a promotion needs at least one product name")
            .into_result("promotion.add");
    }
    if input.description.trim().is_empty() {
        return CommandFailure::invalid_input("promotion description must not be empty")
            .into_result("promotion.add");
    }

    with_database("promotion.add", config, |pool| async move {
        let businesses = SqlBusinessRepository::new(pool.clone());
        let business = find_business(&businesses, business_id).await?;

        let promotion = Promotion {
            id: PromotionId::generate(),
            business_id: business.id.clone(),
            description: input.description.trim().to_string(),
            product_names,
            start_date: input.start_date,
            end_date: input.end_date,
            sold_count: 0,
            created_at: Utc::now(),
        };
        SqlPromotionRepository::new(pool).create_promotion(&promotion).await?;

        Ok(CommandResult::success_with_data(
            "promotion.add",
            format!("recorded promotion {}", promotion.id.0),
            promotion,
        ))
    })
}

pub fn list(config: &AppConfig, business_id: &str) -> CommandResult {
    with_database("promotion.list", config, |pool| async move {
        let businesses = SqlBusinessRepository::new(pool.clone());
        let business = find_business(&businesses, business_id).await?;
        let promotions = SqlPromotionRepository::new(pool).list_promotions(&business.id).await?;
        Ok(CommandResult::success_with_data(
            "promotion.list",
            format!("{} promotions", promotions.len()),
            promotions,
        ))
    })
}
