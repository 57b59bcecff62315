use saleslens_core::config::AppConfig;
use saleslens_core::domain::business::Business;
use saleslens_db::{BusinessRepository, SqlBusinessRepository};
use secrecy::SecretString;
use serde::Serialize;
use tracing::info;

use crate::commands::{find_business, with_database, CommandFailure, CommandResult};

/// Profile fields accepted by `business add`.
#[derive(Clone, Debug, Default)]
pub struct NewBusiness {
    pub name: String,
    pub category: Option<String>,
    pub target_customers: Option<String>,
    pub vibe: Option<String>,
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Serialize)]
struct BusinessSummary {
    id: String,
    name: String,
    category: Option<String>,
    target_customers: Option<String>,
    vibe: Option<String>,
    utc_offset_minutes: i32,
    commerce_connected: bool,
    last_sync_at: Option<String>,
}

impl From<&Business> for BusinessSummary {
    fn from(business: &Business) -> Self {
        Self {
            id: business.id.0.clone(),
            name: business.name.clone(),
            category: business.category.clone(),
            target_customers: business.target_customers.clone(),
            vibe: business.vibe.clone(),
            utc_offset_minutes: business.utc_offset_minutes,
            commerce_connected: business.is_commerce_connected(),
            last_sync_at: business.last_sync_at.map(|ts| ts.to_rfc3339()),
        }
    }
}

pub fn add(config: &AppConfig, input: NewBusiness) -> CommandResult {
    with_database("business.add", config, |pool| async move {
        let repository = SqlBusinessRepository::new(pool);
        let mut business = Business::new(input.name)
            .map_err(|error| CommandFailure::invalid_input(error.to_string()))?;
        business.category = input.category;
        business.target_customers = input.target_customers;
        business.vibe = input.vibe;
        business.utc_offset_minutes = input.utc_offset_minutes;
        repository.create(&business).await?;

        info!(
            event_name = "business.registered",
            correlation_id = "cli",
            business_id = %business.id,
            "business registered"
        );
        Ok(CommandResult::success_with_data(
            "business.add",
            format!("registered business {}", business.id),
            BusinessSummary::from(&business),
        ))
    })
}

pub fn list(config: &AppConfig) -> CommandResult {
    with_database("business.list", config, |pool| async move {
        let businesses = SqlBusinessRepository::new(pool).list().await?;
        let summaries = businesses.iter().map(BusinessSummary::from).collect::<Vec<_>>();
        Ok(CommandResult::success_with_data(
            "business.list",
            format!("{} businesses", summaries.len()),
            summaries,
        ))
    })
}

pub fn connect(config: &AppConfig, business_id: &str, access_token: &str) -> CommandResult {
    let token = access_token.trim().to_string();
    if token.is_empty() {
        return CommandFailure::invalid_input("access token must not be empty")
            .into_result("business.connect");
    }

    with_database("business.connect", config, |pool| async move {
        let repository = SqlBusinessRepository::new(pool);
        let business = find_business(&repository, business_id).await?;
        repository.set_access_token(&business.id, SecretString::from(token)).await?;

        info!(
            event_name = "business.commerce.connected",
            correlation_id = "cli",
            business_id = %business.id,
            "commerce access token stored"
        );
        Ok(CommandResult::success(
            "business.connect",
            format!("business {} connected to the commerce platform", business.id),
        ))
    })
}
