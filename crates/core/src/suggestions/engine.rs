//! Promotion suggestion generator

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::types::{GeneratedSuggestion, SuggestionRequest};
use super::{PromotionStore, SuggestionError, SuggestionModel, MAX_TITLE_CHARS};
use crate::analytics::{analyze, AnalyticsSettings};
use crate::domain::business::Business;
use crate::domain::promotion::{PromotionSuggestion, SuggestionId};
use crate::errors::ApplicationError;
use crate::ledger::LedgerStore;

pub struct PromotionSuggestionGenerator<'a, M, S, L>
where
    M: SuggestionModel + ?Sized,
    S: PromotionStore + ?Sized,
    L: LedgerStore + ?Sized,
{
    model: &'a M,
    store: &'a S,
    ledger: &'a L,
    settings: AnalyticsSettings,
}

impl<'a, M, S, L> PromotionSuggestionGenerator<'a, M, S, L>
where
    M: SuggestionModel + ?Sized,
    S: PromotionStore + ?Sized,
    L: LedgerStore + ?Sized,
{
    pub fn new(model: &'a M, store: &'a S, ledger: &'a L, settings: AnalyticsSettings) -> Self {
        Self { model, store, ledger, settings }
    }

    /// Generates, validates and stores suggestions for `business`. A batch
    /// with any invalid suggestion is rejected as a whole.
    pub async fn generate(
        &self,
        business: &Business,
        now: DateTime<Utc>,
    ) -> Result<Vec<PromotionSuggestion>, ApplicationError> {
        let performance = analyze(self.ledger, business, &self.settings, now).await?;
        let categories = self.store.list_categories().await?;
        let request =
            SuggestionRequest::new(business.context(), performance).with_categories(categories);

        let generated = self.model.generate(&request).await?;
        validate_batch(&generated)?;

        let known_keys = request.category_keys().into_iter().collect::<HashSet<_>>();
        let suggestions = generated
            .into_iter()
            .map(|suggestion| {
                let mut category_keys = Vec::new();
                for key in suggestion.category_keys {
                    let key = key.trim().to_ascii_lowercase();
                    if !known_keys.contains(key.as_str()) {
                        warn!(
                            event_name = "suggestions.category.unmatched",
                            correlation_id = "suggestions",
                            business_id = %business.id,
                            category_key = %key,
                            "suggested category is not known locally; dropped"
                        );
                        continue;
                    }
                    if !category_keys.contains(&key) {
                        category_keys.push(key);
                    }
                }
                PromotionSuggestion {
                    id: SuggestionId::generate(),
                    business_id: business.id.clone(),
                    title: suggestion.title.trim().to_string(),
                    description: suggestion.description.trim().to_string(),
                    category_keys,
                    created_at: now,
                }
            })
            .collect::<Vec<_>>();

        if !suggestions.is_empty() {
            self.store.insert_suggestions(&suggestions).await?;
        }

        info!(
            event_name = "suggestions.generated",
            correlation_id = "suggestions",
            business_id = %business.id,
            count = suggestions.len(),
            "promotion suggestions stored"
        );

        Ok(suggestions)
    }
}

pub fn validate_batch(batch: &[GeneratedSuggestion]) -> Result<(), SuggestionError> {
    for (index, suggestion) in batch.iter().enumerate() {
        let title = suggestion.title.trim();
        if title.is_empty() {
            return Err(SuggestionError::Invalid { index, reason: "title is empty".to_string() });
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(SuggestionError::Invalid {
                index,
                reason: format!("title exceeds {MAX_TITLE_CHARS} characters"),
            });
        }
        if suggestion.description.trim().is_empty() {
            return Err(SuggestionError::Invalid {
                index,
                reason: "description is empty".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{validate_batch, PromotionSuggestionGenerator};
    use crate::analytics::AnalyticsSettings;
    use crate::domain::business::{Business, BusinessId};
    use crate::domain::promotion::{Promotion, PromotionCategory, PromotionSuggestion};
    use crate::errors::{ApplicationError, StoreError};
    use crate::suggestions::{
        GeneratedSuggestion, PromotionStore, SuggestionError, SuggestionModel, SuggestionRequest,
    };
    use crate::test_support::FakeLedger;

    struct CannedModel {
        response: Result<Vec<GeneratedSuggestion>, SuggestionError>,
        seen: Mutex<Vec<SuggestionRequest>>,
    }

    impl CannedModel {
        fn returning(response: Result<Vec<GeneratedSuggestion>, SuggestionError>) -> Self {
            Self { response, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl SuggestionModel for CannedModel {
        async fn generate(
            &self,
            request: &SuggestionRequest,
        ) -> Result<Vec<GeneratedSuggestion>, SuggestionError> {
            self.seen.lock().expect("lock").push(request.clone());
            self.response.clone()
        }
    }

    #[derive(Default)]
    struct MemoryPromotionStore {
        suggestions: Mutex<Vec<PromotionSuggestion>>,
    }

    #[async_trait]
    impl PromotionStore for MemoryPromotionStore {
        async fn list_categories(&self) -> Result<Vec<PromotionCategory>, StoreError> {
            Ok(vec![
                PromotionCategory { key: "discount".to_string(), label: "Discount".to_string() },
                PromotionCategory { key: "bundle".to_string(), label: "Bundle".to_string() },
            ])
        }

        async fn insert_suggestions(
            &self,
            suggestions: &[PromotionSuggestion],
        ) -> Result<(), StoreError> {
            self.suggestions.lock().expect("lock").extend_from_slice(suggestions);
            Ok(())
        }

        async fn list_suggestions(
            &self,
            _business_id: &BusinessId,
        ) -> Result<Vec<PromotionSuggestion>, StoreError> {
            Ok(self.suggestions.lock().expect("lock").clone())
        }

        async fn create_promotion(&self, _promotion: &Promotion) -> Result<(), StoreError> {
            Ok(())
        }

        async fn list_promotions(
            &self,
            _business_id: &BusinessId,
        ) -> Result<Vec<Promotion>, StoreError> {
            Ok(Vec::new())
        }

        async fn refresh_sold_counts(
            &self,
            _business_id: &BusinessId,
            _product_names: &[String],
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    fn business() -> Business {
        let mut business = Business::new("Corner Cafe").expect("business");
        business.category = Some("cafe".to_string());
        business
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().expect("timestamp")
    }

    #[tokio::test]
    async fn unknown_category_keys_are_dropped() {
        let model = CannedModel::returning(Ok(vec![GeneratedSuggestion::new(
            "Two-for-Tuesday",
            "Pair a pastry with any latte on Tuesdays.",
        )
        .with_categories(["Bundle", "flash_sale", "bundle"])]));
        let store = MemoryPromotionStore::default();
        let ledger = FakeLedger::default();

        let stored = PromotionSuggestionGenerator::new(
            &model,
            &store,
            &ledger,
            AnalyticsSettings::default(),
        )
        .generate(&business(), now())
        .await
        .expect("generate");

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category_keys, vec!["bundle".to_string()]);
        assert_eq!(store.suggestions.lock().expect("lock").len(), 1);

        let seen = model.seen.lock().expect("lock");
        assert_eq!(seen[0].business.category.as_deref(), Some("cafe"));
        assert_eq!(seen[0].category_keys(), vec!["discount", "bundle"]);
    }

    #[tokio::test]
    async fn malformed_suggestion_persists_nothing() {
        let model = CannedModel::returning(Ok(vec![
            GeneratedSuggestion::new("Happy hour", "Half price drinks 3-5pm."),
            GeneratedSuggestion::new("  ", "No title here."),
        ]));
        let store = MemoryPromotionStore::default();
        let ledger = FakeLedger::default();

        let error = PromotionSuggestionGenerator::new(
            &model,
            &store,
            &ledger,
            AnalyticsSettings::default(),
        )
        .generate(&business(), now())
        .await
        .expect_err("invalid batch");

        assert!(matches!(error, ApplicationError::Domain(_)));
        assert!(store.suggestions.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn model_failure_is_an_upstream_error() {
        let model =
            CannedModel::returning(Err(SuggestionError::Upstream("status 503".to_string())));
        let store = MemoryPromotionStore::default();
        let ledger = FakeLedger::default();

        let error = PromotionSuggestionGenerator::new(
            &model,
            &store,
            &ledger,
            AnalyticsSettings::default(),
        )
        .generate(&business(), now())
        .await
        .expect_err("upstream");

        assert_eq!(error, ApplicationError::UpstreamApi("status 503".to_string()));
    }

    #[tokio::test]
    async fn empty_batch_is_valid_and_stores_nothing() {
        let model = CannedModel::returning(Ok(Vec::new()));
        let store = MemoryPromotionStore::default();
        let ledger = FakeLedger::default();

        let stored = PromotionSuggestionGenerator::new(
            &model,
            &store,
            &ledger,
            AnalyticsSettings::default(),
        )
        .generate(&business(), now())
        .await
        .expect("empty batch");

        assert!(stored.is_empty());
    }

    #[test]
    fn long_titles_and_empty_descriptions_are_rejected() {
        let long = GeneratedSuggestion::new("x".repeat(256), "fine");
        assert!(matches!(
            validate_batch(&[long]),
            Err(SuggestionError::Invalid { index: 0, .. })
        ));
        let empty = GeneratedSuggestion::new("Title", " ");
        assert!(validate_batch(&[GeneratedSuggestion::new("ok", "ok"), empty]).is_err());
        assert!(validate_batch(&[GeneratedSuggestion::new("x".repeat(255), "ok")]).is_ok());
    }
}
