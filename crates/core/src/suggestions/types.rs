//! Types exchanged with the suggestion model.

use serde::{Deserialize, Serialize};

use crate::analytics::PerformanceSnapshot;
use crate::domain::business::BusinessContext;
use crate::domain::promotion::PromotionCategory;

/// Everything the model sees for one generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionRequest {
    pub business: BusinessContext,
    pub performance: PerformanceSnapshot,
    pub categories: Vec<PromotionCategory>,
    pub max_suggestions: usize,
}

impl SuggestionRequest {
    pub fn new(business: BusinessContext, performance: PerformanceSnapshot) -> Self {
        Self {
            business,
            performance,
            categories: Vec::new(),
            max_suggestions: super::DEFAULT_MAX_SUGGESTIONS,
        }
    }

    pub fn with_categories(mut self, categories: Vec<PromotionCategory>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max;
        self
    }

    pub fn category_keys(&self) -> Vec<&str> {
        self.categories.iter().map(|category| category.key.as_str()).collect()
    }
}

/// One suggestion as returned by the model, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSuggestion {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category_keys: Vec<String>,
}

impl GeneratedSuggestion {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { title: title.into(), description: description.into(), category_keys: Vec::new() }
    }

    pub fn with_categories<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.category_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}
