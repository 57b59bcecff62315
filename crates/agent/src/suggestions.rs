use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use saleslens_core::suggestions::{
    GeneratedSuggestion, SuggestionError, SuggestionModel, SuggestionRequest,
};

use crate::llm::LlmClient;

/// [`SuggestionModel`] that prompts an [`LlmClient`] for JSON suggestions.
pub struct LlmSuggestionModel<C> {
    client: C,
}

impl<C: LlmClient> LlmSuggestionModel<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct SuggestionEnvelope {
    suggestions: Vec<GeneratedSuggestion>,
}

pub fn build_prompt(request: &SuggestionRequest) -> String {
    let context = json!({
        "business": request.business,
        "performance": request.performance,
        "categories": request.categories,
    });
    let context = serde_json::to_string_pretty(&context).unwrap_or_else(|_| context.to_string());

    format!(
        "Suggest up to {max} promotions for the business described below, based on \
         how its products are performing. Favour promotions that lift products tiered \
         \"bottom\" or trending \"downward\" and that make the most of \"top\" products.\n\n\
         Context:\n{context}\n\n\
         Respond with a JSON object of the form \
         {{\"suggestions\": [{{\"title\": string, \"description\": string, \
         \"category_keys\": [string]}}]}}. \
         Titles must be at most 255 characters. \
         Only use category keys from this list: {keys}.",
        max = request.max_suggestions,
        keys = request.category_keys().join(", "),
    )
}

/// Pulls the JSON object out of a reply that may be wrapped in a fenced code
/// block or surrounded by prose.
pub fn extract_json(reply: &str) -> &str {
    let trimmed = reply.trim();
    if let Some(start) = trimmed.find("```") {
        let fenced = &trimmed[start + 3..];
        let body = fenced.find('\n').map_or(fenced, |newline| &fenced[newline + 1..]);
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

pub fn parse_reply(reply: &str) -> Result<Vec<GeneratedSuggestion>, SuggestionError> {
    serde_json::from_str::<SuggestionEnvelope>(extract_json(reply))
        .map(|envelope| envelope.suggestions)
        .map_err(|error| SuggestionError::MalformedResponse(error.to_string()))
}

#[async_trait]
impl<C: LlmClient> SuggestionModel for LlmSuggestionModel<C> {
    async fn generate(
        &self,
        request: &SuggestionRequest,
    ) -> Result<Vec<GeneratedSuggestion>, SuggestionError> {
        let reply = self
            .client
            .complete(&build_prompt(request))
            .await
            .map_err(|error| SuggestionError::Upstream(format!("{error:#}")))?;

        let mut suggestions = parse_reply(&reply)?;
        if suggestions.len() > request.max_suggestions {
            warn!(
                event_name = "suggestions.model.truncated",
                returned = suggestions.len(),
                max = request.max_suggestions,
                "model returned more suggestions than requested"
            );
            suggestions.truncate(request.max_suggestions);
        }
        Ok(suggestions)
    }
}
