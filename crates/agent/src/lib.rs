//! Text-generation side of SalesLens.
//!
//! `llm` holds the provider clients behind the [`llm::LlmClient`] trait.
//! `suggestions` turns a [`saleslens_core::suggestions::SuggestionRequest`]
//! into a prompt and parses the model's JSON reply.
//!
//! The model only drafts promotion copy. Tiers, trends and the category list
//! are computed by `saleslens-core` before the call, and every reply is
//! validated there before anything is stored.

pub mod llm;
pub mod suggestions;

pub use llm::{build_client, AnthropicClient, LlmClient, OpenAiCompatibleClient};
pub use suggestions::LlmSuggestionModel;
