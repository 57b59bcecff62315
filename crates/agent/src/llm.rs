use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use saleslens_core::config::{LlmConfig, LlmProvider};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You are a marketing assistant for small local businesses. \
     Reply with a single JSON object and nothing else.";
const MAX_OUTPUT_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.7;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Box<T> {
    async fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt).await
    }
}

/// Picks the client for the configured provider.
pub fn build_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.provider {
        LlmProvider::OpenAi => {
            let key = config.api_key.clone().context("llm.api_key is required for openai")?;
            let base = config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
            Ok(Box::new(OpenAiCompatibleClient::new(base, &config.model, Some(key), timeout)?))
        }
        LlmProvider::Ollama => {
            let base = config.base_url.as_deref().context("llm.base_url is required for ollama")?;
            Ok(Box::new(OpenAiCompatibleClient::new(base, &config.model, None, timeout)?))
        }
        LlmProvider::Anthropic => {
            let key = config.api_key.clone().context("llm.api_key is required for anthropic")?;
            let base = config.base_url.as_deref().unwrap_or(ANTHROPIC_BASE_URL);
            Ok(Box::new(AnthropicClient::new(base, &config.model, key, timeout)?))
        }
    }
}

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder().timeout(timeout).build().context("failed to build llm http client")
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for OpenAI and for servers exposing the same API
/// (Ollama serves it under `/v1`).
pub struct OpenAiCompatibleClient {
    http: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: prompt },
            ],
            temperature: TEMPERATURE,
        };
        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.context("chat completion request failed")?;
        let status = response.status();
        debug!(
            event_name = "llm.request.completed",
            provider = "openai_compatible",
            status = status.as_u16(),
            "llm responded"
        );
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("chat completion returned {status}: {text}");
        }

        let parsed: ChatCompletionResponse =
            response.json().await.context("chat completion body was not valid json")?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion contained no message content"))
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'static str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicClient {
    http: Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
}

impl AnthropicClient {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_OUTPUT_TOKENS,
            system: SYSTEM_PROMPT,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: TEMPERATURE,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("messages request failed")?;
        let status = response.status();
        debug!(
            event_name = "llm.request.completed",
            provider = "anthropic",
            status = status.as_u16(),
            "llm responded"
        );
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("messages api returned {status}: {text}");
        }

        let parsed: MessagesResponse =
            response.json().await.context("messages body was not valid json")?;
        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            bail!("messages response contained no text blocks");
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use secrecy::SecretString;
    use serde_json::json;

    use saleslens_core::config::{LlmConfig, LlmProvider};

    use super::{build_client, AnthropicClient, LlmClient, OpenAiCompatibleClient};

    #[tokio::test]
    async fn openai_client_posts_chat_completion_with_bearer() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .body_includes("\"model\":\"gpt-4o-mini\"")
                    .body_includes("weekend brunch");
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "{\"suggestions\": []}"}}]
                }));
            })
            .await;

        let client = OpenAiCompatibleClient::new(
            &server.base_url(),
            "gpt-4o-mini",
            Some(SecretString::from("sk-test".to_string())),
            Duration::from_secs(5),
        )
        .expect("client");
        let reply = client.complete("ideas for weekend brunch").await.expect("completion");

        mock.assert_async().await;
        assert_eq!(reply, "{\"suggestions\": []}");
    }

    #[tokio::test]
    async fn anthropic_client_sends_key_and_version_and_joins_text_blocks() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/messages")
                    .header("x-api-key", "ak-test")
                    .header("anthropic-version", "2023-06-01");
                then.status(200).json_body(json!({
                    "content": [
                        {"type": "text", "text": "{\"suggestions\":"},
                        {"type": "text", "text": " []}"}
                    ]
                }));
            })
            .await;

        let client = AnthropicClient::new(
            &server.base_url(),
            "claude-test",
            SecretString::from("ak-test".to_string()),
            Duration::from_secs(5),
        )
        .expect("client");
        let reply = client.complete("hello").await.expect("completion");

        mock.assert_async().await;
        assert_eq!(reply, "{\"suggestions\": []}");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(500).body("model overloaded");
            })
            .await;

        let client =
            OpenAiCompatibleClient::new(&server.base_url(), "llama3.1", None, Duration::from_secs(5))
                .expect("client");
        let error = client.complete("hello").await.expect_err("500");
        assert!(error.to_string().contains("model overloaded"));
    }

    #[test]
    fn hosted_providers_require_an_api_key() {
        let config = LlmConfig {
            provider: LlmProvider::Anthropic,
            api_key: None,
            base_url: None,
            model: "claude-test".to_string(),
            timeout_secs: 10,
        };
        assert!(build_client(&config).is_err());

        let ollama = LlmConfig {
            provider: LlmProvider::Ollama,
            base_url: Some("http://localhost:11434".to_string()),
            ..config
        };
        assert!(build_client(&ollama).is_ok());
    }
}
