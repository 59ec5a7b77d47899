use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::AiConfig;
use crate::error::AiError;
use crate::providers::{ChatBackend, Reply, Timeouts};
use crate::session::ConversationContext;

/// OpenAI-compatible chat-completions backend.
///
/// The API is stateless, so every exchange replays the whole conversation.
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAiBackend {
    /// Create a new backend from configuration
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AiError::Config("OPENAI_API_KEY not found in config or environment".into())
            })?;

        Ok(OpenAiBackend {
            client: Client::new(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    #[doc(hidden)]
    pub fn with_base_url(api_key: String, base_url: String, model: String) -> Self {
        OpenAiBackend {
            client: Client::new(),
            api_key,
            base_url,
            model,
            temperature: 0.2,
        }
    }

    fn messages(context: &ConversationContext) -> Vec<Value> {
        context
            .turns()
            .iter()
            .map(|turn| json!({"role": turn.role.as_str(), "content": turn.text}))
            .collect()
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn open(
        &mut self,
        _context: &ConversationContext,
        _timeouts: &Timeouts,
    ) -> Result<(), AiError> {
        // Seed turns are replayed with every request
        Ok(())
    }

    async fn exchange(
        &mut self,
        context: &ConversationContext,
        timeouts: &Timeouts,
    ) -> Result<Reply, AiError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(timeouts.readiness + timeouts.generation)
            .json(&json!({
                "model": self.model,
                "messages": Self::messages(context),
                "temperature": self.temperature,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let response_body: Value = response.json().await?;
        debug!("{:?}", response_body);
        let content = response_body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AiError::Api("Failed to extract content from response".into()))?;

        Ok(Reply::from_markdown(content))
    }

    async fn close(&mut self) {}
}
