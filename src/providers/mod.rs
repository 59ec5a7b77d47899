mod duck_ai;
mod factory;
mod open_ai;
mod prompt;

pub use duck_ai::DuckAiBackend;
pub use factory::{available_backends, BackendFactory, ConfiguredBackendFactory};
pub use open_ai::OpenAiBackend;
pub use prompt::{build_prompt, seed_prompt, FILL_JSON_PROMPT, STEP_COUNT_PROMPT};

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::config::AiConfig;
use crate::error::AiError;
use crate::session::ConversationContext;

static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)```").unwrap());

/// Time bounds for one exchange with a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Until the backend accepts a prompt
    pub readiness: Duration,
    /// Until a full answer has been produced
    pub generation: Duration,
}

impl Timeouts {
    pub fn from_config(config: &AiConfig) -> Self {
        Self {
            readiness: Duration::from_secs(config.readiness_timeout),
            generation: Duration::from_secs(config.generation_timeout),
        }
    }

    /// Upper bound on a whole exchange: readiness, then submission wait, then generation.
    pub fn total(&self) -> Duration {
        self.readiness + self.generation * 2
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            readiness: Duration::from_secs(10),
            generation: Duration::from_secs(60),
        }
    }
}

/// What a backend answered to the latest prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    /// Plain text of the answer
    pub text: String,
    /// Contents of the answer's fenced JSON blocks, in order
    pub json_blocks: Vec<String>,
}

impl Reply {
    /// Build a reply from a markdown answer, collecting its ```json fenced blocks.
    pub fn from_markdown(text: impl Into<String>) -> Self {
        let text = text.into();
        let json_blocks = JSON_BLOCK
            .captures_iter(&text)
            .map(|captures| captures[1].trim().to_string())
            .collect();
        Self { text, json_blocks }
    }

    /// The answer's last JSON block.
    pub fn last_json_block(&self) -> Option<&str> {
        self.json_blocks.last().map(String::as_str)
    }
}

/// A conversational model the AI session talks to.
///
/// The session owns the [`ConversationContext`]; backends either replay it (API
/// backends) or only forward the newest turn to a UI that keeps its own history.
#[async_trait]
pub trait ChatBackend: Send {
    /// Backend name (e.g. "duck_ai", "openai")
    fn name(&self) -> &str;

    /// Start a conversation primed with the seed turns already in `context`.
    async fn open(
        &mut self,
        context: &ConversationContext,
        timeouts: &Timeouts,
    ) -> Result<(), AiError>;

    /// Answer the last turn of `context`.
    async fn exchange(
        &mut self,
        context: &ConversationContext,
        timeouts: &Timeouts,
    ) -> Result<Reply, AiError>;

    /// Release whatever the conversation holds. Never fails; problems are logged.
    async fn close(&mut self);
}
