//! AI session: one conversation, primed with a caption, that turns JSON skeletons into
//! filled fragments.

use std::fmt;
use std::sync::LazyLock;

use log::{debug, info, warn};
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::AiError;
use crate::providers::{
    build_prompt, seed_prompt, ChatBackend, Reply, Timeouts, STEP_COUNT_PROMPT,
};

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Ordered turns of one conversation, owned by exactly one [`AiSession`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    turns: Vec<Turn>,
}

impl ConversationContext {
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn pop(&mut self) -> Option<Turn> {
        self.turns.pop()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Which part of a recipe a prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Name,
    /// Descriptive metadata: author, description, yield, times
    Info,
    Ingredients,
    Instructions,
    Nutrition,
    Servings,
    /// One recipe step, numbered from 1
    Step(u32),
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptMode::Name => f.write_str("name"),
            PromptMode::Info => f.write_str("info"),
            PromptMode::Ingredients => f.write_str("ingredients"),
            PromptMode::Instructions => f.write_str("instructions"),
            PromptMode::Nutrition => f.write_str("nutrition"),
            PromptMode::Servings => f.write_str("servings"),
            PromptMode::Step(n) => write!(f, "step {n}"),
        }
    }
}

/// A JSON skeleton to fill and the mode steering how it is filled.
#[derive(Debug, Clone, Copy)]
pub struct PromptSpec<'a> {
    pub mode: PromptMode,
    pub skeleton: &'a Value,
}

impl<'a> PromptSpec<'a> {
    pub fn new(mode: PromptMode, skeleton: &'a Value) -> Self {
        Self { mode, skeleton }
    }
}

/// A conversation with one backend for the duration of one job.
pub struct AiSession {
    backend: Box<dyn ChatBackend>,
    context: ConversationContext,
    language: String,
    timeouts: Timeouts,
    initialized: bool,
}

impl AiSession {
    pub fn new(
        backend: Box<dyn ChatBackend>,
        language: impl Into<String>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            backend,
            context: ConversationContext::default(),
            language: language.into(),
            timeouts,
            initialized: false,
        }
    }

    /// Prime the conversation with `caption`. Returns whether the backend accepted it.
    pub async fn initialize(&mut self, caption: &str) -> bool {
        info!("Initializing {} chat with recipe context...", self.backend.name());
        self.context = ConversationContext::default();
        self.context.push(Turn::system(seed_prompt(caption)));

        let bound = self.timeouts.total();
        let opening = self.backend.open(&self.context, &self.timeouts);
        let opened = match tokio::time::timeout(bound, opening).await {
            Ok(result) => result,
            Err(_) => Err(AiError::Timeout(bound)),
        };

        match opened {
            Ok(()) => {
                self.initialized = true;
                true
            }
            Err(e) => {
                warn!("Failed to initialize chat: {}", e);
                false
            }
        }
    }

    /// Fill one skeleton. `Ok(None)` means the fragment is missing; only session-level
    /// failures are returned as errors.
    pub async fn ask(
        &mut self,
        spec: &PromptSpec<'_>,
    ) -> Result<Option<Map<String, Value>>, AiError> {
        let prompt = build_prompt(&self.language, &spec.mode, spec.skeleton);
        let Some(reply) = self.exchange(prompt).await? else {
            warn!("No valid response for {} data", spec.mode);
            return Ok(None);
        };

        let fragment = parse_fragment(&reply);
        match &fragment {
            Some(map) => info!("{} data processed successfully ({} keys)", spec.mode, map.len()),
            None => warn!("No valid response for {} data", spec.mode),
        }
        Ok(fragment)
    }

    /// Ask how many steps the recipe has. `Ok(None)` when the answer holds no number.
    pub async fn step_count(&mut self) -> Result<Option<u32>, AiError> {
        info!("Getting number of recipe steps...");
        let Some(reply) = self.exchange(STEP_COUNT_PROMPT.to_string()).await? else {
            return Ok(None);
        };

        let count = DIGITS
            .find(&reply.text)
            .and_then(|digits| digits.as_str().parse::<u32>().ok());
        match count {
            Some(count) => info!("Found {} steps in the recipe", count),
            None => warn!("No number found in response: {}", reply.text),
        }
        Ok(count)
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub async fn close(&mut self) {
        self.backend.close().await;
        self.initialized = false;
    }

    /// Send one prompt, recording it and its answer in the context. Call-scoped
    /// failures are logged and yield `None`; the unanswered prompt is dropped again.
    async fn exchange(&mut self, prompt: String) -> Result<Option<Reply>, AiError> {
        if !self.initialized {
            return Err(AiError::NotInitialized);
        }
        self.context.push(Turn::user(prompt));

        let bound = self.timeouts.total();
        let exchange = self.backend.exchange(&self.context, &self.timeouts);
        let outcome = match tokio::time::timeout(bound, exchange).await {
            Ok(result) => result,
            Err(_) => Err(AiError::Timeout(bound)),
        };

        match outcome {
            Ok(reply) => {
                debug!("Raw reply: {}", reply.text);
                self.context.push(Turn::assistant(reply.text.clone()));
                Ok(Some(reply))
            }
            Err(e) if e.is_session_fatal() => {
                self.context.pop();
                Err(e)
            }
            Err(e) => {
                warn!("Failed to send prompt: {}", e);
                self.context.pop();
                Ok(None)
            }
        }
    }
}

/// The most recent JSON block of `reply`, if it parses to an object.
fn parse_fragment(reply: &Reply) -> Option<Map<String, Value>> {
    let Some(block) = reply.last_json_block() else {
        warn!("No JSON code block found in the response");
        return None;
    };
    match serde_json::from_str::<Value>(block) {
        Ok(Value::Object(map)) => Some(map),
        Ok(other) => {
            warn!("JSON block is not an object: {}", other);
            None
        }
        Err(e) => {
            warn!("Failed to extract JSON: {}", e);
            None
        }
    }
}
