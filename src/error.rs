use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

use crate::model::{Platform, Target};

/// Errors raised while driving a browser page
#[derive(Error, Debug)]
pub enum BrowserError {
    /// The browser process could not be started or connected to
    #[error("Failed to open browser: {0}")]
    Launch(String),

    /// Loading a page failed
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// A bounded wait elapsed before the page reached the expected state
    #[error("Timed out after {}s waiting for {what}", .timeout.as_secs())]
    Timeout { what: String, timeout: Duration },

    /// An element the caller relies on is not on the page
    #[error("Element not found: {0}")]
    ElementMissing(String),

    /// The connection to the browser went away (crash or closed process)
    #[error("Browser connection lost: {0}")]
    Disconnected(String),

    /// Any other DevTools failure
    #[error("Browser command failed: {0}")]
    Command(String),
}

impl BrowserError {
    /// Map a DevTools failure message onto the error kinds callers distinguish.
    pub(crate) fn from_devtools(message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("connection is closed")
            || lower.contains("connection closed")
            || lower.contains("browser has closed")
        {
            BrowserError::Disconnected(message)
        } else if lower.contains("no element found") || lower.contains("nosuchelement") {
            BrowserError::ElementMissing(message)
        } else {
            BrowserError::Command(message)
        }
    }
}

/// Errors produced by the caption extractor
#[derive(Error, Debug)]
pub enum ExtractError {
    /// No browser session could be opened
    #[error("Failed to open browser: {0}")]
    BrowserUnavailable(#[source] BrowserError),

    /// The post could not be loaded or read
    #[error("Failed to load post: {0}")]
    Navigation(#[source] BrowserError),

    /// The page loaded but no caption matched the platform rules
    #[error("No caption found on {platform} post")]
    CaptionNotFound { platform: Platform },
}

/// Errors produced by an AI session exchange
#[derive(Error, Debug)]
pub enum AiError {
    /// The exchange did not finish within its time bound
    #[error("AI exchange timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The chat interface was not ready to accept a prompt
    #[error("Chat interface unavailable: {0}")]
    Unavailable(String),

    /// HTTP failure talking to a model API
    #[error("Model API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The model API answered with an unusable response
    #[error("Model API error: {0}")]
    Api(String),

    /// The session itself is gone (browser crashed, connection closed)
    #[error("AI session lost: {0}")]
    SessionLost(String),

    /// Prompts were sent before the conversation was primed
    #[error("AI session is not initialized")]
    NotInitialized,

    /// The backend could not be built from configuration
    #[error("AI backend configuration error: {0}")]
    Config(String),
}

impl AiError {
    /// Session-level failures abort assembly; everything else only loses one fragment.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            AiError::SessionLost(_) | AiError::NotInitialized | AiError::Config(_)
        )
    }
}

impl From<BrowserError> for AiError {
    fn from(error: BrowserError) -> Self {
        match error {
            BrowserError::Timeout { timeout, .. } => AiError::Timeout(timeout),
            BrowserError::Disconnected(message) => AiError::SessionLost(message),
            BrowserError::Launch(message) => AiError::SessionLost(message),
            other => AiError::Unavailable(other.to_string()),
        }
    }
}

/// Errors produced while publishing to a recipe manager
#[derive(Error, Debug)]
pub enum PublishError {
    /// No base URL / token configured for the target
    #[error("{0} is not configured")]
    NotConfigured(Target),

    /// The recipe manager could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// The recipe manager did not answer in time
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The recipe manager rejected the request
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// Anything else (bad response body, unreadable thumbnail, ...)
    #[error("Publish error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for PublishError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            PublishError::Timeout(error.to_string())
        } else if error.is_connect() {
            PublishError::Connection(error.to_string())
        } else if let Some(status) = error.status() {
            PublishError::Http {
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else {
            PublishError::Other(error.to_string())
        }
    }
}

/// Errors produced by job stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    Duplicate(String),

    #[error("Illegal job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Progress may not decrease (from {from} to {to})")]
    ProgressRegression { from: u8, to: u8 },

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt job record: {0}")]
    Corrupt(String),

    #[error("Job store lock poisoned")]
    LockPoisoned,
}

/// Errors that end a job
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid {platform} URL format")]
    InvalidUrl { platform: Platform },

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Recipe assembly failed: {0}")]
    Assembly(#[from] AiError),

    #[error("Failed to submit recipe to {}: {source}", .target.display_name())]
    Publish {
        target: Target,
        #[source]
        source: PublishError,
    },

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),
}

/// Render an error followed by every error in its source chain, one per line.
pub fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str("\ncaused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
