use std::sync::Arc;

use crate::browser::BrowserLauncher;
use crate::config::AiConfig;
use crate::error::AiError;
use crate::providers::{ChatBackend, DuckAiBackend, OpenAiBackend};

/// Creates one fresh backend per job, so conversations are never shared.
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn ChatBackend>, AiError>;
}

/// Backend factory driven by the `ai` configuration section.
pub struct ConfiguredBackendFactory {
    config: AiConfig,
    launcher: Arc<dyn BrowserLauncher>,
}

impl ConfiguredBackendFactory {
    pub fn new(config: AiConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { config, launcher }
    }
}

impl BackendFactory for ConfiguredBackendFactory {
    fn create(&self) -> Result<Box<dyn ChatBackend>, AiError> {
        match self.config.backend.as_str() {
            "duck_ai" => Ok(Box::new(DuckAiBackend::new(
                Arc::clone(&self.launcher),
                self.config.chat_url.clone(),
            ))),
            "openai" => Ok(Box::new(OpenAiBackend::new(&self.config)?)),
            other => Err(AiError::Config(format!(
                "Unknown AI backend: {} (available: {})",
                other,
                available_backends().join(", ")
            ))),
        }
    }
}

/// List all available backend names
pub fn available_backends() -> Vec<&'static str> {
    vec!["duck_ai", "openai"]
}
