use config::{Config, ConfigError, Environment, File};
use log::warn;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::model::Target;

/// Main application configuration structure
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Language code the AI should answer in (e.g. "en", "de")
    pub language: String,
    /// SQLite file used by the command line front end
    pub database_path: PathBuf,
    /// Request timeout for recipe manager calls, in seconds
    pub publish_timeout: u64,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// AI backend settings
    pub ai: AiConfig,
    /// Tandoor API endpoint
    pub tandoor: Option<ApiConfig>,
    /// Mealie API endpoint
    pub mealie: Option<ApiConfig>,
}

/// Which browser the automation drives
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    /// Local Chromium launched by the process
    #[default]
    Chrome,
    /// Chromium inside a container: always headless, no sandbox
    Docker,
    /// Already running Chromium reached through its DevTools websocket
    Remote,
}

/// Configuration for browser automation
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserConfig {
    /// Unset means local Chromium
    pub engine: Option<BrowserEngine>,
    /// Run without a visible window (ignored for docker, which is always headless).
    /// Unset means headless.
    pub headless: Option<bool>,
    /// Explicit Chromium executable
    pub chrome_path: Option<PathBuf>,
    /// DevTools websocket URL, required for the remote engine
    pub remote_url: Option<String>,
    /// Capture post thumbnails; unset means "every engine except docker"
    pub capture_thumbnails: Option<bool>,
    /// Directory thumbnails are written to
    pub thumbnail_dir: PathBuf,
    /// Page load timeout in seconds
    pub navigation_timeout: u64,
}

/// Configuration for the AI backend
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AiConfig {
    /// Backend name ("duck_ai" or "openai")
    pub backend: String,
    /// Chat page driven by the duck_ai backend
    pub chat_url: String,
    /// Model identifier for API backends
    pub model: String,
    /// API key for API backends (can also be set via OPENAI_API_KEY)
    pub api_key: Option<String>,
    /// Base URL for OpenAI-compatible endpoints
    pub base_url: String,
    /// Temperature for generation (0.0-1.0)
    pub temperature: f32,
    /// Seconds to wait for the prompt box to become usable
    pub readiness_timeout: u64,
    /// Seconds to wait for a full answer
    pub generation_timeout: u64,
}

/// Base URL and credentials of a recipe manager
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: String,
    /// Mealie group slug used in public recipe links
    #[serde(default)]
    pub group: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            database_path: PathBuf::from("jobs.db"),
            publish_timeout: 30,
            browser: BrowserConfig::default(),
            ai: AiConfig::default(),
            tandoor: None,
            mealie: None,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: None,
            headless: None,
            chrome_path: None,
            remote_url: None,
            capture_thumbnails: None,
            thumbnail_dir: PathBuf::from("thumbnails"),
            navigation_timeout: 30,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            chat_url: "https://duck.ai/".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            temperature: 0.2,
            readiness_timeout: 10,
            generation_timeout: 60,
        }
    }
}

// Default value functions
fn default_language() -> String {
    "en".to_string()
}

fn default_backend() -> String {
    "duck_ai".to_string()
}

impl BrowserConfig {
    pub fn engine(&self) -> BrowserEngine {
        self.engine.unwrap_or_default()
    }

    pub fn headless(&self) -> bool {
        self.headless.unwrap_or(true)
    }

    pub fn thumbnails_enabled(&self) -> bool {
        self.capture_thumbnails
            .unwrap_or(self.engine() != BrowserEngine::Docker)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout)
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables with RECIPE_IMPORT__ prefix
    /// 2. config.toml file in current directory
    /// 3. Legacy flat variables (BASE_URL_TANDOOR, TOKEN_TANDOOR, LANGUAGE_CODE, ...)
    /// 4. Default values
    ///
    /// Environment variable format: RECIPE_IMPORT__TANDOOR__TOKEN
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = load_config()?;
        config.apply_legacy_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// API endpoint configured for `target`, if any.
    pub fn api(&self, target: Target) -> Option<&ApiConfig> {
        match target {
            Target::Tandoor => self.tandoor.as_ref(),
            Target::Mealie => self.mealie.as_ref(),
        }
    }

    /// Fill values that are still at their default from the flat variable names the
    /// original deployment used.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.language == default_language() {
            if let Some(language) = lookup("LANGUAGE_CODE").filter(|l| !l.trim().is_empty()) {
                self.language = language.trim().to_string();
            }
        }

        if self.tandoor.is_none() {
            self.tandoor = legacy_api(&lookup, "TANDOOR");
        }
        if self.mealie.is_none() {
            self.mealie = legacy_api(&lookup, "MEALIE");
        }

        if self.browser.engine.is_none() {
            if let Some(browser) = lookup("BROWSER") {
                self.browser.engine = match browser.trim().to_lowercase().as_str() {
                    "docker" => Some(BrowserEngine::Docker),
                    "remote" => Some(BrowserEngine::Remote),
                    "" | "chrome" | "chromium" => Some(BrowserEngine::Chrome),
                    other => {
                        warn!("Browser '{}' is not supported, falling back to Chromium", other);
                        None
                    }
                };
            }
        }
        if self.browser.headless.is_none() {
            if let Some(headless) = lookup("HEADLESS") {
                self.browser.headless = Some(headless.trim().eq_ignore_ascii_case("true"));
            }
        }

        if self.ai.api_key.is_none() {
            self.ai.api_key = lookup("OPENAI_API_KEY");
        }
    }
}

fn legacy_api<F>(lookup: &F, name: &str) -> Option<ApiConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let base_url = lookup(&format!("BASE_URL_{name}"))?;
    let token = lookup(&format!("TOKEN_{name}")).unwrap_or_default();
    Some(ApiConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        token,
        group: None,
    })
}

/// Load configuration from file and environment variables
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        // Optional config file (can be missing)
        .add_source(File::with_name("config").required(false))
        // Use double underscore for nested: RECIPE_IMPORT__BROWSER__HEADLESS
        .add_source(
            Environment::with_prefix("RECIPE_IMPORT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}
