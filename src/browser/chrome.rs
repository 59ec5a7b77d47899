use std::ffi::OsStr;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use log::{debug, info, warn};
use serde_json::Value;

use super::{BrowserLauncher, Page};
use crate::config::{BrowserConfig, BrowserEngine};
use crate::error::BrowserError;

/// Keep the DevTools connection alive across long generation waits.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Launches (or connects to) Chromium through the DevTools protocol.
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn launch(config: &BrowserConfig) -> Result<Browser, BrowserError> {
        if config.engine() == BrowserEngine::Remote {
            let url = config.remote_url.clone().ok_or_else(|| {
                BrowserError::Launch("browser.remote_url is required for the remote engine".into())
            })?;
            info!("Connecting to remote browser at {}", url);
            return Browser::connect(url).map_err(|e| BrowserError::Launch(text(e)));
        }

        let docker = config.engine() == BrowserEngine::Docker;
        let mut args: Vec<&OsStr> = Vec::new();
        if docker {
            args.push(OsStr::new("--no-sandbox"));
            args.push(OsStr::new("--disable-dev-shm-usage"));
        }

        let mut builder = LaunchOptions::default_builder();
        builder
            .headless(docker || config.headless())
            .sandbox(!docker)
            .path(config.chrome_path.clone())
            .args(args)
            .idle_browser_timeout(IDLE_TIMEOUT);
        let options = builder
            .build()
            .map_err(|e| BrowserError::Launch(text(e)))?;

        info!(
            "Launching Chromium ({})",
            if docker { "docker" } else { "local" }
        );
        Browser::new(options).map_err(|e| BrowserError::Launch(text(e)))
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn open(&self) -> Result<Box<dyn Page>, BrowserError> {
        let config = self.config.clone();
        let (browser, tab) = tokio::task::spawn_blocking(move || {
            let browser = ChromeLauncher::launch(&config)?;
            let tab = browser
                .new_tab()
                .map_err(|e| BrowserError::Launch(text(e)))?;
            tab.set_default_timeout(config.navigation_timeout());
            Ok::<_, BrowserError>((browser, tab))
        })
        .await
        .map_err(|e| BrowserError::Launch(format!("browser task failed: {e}")))??;

        Ok(Box::new(ChromePage {
            browser: Mutex::new(Some(browser)),
            tab,
        }))
    }
}

/// A single Chromium tab. The browser process is released when the page is closed
/// or dropped.
struct ChromePage {
    browser: Mutex<Option<Browser>>,
    tab: Arc<Tab>,
}

impl ChromePage {
    async fn run<T, F>(&self, op: F) -> Result<T, BrowserError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, String> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || op(&tab))
            .await
            .map_err(|e| BrowserError::Command(format!("browser task failed: {e}")))?
            .map_err(BrowserError::from_devtools)
    }

    async fn eval_bool(&self, script: String) -> Result<bool, BrowserError> {
        self.run(move |tab| {
            let result = tab.evaluate(&script, false).map_err(text)?;
            Ok(matches!(result.value, Some(Value::Bool(true))))
        })
        .await
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        info!("Navigating to {}", url);
        let url = url.to_string();
        self.run(move |tab| {
            tab.navigate_to(&url)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
                .map_err(text)
        })
        .await
        .map_err(|e| match e {
            BrowserError::Command(message) => BrowserError::Navigation(message),
            other => other,
        })
    }

    async fn html(&self) -> Result<String, BrowserError> {
        self.run(|tab| tab.get_content().map_err(text)).await
    }

    async fn exists(&self, selector: &str) -> Result<bool, BrowserError> {
        self.eval_bool(format!(
            "document.querySelector({}) !== null",
            js_string(selector)
        ))
        .await
    }

    async fn hide(&self, selector: &str) -> Result<bool, BrowserError> {
        self.eval_bool(format!(
            "(() => {{ const found = document.querySelectorAll({}); \
             found.forEach(el => el.style.visibility = 'hidden'); \
             return found.length > 0; }})()",
            js_string(selector)
        ))
        .await
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        debug!("Clicking {}", selector);
        let selector = selector.to_string();
        self.run(move |tab| {
            tab.find_element(&selector)
                .and_then(|element| element.click().map(|_| ()))
                .map_err(text)
        })
        .await
    }

    async fn submit_text(&self, selector: &str, input: &str) -> Result<(), BrowserError> {
        let clear = format!(
            "(() => {{ const el = document.querySelector({}); if (el) {{ el.value = ''; }} }})()",
            js_string(selector)
        );
        let selector = selector.to_string();
        let input = input.to_string();
        self.run(move |tab| {
            let element = tab.find_element(&selector).map_err(text)?;
            tab.evaluate(&clear, false).map_err(text)?;
            element.click().map_err(text)?;
            tab.type_str(&input).map_err(text)?;
            tab.press_key("Enter").map_err(text)?;
            Ok(())
        })
        .await
    }

    async fn screenshot(&self, selector: &str) -> Result<Vec<u8>, BrowserError> {
        let selector = selector.to_string();
        self.run(move |tab| {
            tab.find_element(&selector)
                .and_then(|element| element.capture_screenshot(CaptureScreenshotFormatOption::Png))
                .map_err(text)
        })
        .await
    }

    async fn close(&self) {
        info!("Closing browser...");
        let browser = match self.browser.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let tab = Arc::clone(&self.tab);
        let closed = tokio::task::spawn_blocking(move || {
            if let Err(e) = tab.close(false) {
                debug!("Closing tab failed: {}", text(e));
            }
            // Dropping the handle terminates a browser process we launched
            drop(browser);
        })
        .await;
        if let Err(e) = closed {
            warn!("Error closing browser: {}", e);
        }
    }
}

fn text<E: Display>(error: E) -> String {
    format!("{error:#}")
}

/// Quote `value` as a JavaScript string literal.
fn js_string(value: &str) -> String {
    Value::from(value).to_string()
}
