//! Browser capability interface.
//!
//! Pipeline code talks to pages only through [`Page`], so the automation technology behind
//! it (local Chromium, a remote DevTools endpoint, a scripted fake in tests) can change
//! without touching caption extraction or the chat-UI backend.

mod chrome;

pub use chrome::ChromeLauncher;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use crate::error::BrowserError;

/// How often bounded waits re-check the page.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One page in a browser session, exclusively owned by the stage that opened it.
#[async_trait]
pub trait Page: Send + Sync {
    /// Load `url` and wait for navigation to finish.
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// Current rendered HTML of the page.
    async fn html(&self) -> Result<String, BrowserError>;

    /// Whether at least one element matches `selector`.
    async fn exists(&self, selector: &str) -> Result<bool, BrowserError>;

    /// Hide every element matching `selector`; returns whether anything was hidden.
    async fn hide(&self, selector: &str) -> Result<bool, BrowserError>;

    /// Click the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Focus the first element matching `selector`, type `text` into it and press Enter.
    async fn submit_text(&self, selector: &str, text: &str) -> Result<(), BrowserError>;

    /// PNG screenshot of the first element matching `selector`.
    async fn screenshot(&self, selector: &str) -> Result<Vec<u8>, BrowserError>;

    /// Close the page and release the browser behind it. Never fails; problems are logged.
    async fn close(&self);
}

/// Opens fresh browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Page>, BrowserError>;
}

/// Wait until an element matching `selector` is present.
pub async fn wait_for(
    page: &dyn Page,
    selector: &str,
    timeout: Duration,
) -> Result<(), BrowserError> {
    wait_until(page, selector, true, timeout).await
}

/// Wait until no element matches `selector` any more.
pub async fn wait_until_gone(
    page: &dyn Page,
    selector: &str,
    timeout: Duration,
) -> Result<(), BrowserError> {
    wait_until(page, selector, false, timeout).await
}

async fn wait_until(
    page: &dyn Page,
    selector: &str,
    present: bool,
    timeout: Duration,
) -> Result<(), BrowserError> {
    let deadline = Instant::now() + timeout;
    loop {
        if page.exists(selector).await? == present {
            return Ok(());
        }
        if Instant::now() >= deadline {
            let what = if present {
                selector.to_string()
            } else {
                format!("{selector} to disappear")
            };
            return Err(BrowserError::Timeout { what, timeout });
        }
        sleep(POLL_INTERVAL).await;
    }
}
