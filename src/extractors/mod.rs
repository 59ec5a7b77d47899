//! Caption extraction from social media posts.

mod instagram;
mod tiktok;

pub use instagram::InstagramRules;
pub use tiktok::TiktokRules;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use scraper::Html;
use uuid::Uuid;

use crate::browser::{wait_for, BrowserLauncher, Page};
use crate::config::BrowserConfig;
use crate::error::ExtractError;
use crate::model::{Extraction, Platform};

/// Elements a thumbnail can be taken from, best candidate first.
const MEDIA_SELECTORS: &[&str] = &["video", "picture img", "article img"];

/// Platform specific structural rules for reading a caption out of a rendered post.
pub trait CaptionRules: Send + Sync {
    /// Overlays that have to be hidden before the page can be read.
    fn overlays(&self) -> &'static [&'static str];

    fn caption(&self, document: &Html) -> Option<String>;
}

pub fn rules_for(platform: Platform) -> &'static dyn CaptionRules {
    match platform {
        Platform::Instagram => &InstagramRules,
        Platform::Tiktok => &TiktokRules,
    }
}

/// Anything that can turn a post URL into a caption and optional thumbnail.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    async fn extract(&self, url: &str, platform: Platform) -> Result<Extraction, ExtractError>;
}

/// Reads captions with a browser session opened for, and closed after, every call.
pub struct CaptionExtractor {
    launcher: Arc<dyn BrowserLauncher>,
    capture_thumbnails: bool,
    thumbnail_dir: PathBuf,
    element_timeout: Duration,
}

impl CaptionExtractor {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: &BrowserConfig) -> Self {
        Self {
            launcher,
            capture_thumbnails: config.thumbnails_enabled(),
            thumbnail_dir: config.thumbnail_dir.clone(),
            element_timeout: Duration::from_secs(10),
        }
    }

    async fn extract_from(
        &self,
        page: &dyn Page,
        url: &str,
        platform: Platform,
    ) -> Result<Extraction, ExtractError> {
        page.goto(url).await.map_err(ExtractError::Navigation)?;

        let rules = rules_for(platform);
        for overlay in rules.overlays() {
            self.hide_overlay(page, overlay).await;
        }

        let thumbnail = self.capture_thumbnail(page).await;

        info!("Parsing page content");
        let html = page.html().await.map_err(ExtractError::Navigation)?;
        let caption = rules.caption(&Html::parse_document(&html));

        match caption {
            Some(caption) => {
                info!(
                    "Caption found ({} chars), thumbnail: {:?}",
                    caption.chars().count(),
                    thumbnail
                );
                Ok(Extraction { caption, thumbnail })
            }
            None => {
                info!("Caption not found");
                if let Some(path) = thumbnail {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        warn!("Failed to remove thumbnail {}: {}", path.display(), e);
                    }
                }
                Err(ExtractError::CaptionNotFound { platform })
            }
        }
    }

    async fn hide_overlay(&self, page: &dyn Page, selector: &str) {
        debug!("Waiting for overlay {}", selector);
        let hidden = match wait_for(page, selector, self.element_timeout).await {
            Ok(()) => page.hide(selector).await,
            Err(e) => Err(e),
        };
        match hidden {
            Ok(true) => info!("Successfully hidden overlay {}", selector),
            Ok(false) => debug!("Overlay {} vanished before it could be hidden", selector),
            Err(e) => info!("Failed to hide overlay {}: {}", selector, e),
        }
    }

    /// Best effort: any failure yields `None`.
    async fn capture_thumbnail(&self, page: &dyn Page) -> Option<PathBuf> {
        if !self.capture_thumbnails {
            info!("Thumbnail capture disabled, skipping");
            return None;
        }

        info!("Attempting to capture thumbnail");
        let image = self.screenshot_media(page).await?;

        if let Err(e) = tokio::fs::create_dir_all(&self.thumbnail_dir).await {
            warn!(
                "Failed to create thumbnail directory {}: {}",
                self.thumbnail_dir.display(),
                e
            );
            return None;
        }
        let path = self
            .thumbnail_dir
            .join(format!("thumbnail_{}.png", Uuid::new_v4()));
        match tokio::fs::write(&path, image).await {
            Ok(()) => {
                info!("Thumbnail saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Failed to write thumbnail {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn screenshot_media(&self, page: &dyn Page) -> Option<Vec<u8>> {
        // Videos load lazily, give them the full wait; images are either there or not
        if wait_for(page, MEDIA_SELECTORS[0], self.element_timeout)
            .await
            .is_ok()
        {
            match page.screenshot(MEDIA_SELECTORS[0]).await {
                Ok(image) => return Some(image),
                Err(e) => info!("Failed to capture video thumbnail: {}", e),
            }
        }

        for selector in &MEDIA_SELECTORS[1..] {
            if !page.exists(selector).await.unwrap_or(false) {
                continue;
            }
            match page.screenshot(selector).await {
                Ok(image) => return Some(image),
                Err(e) => info!("Failed to capture {} thumbnail: {}", selector, e),
            }
        }
        info!("No media element to take a thumbnail from");
        None
    }
}

#[async_trait]
impl CaptionSource for CaptionExtractor {
    async fn extract(&self, url: &str, platform: Platform) -> Result<Extraction, ExtractError> {
        info!("Extracting caption from {} post: {}", platform, url);

        let page = self.launcher.open().await.map_err(|e| {
            warn!("Failed to open browser: {}", e);
            ExtractError::BrowserUnavailable(e)
        })?;
        let result = self.extract_from(page.as_ref(), url, platform).await;
        page.close().await;
        result
    }
}

/// Decode leftover entities and trim; empty captions count as missing.
pub(crate) fn clean_caption(raw: &str) -> Option<String> {
    let decoded = html_escape::decode_html_entities(raw);
    let trimmed = decoded.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
