use log::debug;
use scraper::{Html, Selector};

use super::{clean_caption, CaptionRules};

/// Instagram posts carry the caption in the page heading, or quoted inside the
/// description meta tag ("12 likes, 3 comments - chef on May 1: \"caption\"").
pub struct InstagramRules;

/// Login / cookie overlay covering the post.
const OVERLAYS: &[&str] = &["div.xzkaem6"];

impl InstagramRules {
    fn from_heading(&self, document: &Html) -> Option<String> {
        let selector = Selector::parse("h1").ok()?;
        document
            .select(&selector)
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .find_map(|text| clean_caption(&text))
    }

    fn from_meta_description(&self, document: &Html) -> Option<String> {
        let selector = Selector::parse("meta[name='description']").ok()?;
        let content = document.select(&selector).next()?.value().attr("content")?;
        debug!(
            "Found meta description: {}...",
            content.chars().take(50).collect::<String>()
        );
        quoted(content).and_then(clean_caption)
    }
}

impl CaptionRules for InstagramRules {
    fn overlays(&self) -> &'static [&'static str] {
        OVERLAYS
    }

    fn caption(&self, document: &Html) -> Option<String> {
        self.from_heading(document)
            .or_else(|| self.from_meta_description(document))
    }
}

/// Text between the first and the last double quote.
fn quoted(content: &str) -> Option<&str> {
    let start = content.find('"')?;
    let end = content.rfind('"')?;
    (end > start + 1).then(|| &content[start + 1..end])
}
