use scraper::{Html, Selector};

use super::{clean_caption, CaptionRules};

/// TikTok renders the video description as the alt text of the poster image.
pub struct TiktokRules;

impl CaptionRules for TiktokRules {
    fn overlays(&self) -> &'static [&'static str] {
        &[]
    }

    fn caption(&self, document: &Html) -> Option<String> {
        let selector = Selector::parse("picture img[alt]").ok()?;
        document
            .select(&selector)
            .filter_map(|img| img.value().attr("alt"))
            .find_map(clean_caption)
    }
}
