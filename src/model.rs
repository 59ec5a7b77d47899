use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Social network a post is scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Tiktok,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        }
    }

    fn domain(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram.com",
            Platform::Tiktok => "tiktok.com",
        }
    }

    /// Whether `url` is an http(s) URL hosted on this platform's domain or one of its
    /// sub-domains (`www.`, `vm.`, ...).
    pub fn matches_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain = self.domain();
        host == domain || host.ends_with(&format!(".{domain}"))
    }

    /// Guess the platform from the URL host.
    pub fn detect(url: &str) -> Option<Self> {
        [Platform::Instagram, Platform::Tiktok]
            .into_iter()
            .find(|platform| platform.matches_url(url))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instagram" | "i" => Ok(Platform::Instagram),
            "tiktok" | "t" => Ok(Platform::Tiktok),
            other => Err(format!("Unknown platform: {other}")),
        }
    }
}

/// Recipe manager a finished document is published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Tandoor,
    Mealie,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Tandoor => "tandoor",
            Target::Mealie => "mealie",
        }
    }

    /// Human readable name used in progress messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Target::Tandoor => "Tandoor",
            Target::Mealie => "Mealie",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tandoor" => Ok(Target::Tandoor),
            "mealie" => Ok(Target::Mealie),
            other => Err(format!("Unknown target: {other}")),
        }
    }
}

/// What the caption extractor pulled out of a post.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Caption text of the post
    pub caption: String,
    /// Local image file captured from the post, if any
    pub thumbnail: Option<PathBuf>,
}

/// Recipe document for one target schema, built up from AI fragments.
///
/// Fragments are merged by key union; a key present in a later fragment replaces the
/// earlier value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipeDocument(Map<String, Value>);

impl RecipeDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, fragment: Map<String, Value>) {
        for (key, value) in fragment {
            self.0.insert(key, value);
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for RecipeDocument {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
