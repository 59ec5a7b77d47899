#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use social_recipe_import::config::ApiConfig;
use social_recipe_import::error::{AiError, ExtractError, StoreError};
use social_recipe_import::extractors::CaptionSource;
use social_recipe_import::jobs::{Job, JobStore, JobUpdate, MemoryJobStore, Pipeline};
use social_recipe_import::pipelines::RecipeAssembler;
use social_recipe_import::providers::{BackendFactory, ChatBackend, Reply, Timeouts};
use social_recipe_import::publisher::Publisher;
use social_recipe_import::session::ConversationContext;
use social_recipe_import::{Extraction, Platform};

pub fn fenced(value: Value) -> String {
    format!("Here you go:\n```json\n{value}\n```")
}

/// Answers each prompt with the first rule whose needle it contains.
#[derive(Clone, Default)]
pub struct Rules {
    rules: Vec<(String, String)>,
    pub prompts: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<AtomicUsize>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, answer: impl Into<String>) -> Self {
        self.rules.push((needle.to_string(), answer.into()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn answer(&self, prompt: &str) -> String {
        self.rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, answer)| answer.clone())
            .unwrap_or_else(|| "I am not sure about that.".to_string())
    }
}

pub struct RuleBackend {
    rules: Rules,
    open: AtomicBool,
}

#[async_trait]
impl ChatBackend for RuleBackend {
    fn name(&self) -> &str {
        "rules"
    }

    async fn open(
        &mut self,
        _context: &ConversationContext,
        _timeouts: &Timeouts,
    ) -> Result<(), AiError> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn exchange(
        &mut self,
        context: &ConversationContext,
        _timeouts: &Timeouts,
    ) -> Result<Reply, AiError> {
        let prompt = context
            .last()
            .map(|turn| turn.text.clone())
            .unwrap_or_default();
        self.rules.prompts.lock().unwrap().push(prompt.clone());
        Ok(Reply::from_markdown(self.rules.answer(&prompt)))
    }

    async fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.rules.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl BackendFactory for Rules {
    fn create(&self) -> Result<Box<dyn ChatBackend>, AiError> {
        Ok(Box::new(RuleBackend {
            rules: self.clone(),
            open: AtomicBool::new(false),
        }))
    }
}

/// Caption source returning a fixed caption, counting how often it is asked.
#[derive(Default)]
pub struct FakeCaptions {
    pub caption: Option<String>,
    pub thumbnail: Option<PathBuf>,
    pub calls: AtomicUsize,
}

impl FakeCaptions {
    pub fn with_caption(caption: &str) -> Self {
        Self {
            caption: Some(caption.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptionSource for FakeCaptions {
    async fn extract(&self, _url: &str, platform: Platform) -> Result<Extraction, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.caption {
            Some(caption) => Ok(Extraction {
                caption: caption.clone(),
                thumbnail: self.thumbnail.clone(),
            }),
            None => Err(ExtractError::CaptionNotFound { platform }),
        }
    }
}

/// Memory store that keeps a snapshot of the job after every successful update.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryJobStore,
    pub history: Mutex<Vec<Job>>,
}

impl RecordingStore {
    pub fn history(&self) -> Vec<Job> {
        self.history.lock().unwrap().clone()
    }
}

impl JobStore for RecordingStore {
    fn insert(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.insert(job)
    }

    fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        self.inner.get(id)
    }

    fn update(&self, id: &str, update: &JobUpdate) -> Result<Job, StoreError> {
        let job = self.inner.update(id, update)?;
        self.history.lock().unwrap().push(job.clone());
        Ok(job)
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.inner.delete(id)
    }

    fn list(&self) -> Result<Vec<Job>, StoreError> {
        self.inner.list()
    }
}

pub fn api(base_url: &str) -> ApiConfig {
    ApiConfig {
        base_url: base_url.to_string(),
        token: "test-token".to_string(),
        group: None,
    }
}

/// Pipeline publishing both targets to `base_url`.
pub fn pipeline(base_url: &str, captions: Arc<FakeCaptions>, rules: &Rules) -> Pipeline {
    let publisher = Publisher::new(
        Some(api(base_url)),
        Some(api(base_url)),
        Duration::from_secs(5),
    )
    .unwrap();
    Pipeline {
        captions,
        assembler: Arc::new(RecipeAssembler::new(
            Arc::new(rules.clone()),
            "en",
            Timeouts::default(),
        )),
        publisher: Arc::new(publisher),
    }
}
