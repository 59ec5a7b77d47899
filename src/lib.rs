pub mod browser;
pub mod config;
pub mod error;
pub mod extractors;
pub mod jobs;
pub mod model;
pub mod pipelines;
pub mod providers;
pub mod publisher;
pub mod session;

use std::sync::Arc;

use log::info;

pub use crate::config::AppConfig;
pub use crate::error::{PipelineError, PublishError, StoreError};
pub use crate::jobs::{Job, JobStatus, JobStatusView, JobStore, Orchestrator, Pipeline};
pub use crate::model::{Extraction, Platform, RecipeDocument, Target};

use crate::browser::{BrowserLauncher, ChromeLauncher};
use crate::extractors::CaptionExtractor;
use crate::pipelines::RecipeAssembler;
use crate::providers::{ConfiguredBackendFactory, Timeouts};
use crate::publisher::Publisher;

/// Wire the production stages from configuration: Chromium for captions and the chat UI,
/// the configured AI backend, and HTTP publishing to the configured recipe managers.
pub fn build_pipeline(config: &AppConfig) -> Result<Pipeline, PublishError> {
    let launcher: Arc<dyn BrowserLauncher> =
        Arc::new(ChromeLauncher::new(config.browser.clone()));
    let backends = ConfiguredBackendFactory::new(config.ai.clone(), launcher.clone());
    info!(
        "Using {:?} browser with the {} AI backend",
        config.browser.engine(), config.ai.backend
    );

    Ok(Pipeline {
        captions: Arc::new(CaptionExtractor::new(launcher, &config.browser)),
        assembler: Arc::new(RecipeAssembler::new(
            Arc::new(backends),
            config.language.clone(),
            Timeouts::from_config(&config.ai),
        )),
        publisher: Arc::new(Publisher::from_config(config)?),
    })
}

/// Orchestrator over `store` with the production pipeline.
pub fn build_orchestrator(
    config: &AppConfig,
    store: Arc<dyn JobStore>,
) -> Result<Orchestrator, PublishError> {
    Ok(Orchestrator::new(store, build_pipeline(config)?))
}
