use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use serde_json::json;
use uuid::Uuid;

use super::{Job, JobStatus, JobStatusView, JobStore, JobUpdate};
use crate::error::{error_chain, PipelineError, StoreError};
use crate::extractors::CaptionSource;
use crate::model::{Extraction, Platform, Target};
use crate::pipelines::RecipeAssembler;
use crate::publisher::{Published, Publisher};

const SUCCESS_MESSAGE: &str = "Recipe successfully scraped and uploaded!";

/// The three stages a job runs through, in order.
#[derive(Clone)]
pub struct Pipeline {
    pub captions: Arc<dyn CaptionSource>,
    pub assembler: Arc<RecipeAssembler>,
    pub publisher: Arc<Publisher>,
}

/// Owns the job lifecycle: submission, stage sequencing, progress and the terminal state.
///
/// Each job is run end to end by a single task; stages never run concurrently within a job.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    pipeline: Pipeline,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn JobStore>, pipeline: Pipeline) -> Self {
        Self { store, pipeline }
    }

    /// Record a pending job without running it.
    pub fn create(
        &self,
        url: &str,
        platform: Platform,
        target: Target,
    ) -> Result<Job, StoreError> {
        let job = Job::new(
            Uuid::new_v4().to_string(),
            url.trim(),
            platform,
            target,
            Utc::now(),
        );
        self.store.insert(&job)?;
        info!("Created job {} for {} ({} -> {})", job.id, job.url, platform, target);
        Ok(job)
    }

    /// Create a job and run it on its own task. Returns as soon as the job is recorded.
    pub fn submit(
        &self,
        url: &str,
        platform: Platform,
        target: Target,
    ) -> Result<String, StoreError> {
        let job = self.create(url, platform, target)?;
        let orchestrator = self.clone();
        let id = job.id.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run(&id).await {
                error!("Job {} could not be recorded: {}", id, e);
            }
        });
        Ok(job.id)
    }

    /// Run a pending job to its terminal state and return the final record.
    ///
    /// Stage failures end up in the job record; only store failures are returned as errors.
    pub async fn run(&self, id: &str) -> Result<Job, StoreError> {
        let job = self
            .store
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if job.status != JobStatus::Pending {
            return Err(StoreError::InvalidTransition {
                from: job.status.to_string(),
                to: JobStatus::Processing.to_string(),
            });
        }

        let update = match self.process(&job).await {
            Ok(published) => {
                info!("Job {} completed: {}", id, published.remote_url);
                let result = json!({
                    "target": job.target,
                    "recipe_id": published.remote_id,
                    "url": published.remote_url,
                });
                let result_url = Some(published.remote_url);
                JobUpdate::completed(SUCCESS_MESSAGE, result.to_string(), result_url)
            }
            Err(e @ PipelineError::InvalidUrl { .. }) => {
                warn!("Job {} rejected: {}", id, e);
                JobUpdate::failed(Some(0), e.to_string(), error_chain(&e))
            }
            Err(e) => {
                error!("Job {} failed: {}", id, e);
                JobUpdate::failed(None, format!("Error: {e}"), error_chain(&e))
            }
        };
        self.store.update(id, &update)
    }

    async fn process(&self, job: &Job) -> Result<Published, PipelineError> {
        if !job.platform.matches_url(&job.url) {
            return Err(PipelineError::InvalidUrl {
                platform: job.platform,
            });
        }

        self.progress(job, 10, "Starting job...")?;
        self.progress(job, 20, "Scraping content...")?;
        let extraction = self
            .pipeline
            .captions
            .extract(&job.url, job.platform)
            .await?;

        let stage = format!("Processing for {}...", job.target.display_name());
        self.progress(job, 40, &stage)?;
        let published = self.assemble_and_publish(job, &extraction).await;

        if let Some(path) = &extraction.thumbnail {
            remove_thumbnail(path).await;
        }
        published
    }

    async fn assemble_and_publish(
        &self,
        job: &Job,
        extraction: &Extraction,
    ) -> Result<Published, PipelineError> {
        let document = self
            .pipeline
            .assembler
            .assemble(extraction, job.target, &job.url)
            .await?;

        self.progress(job, 80, "Finishing up...")?;
        self.pipeline
            .publisher
            .publish(&document, job.target, extraction.thumbnail.as_deref())
            .await
            .map_err(|source| PipelineError::Publish {
                target: job.target,
                source,
            })
    }

    fn progress(&self, job: &Job, progress: u8, message: &str) -> Result<(), StoreError> {
        info!("Job {}: {}% {}", job.id, progress, message);
        self.store
            .update(&job.id, &JobUpdate::processing(progress, message))?;
        Ok(())
    }

    pub fn status(&self, id: &str) -> Result<Option<JobStatusView>, StoreError> {
        Ok(self.store.get(id)?.as_ref().map(JobStatusView::from))
    }

    pub fn job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        self.store.get(id)
    }

    /// All jobs, newest first.
    pub fn jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.store.list()
    }

    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.store.delete(id)
    }
}

async fn remove_thumbnail(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove thumbnail {}: {}", path.display(), e);
    }
}
