//! Import jobs: the persisted record, its state machine and the stores holding it.

mod memory;
mod orchestrator;
mod sqlite;

pub use memory::MemoryJobStore;
pub use orchestrator::{Orchestrator, Pipeline};
pub use sqlite::SqliteJobStore;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{Platform, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Every legal (from, to) pair. Progress updates while processing are
/// Processing -> Processing.
const TRANSITIONS: &[(JobStatus, JobStatus)] = &[
    (JobStatus::Pending, JobStatus::Processing),
    (JobStatus::Pending, JobStatus::Failed),
    (JobStatus::Processing, JobStatus::Processing),
    (JobStatus::Processing, JobStatus::Completed),
    (JobStatus::Processing, JobStatus::Failed),
];

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        TRANSITIONS.contains(&(*self, next))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("Unknown job status: {other}")),
        }
    }
}

/// One import request, from submission to its terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub url: String,
    pub platform: Platform,
    pub target: Target,
    pub status: JobStatus,
    /// 0 to 100, never decreasing
    pub progress: u8,
    pub message: String,
    /// Outcome on success, error chain on failure
    pub result: Option<String>,
    pub result_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set once, when the job reaches a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        platform: Platform,
        target: Target,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            platform,
            target,
            status: JobStatus::Pending,
            progress: 0,
            message: "Job queued".to_string(),
            result: None,
            result_url: None,
            created_at,
            completed_at: None,
        }
    }

    /// Apply `update`, rejecting illegal transitions and decreasing progress.
    pub fn apply(&mut self, update: &JobUpdate, now: DateTime<Utc>) -> Result<(), StoreError> {
        if !self.status.can_transition_to(update.status) {
            return Err(StoreError::InvalidTransition {
                from: self.status.to_string(),
                to: update.status.to_string(),
            });
        }
        if let Some(progress) = update.progress {
            let progress = progress.min(100);
            if progress < self.progress {
                return Err(StoreError::ProgressRegression {
                    from: self.progress,
                    to: progress,
                });
            }
            self.progress = progress;
        }

        self.status = update.status;
        if let Some(message) = &update.message {
            self.message = message.clone();
        }
        if let Some(result) = &update.result {
            self.result = Some(result.clone());
        }
        if let Some(result_url) = &update.result_url {
            self.result_url = Some(result_url.clone());
        }
        if self.status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}

/// Fields to change on a job; `None` leaves the current value.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub result: Option<String>,
    pub result_url: Option<String>,
}

impl JobUpdate {
    pub fn processing(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Processing,
            progress: Some(progress),
            message: Some(message.into()),
            result: None,
            result_url: None,
        }
    }

    pub fn completed(
        message: impl Into<String>,
        result: impl Into<String>,
        result_url: Option<String>,
    ) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: Some(100),
            message: Some(message.into()),
            result: Some(result.into()),
            result_url,
        }
    }

    /// Failure keeping the current progress unless `progress` is given.
    pub fn failed(
        progress: Option<u8>,
        message: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            status: JobStatus::Failed,
            progress,
            message: Some(message.into()),
            result: Some(result.into()),
            result_url: None,
        }
    }
}

/// Persistence for jobs. Implementations validate every update with [`Job::apply`]
/// and apply it atomically per record.
pub trait JobStore: Send + Sync {
    fn insert(&self, job: &Job) -> Result<(), StoreError>;

    fn get(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Apply `update` to the job and return the updated record.
    fn update(&self, id: &str, update: &JobUpdate) -> Result<Job, StoreError>;

    /// Returns whether a job was removed.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// All jobs, newest first.
    fn list(&self) -> Result<Vec<Job>, StoreError>;
}

/// What a polling client gets to see of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    /// Only present once the job completed
    pub result_url: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            result_url: if job.status == JobStatus::Completed {
                job.result_url.clone()
            } else {
                None
            },
        }
    }
}
