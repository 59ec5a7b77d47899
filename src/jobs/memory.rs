use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::Utc;

use super::{Job, JobStore, JobUpdate};
use crate::error::StoreError;

/// Jobs kept in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryJobStore {
    // insertion sequence breaks ties between equal creation times
    jobs: RwLock<HashMap<String, (u64, Job)>>,
    next: AtomicU64,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::LockPoisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id.clone()));
        }
        let seq = self.next.fetch_add(1, Ordering::SeqCst);
        jobs.insert(job.id.clone(), (seq, job.clone()));
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(jobs.get(id).map(|(_, job)| job.clone()))
    }

    fn update(&self, id: &str, update: &JobUpdate) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::LockPoisoned)?;
        let (_, job) = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut updated = job.clone();
        updated.apply(update, Utc::now())?;
        *job = updated.clone();
        Ok(updated)
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(jobs.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut entries: Vec<_> = jobs.values().cloned().collect();
        entries.sort_by(|(a_seq, a), (b_seq, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b_seq.cmp(a_seq))
        });
        Ok(entries.into_iter().map(|(_, job)| job).collect())
    }
}
