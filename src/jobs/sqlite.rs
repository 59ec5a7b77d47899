//! SQLite-backed job store.
//!
//! All access is serialized through a `Mutex<Connection>`; updates run inside a
//! transaction so a job record is read, validated and written as one unit.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Job, JobStatus, JobStore, JobUpdate};
use crate::error::StoreError;
use crate::model::{Platform, Target};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id           TEXT PRIMARY KEY,
    url          TEXT NOT NULL,
    platform     TEXT NOT NULL,
    target       TEXT NOT NULL,
    status       TEXT NOT NULL,
    progress     INTEGER NOT NULL DEFAULT 0,
    message      TEXT NOT NULL,
    result       TEXT,
    result_url   TEXT,
    created_at   TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
";

const COLUMNS: &str = "id, url, platform, target, status, progress, message, result, \
                       result_url, created_at, completed_at";

/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Opens (or creates) the database at `path` and creates the jobs table.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Corrupt(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        info!("Job database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut conn)
    }
}

/// Column values as stored; converted to a [`Job`] outside the rusqlite row callback.
struct JobRow {
    id: String,
    url: String,
    platform: String,
    target: String,
    status: String,
    progress: i64,
    message: String,
    result: Option<String>,
    result_url: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            url: row.get("url")?,
            platform: row.get("platform")?,
            target: row.get("target")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            message: row.get("message")?,
            result: row.get("result")?,
            result_url: row.get("result_url")?,
            created_at: row.get("created_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    fn into_job(self) -> Result<Job, StoreError> {
        let corrupt = |field: &str, e: String| {
            StoreError::Corrupt(format!("job {} has invalid {field}: {e}", self.id))
        };
        let platform = self.platform.parse::<Platform>().map_err(|e| corrupt("platform", e))?;
        let target = self.target.parse::<Target>().map_err(|e| corrupt("target", e))?;
        let status = self.status.parse::<JobStatus>().map_err(|e| corrupt("status", e))?;
        let progress = u8::try_from(self.progress)
            .map_err(|e| corrupt("progress", e.to_string()))?;
        let created_at =
            parse_timestamp(&self.created_at).map_err(|e| corrupt("created_at", e))?;
        let completed_at = self
            .completed_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(|e| corrupt("completed_at", e))?;

        Ok(Job {
            id: self.id,
            url: self.url,
            platform,
            target,
            status,
            progress,
            message: self.message,
            result: self.result,
            result_url: self.result_url,
            created_at,
            completed_at,
        })
    }
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

fn find(conn: &Connection, id: &str) -> Result<Option<Job>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1"),
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    row.map(JobRow::into_job).transpose()
}

impl JobStore for SqliteJobStore {
    fn insert(&self, job: &Job) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO jobs ({COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    job.id,
                    job.url,
                    job.platform.as_str(),
                    job.target.as_str(),
                    job.status.as_str(),
                    job.progress,
                    job.message,
                    job.result,
                    job.result_url,
                    format_timestamp(&job.created_at),
                    job.completed_at.as_ref().map(format_timestamp),
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::Duplicate(job.id.clone()));
            }
            Ok(())
        })
    }

    fn get(&self, id: &str) -> Result<Option<Job>, StoreError> {
        self.with_conn(|conn| find(conn, id))
    }

    fn update(&self, id: &str, update: &JobUpdate) -> Result<Job, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut job = find(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            job.apply(update, Utc::now())?;

            tx.execute(
                "UPDATE jobs SET status = ?2, progress = ?3, message = ?4, result = ?5,
                 result_url = ?6, completed_at = ?7
                 WHERE id = ?1",
                params![
                    job.id,
                    job.status.as_str(),
                    job.progress,
                    job.message,
                    job.result,
                    job.result_url,
                    job.completed_at.as_ref().map(format_timestamp),
                ],
            )?;
            let stored = find(&tx, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            tx.commit()?;
            Ok(stored)
        })
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
    }

    fn list(&self) -> Result<Vec<Job>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM jobs ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([], JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(JobRow::into_job).collect()
        })
    }
}
