//! Durable job store backed by Fjall
//!
//! The authoritative record of every job's lifecycle: status, progress, last
//! error, and final statistics for completed jobs. A failed persist never
//! rolls back in-memory progress, but terminal-write failures are surfaced
//! loudly because they mean the system of record disagrees with reality.

use crate::job::{JobDescriptor, JobStatus};
use crate::stats::Statistics;
use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persisted view of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub display_name: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub last_error: Option<String>,
    pub stats: Option<Statistics>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    fn for_descriptor(descriptor: &JobDescriptor) -> Self {
        let now = Utc::now();
        Self {
            job_id: descriptor.job_id.clone(),
            display_name: descriptor.display_name.clone(),
            owner_id: descriptor.owner_id.clone(),
            status: JobStatus::Waiting,
            progress: 0,
            last_error: None,
            stats: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Fjall-backed job snapshot store.
#[derive(Clone)]
pub struct JobStore {
    keyspace: Keyspace,
    jobs: PartitionHandle,
}

impl JobStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening job store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;

        Ok(Self { keyspace, jobs })
    }

    /// Register a freshly claimed job in `Waiting`. Safe under queue
    /// redelivery: a re-run simply overwrites the stale snapshot.
    pub fn register(&self, descriptor: &JobDescriptor) -> Result<()> {
        self.write(JobSnapshot::for_descriptor(descriptor))
    }

    /// Record a status/progress transition for a job.
    pub fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: u8,
        error: Option<&str>,
    ) -> Result<()> {
        let mut snapshot = self.get(job_id)?.unwrap_or_else(|| {
            // Status update for a job this store never saw; keep the record
            // rather than dropping the transition.
            JobSnapshot {
                job_id: job_id.to_string(),
                display_name: String::new(),
                owner_id: String::new(),
                status: JobStatus::Waiting,
                progress: 0,
                last_error: None,
                stats: None,
                started_at: Utc::now(),
                updated_at: Utc::now(),
                completed_at: None,
            }
        });

        snapshot.status = status;
        snapshot.progress = progress;
        snapshot.last_error = error.map(str::to_string);
        snapshot.updated_at = Utc::now();
        if status.is_terminal() {
            snapshot.completed_at = Some(snapshot.updated_at);
        }

        self.write(snapshot)
    }

    /// Persist final statistics together with the terminal status in one
    /// write, so a `Completed` label is never visible without its stats.
    pub fn update_final_stats(
        &self,
        job_id: &str,
        stats: Statistics,
        status: JobStatus,
        progress: u8,
    ) -> Result<()> {
        let mut snapshot = self
            .get(job_id)?
            .unwrap_or_else(|| JobSnapshot {
                job_id: job_id.to_string(),
                display_name: String::new(),
                owner_id: String::new(),
                status,
                progress,
                last_error: None,
                stats: None,
                started_at: Utc::now(),
                updated_at: Utc::now(),
                completed_at: None,
            });

        snapshot.status = status;
        snapshot.progress = progress;
        snapshot.stats = Some(stats);
        snapshot.updated_at = Utc::now();
        snapshot.completed_at = Some(snapshot.updated_at);

        self.write(snapshot)
    }

    /// Fetch a job snapshot by id.
    pub fn get(&self, job_id: &str) -> Result<Option<JobSnapshot>> {
        match self.jobs.get(job_id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Flush pending writes to disk.
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    fn write(&self, snapshot: JobSnapshot) -> Result<()> {
        let value = serde_json::to_vec(&snapshot)?;
        self.jobs.insert(snapshot.job_id.as_bytes(), value)?;
        debug!(
            job_id = %snapshot.job_id,
            status = ?snapshot.status,
            progress = snapshot.progress,
            "job snapshot written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn test_store() -> (JobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = JobStore::open(dir.path().join("jobs")).unwrap();
        (store, dir)
    }

    fn descriptor(job_id: &str) -> JobDescriptor {
        JobDescriptor {
            job_id: job_id.to_string(),
            source_locator: "uploads/app.log".to_string(),
            display_name: "app.log".to_string(),
            size_hint: 1024,
            owner_id: "user-1".to_string(),
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_register_and_get() {
        let (store, _dir) = test_store();
        store.register(&descriptor("job-1")).unwrap();

        let snapshot = store.get("job-1").unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::Waiting);
        assert_eq!(snapshot.progress, 0);
        assert_eq!(snapshot.display_name, "app.log");
        assert!(snapshot.stats.is_none());
    }

    #[test]
    fn test_status_updates_tracked() {
        let (store, _dir) = test_store();
        store.register(&descriptor("job-1")).unwrap();
        store
            .update_status("job-1", JobStatus::Processing, 10, None)
            .unwrap();

        let snapshot = store.get("job-1").unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::Processing);
        assert_eq!(snapshot.progress, 10);
        assert!(snapshot.completed_at.is_none());
    }

    #[test]
    fn test_failed_carries_error_and_completion_time() {
        let (store, _dir) = test_store();
        store.register(&descriptor("job-1")).unwrap();
        store
            .update_status("job-1", JobStatus::Failed, 10, Some("retrieval failed"))
            .unwrap();

        let snapshot = store.get("job-1").unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.last_error.as_deref(), Some("retrieval failed"));
        assert!(snapshot.completed_at.is_some());
    }

    #[test]
    fn test_final_stats_written_atomically_with_completed() {
        let (store, _dir) = test_store();
        store.register(&descriptor("job-1")).unwrap();

        let mut stats = Statistics::new(&["error".to_string()]);
        stats.total_entries = 42;
        store
            .update_final_stats("job-1", stats, JobStatus::Completed, 100)
            .unwrap();

        let snapshot = store.get("job-1").unwrap().unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.stats.unwrap().total_entries, 42);
        assert!(snapshot.completed_at.is_some());
    }

    #[test]
    fn test_get_missing_job() {
        let (store, _dir) = test_store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_snapshots_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs");

        {
            let store = JobStore::open(&path).unwrap();
            store.register(&descriptor("job-1")).unwrap();
            store.persist().unwrap();
        }

        let store = JobStore::open(&path).unwrap();
        assert!(store.get("job-1").unwrap().is_some());
    }
}
