//! Job lifecycle: descriptors, the state machine, and the error taxonomy
//!
//! `Waiting -> Processing -> {Completed | Failed}`. Failed is reachable from
//! any non-terminal state; terminal states are immutable.

pub mod controller;

pub use controller::{run_job, EngineContext};

use crate::retrieve::RetrievalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Immutable unit of work handed to the engine by the queue layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: String,
    pub source_locator: String,
    pub display_name: String,
    pub size_hint: u64,
    pub owner_id: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Failures that terminate a job. Everything else (parse skips, persistence
/// hiccups, notification drops) is contained locally and never surfaces here.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("safety timeout of {}s exceeded before completion", .0.as_secs())]
    Timeout(Duration),

    #[error("scan failed: {0}")]
    Scan(#[from] std::io::Error),

    #[error("job aborted before completion")]
    Aborted,

    #[error("{0}")]
    Internal(String),
}

/// In-memory job state, owned by one controller invocation.
///
/// All mutators enforce the terminal guard: once Completed or Failed the
/// state never changes again, and each returns whether the transition was
/// applied.
#[derive(Debug, Clone)]
pub struct JobState {
    status: JobStatus,
    progress: u8,
    last_error: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}

impl JobState {
    pub fn new() -> Self {
        Self {
            status: JobStatus::Waiting,
            progress: 0,
            last_error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Waiting -> Processing at progress 1, before any I/O happens.
    pub fn begin_processing(&mut self) -> bool {
        if self.status != JobStatus::Waiting {
            return false;
        }
        self.status = JobStatus::Processing;
        self.progress = 1;
        true
    }

    /// Raise progress while Processing. Regressions are ignored so reported
    /// percentages stay monotonic even if an estimate wobbles.
    pub fn advance(&mut self, progress: u8) -> bool {
        if self.status != JobStatus::Processing || progress <= self.progress {
            return false;
        }
        self.progress = progress.min(99);
        true
    }

    /// Processing -> Completed at progress 100.
    pub fn complete(&mut self) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Any non-terminal state -> Failed.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.last_error = Some(error.into());
        self.completed_at = Some(Utc::now());
        true
    }
}
