//! File retrieval: blob storage -> local scratch file, with bounded retries
//! and exponential backoff

use crate::observability::Metrics;
use crate::storage::BlobSource;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid source locator: {0:?}")]
    InvalidLocator(String),

    #[error("source file is empty ({locator}), gave up after {attempts} attempts")]
    EmptyFile { locator: String, attempts: u32 },

    #[error("retrieval failed after {attempts} attempts: {last_cause}")]
    Exhausted { attempts: u32, last_cause: String },

    #[error("scratch file error: {0}")]
    Scratch(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Retry budget for one retrieval. Backoff after failed attempt `k`
/// (1-based) is `backoff_base * 2^k`: ~2s, ~4s with the defaults.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }
}

/// Local copy of a retrieved file. The file is deleted when this guard is
/// dropped, on success and failure paths alike; removal failures are logged
/// and never propagated.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove scratch file");
            }
        }
    }
}

/// Fetches source files into the scratch area.
pub struct Retriever {
    source: Arc<dyn BlobSource>,
    scratch_dir: PathBuf,
    policy: RetryPolicy,
    metrics: Option<Arc<Metrics>>,
}

impl Retriever {
    pub fn new(source: Arc<dyn BlobSource>, scratch_dir: PathBuf, policy: RetryPolicy) -> Self {
        Self {
            source,
            scratch_dir,
            policy,
            metrics: None,
        }
    }

    /// Count retry attempts on the shared engine counters.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Retrieve `locator` into a collision-free scratch file for `job_id`.
    ///
    /// A zero-byte fetch counts as a failed attempt and is retried like a
    /// network error; when the budget runs out with an empty payload as the
    /// last cause, the aggregate error is [`RetrievalError::EmptyFile`].
    pub async fn retrieve(
        &self,
        locator: &str,
        job_id: &str,
        display_name: &str,
    ) -> Result<ScratchFile> {
        if locator.trim().is_empty() {
            return Err(RetrievalError::InvalidLocator(locator.to_string()));
        }

        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        let mut last_cause = String::new();
        let mut last_was_empty = false;

        for attempt in 1..=self.policy.max_attempts {
            match self.source.fetch(locator).await {
                Ok(bytes) if bytes.is_empty() => {
                    last_cause = "fetched zero bytes".to_string();
                    last_was_empty = true;
                }
                Ok(bytes) => {
                    let path = self.scratch_path(job_id, display_name);
                    tokio::fs::write(&path, &bytes).await?;
                    debug!(
                        locator,
                        job_id,
                        attempt,
                        size = bytes.len(),
                        path = %path.display(),
                        "retrieval complete"
                    );
                    return Ok(ScratchFile { path });
                }
                Err(e) => {
                    last_cause = e.to_string();
                    last_was_empty = false;
                }
            }

            if attempt < self.policy.max_attempts {
                if let Some(metrics) = &self.metrics {
                    metrics.retrieval_retry();
                }
                let backoff = self.policy.backoff_after(attempt);
                warn!(
                    locator,
                    job_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    cause = %last_cause,
                    "retrieval attempt failed, backing off"
                );
                tokio::time::sleep(backoff).await;
            }
        }

        let attempts = self.policy.max_attempts;
        if last_was_empty {
            // Exhausting the budget on an empty source is fatal: retrying at
            // the queue level will not conjure content into the file.
            Err(RetrievalError::EmptyFile {
                locator: locator.to_string(),
                attempts,
            })
        } else {
            Err(RetrievalError::Exhausted {
                attempts,
                last_cause,
            })
        }
    }

    /// Multiple jobs share the scratch directory, so names carry the job id
    /// and a timestamp alongside the sanitized upload name.
    fn scratch_path(&self, job_id: &str, display_name: &str) -> PathBuf {
        let sanitized: String = display_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.scratch_dir
            .join(format!("{job_id}-{now_ms}-{sanitized}"))
    }
}
