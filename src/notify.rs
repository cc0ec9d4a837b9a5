//! Progress notification fan-out
//!
//! Best-effort publish of job status events. A notifier failure is logged
//! and swallowed; it never changes a job's outcome.

use crate::job::JobStatus;
use crate::stats::Statistics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Channel all job progress events are published on.
pub const PROGRESS_CHANNEL: &str = "jobs.progress";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("publish failed: {0}")]
    PublishFailed(String),
}

/// Wire payload for one status/progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Statistics>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(job_id: &str, status: JobStatus, progress: u8) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            progress,
            error: None,
            stats: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_stats(mut self, stats: Statistics) -> Self {
        self.stats = Some(stats);
        self
    }
}

/// Event fan-out interface. Delivery is at-most-once and best-effort;
/// consumers must tolerate gaps.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, channel: &str, event: &ProgressEvent) -> Result<(), NotifyError>;
}

/// Publish without letting a transport failure escape. This is the only way
/// the engine invokes a notifier.
pub async fn notify_best_effort(notifier: &dyn Notifier, event: &ProgressEvent) {
    if let Err(e) = notifier.publish(PROGRESS_CHANNEL, event).await {
        warn!(
            job_id = %event.job_id,
            status = ?event.status,
            error = %e,
            "progress notification dropped"
        );
    }
}

/// Notifier that only writes structured logs. Default for the CLI.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, channel: &str, event: &ProgressEvent) -> Result<(), NotifyError> {
        info!(
            channel,
            job_id = %event.job_id,
            status = ?event.status,
            progress = event.progress,
            error = event.error.as_deref().unwrap_or(""),
            "job progress"
        );
        Ok(())
    }
}

/// In-process fan-out over a tokio broadcast channel, plus a bounded ring of
/// recent events so consumers that missed a push can poll
/// [`BroadcastNotifier::events_since`].
pub struct BroadcastNotifier {
    tx: broadcast::Sender<ProgressEvent>,
    recent: Mutex<VecDeque<ProgressEvent>>,
    retain: usize,
}

impl BroadcastNotifier {
    /// `retain` bounds the replay ring; zero is clamped to one so the ring
    /// stays bounded.
    pub fn new(retain: usize) -> Self {
        let retain = retain.max(1);
        let (tx, _) = broadcast::channel(retain.max(16));
        Self {
            tx,
            recent: Mutex::new(VecDeque::with_capacity(retain)),
            retain,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Polling fallback: events published strictly after `since`, oldest
    /// first, limited by the retention window.
    pub fn events_since(&self, since: DateTime<Utc>) -> Vec<ProgressEvent> {
        self.recent
            .lock()
            .map(|ring| {
                ring.iter()
                    .filter(|e| e.timestamp > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, _channel: &str, event: &ProgressEvent) -> Result<(), NotifyError> {
        {
            let mut ring = self
                .recent
                .lock()
                .map_err(|e| NotifyError::PublishFailed(e.to_string()))?;
            while ring.len() >= self.retain {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }

        // No live subscribers is not a failure; push delivery is optional.
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}
