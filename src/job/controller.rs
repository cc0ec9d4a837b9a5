//! Job lifecycle controller
//!
//! Drives one job end-to-end: claim -> retrieve -> scan -> terminal state,
//! supervised by a safety timeout that cancels stalled work.

use super::{JobDescriptor, JobError, JobState, JobStatus};
use crate::notify::{notify_best_effort, Notifier, ProgressEvent};
use crate::observability::Metrics;
use crate::retrieve::Retriever;
use crate::scan::{CancelFlag, ProgressSink, Scanner};
use crate::stats::Statistics;
use crate::store::JobStore;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Progress value reported the moment a job is claimed, before any I/O.
const CLAIMED_PROGRESS: u8 = 1;
/// Progress value reported once the source file is local.
const RETRIEVED_PROGRESS: u8 = 10;

/// Everything one job execution needs, explicitly constructed and injected.
/// Shared across the worker pool behind an `Arc`.
pub struct EngineContext {
    pub store: JobStore,
    pub notifier: Arc<dyn Notifier>,
    pub retriever: Retriever,
    pub scanner: Scanner,
    pub keywords: Vec<String>,
    pub safety_timeout: Duration,
    pub sample_lines: usize,
    pub metrics: Arc<Metrics>,
}

/// Execute one job to a terminal state.
///
/// Returns the final statistics on success. On any failure the job is left
/// `Failed` with a human-readable `last_error`, the scratch file is cleaned
/// up, and the terminal notification has already been sent.
pub async fn run_job(
    ctx: Arc<EngineContext>,
    descriptor: JobDescriptor,
) -> Result<Statistics, JobError> {
    ctx.metrics.job_claimed();
    info!(
        job_id = %descriptor.job_id,
        locator = %descriptor.source_locator,
        size_hint = descriptor.size_hint,
        owner = %descriptor.owner_id,
        "job claimed"
    );

    if let Err(e) = ctx.store.register(&descriptor) {
        warn!(job_id = %descriptor.job_id, error = %e, "failed to register job snapshot");
    }

    let reporter = Arc::new(ProgressReporter::new(ctx.clone(), descriptor.job_id.clone()));
    reporter.begin_processing().await;

    let cancel = CancelFlag::new();
    let pipeline = tokio::spawn(run_pipeline(
        ctx.clone(),
        descriptor.clone(),
        Arc::clone(&reporter),
        cancel.clone(),
    ));

    tokio::select! {
        joined = pipeline => match joined {
            Ok(Ok(stats)) => {
                reporter.complete(stats.clone()).await;
                ctx.metrics.job_completed();
                info!(
                    job_id = %descriptor.job_id,
                    total_entries = stats.total_entries,
                    error_count = stats.error_count,
                    elapsed_ms = stats.processing_time_ms,
                    "job completed"
                );
                Ok(stats)
            }
            Ok(Err(e)) => {
                reporter.fail(&e.to_string()).await;
                ctx.metrics.job_failed();
                warn!(job_id = %descriptor.job_id, error = %e, "job failed");
                Err(e)
            }
            Err(join_err) => {
                let msg = format!("job task panicked: {join_err}");
                reporter.fail(&msg).await;
                ctx.metrics.job_failed();
                error!(job_id = %descriptor.job_id, error = %msg, "job handler panicked");
                Err(JobError::Internal(msg))
            }
        },
        _ = tokio::time::sleep(ctx.safety_timeout) => {
            // A stalled scan must not hold a concurrency slot forever. Signal
            // cancellation and fail the job now; any in-flight fetch finishes
            // on its own schedule and its result is discarded.
            cancel.cancel();
            let err = JobError::Timeout(ctx.safety_timeout);
            reporter.fail(&err.to_string()).await;
            ctx.metrics.job_timed_out();
            warn!(job_id = %descriptor.job_id, "safety timeout fired, job failed");
            Err(err)
        }
    }
}

/// Retrieval and scan phases, run as a spawned task so the controller can
/// select against the safety timer. Scratch cleanup rides on `ScratchFile`'s
/// drop guard, so it happens on every exit path including cancellation.
async fn run_pipeline(
    ctx: Arc<EngineContext>,
    descriptor: JobDescriptor,
    reporter: Arc<ProgressReporter>,
    cancel: CancelFlag,
) -> Result<Statistics, JobError> {
    let scratch = ctx
        .retriever
        .retrieve(
            &descriptor.source_locator,
            &descriptor.job_id,
            &descriptor.display_name,
        )
        .await?;

    reporter.advance(RETRIEVED_PROGRESS).await;
    log_head_sample(scratch.path(), &descriptor.job_id, ctx.sample_lines).await;

    let stats = ctx
        .scanner
        .scan(scratch.path(), &ctx.keywords, reporter.as_ref(), &cancel)
        .await?;

    if cancel.is_cancelled() {
        return Err(JobError::Aborted);
    }
    Ok(stats)
}

/// Log the first few lines of the retrieved file. Diagnostic visibility
/// only; any read error here is ignored.
async fn log_head_sample(path: &Path, job_id: &str, sample_lines: usize) {
    if sample_lines == 0 {
        return;
    }
    let Ok(file) = tokio::fs::File::open(path).await else {
        return;
    };
    let mut lines = BufReader::new(file).lines();
    let mut sample = Vec::with_capacity(sample_lines);
    while sample.len() < sample_lines {
        match lines.next_line().await {
            Ok(Some(line)) => sample.push(line),
            _ => break,
        }
    }
    debug!(job_id, sample = %sample.join("\n"), "retrieved file head sample");
}

/// Owns the job's [`JobState`] and mirrors every transition out to the
/// durable store and the notifier.
///
/// The async mutex is held across the transition AND its store write and
/// notification, so deliveries for one job are serialized. Combined with the
/// terminal guard inside [`JobState`] this guarantees the terminal
/// notification is the last one sent: a checkpoint racing the safety timeout
/// either delivers before `fail` takes the lock, or is suppressed by the
/// guard afterwards.
struct ProgressReporter {
    ctx: Arc<EngineContext>,
    job_id: String,
    state: Mutex<JobState>,
}

impl ProgressReporter {
    fn new(ctx: Arc<EngineContext>, job_id: String) -> Self {
        Self {
            ctx,
            job_id,
            state: Mutex::new(JobState::new()),
        }
    }

    async fn begin_processing(&self) {
        let mut state = self.state.lock().await;
        if state.begin_processing() {
            self.mirror(JobStatus::Processing, CLAIMED_PROGRESS, None).await;
        }
    }

    async fn advance(&self, progress: u8) {
        let mut state = self.state.lock().await;
        if state.advance(progress) {
            self.mirror(JobStatus::Processing, progress.min(99), None).await;
        }
    }

    async fn complete(&self, stats: Statistics) {
        let mut state = self.state.lock().await;
        if !state.complete() {
            return;
        }

        // Final stats and the Completed label go down in one write; losing
        // this one silently would desync the system of record.
        if let Err(e) =
            self.ctx
                .store
                .update_final_stats(&self.job_id, stats.clone(), JobStatus::Completed, 100)
        {
            error!(job_id = %self.job_id, error = %e, "failed to persist final job statistics");
        }

        let event = ProgressEvent::new(&self.job_id, JobStatus::Completed, 100).with_stats(stats);
        notify_best_effort(self.ctx.notifier.as_ref(), &event).await;
    }

    async fn fail(&self, message: &str) {
        let mut state = self.state.lock().await;
        if !state.fail(message) {
            return;
        }
        let progress = state.progress();
        self.mirror(JobStatus::Failed, progress, Some(message)).await;
    }

    /// Persist and publish one transition. Callers hold the state lock.
    async fn mirror(&self, status: JobStatus, progress: u8, error: Option<&str>) {
        if let Err(e) = self
            .ctx
            .store
            .update_status(&self.job_id, status, progress, error)
        {
            // Does not roll back in-memory progress, but must be visible.
            if status.is_terminal() {
                error!(job_id = %self.job_id, error = %e, "failed to persist terminal job state");
            } else {
                warn!(job_id = %self.job_id, error = %e, "failed to persist job progress");
            }
        }

        let mut event = ProgressEvent::new(&self.job_id, status, progress);
        if let Some(err) = error {
            event = event.with_error(err.to_string());
        }
        notify_best_effort(self.ctx.notifier.as_ref(), &event).await;
    }
}

#[async_trait]
impl ProgressSink for ProgressReporter {
    async fn checkpoint(&self, percent: u8, _lines_seen: u64) {
        self.advance(percent).await;
    }
}
