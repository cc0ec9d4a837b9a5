//! Worker pool: fixed-size set of job handler tasks fed over bounded
//! channels with round-robin dispatch
//!
//! The external queue owns at-most-one-active-claim semantics; this pool
//! only distributes descriptors it is handed. Dropping the dispatcher closes
//! the channels and lets workers drain and exit.

use crate::job::{run_job, EngineContext, JobDescriptor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker pool is shut down")]
    Closed,
}

pub struct JobDispatcher {
    channels: Vec<mpsc::Sender<JobDescriptor>>,
    next_worker: AtomicUsize,
}

/// Spawn `concurrency` job handler tasks sharing `ctx`.
///
/// Returns the dispatcher plus the worker join handles; await the handles
/// after dropping the dispatcher for a clean drain.
pub fn spawn_pool(
    ctx: Arc<EngineContext>,
    concurrency: usize,
    channel_size: usize,
) -> (JobDispatcher, Vec<JoinHandle<()>>) {
    info!(concurrency, channel_size, "starting worker pool");

    let mut channels = Vec::with_capacity(concurrency);
    let mut handles = Vec::with_capacity(concurrency);

    for worker_id in 0..concurrency {
        let (tx, rx) = mpsc::channel(channel_size);
        channels.push(tx);
        handles.push(tokio::spawn(worker_loop(worker_id, rx, ctx.clone())));
    }

    (
        JobDispatcher {
            channels,
            next_worker: AtomicUsize::new(0),
        },
        handles,
    )
}

impl JobDispatcher {
    /// Hand a claimed job to the next worker (round-robin). Applies
    /// backpressure by waiting when the target worker's channel is full.
    pub async fn dispatch(&self, job: JobDescriptor) -> Result<(), DispatchError> {
        let idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.channels.len();
        let job_id = job.job_id.clone();

        match self.channels[idx].send(job).await {
            Ok(()) => {
                debug!(job_id, worker = idx, "job dispatched");
                Ok(())
            }
            Err(_) => {
                warn!(job_id, worker = idx, "worker channel closed, job not delivered");
                Err(DispatchError::Closed)
            }
        }
    }

    pub fn num_workers(&self) -> usize {
        self.channels.len()
    }

    pub fn health_check(&self) -> bool {
        self.channels.iter().all(|ch| !ch.is_closed())
    }
}

/// One worker: runs jobs sequentially until its channel closes. Job
/// failures are already fully handled (terminal state persisted and
/// notified) inside `run_job`, so the loop just keeps going.
async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<JobDescriptor>,
    ctx: Arc<EngineContext>,
) {
    debug!(worker_id, "worker started");
    while let Some(job) = rx.recv().await {
        let job_id = job.job_id.clone();
        if let Err(e) = run_job(ctx.clone(), job).await {
            debug!(worker_id, job_id, error = %e, "job ended in failure");
        }
    }
    debug!(worker_id, "worker channel closed, exiting");
}
