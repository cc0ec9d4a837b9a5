//! Engine counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for job outcomes.
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_claimed: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_timed_out: AtomicU64,
    retrieval_retries: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_claimed(&self) {
        self.jobs_claimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_timed_out(&self) {
        self.jobs_timed_out.fetch_add(1, Ordering::Relaxed);
        // Timeouts are also failures from the queue's perspective.
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// One source fetch failed and another attempt is about to run.
    pub fn retrieval_retry(&self) {
        self.retrieval_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_claimed: self.jobs_claimed.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_timed_out: self.jobs_timed_out.load(Ordering::Relaxed),
            retrieval_retries: self.retrieval_retries.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_claimed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_timed_out: u64,
    pub retrieval_retries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.job_claimed();
        metrics.job_claimed();
        metrics.job_completed();
        metrics.job_timed_out();
        metrics.retrieval_retry();
        metrics.retrieval_retry();

        let snap = metrics.snapshot();
        assert_eq!(snap.jobs_claimed, 2);
        assert_eq!(snap.jobs_completed, 1);
        assert_eq!(snap.jobs_timed_out, 1);
        assert_eq!(snap.jobs_failed, 1);
        assert_eq!(snap.retrieval_retries, 2);
    }
}
