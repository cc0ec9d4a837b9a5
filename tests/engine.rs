//! End-to-end engine tests
//!
//! Each test drives the real pipeline: descriptors dispatched to a worker
//! pool, retrieval from an in-memory blob store, streaming scan, durable
//! snapshots in a throwaway Fjall store, and fan-out over the broadcast
//! notifier.

use bytes::Bytes;
use chrono::Utc;
use logsift::job::{EngineContext, JobDescriptor, JobStatus};
use logsift::notify::{BroadcastNotifier, ProgressEvent};
use logsift::observability::Metrics;
use logsift::retrieve::{Retriever, RetryPolicy};
use logsift::scan::{ScanConfig, Scanner};
use logsift::storage::BlobClient;
use logsift::store::JobStore;
use logsift::worker::spawn_pool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    ctx: Arc<EngineContext>,
    client: BlobClient,
    notifier: Arc<BroadcastNotifier>,
    _dir: TempDir,
}

impl Harness {
    fn new(safety_timeout: Duration) -> Self {
        let dir = TempDir::new().unwrap();
        let client = BlobClient::in_memory();
        let notifier = Arc::new(BroadcastNotifier::new(256));
        let metrics = Arc::new(Metrics::new());

        let ctx = Arc::new(EngineContext {
            store: JobStore::open(dir.path().join("jobs")).unwrap(),
            notifier: notifier.clone(),
            retriever: Retriever::new(
                Arc::new(client.clone()),
                dir.path().join("scratch"),
                RetryPolicy {
                    max_attempts: 3,
                    backoff_base: Duration::from_millis(1),
                },
            )
            .with_metrics(metrics.clone()),
            scanner: Scanner::new(ScanConfig {
                batch_lines: 100,
                ..ScanConfig::default()
            }),
            keywords: vec!["error".to_string(), "timeout".to_string()],
            safety_timeout,
            sample_lines: 3,
            metrics,
        });

        Self {
            ctx,
            client,
            notifier,
            _dir: dir,
        }
    }

    async fn seed(&self, locator: &str, content: String) {
        self.client.put(locator, Bytes::from(content)).await.unwrap();
    }

    fn descriptor(&self, job_id: &str, locator: &str) -> JobDescriptor {
        JobDescriptor {
            job_id: job_id.to_string(),
            source_locator: locator.to_string(),
            display_name: format!("{job_id}.log"),
            size_hint: 0,
            owner_id: "owner-1".to_string(),
            submitted_at: Utc::now(),
        }
    }
}

fn synthetic_log(lines: usize) -> String {
    let mut out = String::new();
    for i in 0..lines {
        if i % 10 == 0 {
            out.push_str(
                "[2024-05-01T10:00:00Z] ERROR timeout contacting 10.0.0.9 {\"peer\": \"10.0.0.9\"}\n",
            );
        } else {
            out.push_str(&format!(
                "[2024-05-01T10:00:00Z] INFO request {i} served for 192.168.1.{}\n",
                i % 250
            ));
        }
    }
    out
}

#[tokio::test]
async fn full_pipeline_produces_expected_statistics() {
    let harness = Harness::new(Duration::from_secs(30));
    harness.seed("uploads/a.log", synthetic_log(500)).await;

    let mut rx = harness.notifier.subscribe();
    let started = Utc::now();

    let (dispatcher, handles) = spawn_pool(harness.ctx.clone(), 2, 8);
    dispatcher
        .dispatch(harness.descriptor("job-a", "uploads/a.log"))
        .await
        .unwrap();
    drop(dispatcher);
    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = harness.ctx.store.get("job-a").unwrap().unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.owner_id, "owner-1");

    let stats = snapshot.stats.unwrap();
    assert_eq!(stats.total_entries, 500);
    assert_eq!(stats.error_count, 50);
    assert_eq!(stats.keyword_matches.get("timeout"), Some(&50));
    assert_eq!(stats.keyword_matches.get("error"), Some(&50)); // matched via the ERROR level
    // 10.0.0.9 appears in both message and payload on each ERROR line.
    assert_eq!(stats.ip_addresses.get("10.0.0.9"), Some(&100));

    // Push delivery observed the first event.
    let first = rx.recv().await.unwrap();
    assert_eq!(first.job_id, "job-a");
    assert_eq!(first.progress, 1);
    assert!(matches!(first.status, JobStatus::Processing));

    // Polling fallback replays the full sequence in order, terminal last.
    let events = harness.notifier.events_since(started - chrono::Duration::seconds(1));
    assert!(!events.is_empty());
    let last = events.last().unwrap();
    assert!(matches!(last.status, JobStatus::Completed));
    assert_eq!(last.progress, 100);
    assert!(last.stats.is_some());
    assert!(!events[..events.len() - 1]
        .iter()
        .any(|e| e.status.is_terminal()));
}

#[tokio::test]
async fn concurrent_jobs_report_monotonic_progress_independently() {
    let harness = Harness::new(Duration::from_secs(30));
    for name in ["a", "b", "c", "d"] {
        harness
            .seed(&format!("uploads/{name}.log"), synthetic_log(300))
            .await;
    }

    let started = Utc::now();
    let (dispatcher, handles) = spawn_pool(harness.ctx.clone(), 2, 8);
    for name in ["a", "b", "c", "d"] {
        dispatcher
            .dispatch(harness.descriptor(&format!("job-{name}"), &format!("uploads/{name}.log")))
            .await
            .unwrap();
    }
    drop(dispatcher);
    for handle in handles {
        handle.await.unwrap();
    }

    let mut per_job: HashMap<String, Vec<ProgressEvent>> = HashMap::new();
    for event in harness
        .notifier
        .events_since(started - chrono::Duration::seconds(1))
    {
        per_job.entry(event.job_id.clone()).or_default().push(event);
    }

    assert_eq!(per_job.len(), 4);
    for (job_id, events) in per_job {
        let percents: Vec<u8> = events.iter().map(|e| e.progress).collect();
        assert!(
            percents.windows(2).all(|w| w[0] <= w[1]),
            "{job_id} progress regressed: {percents:?}"
        );
        assert!(matches!(events.last().unwrap().status, JobStatus::Completed));
    }
    assert_eq!(harness.ctx.metrics.snapshot().jobs_completed, 4);
}

#[tokio::test]
async fn stalled_job_times_out_without_blocking_siblings() {
    let harness = Harness::new(Duration::from_millis(200));
    harness.seed("uploads/good.log", synthetic_log(50)).await;

    // The stalled job points at a locator that is never seeded and gets an
    // effectively unbounded retry budget, so only the safety timeout can
    // end it.
    let slow_ctx = Arc::new(EngineContext {
        store: harness.ctx.store.clone(),
        notifier: harness.ctx.notifier.clone(),
        retriever: Retriever::new(
            Arc::new(harness.client.clone()),
            harness._dir.path().join("scratch"),
            RetryPolicy {
                max_attempts: u32::MAX,
                backoff_base: Duration::from_millis(50),
            },
        ),
        scanner: Scanner::new(ScanConfig::default()),
        keywords: harness.ctx.keywords.clone(),
        safety_timeout: Duration::from_millis(200),
        sample_lines: 0,
        metrics: harness.ctx.metrics.clone(),
    });

    let slow = tokio::spawn(logsift::job::run_job(
        slow_ctx,
        harness.descriptor("job-slow", "uploads/never-there.log"),
    ));
    let fast = tokio::spawn(logsift::job::run_job(
        harness.ctx.clone(),
        harness.descriptor("job-fast", "uploads/good.log"),
    ));

    let fast_result = fast.await.unwrap();
    assert!(fast_result.is_ok());

    let slow_result = slow.await.unwrap();
    assert!(slow_result.is_err());

    let slow_snapshot = harness.ctx.store.get("job-slow").unwrap().unwrap();
    assert_eq!(slow_snapshot.status, JobStatus::Failed);
    assert!(slow_snapshot.last_error.unwrap().contains("timeout"));

    let fast_snapshot = harness.ctx.store.get("job-fast").unwrap().unwrap();
    assert_eq!(fast_snapshot.status, JobStatus::Completed);
}

#[tokio::test]
async fn redelivered_job_reruns_cleanly() {
    let harness = Harness::new(Duration::from_secs(30));
    harness.seed("uploads/a.log", synthetic_log(100)).await;

    let descriptor = harness.descriptor("job-again", "uploads/a.log");

    let first = logsift::job::run_job(harness.ctx.clone(), descriptor.clone())
        .await
        .unwrap();
    // Queue-level redelivery of the same descriptor: the engine starts over
    // from Waiting and lands on the same result.
    let second = logsift::job::run_job(harness.ctx.clone(), descriptor)
        .await
        .unwrap();

    assert_eq!(first.total_entries, second.total_entries);
    assert_eq!(first.ip_addresses, second.ip_addresses);

    let snapshot = harness.ctx.store.get("job-again").unwrap().unwrap();
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.stats.unwrap().total_entries, 100);
}

#[tokio::test]
async fn ten_thousand_line_file_ends_at_full_progress() {
    let harness = Harness::new(Duration::from_secs(60));
    harness.seed("uploads/big.log", synthetic_log(10_000)).await;

    let started = Utc::now();
    logsift::job::run_job(harness.ctx.clone(), harness.descriptor("job-big", "uploads/big.log"))
        .await
        .unwrap();

    let events = harness
        .notifier
        .events_since(started - chrono::Duration::seconds(1));
    let percents: Vec<u8> = events.iter().map(|e| e.progress).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");

    // Final checkpoint before the terminal transition sits at the top of
    // the scan window; the terminal event itself reports 100.
    let scan_checkpoints: Vec<&ProgressEvent> = events
        .iter()
        .filter(|e| !e.status.is_terminal())
        .collect();
    assert!(scan_checkpoints.last().unwrap().progress >= 99);
    assert_eq!(events.last().unwrap().progress, 100);
}
