//! Streaming file scanner
//!
//! Reads a log file line by line under a bounded read buffer, folds parsed
//! records into [`Statistics`], emits progress checkpoints through a
//! [`ProgressSink`], and pauses cooperatively under memory pressure.

use crate::parser::parse_line;
use crate::stats::Statistics;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Cooperative cancellation handle, polled once per line by the scanner.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Receiver for scan progress checkpoints.
///
/// Implementations must contain their own failures; the scanner treats
/// checkpoint delivery as fire-and-forget.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn checkpoint(&self, percent: u8, lines_seen: u64);
}

/// Process memory sampler used for backpressure decisions.
pub trait MemoryGauge: Send + Sync {
    /// Used-memory ratio in 0.0..=1.0, or `None` when unavailable.
    fn used_ratio(&self) -> Option<f64>;
}

/// Reads resident set size from procfs against total system memory.
/// Returns `None` on platforms without procfs.
#[derive(Debug, Default)]
pub struct ProcMemoryGauge;

impl MemoryGauge for ProcMemoryGauge {
    fn used_ratio(&self) -> Option<f64> {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        let resident_bytes = resident_pages * 4096;

        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        let total_kb: u64 = meminfo
            .lines()
            .find(|l| l.starts_with("MemTotal:"))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()?;
        if total_kb == 0 {
            return None;
        }

        Some(resident_bytes as f64 / (total_kb * 1024) as f64)
    }
}

/// Scanner tuning knobs. Defaults match the engine's documented policy.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Lines between batch-triggered checkpoint evaluations.
    pub batch_lines: u64,
    /// Assumed average line length used to estimate total line count.
    pub avg_line_bytes: u64,
    /// Minimum percentage advance required for a batch-triggered checkpoint.
    pub min_progress_step: u8,
    /// Emit a checkpoint after this much wall clock even without advance.
    pub checkpoint_interval: Duration,
    /// How often to sample process memory.
    pub memory_check_interval: Duration,
    /// Used-memory percentage above which the scanner pauses.
    pub memory_threshold_pct: u8,
    /// Length of one cooperative backpressure pause.
    pub memory_pause: Duration,
    /// Read buffer capacity in bytes.
    pub read_buffer: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_lines: 1000,
            avg_line_bytes: 200,
            min_progress_step: 5,
            checkpoint_interval: Duration::from_secs(5),
            memory_check_interval: Duration::from_secs(5),
            memory_threshold_pct: 80,
            memory_pause: Duration::from_millis(500),
            read_buffer: 64 * 1024,
        }
    }
}

/// Scanning progress window. Below 20 is retrieval/setup; 100 is the
/// terminal Completed transition, owned by the controller.
const SCAN_WINDOW_LOW: u64 = 20;
const SCAN_WINDOW_HIGH: u64 = 99;

pub struct Scanner {
    config: ScanConfig,
    gauge: Arc<dyn MemoryGauge>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            gauge: Arc::new(ProcMemoryGauge),
        }
    }

    /// Replace the memory gauge (tests inject synthetic pressure).
    pub fn with_gauge(mut self, gauge: Arc<dyn MemoryGauge>) -> Self {
        self.gauge = gauge;
        self
    }

    /// Stream `path`, folding every parseable line into the returned
    /// [`Statistics`].
    ///
    /// Checkpoints are reported through `sink` inside the [20, 99] window.
    /// The cancel flag is polled before each line; on cancellation the scan
    /// stops and returns whatever has accumulated so far.
    pub async fn scan(
        &self,
        path: &Path,
        keywords: &[String],
        sink: &dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> std::io::Result<Statistics> {
        let started = Instant::now();
        let file_size = tokio::fs::metadata(path).await?.len();
        let estimated_lines = (file_size / self.config.avg_line_bytes).max(1);

        let file = File::open(path).await?;
        let mut lines = BufReader::with_capacity(self.config.read_buffer, file).lines();

        let mut stats = Statistics::new(keywords);
        let mut lines_seen: u64 = 0;
        let mut last_emitted_pct: u8 = 0;
        let mut last_checkpoint = Instant::now();
        let mut last_memory_check = Instant::now();
        let mut aborted = false;

        while let Some(line) = lines.next_line().await? {
            if cancel.is_cancelled() {
                aborted = true;
                break;
            }

            lines_seen += 1;
            if let Some(record) = parse_line(&line) {
                stats.fold(&record, keywords);
            }

            let batch_hit = lines_seen % self.config.batch_lines == 0;
            let time_hit = last_checkpoint.elapsed() >= self.config.checkpoint_interval;
            if batch_hit || time_hit {
                let pct = scaled_percent(lines_seen, estimated_lines);
                let advanced = pct >= last_emitted_pct.saturating_add(self.config.min_progress_step);
                if time_hit || advanced {
                    sink.checkpoint(pct.max(last_emitted_pct), lines_seen).await;
                    last_emitted_pct = pct.max(last_emitted_pct);
                    last_checkpoint = Instant::now();
                }
            }

            if last_memory_check.elapsed() >= self.config.memory_check_interval {
                self.pause_if_pressured().await;
                last_memory_check = Instant::now();
            }
        }

        stats.processing_time_ms = started.elapsed().as_millis() as u64;

        if aborted {
            debug!(lines_seen, "scan cancelled, returning partial statistics");
        } else {
            // Closing checkpoint: the window top, never 100 (that belongs to
            // the terminal transition).
            sink.checkpoint(SCAN_WINDOW_HIGH as u8, lines_seen).await;
            debug!(
                lines_seen,
                total_entries = stats.total_entries,
                elapsed_ms = stats.processing_time_ms,
                "scan complete"
            );
        }

        Ok(stats)
    }

    /// Sample memory and take one cooperative pause when over the threshold.
    /// Trades throughput for stability on very large files.
    async fn pause_if_pressured(&self) {
        let Some(ratio) = self.gauge.used_ratio() else {
            return;
        };
        if ratio * 100.0 >= self.config.memory_threshold_pct as f64 {
            warn!(
                used_pct = (ratio * 100.0) as u64,
                threshold_pct = self.config.memory_threshold_pct,
                "memory pressure, pausing scan"
            );
            tokio::time::sleep(self.config.memory_pause).await;
        }
    }
}

/// Map a raw line-count estimate into the scanning window [20, 99].
fn scaled_percent(lines_seen: u64, estimated_lines: u64) -> u8 {
    let raw = (lines_seen * 100 / estimated_lines).min(100);
    (SCAN_WINDOW_LOW + raw * (SCAN_WINDOW_HIGH - SCAN_WINDOW_LOW) / 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    #[derive(Default)]
    struct RecordingSink {
        checkpoints: Mutex<Vec<u8>>,
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn checkpoint(&self, percent: u8, _lines_seen: u64) {
            self.checkpoints.lock().unwrap().push(percent);
        }
    }

    struct FixedGauge(f64);

    impl MemoryGauge for FixedGauge {
        fn used_ratio(&self) -> Option<f64> {
            Some(self.0)
        }
    }

    fn write_log_file(lines: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for i in 0..lines {
            // Padding keeps each line near the assumed 200-byte average so
            // the percentage estimate tracks reality.
            writeln!(
                file,
                "[2024-05-01T10:00:{:02}Z] INFO request {i} handled from 10.0.0.{} {}",
                i % 60,
                i % 250,
                "x".repeat(130)
            )
            .unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn test_config() -> ScanConfig {
        ScanConfig {
            batch_lines: 1000,
            ..ScanConfig::default()
        }
    }

    #[tokio::test]
    async fn test_checkpoints_monotonic_over_ten_thousand_lines() {
        let file = write_log_file(10_000);
        let sink = RecordingSink::default();
        let scanner = Scanner::new(test_config());

        let stats = scanner
            .scan(file.path(), &[], &sink, &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(stats.total_entries, 10_000);

        let checkpoints = sink.checkpoints.lock().unwrap();
        assert!(!checkpoints.is_empty());
        assert!(
            checkpoints.windows(2).all(|w| w[0] <= w[1]),
            "checkpoints must be non-decreasing: {checkpoints:?}"
        );
        assert!(checkpoints.iter().all(|&p| (20..=99).contains(&p)));
        assert!(*checkpoints.last().unwrap() >= 99);
    }

    #[tokio::test]
    async fn test_unparseable_lines_excluded_from_totals() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[t] INFO fine").unwrap();
        writeln!(file, "garbage line").unwrap();
        writeln!(file, "[t] ERROR broken pipe").unwrap();
        file.flush().unwrap();

        let scanner = Scanner::new(test_config());
        let stats = scanner
            .scan(file.path(), &[], &RecordingSink::default(), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.error_count, 1);
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial_stats() {
        let file = write_log_file(5_000);
        let sink = RecordingSink::default();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let scanner = Scanner::new(test_config());
        let stats = scanner
            .scan(file.path(), &[], &sink, &cancel)
            .await
            .unwrap();

        // Flag was set before the first line; nothing folded, no closing
        // checkpoint sent.
        assert_eq!(stats.total_entries, 0);
        assert!(sink.checkpoints.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_survives_memory_pressure() {
        let file = write_log_file(2_000);
        let config = ScanConfig {
            memory_check_interval: Duration::from_millis(0),
            memory_pause: Duration::from_millis(1),
            ..test_config()
        };
        let scanner = Scanner::new(config).with_gauge(Arc::new(FixedGauge(0.95)));

        let stats = scanner
            .scan(file.path(), &[], &RecordingSink::default(), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(stats.total_entries, 2_000);
    }

    #[tokio::test]
    async fn test_processing_time_recorded() {
        let file = write_log_file(100);
        let scanner = Scanner::new(test_config());
        let stats = scanner
            .scan(file.path(), &[], &RecordingSink::default(), &CancelFlag::new())
            .await
            .unwrap();

        // Wall clock resolution may round a fast scan down to zero ms, so
        // only assert the field is populated sanely.
        assert!(stats.processing_time_ms < 60_000);
    }
}
