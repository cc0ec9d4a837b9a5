use crate::humanize::ByteSize;
use crate::retrieve::RetryPolicy;
use crate::scan::ScanConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub store: StoreSettings,
}

/// Job engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Comma-separated, matched case-insensitively against message text.
    #[serde(default = "default_monitored_keywords")]
    pub monitored_keywords: String,
    /// Concurrent job handlers per worker process.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Dispatch channel depth per worker.
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
    /// Hard ceiling on one job's wall-clock runtime.
    #[serde(default = "default_safety_timeout_secs")]
    pub safety_timeout_secs: u64,
    /// Head-of-file lines captured for diagnostics after retrieval.
    #[serde(default = "default_sample_lines")]
    pub sample_lines: usize,
}

impl EngineConfig {
    /// Normalized keyword list: lower-cased, trimmed, empties dropped.
    pub fn keywords(&self) -> Vec<String> {
        self.monitored_keywords
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }

    pub fn safety_timeout(&self) -> Duration {
        Duration::from_secs(self.safety_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            monitored_keywords: default_monitored_keywords(),
            concurrency: default_concurrency(),
            channel_size: default_channel_size(),
            safety_timeout_secs: default_safety_timeout_secs(),
            sample_lines: default_sample_lines(),
        }
    }
}

fn default_monitored_keywords() -> String {
    "error,timeout".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_channel_size() -> usize {
    16
}

fn default_safety_timeout_secs() -> u64 {
    180
}

fn default_sample_lines() -> usize {
    5
}

/// Streaming scanner configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanSettings {
    #[serde(default = "default_batch_lines")]
    pub batch_lines: u64,
    #[serde(default = "default_avg_line_bytes")]
    pub avg_line_bytes: u64,
    #[serde(default = "default_min_progress_step")]
    pub min_progress_step: u8,
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,
    #[serde(default = "default_memory_check_interval_secs")]
    pub memory_check_interval_secs: u64,
    #[serde(default = "default_memory_threshold_pct")]
    pub memory_threshold_pct: u8,
    #[serde(default = "default_memory_pause_ms")]
    pub memory_pause_ms: u64,
    #[serde(default = "default_read_buffer")]
    pub read_buffer: ByteSize,
}

impl ScanSettings {
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            batch_lines: self.batch_lines,
            avg_line_bytes: self.avg_line_bytes,
            min_progress_step: self.min_progress_step,
            checkpoint_interval: Duration::from_secs(self.checkpoint_interval_secs),
            memory_check_interval: Duration::from_secs(self.memory_check_interval_secs),
            memory_threshold_pct: self.memory_threshold_pct,
            memory_pause: Duration::from_millis(self.memory_pause_ms),
            read_buffer: self.read_buffer.as_usize(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            batch_lines: default_batch_lines(),
            avg_line_bytes: default_avg_line_bytes(),
            min_progress_step: default_min_progress_step(),
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
            memory_check_interval_secs: default_memory_check_interval_secs(),
            memory_threshold_pct: default_memory_threshold_pct(),
            memory_pause_ms: default_memory_pause_ms(),
            read_buffer: default_read_buffer(),
        }
    }
}

fn default_batch_lines() -> u64 {
    1000
}

fn default_avg_line_bytes() -> u64 {
    200
}

fn default_min_progress_step() -> u8 {
    5
}

fn default_checkpoint_interval_secs() -> u64 {
    5
}

fn default_memory_check_interval_secs() -> u64 {
    5
}

fn default_memory_threshold_pct() -> u8 {
    80
}

fn default_memory_pause_ms() -> u64 {
    500
}

fn default_read_buffer() -> ByteSize {
    ByteSize(64 * 1024)
}

/// File retrieval configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

impl RetrievalSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("data/scratch")
}

/// Blob storage provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Local,
    Memory,
}

/// Blob storage configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StorageSettings {
    #[serde(default)]
    pub provider: StorageProvider,
}

/// Durable job store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/jobs")
}
