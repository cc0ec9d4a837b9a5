//! `logsift process` command: run local files through the full engine

use crate::cli::ProcessArgs;
use chrono::Utc;
use logsift::config::{Config, StorageProvider};
use logsift::job::{EngineContext, JobDescriptor};
use logsift::notify::LogNotifier;
use logsift::observability::Metrics;
use logsift::retrieve::Retriever;
use logsift::scan::Scanner;
use logsift::storage::BlobClient;
use logsift::store::JobStore;
use logsift::worker::spawn_pool;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(args: ProcessArgs) -> Result<(), AnyError> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };
    if let Some(keywords) = args.keywords {
        config.engine.monitored_keywords = keywords;
    }

    let client = match config.storage.provider {
        StorageProvider::Local => BlobClient::local()?,
        StorageProvider::Memory => BlobClient::in_memory(),
    };

    let metrics = Arc::new(Metrics::new());
    let ctx = Arc::new(EngineContext {
        store: JobStore::open(&config.store.path)?,
        notifier: Arc::new(LogNotifier),
        retriever: Retriever::new(
            Arc::new(client.clone()),
            config.retrieval.scratch_dir.clone(),
            config.retrieval.retry_policy(),
        )
        .with_metrics(metrics.clone()),
        scanner: Scanner::new(config.scan.scan_config()),
        keywords: config.engine.keywords(),
        safety_timeout: config.engine.safety_timeout(),
        sample_lines: config.engine.sample_lines,
        metrics,
    });

    let (dispatcher, handles) = spawn_pool(
        ctx.clone(),
        config.engine.concurrency,
        config.engine.channel_size,
    );

    let mut job_ids = Vec::with_capacity(args.files.len());
    for file in &args.files {
        let descriptor = describe(file, &client, config.storage.provider).await?;
        let job_id = descriptor.job_id.clone();
        dispatcher.dispatch(descriptor).await?;
        job_ids.push(job_id);
    }

    // Closing the dispatcher lets workers drain and exit.
    drop(dispatcher);
    for handle in handles {
        handle.await?;
    }

    for job_id in &job_ids {
        if let Some(snapshot) = ctx.store.get(job_id)? {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }
    ctx.store.persist()?;

    let metrics = ctx.metrics.snapshot();
    info!(
        completed = metrics.jobs_completed,
        failed = metrics.jobs_failed,
        "all jobs drained"
    );
    Ok(())
}

/// Build a job descriptor for a local file, staging it into the blob store
/// when the configured provider is not filesystem-backed.
async fn describe(
    file: &Path,
    client: &BlobClient,
    provider: StorageProvider,
) -> Result<JobDescriptor, AnyError> {
    let abs = std::fs::canonicalize(file)?;
    let display_name = abs
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.log".to_string());
    let size_hint = std::fs::metadata(&abs)?.len();
    let job_id = Uuid::now_v7().to_string();

    let source_locator = match provider {
        StorageProvider::Local => {
            object_store::path::Path::from_filesystem_path(&abs)?.to_string()
        }
        StorageProvider::Memory => {
            let locator = format!("uploads/{job_id}/{display_name}");
            let bytes = tokio::fs::read(&abs).await?;
            client.put(&locator, bytes.into()).await?;
            locator
        }
    };

    Ok(JobDescriptor {
        job_id,
        source_locator,
        display_name,
        size_hint,
        owner_id: "cli".to_string(),
        submitted_at: Utc::now(),
    })
}
