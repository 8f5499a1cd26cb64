/// Media download manager
///
/// Media catalogs are flattened into [`DownloadJob`]s. Each batch runs on a
/// bounded pool of tasks; a file only reaches its final path after the whole
/// body has been written, and only then is its URL added to the state.
pub mod state;
pub mod transfer;

pub use state::DownloadState;
pub use transfer::{temp_path, write_stream_atomically, TransferOutcome};

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::Language;
use crate::config::DownloadConfig;
use crate::links::MediaEntry;
use crate::persist::sanitize_file_name;

/// One file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub destination: PathBuf,
}

impl DownloadJob {
    pub fn file_name(&self) -> String {
        self.destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.url.clone())
    }
}

/// URL-decoded last path segment of `url`, safe to use as a file name
pub fn file_name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let raw = path.rsplit('/').next().filter(|segment| !segment.is_empty())?;
    let decoded = urlencoding::decode(raw).map(|s| s.into_owned()).unwrap_or_else(|_| raw.to_string());
    Some(sanitize_file_name(&decoded))
}

/// Expand media entries into jobs under `<base>/<language>/<discourse>/<file>`
///
/// An entry's own language picks the directory; `fallback` covers entries
/// whose language is unknown.
pub fn flatten_jobs(base_dir: &Path, fallback: Language, entries: &[MediaEntry]) -> Vec<DownloadJob> {
    let mut jobs = Vec::new();

    for entry in entries {
        let language = match entry.language {
            Language::Unknown => fallback,
            known => known,
        };
        let save_dir = base_dir
            .join(language.dir_name())
            .join(sanitize_file_name(&entry.discourse_name));

        for url in &entry.mp3_links {
            match file_name_from_url(url) {
                Some(file_name) => jobs.push(DownloadJob {
                    url: url.clone(),
                    destination: save_dir.join(file_name),
                }),
                None => warn!("⚠️  Skipping URL without a file name: {}", url),
            }
        }
    }

    jobs
}

/// How one job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Downloaded(u64),
    Skipped,
    Interrupted,
    Failed(String),
}

/// Totals for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub interrupted: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl BatchReport {
    fn record(&mut self, status: &JobStatus) {
        match status {
            JobStatus::Downloaded(bytes) => {
                self.downloaded += 1;
                self.bytes += bytes;
            }
            JobStatus::Skipped => self.skipped += 1,
            JobStatus::Interrupted => self.interrupted += 1,
            JobStatus::Failed(_) => self.failed += 1,
        }
    }
}

/// Runs download batches against a shared [`DownloadState`]
pub struct DownloadManager {
    client: reqwest::Client,
    state: DownloadState,
    max_threads: usize,
}

impl DownloadManager {
    pub fn new(config: &DownloadConfig, state: DownloadState) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .read_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            state,
            max_threads: config.max_threads.max(1),
        })
    }

    pub fn state(&self) -> &DownloadState {
        &self.state
    }

    /// Jobs whose URL is not yet in the state, in catalog order
    pub async fn pending(&self, jobs: &[DownloadJob]) -> Vec<DownloadJob> {
        let mut pending = Vec::new();
        for job in jobs {
            if !self.state.contains(&job.url).await {
                pending.push(job.clone());
            }
        }
        pending
    }

    /// Download up to `batch_size` pending jobs with at most `concurrency`
    /// transfers in flight, then save the state
    ///
    /// Once `cancel` fires no further job starts and in-flight transfers stop
    /// at their next chunk. The state is saved in every case.
    pub async fn run(
        &self,
        jobs: &[DownloadJob],
        batch_size: usize,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let batch: Vec<DownloadJob> = self.pending(jobs).await.into_iter().take(batch_size).collect();
        if batch.is_empty() {
            return Ok(BatchReport::default());
        }

        let workers = batch.len().min(concurrency.max(1)).min(self.max_threads);
        info!("🚀 Starting download of {} files with {} workers", batch.len(), workers);

        let start_time = Instant::now();
        let report = self.run_batch(batch, workers, cancel).await;

        info!(
            "📊 Batch finished in {:.1}s: {} downloaded, {} failed, {} interrupted",
            start_time.elapsed().as_secs_f64(),
            report.downloaded,
            report.failed,
            report.interrupted
        );

        self.state.save().await?;
        Ok(report)
    }

    async fn run_batch(&self, batch: Vec<DownloadJob>, workers: usize, cancel: &CancellationToken) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::channel(workers);

        for job in batch {
            let semaphore = Arc::clone(&semaphore);
            let client = self.client.clone();
            let state = self.state.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let status = match semaphore.acquire_owned().await {
                    Ok(_permit) => download_job(&client, &state, &job, &cancel).await,
                    Err(_) => JobStatus::Interrupted,
                };
                if let Err(e) = tx.send((job, status)).await {
                    error!("Failed to send download result: {}", e);
                }
            });
        }

        // Drop the original sender to close the channel when all tasks complete
        drop(tx);

        let mut report = BatchReport::default();
        while let Some((job, status)) = rx.recv().await {
            match &status {
                JobStatus::Downloaded(bytes) => info!("  ✅ Downloaded: {} ({} bytes)", job.file_name(), bytes),
                JobStatus::Failed(reason) => warn!("  ❌ Failed: {} ({})", job.file_name(), reason),
                JobStatus::Interrupted => info!("  🛑 Interrupted: {}", job.file_name()),
                JobStatus::Skipped => debug!("  ⏭️  Already downloaded: {}", job.file_name()),
            }
            report.record(&status);
        }
        report
    }
}

async fn download_job(
    client: &reqwest::Client,
    state: &DownloadState,
    job: &DownloadJob,
    cancel: &CancellationToken,
) -> JobStatus {
    if cancel.is_cancelled() {
        return JobStatus::Interrupted;
    }
    if state.contains(&job.url).await {
        return JobStatus::Skipped;
    }

    match fetch(client, job, cancel).await {
        Ok(TransferOutcome::Completed(bytes)) => {
            state.insert(&job.url).await;
            JobStatus::Downloaded(bytes)
        }
        Ok(TransferOutcome::Cancelled) => JobStatus::Interrupted,
        Err(e) => JobStatus::Failed(e.to_string()),
    }
}

async fn fetch(client: &reqwest::Client, job: &DownloadJob, cancel: &CancellationToken) -> Result<TransferOutcome> {
    let response = client
        .get(&job.url)
        .send()
        .await
        .map_err(|e| anyhow!("Failed to start download: {}", e))?;

    if !response.status().is_success() {
        return Err(anyhow!("HTTP {}", response.status()));
    }

    write_stream_atomically(response.bytes_stream(), &job.destination, cancel).await
}
