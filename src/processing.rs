use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{discourse_id, ChapterTask, Language, SeriesEntry};
use crate::chapters::{ChapterRecord, ChapterResolver, DiscourseRecord, Extraction};
use crate::config::Config;
use crate::persist::{sanitize_file_name, write_json_atomic};
use crate::session::{PageSession, SessionFactory};
use crate::state::{ChapterLog, ChapterStatus, ProgressLedger};

/// Per-run knobs from the command line
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Maximum number of pending series to process
    pub count: Option<usize>,
    /// Parallel workers, each with its own page session
    pub workers: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { count: None, workers: 1 }
    }
}

/// A series selected for this run
#[derive(Debug, Clone)]
pub struct PlannedDiscourse {
    pub discourse_index: usize,
    pub entry: SeriesEntry,
    pub chapter_count: usize,
}

/// Chapter units for one run
#[derive(Debug, Clone, Default)]
pub struct WorkPlan {
    pub discourses: Vec<PlannedDiscourse>,
    pub tasks: Vec<ChapterTask>,
    /// Titles of pending series that could not be expanded into chapters
    pub skipped: Vec<String>,
}

/// Split the catalog into chapter units, leaving out completed series
///
/// `discourse_index` is the position in the full catalog so chapter ids stay
/// stable across runs.
pub fn plan_work(catalog: &[SeriesEntry], completed: &BTreeSet<String>, count: Option<usize>) -> WorkPlan {
    let mut plan = WorkPlan::default();
    let limit = count.unwrap_or(usize::MAX);

    for (discourse_index, entry) in catalog.iter().enumerate() {
        if plan.discourses.len() >= limit {
            break;
        }
        if completed.contains(&entry.url) {
            debug!("⏭️  Already completed: {}", entry.title);
            continue;
        }

        let links = entry.chapter_links();
        if links.is_empty() {
            warn!("⚠️  Skipping {}: no chapter links could be derived", entry.title);
            plan.skipped.push(entry.title.clone());
            continue;
        }

        plan.tasks.extend(links.iter().enumerate().map(|(chapter_index, url)| ChapterTask {
            discourse_index,
            discourse_name: entry.title.clone(),
            chapter_index,
            chapter_url: url.clone(),
        }));
        plan.discourses.push(PlannedDiscourse {
            discourse_index,
            entry: entry.clone(),
            chapter_count: links.len(),
        });
    }

    plan
}

/// Result of one chapter unit as reported by a worker
#[derive(Debug)]
pub struct ChapterOutcome {
    pub task: ChapterTask,
    pub result: std::result::Result<Extraction, String>,
}

/// Counts written to `stats.json` at the end of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub discourses_planned: usize,
    pub discourses_saved: usize,
    pub discourses_partial: usize,
    pub discourses_skipped: usize,
    pub chapters_planned: usize,
    pub chapters_scraped: usize,
    pub chapters_failed: usize,
    pub chapters_with_transcript: usize,
    pub chapters_without_transcript: usize,
    /// Share of scraped chapters with a transcript, 0.0 to 1.0
    pub transcript_coverage: f64,
    pub interrupted: bool,
    pub elapsed_secs: f64,
    pub finished_at: DateTime<Utc>,
}

/// Writes one JSON file per discourse
#[derive(Debug, Clone)]
pub struct DiscourseWriter {
    output_dir: PathBuf,
}

impl DiscourseWriter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn path_for(&self, discourse_name: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.json", sanitize_file_name(discourse_name)))
    }

    /// Overwrite the discourse file atomically
    pub async fn write(&self, record: &DiscourseRecord) -> Result<PathBuf> {
        let path = self.path_for(&record.discourse_name);
        write_json_atomic(&path, record).await?;
        Ok(path)
    }
}

/// Chapters collected so far for one discourse
struct DiscourseProgress {
    plan: PlannedDiscourse,
    pending: usize,
    chapters: Vec<(usize, ChapterRecord)>,
    detected_language: Language,
}

impl DiscourseProgress {
    fn language(&self) -> Language {
        match self.plan.entry.language {
            Language::Unknown => self.detected_language,
            known => known,
        }
    }

    fn to_record(&self) -> DiscourseRecord {
        DiscourseRecord::assemble(
            discourse_id(self.plan.discourse_index),
            &self.plan.entry.title,
            &self.plan.entry.url,
            self.language(),
            self.chapters.clone(),
        )
    }
}

/// Work scheduler: fans chapter units out to a fixed worker pool and folds
/// results back into discourse files and the ledger
pub struct Scheduler {
    resolver: Arc<ChapterResolver>,
    factory: Arc<dyn SessionFactory>,
    ledger: ProgressLedger,
    writer: DiscourseWriter,
    stats_file: PathBuf,
}

impl Scheduler {
    pub fn new(config: &Config, factory: Arc<dyn SessionFactory>, ledger: ProgressLedger) -> Result<Self> {
        info!("🔧 Initializing scheduler with {} session backend", factory.name());

        Ok(Self {
            resolver: Arc::new(ChapterResolver::new(config)?),
            factory,
            ledger,
            writer: DiscourseWriter::new(config.output.output_dir.clone()),
            stats_file: config.output.stats_file.clone(),
        })
    }

    /// Process every pending series in `catalog`
    ///
    /// Stops dispatching new units once `cancel` fires; units already in
    /// flight finish and everything collected is saved.
    pub async fn run(
        &self,
        catalog: &[SeriesEntry],
        options: RunOptions,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        let start_time = Instant::now();
        let completed = self.ledger.completed().await;
        let plan = plan_work(catalog, &completed, options.count);

        info!(
            "🚀 Planned {} discourses, {} chapters ({} already completed, {} skipped)",
            plan.discourses.len(),
            plan.tasks.len(),
            completed.len(),
            plan.skipped.len()
        );

        let mut summary = RunSummary {
            discourses_planned: plan.discourses.len(),
            discourses_saved: 0,
            discourses_partial: 0,
            discourses_skipped: plan.skipped.len(),
            chapters_planned: plan.tasks.len(),
            chapters_scraped: 0,
            chapters_failed: 0,
            chapters_with_transcript: 0,
            chapters_without_transcript: 0,
            transcript_coverage: 0.0,
            interrupted: false,
            elapsed_secs: 0.0,
            finished_at: Utc::now(),
        };

        let mut progress: HashMap<usize, DiscourseProgress> = plan
            .discourses
            .iter()
            .map(|planned| {
                (
                    planned.discourse_index,
                    DiscourseProgress {
                        plan: planned.clone(),
                        pending: planned.chapter_count,
                        chapters: Vec::new(),
                        detected_language: Language::Unknown,
                    },
                )
            })
            .collect();

        let total_units = plan.tasks.len();
        let worker_count = options.workers.max(1).min(total_units.max(1));
        let queue = Arc::new(Mutex::new(VecDeque::from(plan.tasks)));
        let (tx, mut rx) = mpsc::channel::<ChapterOutcome>(worker_count * 2);

        let handles: Vec<_> = (0..worker_count)
            .filter(|_| total_units > 0)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&queue),
                    Arc::clone(&self.resolver),
                    Arc::clone(&self.factory),
                    tx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        // Drop the original sender so the channel closes when all workers exit
        drop(tx);

        let mut reported = 0usize;
        while let Some(outcome) = rx.recv().await {
            reported += 1;
            let discourse_index = outcome.task.discourse_index;
            self.record_outcome(outcome, &mut progress, &mut summary, reported, total_units)
                .await;

            let finished = progress
                .get(&discourse_index)
                .is_some_and(|discourse| discourse.pending == 0);
            if finished {
                if let Some(discourse) = progress.remove(&discourse_index) {
                    self.finalize_discourse(&discourse, true, &mut summary).await;
                }
            }
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Worker task panicked: {}", e);
            }
        }

        summary.interrupted = cancel.is_cancelled() && reported < total_units;
        if !progress.is_empty() {
            warn!(
                "⚠️  {} discourse(s) did not finish; saving partial results without marking them complete",
                progress.len()
            );
        }
        let mut unfinished: Vec<_> = progress.into_values().collect();
        unfinished.sort_by_key(|discourse| discourse.plan.discourse_index);
        for discourse in &unfinished {
            self.finalize_discourse(discourse, false, &mut summary).await;
        }

        if let Err(e) = self.ledger.save().await {
            error!("❌ Failed to save ledger: {}", e);
        }

        summary.transcript_coverage = if summary.chapters_scraped > 0 {
            summary.chapters_with_transcript as f64 / summary.chapters_scraped as f64
        } else {
            0.0
        };
        summary.elapsed_secs = start_time.elapsed().as_secs_f64();
        summary.finished_at = Utc::now();

        if let Err(e) = write_json_atomic(&self.stats_file, &summary).await {
            error!("❌ Failed to write {}: {}", self.stats_file.display(), e);
        }

        info!("🎉 Run finished in {:.1}s", summary.elapsed_secs);
        info!("✅ Discourses saved: {} (partial: {})", summary.discourses_saved, summary.discourses_partial);
        info!("📖 Chapters scraped: {}/{}, failed: {}", summary.chapters_scraped, summary.chapters_planned, summary.chapters_failed);
        info!(
            "📝 Transcript coverage: {:.1}% ({} with, {} without)",
            summary.transcript_coverage * 100.0,
            summary.chapters_with_transcript,
            summary.chapters_without_transcript
        );

        Ok(summary)
    }

    /// Fold one worker report into the in-memory progress and the ledger log
    async fn record_outcome(
        &self,
        outcome: ChapterOutcome,
        progress: &mut HashMap<usize, DiscourseProgress>,
        summary: &mut RunSummary,
        reported: usize,
        total_units: usize,
    ) {
        let ChapterOutcome { task, result } = outcome;
        let chapter_id = task.chapter_id();

        let log = match result {
            Ok(extraction) => {
                let mut record = extraction.record;
                record.id = chapter_id.clone();
                summary.chapters_scraped += 1;

                let (status, error) = if record.has_transcript() {
                    summary.chapters_with_transcript += 1;
                    info!("✅ [{}/{}] {} {}", reported, total_units, chapter_id, record.title);
                    (ChapterStatus::Passed, None)
                } else {
                    summary.chapters_without_transcript += 1;
                    warn!("⚠️  [{}/{}] {} no transcript: {}", reported, total_units, chapter_id, task.chapter_url);
                    (ChapterStatus::Failed, Some("no transcript recovered".to_string()))
                };

                let log = ChapterLog {
                    chapter_id: chapter_id.clone(),
                    discourse_id: task.discourse_id(),
                    status,
                    title: record.title.clone(),
                    url: record.url.clone(),
                    error,
                    logged_at: Utc::now(),
                };

                if let Some(discourse) = progress.get_mut(&task.discourse_index) {
                    if discourse.detected_language == Language::Unknown {
                        discourse.detected_language = extraction.language;
                    }
                    discourse.chapters.push((task.chapter_index, record));
                }
                log
            }
            Err(message) => {
                summary.chapters_failed += 1;
                warn!("❌ [{}/{}] {} failed: {}", reported, total_units, chapter_id, message);
                ChapterLog {
                    chapter_id,
                    discourse_id: task.discourse_id(),
                    status: ChapterStatus::Failed,
                    title: String::new(),
                    url: task.chapter_url.clone(),
                    error: Some(message),
                    logged_at: Utc::now(),
                }
            }
        };

        if let Some(discourse) = progress.get_mut(&task.discourse_index) {
            discourse.pending = discourse.pending.saturating_sub(1);
        }
        self.ledger.append_logs([log]).await;
    }

    /// Write a discourse file and, if `complete`, mark it in the ledger
    ///
    /// A discourse with no successful chapter is neither written nor marked.
    async fn finalize_discourse(&self, discourse: &DiscourseProgress, complete: bool, summary: &mut RunSummary) {
        let title = &discourse.plan.entry.title;
        if discourse.chapters.is_empty() {
            warn!("⚠️  No chapters recovered for {}; leaving it for the next run", title);
            return;
        }

        let record = discourse.to_record();
        let path = match self.writer.write(&record).await {
            Ok(path) => path,
            Err(e) => {
                error!("❌ Failed to write discourse {}: {}", title, e);
                return;
            }
        };

        if !complete {
            summary.discourses_partial += 1;
            info!("💾 Saved partial discourse {} ({} chapters) to {}", title, record.chapters.len(), path.display());
            return;
        }

        self.ledger.mark_completed(&discourse.plan.entry.url).await;
        if let Err(e) = self.ledger.save().await {
            error!("❌ Failed to save ledger after {}: {}", title, e);
        }
        summary.discourses_saved += 1;
        info!(
            "💾 Saved {} ({}/{} chapters with transcript) to {}",
            title,
            record.stats.chapters_with_transcript,
            record.stats.total_chapters,
            path.display()
        );
    }
}

/// One worker: pulls units until the queue is empty or the run is cancelled
///
/// The session is created on first use and discarded after a transient
/// failure, so a broken browser never serves a second unit. A page the site
/// rejects outright leaves the session in place.
async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<ChapterTask>>>,
    resolver: Arc<ChapterResolver>,
    factory: Arc<dyn SessionFactory>,
    tx: mpsc::Sender<ChapterOutcome>,
    cancel: CancellationToken,
) {
    let mut session: Option<Box<dyn PageSession>> = None;

    loop {
        if cancel.is_cancelled() {
            info!("🛑 [worker {}] stop requested", worker_id);
            break;
        }

        let Some(task) = queue.lock().await.pop_front() else {
            break;
        };
        debug!("📖 [worker {}] {} {}", worker_id, task.chapter_id(), task.chapter_url);

        if session.is_none() {
            match factory.create().await {
                Ok(created) => session = Some(created),
                Err(e) => {
                    error!("[worker {}] failed to open session: {}", worker_id, e);
                    let outcome = ChapterOutcome { task, result: Err(e.to_string()) };
                    if tx.send(outcome).await.is_err() {
                        break;
                    }
                    continue;
                }
            }
        }
        let Some(active) = session.as_mut() else {
            continue;
        };

        let result = resolver
            .resolve(active.as_mut(), &task.chapter_url, &task.discourse_name)
            .await;

        if let Some(e) = result.as_ref().err().filter(|e| e.is_transient()) {
            warn!("[worker {}] discarding session after failure: {}", worker_id, e);
            if let Some(mut broken) = session.take() {
                broken.shutdown().await;
            }
        }

        let outcome = ChapterOutcome {
            task,
            result: result.map_err(|e| e.to_string()),
        };
        if tx.send(outcome).await.is_err() {
            break;
        }
    }

    if let Some(mut open) = session.take() {
        open.shutdown().await;
    }
    debug!("[worker {}] exiting", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, url: &str, start: u32, end: u32) -> SeriesEntry {
        SeriesEntry::new(title, url, Language::English).with_range(start, end)
    }

    #[test]
    fn test_plan_skips_completed_discourses() {
        let catalog = vec![
            entry("Done", "https://oshoworld.com/done-by-x-1-2", 1, 2),
            entry("Todo", "https://oshoworld.com/todo-by-x-1-3", 1, 3),
        ];
        let completed = BTreeSet::from(["https://oshoworld.com/done-by-x-1-2".to_string()]);

        let plan = plan_work(&catalog, &completed, None);
        assert_eq!(plan.discourses.len(), 1);
        assert_eq!(plan.tasks.len(), 3);
        assert!(plan.tasks.iter().all(|t| t.discourse_index == 1));
        assert_eq!(plan.tasks[0].chapter_id(), "002001");
    }

    #[test]
    fn test_plan_respects_count_and_skips_unexpandable() {
        let catalog = vec![
            SeriesEntry::new("No Range", "https://oshoworld.com/no-range", Language::Hindi),
            entry("A", "https://oshoworld.com/a-by-x-1-2", 1, 2),
            entry("B", "https://oshoworld.com/b-by-x-1-2", 1, 2),
        ];

        let plan = plan_work(&catalog, &BTreeSet::new(), Some(1));
        assert_eq!(plan.skipped, vec!["No Range"]);
        assert_eq!(plan.discourses.len(), 1);
        assert_eq!(plan.discourses[0].entry.title, "A");
        assert_eq!(plan.tasks.len(), 2);
    }

    #[test]
    fn test_writer_sanitizes_file_name() {
        let writer = DiscourseWriter::new(PathBuf::from("output"));
        assert_eq!(
            writer.path_for("Why? Sample: Series"),
            PathBuf::from("output").join("Why Sample Series.json")
        );
    }
}
