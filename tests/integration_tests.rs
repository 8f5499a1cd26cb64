use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use discourse_harvester::catalog::{Language, SeriesEntry};
use discourse_harvester::chapters::DiscourseRecord;
use discourse_harvester::config::{Config, ConfigBuilder};
use discourse_harvester::error::{HarvestError, Result};
use discourse_harvester::processing::{RunOptions, RunSummary, Scheduler};
use discourse_harvester::session::{LoadedPage, PageSession, SessionFactory};
use discourse_harvester::state::{ChapterStatus, ProgressLedger};

const HOMEPAGE: &str = r#"<html lang="en"><head><title>Osho World</title></head>
<body><nav>Home</nav><p>Home</p><p>Discourses</p></body></html>"#;

fn chapter_page(title: &str, paragraph: &str) -> String {
    format!(
        r#"<html lang="en"><head><title>{title} | Osho World</title></head><body>
        <h1 class="entry-title">{title}</h1>
        <span class="duration">1:12:30</span>
        <div class="entry-content">
          <h2>{title}</h2>
          <p>{paragraph}</p>
          <p>Whatsapp</p>
          <p>The second paragraph of the talk continues here.</p>
          <a href="/wp-content/uploads/OSHO-Talk_01.mp3">Download</a>
        </div></body></html>"#
    )
}

/// A site served from memory; tracks session lifecycle across workers
#[derive(Default)]
struct FakeSite {
    pages: HashMap<String, String>,
    created: AtomicUsize,
    shut_down: AtomicUsize,
    loads: AtomicUsize,
    /// Pages whose load kills the session
    crashing: Option<String>,
    /// Fired after this many page loads, to simulate an operator interrupt
    cancel_after: Option<(usize, CancellationToken)>,
}

struct FakeSession {
    site: Arc<FakeSite>,
}

#[async_trait]
impl PageSession for FakeSession {
    async fn load(&mut self, url: &str) -> Result<LoadedPage> {
        let count = self.site.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.site.cancel_after {
            if count >= *limit {
                token.cancel();
            }
        }

        if self.site.crashing.as_deref() == Some(url) {
            return Err(HarvestError::Session("renderer crashed".to_string()));
        }

        match self.site.pages.get(url) {
            Some(html) => Ok(LoadedPage {
                requested_url: url.to_string(),
                final_url: url.to_string(),
                html: html.clone(),
            }),
            None => Err(HarvestError::Http {
                status: 404,
                url: url.to_string(),
            }),
        }
    }

    async fn shutdown(&mut self) {
        self.site.shut_down.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeFactory(Arc<FakeSite>);

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn create(&self) -> Result<Box<dyn PageSession>> {
        self.0.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            site: Arc::clone(&self.0),
        }))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

fn test_config(dir: &Path) -> Config {
    ConfigBuilder::new()
        .with_output_dir(dir.join("output"))
        .with_progress_file(dir.join("progress.json"))
        .with_stats_file(dir.join("stats.json"))
        .with_retries(0, 0)
        .build()
}

const SAMPLE_URL: &str = "https://oshoworld.com/sample-series-by-x-1-3";

fn sample_series() -> SeriesEntry {
    SeriesEntry::new("Sample Series", SAMPLE_URL, Language::Unknown).with_range(1, 3)
}

fn sample_pages() -> HashMap<String, String> {
    (1..=3)
        .map(|i| {
            (
                format!("https://oshoworld.com/sample-series-{:02}", i),
                chapter_page(
                    &format!("Sample Series {:02}", i),
                    &format!("Beloved ones, this is talk number {}.", i),
                ),
            )
        })
        .collect()
}

async fn run(
    dir: &Path,
    site: Arc<FakeSite>,
    catalog: &[SeriesEntry],
    workers: usize,
    cancel: CancellationToken,
) -> (RunSummary, ProgressLedger) {
    let config = test_config(dir);
    let ledger = assert_ok!(ProgressLedger::load(config.output.progress_file.clone()).await);
    let scheduler = assert_ok!(Scheduler::new(&config, Arc::new(FakeFactory(site)), ledger.clone()));
    let options = RunOptions { count: None, workers };
    let summary = assert_ok!(scheduler.run(catalog, options, cancel).await);
    (summary, ledger)
}

fn read_discourse(dir: &Path, name: &str) -> DiscourseRecord {
    let path = dir.join("output").join(format!("{}.json", name));
    let content = std::fs::read_to_string(&path).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[tokio::test]
async fn test_sample_series_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let site = Arc::new(FakeSite {
        pages: sample_pages(),
        ..Default::default()
    });

    let (summary, ledger) = run(temp_dir.path(), Arc::clone(&site), &[sample_series()], 1, CancellationToken::new()).await;

    assert_eq!(summary.discourses_saved, 1);
    assert_eq!(summary.chapters_scraped, 3);
    assert_eq!(summary.chapters_with_transcript, 3);
    assert_eq!(summary.transcript_coverage, 1.0);

    let discourse = read_discourse(temp_dir.path(), "Sample Series");
    assert_eq!(discourse.id, "001");
    assert_eq!(discourse.language, Language::English);
    assert_eq!(discourse.stats.total_chapters, 3);
    assert_eq!(discourse.stats.chapters_with_transcript, 3);

    let first = &discourse.chapters[0];
    assert_eq!(first.id, "001001");
    assert_eq!(first.title, "Sample Series 01");
    assert_eq!(first.duration.as_deref(), Some("1:12:30"));
    assert_eq!(first.mp3_links, vec!["https://oshoworld.com/wp-content/uploads/OSHO-Talk_01.mp3"]);
    assert_eq!(
        first.transcript.as_deref().unwrap(),
        [
            "Beloved ones, this is talk number 1.",
            "The second paragraph of the talk continues here.",
        ]
    );

    assert!(ledger.is_completed(SAMPLE_URL).await);
    let persisted = assert_ok!(ProgressLedger::load(temp_dir.path().join("progress.json")).await);
    let state = persisted.snapshot().await;
    assert!(state.completed_discourses.contains(SAMPLE_URL));
    assert_eq!(state.chapter_logs.len(), 3);
    assert!(state.chapter_logs.iter().all(|log| log.status == ChapterStatus::Passed));

    let stats: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(temp_dir.path().join("stats.json")).unwrap()).unwrap();
    assert_eq!(stats["chapters_with_transcript"], 3);
    assert_eq!(stats["discourses_saved"], 1);

    assert_eq!(site.created.load(Ordering::SeqCst), 1);
    assert_eq!(site.shut_down.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_completed_discourse_is_not_redone() {
    let temp_dir = TempDir::new().unwrap();
    let site = Arc::new(FakeSite {
        pages: sample_pages(),
        ..Default::default()
    });
    run(temp_dir.path(), Arc::clone(&site), &[sample_series()], 1, CancellationToken::new()).await;
    let loads_after_first_run = site.loads.load(Ordering::SeqCst);

    let (summary, _) = run(temp_dir.path(), Arc::clone(&site), &[sample_series()], 2, CancellationToken::new()).await;

    assert_eq!(summary.discourses_planned, 0);
    assert_eq!(summary.chapters_planned, 0);
    assert_eq!(site.loads.load(Ordering::SeqCst), loads_after_first_run);
    assert_eq!(site.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_parallel_workers_preserve_chapter_order() {
    let temp_dir = TempDir::new().unwrap();
    let mut pages = sample_pages();
    for i in 1..=5 {
        pages.insert(
            format!("https://oshoworld.com/other-talks-{:02}", i),
            chapter_page(&format!("Other Talks {:02}", i), "Beloved ones, another talk."),
        );
    }
    let site = Arc::new(FakeSite { pages, ..Default::default() });
    let catalog = vec![
        sample_series(),
        SeriesEntry::new("Other Talks", "https://oshoworld.com/other-talks-by-x-1-5", Language::English).with_range(1, 5),
    ];

    let (summary, ledger) = run(temp_dir.path(), Arc::clone(&site), &catalog, 3, CancellationToken::new()).await;

    assert_eq!(summary.discourses_saved, 2);
    assert_eq!(summary.chapters_scraped, 8);

    let other = read_discourse(temp_dir.path(), "Other Talks");
    let ids: Vec<&str> = other.chapters.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["002001", "002002", "002003", "002004", "002005"]);
    assert_eq!(ledger.completed().await.len(), 2);
    assert!(site.created.load(Ordering::SeqCst) <= 3);
    assert_eq!(site.created.load(Ordering::SeqCst), site.shut_down.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_mismatched_chapter_recovers_through_variant() {
    let temp_dir = TempDir::new().unwrap();
    let mut pages = sample_pages();
    pages.insert("https://oshoworld.com/sample-series-02".to_string(), HOMEPAGE.to_string());
    pages.insert(
        "https://oshoworld.com/sample-series-2".to_string(),
        chapter_page("Sample Series 02", "Beloved ones, the recovered talk."),
    );
    let site = Arc::new(FakeSite { pages, ..Default::default() });

    let (summary, _) = run(temp_dir.path(), site, &[sample_series()], 1, CancellationToken::new()).await;
    assert_eq!(summary.chapters_with_transcript, 3);

    let discourse = read_discourse(temp_dir.path(), "Sample Series");
    let second = &discourse.chapters[1];
    assert_eq!(second.id, "001002");
    assert_eq!(second.url, "https://oshoworld.com/sample-series-2");
    assert_eq!(second.title, "Sample Series 02");
}

#[tokio::test]
async fn test_missing_chapter_is_logged_and_session_kept() {
    let temp_dir = TempDir::new().unwrap();
    let mut pages = sample_pages();
    pages.remove("https://oshoworld.com/sample-series-02");
    let site = Arc::new(FakeSite { pages, ..Default::default() });

    let (summary, ledger) = run(temp_dir.path(), Arc::clone(&site), &[sample_series()], 1, CancellationToken::new()).await;

    assert_eq!(summary.chapters_failed, 1);
    assert_eq!(summary.chapters_scraped, 2);
    assert_eq!(site.created.load(Ordering::SeqCst), 1);
    assert_eq!(site.shut_down.load(Ordering::SeqCst), 1);

    let discourse = read_discourse(temp_dir.path(), "Sample Series");
    let ids: Vec<&str> = discourse.chapters.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["001001", "001003"]);

    let state = ledger.snapshot().await;
    let failed: Vec<_> = state
        .chapter_logs
        .iter()
        .filter(|log| log.status == ChapterStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].chapter_id, "001002");
    assert!(failed[0].error.as_deref().unwrap().contains("404"));
}

#[tokio::test]
async fn test_crashed_session_is_replaced() {
    let temp_dir = TempDir::new().unwrap();
    let site = Arc::new(FakeSite {
        pages: sample_pages(),
        crashing: Some("https://oshoworld.com/sample-series-02".to_string()),
        ..Default::default()
    });

    let (summary, _) = run(temp_dir.path(), Arc::clone(&site), &[sample_series()], 1, CancellationToken::new()).await;

    assert_eq!(summary.chapters_failed, 1);
    assert_eq!(summary.chapters_scraped, 2);
    assert_eq!(site.created.load(Ordering::SeqCst), 2);
    assert_eq!(site.shut_down.load(Ordering::SeqCst), 2);

    let discourse = read_discourse(temp_dir.path(), "Sample Series");
    let ids: Vec<&str> = discourse.chapters.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["001001", "001003"]);
}

#[tokio::test]
async fn test_interrupt_saves_partial_discourse_without_marking_it() {
    let temp_dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let site = Arc::new(FakeSite {
        pages: sample_pages(),
        cancel_after: Some((1, cancel.clone())),
        ..Default::default()
    });

    let (summary, ledger) = run(temp_dir.path(), Arc::clone(&site), &[sample_series()], 1, cancel).await;

    assert!(summary.interrupted);
    assert_eq!(summary.chapters_scraped, 1);
    assert_eq!(summary.discourses_saved, 0);
    assert_eq!(summary.discourses_partial, 1);
    assert!(!ledger.is_completed(SAMPLE_URL).await);

    let discourse = read_discourse(temp_dir.path(), "Sample Series");
    assert_eq!(discourse.chapters.len(), 1);
    assert_eq!(site.shut_down.load(Ordering::SeqCst), 1);

    let resumed_site = Arc::new(FakeSite {
        pages: sample_pages(),
        ..Default::default()
    });
    let (resumed, _) = run(temp_dir.path(), resumed_site, &[sample_series()], 1, CancellationToken::new()).await;
    assert_eq!(resumed.chapters_planned, 3);
    assert_eq!(resumed.discourses_saved, 1);
    assert_eq!(read_discourse(temp_dir.path(), "Sample Series").chapters.len(), 3);
}

#[tokio::test]
async fn test_unexpandable_series_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let site = Arc::new(FakeSite {
        pages: sample_pages(),
        ..Default::default()
    });
    let catalog = vec![
        SeriesEntry::new("No Range", "https://oshoworld.com/no-range", Language::Hindi),
        sample_series(),
    ];

    let (summary, _) = run(temp_dir.path(), site, &catalog, 1, CancellationToken::new()).await;

    assert_eq!(summary.discourses_skipped, 1);
    assert_eq!(summary.discourses_saved, 1);
    let discourse = read_discourse(temp_dir.path(), "Sample Series");
    assert_eq!(discourse.id, "002");
    assert_eq!(discourse.chapters[0].id, "002001");
}
