//! Catalog builders that run before a crawl or a download
//!
//! - [`build_catalog`] turns series name lists into the `chapter_links`
//!   catalog consumed by the crawl.
//! - [`expand_media`] visits each series page once, takes the first audio
//!   link and expands it over the episode range into a media catalog.

use anyhow::Result;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::catalog::{load_catalog, patterns, Language, SeriesEntry};
use crate::chapters::PageExtractor;
use crate::persist::write_json_atomic;
use crate::session::{LoadedPage, PageSession};

/// Media catalog entry: every audio file of one series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaEntry {
    pub discourse_name: String,
    pub discourse_url: String,
    #[serde(default)]
    pub language: Language,
    pub mp3_links: Vec<String>,
}

/// Guess a list's language from a file name such as `eng-names.json`
pub fn language_from_file_name(path: &Path) -> Language {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let prefix = stem.split(['-', '_']).next().unwrap_or_default();
    Language::from_label(prefix)
}

/// Read series name lists and expand each entry into explicit chapter links
///
/// Entries whose language is unknown inherit it from the file name. Entries
/// without an episode range are kept with no links so the crawl logs and
/// skips them.
pub async fn build_catalog(names_files: &[PathBuf]) -> Result<Vec<SeriesEntry>> {
    let mut catalog = Vec::new();

    for path in names_files {
        let file_language = language_from_file_name(path);
        let entries = load_catalog(path).await?;
        info!("📚 {} series in {} ({})", entries.len(), path.display(), file_language);

        for mut entry in entries {
            if entry.language == Language::Unknown {
                entry.language = file_language;
            }

            let links = entry.chapter_links();
            if links.is_empty() {
                warn!("⚠️  No chapter links for {}: missing episode range or unknown URL shape", entry.title);
            } else {
                debug!("🔗 {} -> {} chapters", entry.title, links.len());
            }
            entry.chapter_links = Some(links);
            catalog.push(entry);
        }
    }

    let expanded = catalog
        .iter()
        .filter(|entry| entry.chapter_links.as_ref().is_some_and(|links| !links.is_empty()))
        .count();
    info!("✅ Built catalog: {} series, {} with chapter links", catalog.len(), expanded);

    Ok(catalog)
}

/// Outcome of a media expansion pass
#[derive(Debug, Clone, Default)]
pub struct MediaReport {
    pub entries: Vec<MediaEntry>,
    pub failed: Vec<String>,
    pub duplicates: usize,
}

impl MediaReport {
    pub fn total_links(&self) -> usize {
        self.entries.iter().map(|entry| entry.mp3_links.len()).sum()
    }
}

/// First audio link on an already loaded series page
pub fn first_media_link(extractor: &PageExtractor, page: &LoadedPage) -> Option<String> {
    let document = Html::parse_document(&page.html);
    let base = Url::parse(&page.final_url).ok();
    extractor.media_links(&document, base.as_ref()).into_iter().next()
}

/// Build a media catalog, one page load per series
///
/// Series are deduplicated by name; a series is reported as failed when it
/// has no range, its page has no audio link, or the link does not follow a
/// numbered naming scheme.
pub async fn expand_media(
    series: &[SeriesEntry],
    session: &mut dyn PageSession,
    extractor: &PageExtractor,
    cancel: &CancellationToken,
) -> MediaReport {
    let mut report = MediaReport::default();
    let mut seen_names = HashSet::new();

    for (index, entry) in series.iter().enumerate() {
        if cancel.is_cancelled() {
            info!("🛑 Media expansion interrupted after {} series", index);
            break;
        }
        if !seen_names.insert(entry.title.clone()) {
            report.duplicates += 1;
            continue;
        }

        let Some((start, end)) = entry.episode_range() else {
            warn!("[{}/{}] ✗ {}: missing episode range", index + 1, series.len(), entry.title);
            report.failed.push(entry.title.clone());
            continue;
        };

        let first = match session.load(&entry.url).await {
            Ok(page) => first_media_link(extractor, &page),
            Err(e) => {
                warn!("[{}/{}] ✗ {}: {}", index + 1, series.len(), entry.title, e);
                None
            }
        };
        let Some(first) = first else {
            warn!("[{}/{}] ✗ {}: no audio link on page", index + 1, series.len(), entry.title);
            report.failed.push(entry.title.clone());
            continue;
        };

        let mp3_links = patterns::generate(&first, start, end);
        if mp3_links.is_empty() {
            report.failed.push(entry.title.clone());
            continue;
        }

        info!("[{}/{}] 🎧 {}: {} files", index + 1, series.len(), entry.title, mp3_links.len());
        report.entries.push(MediaEntry {
            discourse_name: entry.title.clone(),
            discourse_url: entry.url.clone(),
            language: entry.language,
            mp3_links,
        });
    }

    report
}

pub async fn load_media_catalog(path: &Path) -> Result<Vec<MediaEntry>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

pub async fn save_media_catalog(path: &Path, entries: &[MediaEntry]) -> Result<()> {
    write_json_atomic(path, entries).await?;
    info!("💾 Saved {} media entries to {}", entries.len(), path.display());
    Ok(())
}
