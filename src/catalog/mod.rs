/// Series catalog: the crawl's input model
///
/// A catalog is a JSON array of series entries. Entries either carry their
/// `chapter_links` directly or an episode range from which links are derived.
pub mod patterns;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// Language a series is published in
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Hindi,
    English,
    #[default]
    Unknown,
}

impl Language {
    /// Map a free-form label (`hindi`, `eng`, `English`, `हिंदी`, ...) onto a language
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "hindi" | "hi" | "हिंदी" | "हिन्दी" => Language::Hindi,
            "english" | "eng" | "en" => Language::English,
            _ => Language::Unknown,
        }
    }

    /// Directory name used for downloads
    pub fn dir_name(&self) -> &'static str {
        match self {
            Language::Hindi => "Hindi",
            Language::English => "English",
            Language::Unknown => "Unknown",
        }
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.map(|label| Language::from_label(&label)).unwrap_or_default())
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Language::Hindi => "hindi",
            Language::English => "english",
            Language::Unknown => "unknown",
        })
    }
}

/// One multi-episode series from the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesEntry {
    #[serde(rename = "discourse_name", alias = "title")]
    pub title: String,

    /// Canonical series (or first chapter) URL
    #[serde(rename = "discourse_url", alias = "url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_episode: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_episode: Option<u32>,

    /// Confirmed episode URL used as the template instead of `url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_links: Option<Vec<String>>,

    #[serde(default)]
    pub language: Language,
}

impl SeriesEntry {
    pub fn new(title: &str, url: &str, language: Language) -> Self {
        Self {
            title: title.to_string(),
            url: url.to_string(),
            start_episode: None,
            end_episode: None,
            example_url: None,
            chapter_links: None,
            language,
        }
    }

    pub fn with_range(mut self, start: u32, end: u32) -> Self {
        self.start_episode = Some(start);
        self.end_episode = Some(end);
        self
    }

    /// Episode range, falling back to a `# 1-17` marker in the title
    pub fn episode_range(&self) -> Option<(u32, u32)> {
        match (self.start_episode, self.end_episode) {
            (Some(start), Some(end)) if start >= 1 && start <= end => Some((start, end)),
            (Some(_), Some(_)) => None,
            _ => patterns::extract_episode_range(&self.title),
        }
    }

    /// Chapter page URLs in episode order
    ///
    /// Explicit `chapter_links` win; otherwise links are generated from the
    /// example URL (or the series URL) over the episode range. An empty list
    /// means the series cannot be expanded.
    pub fn chapter_links(&self) -> Vec<String> {
        if let Some(links) = self.chapter_links.as_ref().filter(|links| !links.is_empty()) {
            return links.clone();
        }

        let Some((start, end)) = self.episode_range() else {
            debug!("No episode range for {}", self.title);
            return Vec::new();
        };

        let template = self.example_url.as_deref().unwrap_or(&self.url);
        patterns::generate(template, start, end)
    }
}

/// One chapter to extract, identified by `(discourse_index, chapter_index)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterTask {
    pub discourse_index: usize,
    pub discourse_name: String,
    pub chapter_index: usize,
    pub chapter_url: String,
}

impl ChapterTask {
    /// Six-digit id: three digits of discourse, three of chapter, both 1-based
    pub fn chapter_id(&self) -> String {
        format!("{}{:03}", discourse_id(self.discourse_index), self.chapter_index + 1)
    }

    pub fn discourse_id(&self) -> String {
        discourse_id(self.discourse_index)
    }
}

/// Three-digit, 1-based discourse id
pub fn discourse_id(discourse_index: usize) -> String {
    format!("{:03}", discourse_index + 1)
}

/// Load a catalog file, skipping malformed entries
pub async fn load_catalog(path: &Path) -> Result<Vec<SeriesEntry>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    let raw: Vec<serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("Catalog {} is not a JSON array", path.display()))?;

    let mut entries = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<SeriesEntry>(value) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("⚠️  Skipping malformed catalog entry #{}: {}", index, e),
        }
    }

    info!("📚 Loaded {} series from {}", entries.len(), path.display());
    Ok(entries)
}

/// Write a catalog file as pretty JSON
pub async fn save_catalog(path: &Path, entries: &[SeriesEntry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    crate::persist::write_atomic(path, json.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_language_labels() {
        assert_eq!(Language::from_label("eng"), Language::English);
        assert_eq!(Language::from_label("Hindi"), Language::Hindi);
        assert_eq!(Language::from_label("हिन्दी"), Language::Hindi);
        assert_eq!(Language::from_label("french"), Language::Unknown);
    }

    #[test]
    fn test_entry_accepts_both_shapes() {
        let from_names: SeriesEntry = serde_json::from_str(
            r#"{"title": "Sample Series", "url": "https://oshoworld.com/sample-series-by-x-1-3",
                "start_episode": 1, "end_episode": 3, "language": "eng"}"#,
        )
        .unwrap();
        assert_eq!(from_names.language, Language::English);
        assert_eq!(from_names.episode_range(), Some((1, 3)));

        let from_links: SeriesEntry = serde_json::from_str(
            r#"{"discourse_name": "Other", "discourse_url": "https://oshoworld.com/other",
                "chapter_links": ["https://oshoworld.com/other-01"], "language": null}"#,
        )
        .unwrap();
        assert_eq!(from_links.language, Language::Unknown);
        assert_eq!(from_links.chapter_links(), vec!["https://oshoworld.com/other-01"]);
    }

    #[test]
    fn test_chapter_links_from_range() {
        let entry = SeriesEntry::new(
            "Sample Series",
            "https://oshoworld.com/sample-series-by-x-1-3",
            Language::English,
        )
        .with_range(1, 3);

        let links = entry.chapter_links();
        assert_eq!(links.len(), 3);
        assert!(links[0].ends_with("-01"));
        assert!(links[2].ends_with("-03"));
    }

    #[test]
    fn test_missing_range_yields_no_links() {
        let entry = SeriesEntry::new("Untitled", "https://oshoworld.com/untitled-by-x", Language::Hindi);
        assert!(entry.chapter_links().is_empty());
    }

    #[test]
    fn test_range_from_title() {
        let entry = SeriesEntry::new("Sample Series # 2-4", "https://oshoworld.com/sample-by-x", Language::Hindi);
        assert_eq!(entry.episode_range(), Some((2, 4)));
        assert_eq!(entry.chapter_links().len(), 3);
    }

    #[test]
    fn test_chapter_id_format() {
        let task = ChapterTask {
            discourse_index: 0,
            discourse_name: "Sample".into(),
            chapter_index: 11,
            chapter_url: "https://x/sample-12".into(),
        };
        assert_eq!(task.chapter_id(), "001012");
        assert_eq!(task.discourse_id(), "001");
    }

    #[tokio::test]
    async fn test_load_catalog_skips_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("chapter_links.json");
        tokio::fs::write(
            &path,
            r#"[{"discourse_name": "Good", "discourse_url": "https://x/good-by-y-1-2", "start_episode": 1, "end_episode": 2},
                {"no_title": true}]"#,
        )
        .await
        .unwrap();

        let entries = load_catalog(&path).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Good");
    }
}
