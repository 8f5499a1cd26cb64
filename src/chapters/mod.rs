/// Chapter extraction: records, page strategies, transcript cleaning and mismatch recovery
///
/// This module turns a chapter page into a [`ChapterRecord`] and groups records
/// into per-series [`DiscourseRecord`]s.
pub mod extractor;
pub mod resolver;
pub mod similarity;
pub mod strategies;
pub mod transcript;

pub use extractor::PageExtractor;
pub use resolver::ChapterResolver;
pub use transcript::TranscriptCleaner;

use crate::catalog::Language;
use serde::{Deserialize, Serialize};

/// Everything recovered from one chapter page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChapterRecord {
    /// Six-digit discourse + chapter id
    pub id: String,
    pub title: String,
    pub url: String,
    /// Unique, in page order
    pub mp3_links: Vec<String>,
    pub image_url: Option<String>,
    /// `H:MM:SS` or `HH:MM:SS`
    pub duration: Option<String>,
    pub tags: Vec<String>,
    /// Cleaned paragraph lines; `None` means nothing usable was recovered
    pub transcript: Option<Vec<String>>,
}

impl ChapterRecord {
    pub fn has_transcript(&self) -> bool {
        self.transcript.is_some()
    }
}

/// A chapter record plus page-level facts that are not persisted per chapter
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub record: ChapterRecord,
    /// Language declared or implied by the page
    pub language: Language,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DiscourseStats {
    pub total_chapters: usize,
    pub chapters_with_transcript: usize,
    pub chapters_without_transcript: usize,
}

impl DiscourseStats {
    pub fn from_chapters(chapters: &[ChapterRecord]) -> Self {
        let with_transcript = chapters.iter().filter(|c| c.has_transcript()).count();
        Self {
            total_chapters: chapters.len(),
            chapters_with_transcript: with_transcript,
            chapters_without_transcript: chapters.len() - with_transcript,
        }
    }
}

/// One persisted series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscourseRecord {
    pub id: String,
    pub discourse_name: String,
    pub discourse_url: String,
    pub language: Language,
    /// Sorted by chapter index
    pub chapters: Vec<ChapterRecord>,
    pub stats: DiscourseStats,
}

impl DiscourseRecord {
    /// Build a record from `(chapter_index, record)` pairs in any completion order
    pub fn assemble(
        id: String,
        discourse_name: &str,
        discourse_url: &str,
        language: Language,
        mut chapters: Vec<(usize, ChapterRecord)>,
    ) -> Self {
        chapters.sort_by_key(|(chapter_index, _)| *chapter_index);
        let chapters: Vec<ChapterRecord> = chapters.into_iter().map(|(_, record)| record).collect();
        let stats = DiscourseStats::from_chapters(&chapters);

        Self {
            id,
            discourse_name: discourse_name.to_string(),
            discourse_url: discourse_url.to_string(),
            language,
            chapters,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, transcript: bool) -> ChapterRecord {
        ChapterRecord {
            id: id.to_string(),
            transcript: transcript.then(|| vec!["line".to_string()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_assemble_sorts_by_chapter_index() {
        let discourse = DiscourseRecord::assemble(
            "001".into(),
            "Sample",
            "https://x/sample",
            Language::English,
            vec![(2, record("001003", true)), (0, record("001001", false)), (1, record("001002", true))],
        );

        let ids: Vec<&str> = discourse.chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["001001", "001002", "001003"]);
        assert_eq!(discourse.stats.total_chapters, 3);
        assert_eq!(discourse.stats.chapters_with_transcript, 2);
        assert_eq!(discourse.stats.chapters_without_transcript, 1);
    }

    #[test]
    fn test_null_transcript_serializes_as_null() {
        let json = serde_json::to_value(record("001001", false)).unwrap();
        assert!(json["transcript"].is_null());
        assert!(json["image_url"].is_null());
    }
}
