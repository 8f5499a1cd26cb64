/// Transcript cleaning: separates discourse text from site chrome
///
/// Pages interleave the talk itself with navigation labels, share buttons,
/// playlist entries repeating the series title, dates, timestamps and footer
/// lines. [`TranscriptCleaner::clean`] runs every line through an ordered
/// filter and keeps what survives, deduplicated, in page order.
use super::similarity::ratio;
use crate::config::TranscriptConfig;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, warn};

static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}:\d{2}(?::\d{2})?$").expect("timestamp regex"));
static LONG_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2}(st|nd|rd|th)?,\s*\d{4}$",
    )
    .expect("date regex")
});

/// Why a line was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Blank,
    Boilerplate,
    TitleRepeat,
    SimilarToTitle,
    Timestamp,
    Date,
    Copyright,
    Header,
}

/// Per-discourse matchers derived from the series name
struct TitleMatcher {
    lowered: String,
    bare_repeat: Option<Regex>,
}

impl TitleMatcher {
    fn new(discourse_name: &str) -> Option<Self> {
        let name = discourse_name.trim();
        if name.is_empty() {
            return None;
        }

        let pattern = format!(r"^{}\s*\d*$", regex::escape(name));
        let bare_repeat = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!("Cannot build title pattern for {:?}: {}", name, e);
                None
            }
        };

        Some(Self {
            lowered: name.to_lowercase(),
            bare_repeat,
        })
    }
}

/// Line filter turning raw container text into a transcript
#[derive(Debug, Clone)]
pub struct TranscriptCleaner {
    boilerplate: HashSet<String>,
    brand: String,
    similarity_threshold: f64,
    near_identical_threshold: f64,
    header_max_length: usize,
}

impl TranscriptCleaner {
    pub fn new(config: &TranscriptConfig) -> Self {
        Self {
            boilerplate: config.boilerplate.iter().map(|p| p.trim().to_string()).collect(),
            brand: config.brand.to_lowercase(),
            similarity_threshold: config.similarity_threshold,
            near_identical_threshold: config.near_identical_threshold,
            header_max_length: config.header_max_length,
        }
    }

    /// Clean `lines` scraped from a page of the series `discourse_name`
    ///
    /// Returns `None` when no line survives.
    pub fn clean<S: AsRef<str>>(&self, lines: &[S], discourse_name: &str) -> Option<Vec<String>> {
        let title = TitleMatcher::new(discourse_name);
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        let mut dropped = 0usize;

        for raw in lines {
            let line = raw.as_ref().trim();
            match self.verdict(line, title.as_ref()) {
                Some(_) => dropped += 1,
                None => {
                    if seen.insert(line.to_string()) {
                        kept.push(line.to_string());
                    }
                }
            }
        }

        debug!("🧹 Kept {} lines, dropped {}", kept.len(), dropped);
        (!kept.is_empty()).then_some(kept)
    }

    /// Reason `line` should be dropped for the series `discourse_name`, if any
    pub fn drop_reason(&self, line: &str, discourse_name: &str) -> Option<DropReason> {
        self.verdict(line.trim(), TitleMatcher::new(discourse_name).as_ref())
    }

    fn verdict(&self, line: &str, title: Option<&TitleMatcher>) -> Option<DropReason> {
        if line.is_empty() {
            return Some(DropReason::Blank);
        }

        if self.boilerplate.contains(line) {
            return Some(DropReason::Boilerplate);
        }

        if let Some(title) = title {
            if title.bare_repeat.as_ref().is_some_and(|re| re.is_match(line)) {
                return Some(DropReason::TitleRepeat);
            }

            let similarity = ratio(&line.to_lowercase(), &title.lowered);
            if similarity > self.similarity_threshold {
                let numbered = line.chars().last().is_some_and(|c| c.is_ascii_digit());
                if numbered || similarity >= self.near_identical_threshold {
                    return Some(DropReason::SimilarToTitle);
                }
            }
        }

        if TIMESTAMP.is_match(line) {
            return Some(DropReason::Timestamp);
        }

        if LONG_DATE.is_match(line) {
            return Some(DropReason::Date);
        }

        let lowered = line.to_lowercase();
        if lowered.contains("copyright") && !self.brand.is_empty() && lowered.contains(&self.brand) {
            return Some(DropReason::Copyright);
        }

        if line.chars().count() < self.header_max_length
            && is_upper_case(line)
            && !line.ends_with(['.', '!', '?'])
        {
            return Some(DropReason::Header);
        }

        None
    }
}

/// At least one cased character and no lower-case ones
fn is_upper_case(line: &str) -> bool {
    line.chars().any(char::is_uppercase) && !line.chars().any(char::is_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> TranscriptCleaner {
        TranscriptCleaner::new(&TranscriptConfig::default())
    }

    #[test]
    fn test_empty_input_is_none() {
        let lines: Vec<&str> = Vec::new();
        assert_eq!(cleaner().clean(&lines, "Foo"), None);
        assert_eq!(cleaner().clean(&["   ", "Share", "Home"], "Foo"), None);
    }

    #[test]
    fn test_drops_site_chrome() {
        let c = cleaner();
        let name = "The Path of Love";
        assert_eq!(c.drop_reason("Whatsapp", name), Some(DropReason::Boilerplate));
        assert_eq!(c.drop_reason("The Path of Love 03", name), Some(DropReason::TitleRepeat));
        assert_eq!(c.drop_reason("the path of love", name), Some(DropReason::TitleRepeat));
        assert_eq!(c.drop_reason("The Path of Love - 3", name), Some(DropReason::SimilarToTitle));
        assert_eq!(c.drop_reason("01:12:45", name), Some(DropReason::Timestamp));
        assert_eq!(c.drop_reason("45:10", name), Some(DropReason::Timestamp));
        assert_eq!(c.drop_reason("March 3rd, 1976", name), Some(DropReason::Date));
        assert_eq!(c.drop_reason("Copyright © Osho International", name), Some(DropReason::Copyright));
        assert_eq!(c.drop_reason("RELATED TALKS", name), Some(DropReason::Header));
    }

    #[test]
    fn test_keeps_discourse_text() {
        let c = cleaner();
        let name = "The Path of Love";
        assert_eq!(c.drop_reason("Love is not a relationship, it is a state of being.", name), None);
        assert_eq!(c.drop_reason("I SAY UNTO YOU.", name), None);
        assert_eq!(c.drop_reason("प्रेम एक अवस्था है", name), None);
    }

    #[test]
    fn test_similarity_threshold_is_configurable() {
        let name = "Sample Series";
        let strict = TranscriptCleaner::new(&TranscriptConfig {
            similarity_threshold: 0.99,
            near_identical_threshold: 1.0,
            ..TranscriptConfig::default()
        });
        // "sample serie 2" is close to the title but not a bare repeat
        assert_eq!(strict.drop_reason("Sample Serie 2", name), None);
        assert_eq!(cleaner().drop_reason("Sample Serie 2", name), Some(DropReason::SimilarToTitle));
    }

    #[test]
    fn test_dedup_preserves_first_occurrence_order() {
        let lines = vec!["First line.", "Second line.", "First line.", "Third line.", "Second line."];
        let cleaned = cleaner().clean(&lines, "Foo").unwrap();
        assert_eq!(cleaned, vec!["First line.", "Second line.", "Third line."]);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let lines = vec![
            "Home",
            "  Sample Series 01 ",
            "Sample Series",
            "Beloved ones, the first sutra.",
            "00:45:12",
            "January 14th, 1975",
            "  Meditation is a state of no-mind.  ",
            "SHARE THIS",
            "Beloved ones, the first sutra.",
            "Copyright Osho International Foundation",
        ];
        let c = cleaner();
        let once = c.clean(&lines, "Sample Series").unwrap();
        assert_eq!(
            once,
            vec!["Beloved ones, the first sutra.", "Meditation is a state of no-mind."]
        );
        let twice = c.clean(&once, "Sample Series").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_output_is_subsequence_of_input() {
        let lines = vec!["c line.", "a line.", "b line.", "a line."];
        let cleaned = cleaner().clean(&lines, "Foo").unwrap();
        let mut cursor = lines.iter();
        for kept in &cleaned {
            assert!(cursor.any(|l| l == kept));
        }
    }
}
