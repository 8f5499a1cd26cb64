/// Mismatch detection and URL-variant retry
///
/// Generated chapter URLs are guesses. An unknown slug lands on the site's
/// homepage, and some differently padded slugs land on pages with no usable
/// text. Either outcome triggers a bounded search over a few alternate URLs.
use super::{ChapterRecord, Extraction, PageExtractor};
use crate::config::Config;
use crate::error::HarvestError;
use crate::session::PageSession;
use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static VOLUME_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(vol-)(\d+)").expect("volume segment regex"));
static TRAILING_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d+)(/?)$").expect("trailing episode regex"));

/// Resolves a chapter URL, falling back to padding variants on a mismatch
#[derive(Debug, Clone)]
pub struct ChapterResolver {
    extractor: PageExtractor,
    homepage_title: String,
}

impl ChapterResolver {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            extractor: PageExtractor::new(config)?,
            homepage_title: config.extraction.homepage_title.trim().to_lowercase(),
        })
    }

    pub fn extractor(&self) -> &PageExtractor {
        &self.extractor
    }

    /// True when the record came from the wrong page
    pub fn is_mismatch(&self, record: &ChapterRecord) -> bool {
        record.transcript.is_none() || record.title.trim().to_lowercase() == self.homepage_title
    }

    /// Extract `primary_url`, trying variants if the result is a mismatch
    ///
    /// A page that loads but fails the mismatch check, or a load rejected
    /// with a non-transient status such as 404, sends the resolver through
    /// the variants. The first variant that passes the check replaces the
    /// primary result wholesale. If none does, the primary outcome is
    /// returned as is, error included. Transient failures that outlived the
    /// extractor's retries are returned immediately.
    pub async fn resolve(
        &self,
        session: &mut dyn PageSession,
        primary_url: &str,
        discourse_name: &str,
    ) -> std::result::Result<Extraction, HarvestError> {
        let primary = match self.extractor.extract(session, primary_url, discourse_name).await {
            Ok(extraction) if !self.is_mismatch(&extraction.record) => return Ok(extraction),
            Ok(extraction) => {
                info!("🔀 Mismatch at {} (title {:?})", primary_url, extraction.record.title);
                Ok(extraction)
            }
            Err(e) if !e.is_transient() => {
                info!("🔀 {} was rejected: {}", primary_url, e);
                Err(e)
            }
            Err(e) => return Err(e),
        };

        let candidates = candidate_urls(primary_url);
        debug!("Trying {} variant(s) of {}", candidates.len(), primary_url);

        for candidate in candidates {
            match self.extractor.extract(session, &candidate, discourse_name).await {
                Ok(extraction) if !self.is_mismatch(&extraction.record) => {
                    info!("✅ Variant resolved: {}", candidate);
                    return Ok(extraction);
                }
                Ok(_) => debug!("Variant {} is also a mismatch", candidate),
                Err(e) => warn!("Variant {} failed to load: {}", candidate, e),
            }
        }

        primary
    }
}

/// Alternate URLs differing only in numeric zero-padding
///
/// Toggles the `vol-<n>` segment, then the trailing episode number, then
/// both. Never includes `url` itself.
pub fn candidate_urls(url: &str) -> Vec<String> {
    let volume = toggle_volume(url);
    let episode = toggle_episode(url);
    let both = volume.as_deref().and_then(toggle_episode);

    let mut candidates: Vec<String> = Vec::new();
    for candidate in [volume, episode, both].into_iter().flatten() {
        if candidate != url && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

fn toggle_volume(url: &str) -> Option<String> {
    let caps = VOLUME_SEGMENT.captures(url)?;
    let digits = caps.get(2)?;
    let toggled = toggle_padding(digits.as_str())?;
    Some(format!("{}{}{}", &url[..digits.start()], toggled, &url[digits.end()..]))
}

fn toggle_episode(url: &str) -> Option<String> {
    let caps = TRAILING_EPISODE.captures(url)?;
    let digits = caps.get(1)?;
    let toggled = toggle_padding(digits.as_str())?;
    Some(format!("{}{}{}", &url[..digits.start()], toggled, &url[digits.end()..]))
}

/// `04` -> `4`, `4` -> `04`; other widths are left alone
fn toggle_padding(digits: &str) -> Option<String> {
    if digits.len() > 1 && digits.starts_with('0') {
        let trimmed = digits.trim_start_matches('0');
        Some(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
    } else if digits.len() == 1 {
        Some(format!("0{}", digits))
    } else {
        None
    }
}
