/// Episode URL inference from a single example URL and an episode range
///
/// Two numbering conventions are recognised:
/// - media files ending in `_<digits>.<ext>`, where the observed digit width is kept
/// - page slugs such as `series-name-by-author-1-12` or `series-name-04`, expanded as `series-name-NN`
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static MEDIA_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>.+)_(?P<num>\d+)(?P<ext>\.(?i:mp3|m4a|aac|ogg|opus|wav))$")
        .expect("media suffix regex")
});
static BY_AUTHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-by-.*$").expect("author suffix regex"));
static RANGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d+-\d+$").expect("range marker regex"));
static EPISODE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d{2}$").expect("episode suffix regex"));
static EPISODE_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#?\s*(\d+)\s*-\s*(\d+)").expect("episode range regex"));

/// Numbering convention detected in an example URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberingConvention {
    /// `<base>_<NN>.<ext>` with the episode number zero-padded to `width`
    MediaSuffix { base: String, width: usize, extension: String },
    /// `<directory>/<prefix>-<NN>` with a fixed width of two
    PageSlug { directory: String, prefix: String },
}

impl NumberingConvention {
    /// Detect which convention `example_url` follows, if any
    pub fn detect(example_url: &str) -> Option<Self> {
        let trimmed = example_url.trim();

        if let Some(caps) = MEDIA_SUFFIX.captures(trimmed) {
            return Some(NumberingConvention::MediaSuffix {
                base: caps["base"].to_string(),
                width: caps["num"].len(),
                extension: caps["ext"].to_string(),
            });
        }

        let without_fragment = trimmed.split(['#', '?']).next().unwrap_or(trimmed);
        let path = without_fragment.trim_end_matches('/');
        let (directory, slug) = path.rsplit_once('/')?;
        if slug.is_empty() || !directory.contains("://") {
            return None;
        }

        let without_author = BY_AUTHOR.replace(slug, "");
        let without_range = RANGE_MARKER.replace(&without_author, "");
        let prefix = EPISODE_SUFFIX.replace(&without_range, "");

        if prefix == slug || prefix.is_empty() {
            return None;
        }

        Some(NumberingConvention::PageSlug {
            directory: directory.to_string(),
            prefix: prefix.into_owned(),
        })
    }

    /// URL of a single episode under this convention
    pub fn episode_url(&self, episode: u32) -> String {
        match self {
            NumberingConvention::MediaSuffix { base, width, extension } => {
                format!("{}_{:0width$}{}", base, episode, extension, width = *width)
            }
            NumberingConvention::PageSlug { directory, prefix } => {
                format!("{}/{}-{:02}", directory, prefix, episode)
            }
        }
    }
}

/// Derive one URL per episode in `start..=end` from `example_url`
///
/// Returns an empty list when the example follows no known convention or the
/// range is inverted; callers treat that as a per-series skip.
pub fn generate(example_url: &str, start: u32, end: u32) -> Vec<String> {
    if start > end {
        warn!("⚠️  Inverted episode range {}-{} for {}", start, end, example_url);
        return Vec::new();
    }

    match NumberingConvention::detect(example_url) {
        Some(convention) => {
            debug!("🔢 {:?} detected for {}", convention, example_url);
            (start..=end).map(|episode| convention.episode_url(episode)).collect()
        }
        None => {
            warn!("⚠️  No episode numbering recognised in {}", example_url);
            Vec::new()
        }
    }
}

/// Parse an episode range such as `# 1-17` out of a series title
pub fn extract_episode_range(title: &str) -> Option<(u32, u32)> {
    let caps = EPISODE_RANGE.captures(title)?;
    let start: u32 = caps.get(1)?.as_str().parse().ok()?;
    let end: u32 = caps.get(2)?.as_str().parse().ok()?;
    (start >= 1 && start <= end).then_some((start, end))
}
