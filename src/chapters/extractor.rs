/// Chapter page extraction
///
/// Loads a page through a [`PageSession`] and reads every field with its own
/// strategy cascade. A miss in one field never affects another; only the
/// transcript can come back as `None`.
use super::strategies::{collect_all, detect_language, find_duration, first_match, normalize_whitespace, FieldStrategies};
use super::{ChapterRecord, Extraction, TranscriptCleaner};
use crate::config::Config;
use crate::error::HarvestError;
use crate::session::{LoadedPage, PageSession};
use anyhow::Result;
use scraper::{node::Node, ElementRef, Html};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Elements whose content is never transcript text
const STRUCTURAL_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "aside", "header", "footer", "iframe", "form", "button", "input",
    "select", "textarea", "svg",
];

/// Widget classes that wrap sharing, playlists and related links
const NOISE_CLASSES: &[&str] = &[
    "share", "social", "widget", "sidebar", "related-posts", "navigation", "meta", "tags", "playlist",
    "tracklist", "audio-playlist", "wp-playlist", "jp-playlist",
];

/// Elements that start a new line of text
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "section",
    "article", "tr", "td", "pre", "hr", "figure", "figcaption", "dd", "dt", "main",
];

/// Reads chapter pages into [`ChapterRecord`]s
#[derive(Debug, Clone)]
pub struct PageExtractor {
    strategies: FieldStrategies,
    cleaner: TranscriptCleaner,
    audio_extension: String,
    max_tag_length: usize,
    max_retries: u32,
    retry_delay: Duration,
}

impl PageExtractor {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            strategies: FieldStrategies::new(&config.extraction)?,
            cleaner: TranscriptCleaner::new(&config.transcript),
            audio_extension: config.extraction.audio_extension.to_lowercase(),
            max_tag_length: config.extraction.max_tag_length,
            max_retries: config.scraper.max_retries,
            retry_delay: config.scraper.retry_delay(),
        })
    }

    /// Load `url` and extract a chapter record
    ///
    /// Transient load failures are retried; the error is returned once the
    /// retry bound is exhausted.
    pub async fn extract(
        &self,
        session: &mut dyn PageSession,
        url: &str,
        discourse_name: &str,
    ) -> std::result::Result<Extraction, HarvestError> {
        let page = self.load_with_retries(session, url).await?;
        Ok(self.extract_from_page(&page, discourse_name))
    }

    async fn load_with_retries(
        &self,
        session: &mut dyn PageSession,
        url: &str,
    ) -> std::result::Result<LoadedPage, HarvestError> {
        let mut attempt = 0;
        loop {
            match session.load(url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!("🔄 Retry {}/{} for {}: {}", attempt, self.max_retries, url, e);
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Extract every field from an already loaded page
    pub fn extract_from_page(&self, page: &LoadedPage, discourse_name: &str) -> Extraction {
        let document = Html::parse_document(&page.html);
        let base = Url::parse(&page.final_url).or_else(|_| Url::parse(&page.requested_url)).ok();

        let title = match first_match(&self.strategies.title, &document) {
            Some((strategy, title)) => {
                debug!("Title via {}: {}", strategy, title);
                title
            }
            None => String::new(),
        };

        let mp3_links = self.media_links(&document, base.as_ref());
        let image_url = first_match(&self.strategies.image, &document)
            .map(|(_, src)| absolutize(base.as_ref(), &src));
        let duration = find_duration(&page.html);
        let tags = self.tags(&document);

        let transcript = match self.strategies.container(&document) {
            Some((strategy, container)) => {
                let lines = container_lines(container);
                debug!("📝 Container {} yielded {} raw lines", strategy, lines.len());
                self.cleaner.clean(&lines, discourse_name)
            }
            None => None,
        };

        let language = detect_language(&document, transcript.as_deref());

        if transcript.is_none() {
            info!("⚠️  No transcript recovered from {}", page.requested_url);
        }

        Extraction {
            record: ChapterRecord {
                id: String::new(),
                title,
                url: page.requested_url.clone(),
                mp3_links,
                image_url,
                duration,
                tags,
                transcript,
            },
            language,
        }
    }

    /// Audio URLs from anchors and audio elements, absolute, unique, page order
    pub fn media_links(&self, document: &Html, base: Option<&Url>) -> Vec<String> {
        let mut seen = HashSet::new();
        collect_all(&self.strategies.media, document)
            .into_iter()
            .map(|href| absolutize(base, &href))
            .filter(|href| self.is_audio(href))
            .filter(|href| seen.insert(href.clone()))
            .collect()
    }

    fn is_audio(&self, href: &str) -> bool {
        let path = match Url::parse(href) {
            Ok(url) => url.path().to_lowercase(),
            Err(_) => href.split(['?', '#']).next().unwrap_or(href).to_lowercase(),
        };
        path.ends_with(&self.audio_extension)
    }

    fn tags(&self, document: &Html) -> Vec<String> {
        collect_all(&self.strategies.tags, document)
            .into_iter()
            .filter(|tag| tag.chars().count() <= self.max_tag_length)
            .collect()
    }
}

fn absolutize(base: Option<&Url>, href: &str) -> String {
    match base.and_then(|base| base.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}

/// Text of `container` split into block-level lines, skipping chrome
pub fn container_lines(container: ElementRef<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    let mut buffer = String::new();
    walk(container, &mut lines, &mut buffer);
    flush(&mut lines, &mut buffer);
    lines
}

fn walk(element: ElementRef<'_>, lines: &mut Vec<String>, buffer: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => buffer.push_str(text),
            Node::Element(el) => {
                if is_noise(el) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&el.name());
                if block {
                    flush(lines, buffer);
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    walk(child_element, lines, buffer);
                }
                if block {
                    flush(lines, buffer);
                }
            }
            _ => {}
        }
    }
}

fn flush(lines: &mut Vec<String>, buffer: &mut String) {
    for piece in buffer.split('\n') {
        let line = normalize_whitespace(piece);
        if !line.is_empty() {
            lines.push(line);
        }
    }
    buffer.clear();
}

fn is_noise(element: &scraper::node::Element) -> bool {
    STRUCTURAL_TAGS.contains(&element.name()) || element.classes().any(|class| NOISE_CLASSES.contains(&class))
}
