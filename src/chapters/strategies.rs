/// Named extraction strategies per page field
///
/// Each field has an ordered list of strategies. Single-valued fields take the
/// first strategy that yields a value; multi-valued fields take the union of
/// every strategy in order. Strategies are plain data so each can be tested
/// against fixture HTML on its own.
use crate::catalog::Language;
use crate::config::ExtractionConfig;
use anyhow::{anyhow, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

static DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}:\d{2}:\d{2}\b").expect("duration regex"));
static LANGUAGE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)language\s*[:\-\x{00A0}]?\s*([A-Za-z\x{0900}-\x{097F}]+)").expect("language label regex")
});

/// Where a strategy reads its value from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Whitespace-normalised text content
    Text,
    /// Value of the named attribute
    Attr(String),
}

/// One named way of reading a field from a document
#[derive(Debug, Clone)]
pub struct Strategy {
    pub name: String,
    css: String,
    selector: Selector,
    source: ValueSource,
    reject_containing: Option<String>,
}

impl Strategy {
    pub fn text(name: &str, css: &str) -> Result<Self> {
        Self::build(name, css, ValueSource::Text)
    }

    pub fn attr(name: &str, css: &str, attribute: &str) -> Result<Self> {
        Self::build(name, css, ValueSource::Attr(attribute.to_string()))
    }

    /// Skip values containing `needle`
    pub fn rejecting(mut self, needle: &str) -> Self {
        self.reject_containing = Some(needle.to_string());
        self
    }

    fn build(name: &str, css: &str, source: ValueSource) -> Result<Self> {
        let selector = parse_selector(css)?;
        Ok(Self {
            name: name.to_string(),
            css: css.to_string(),
            selector,
            source,
            reject_containing: None,
        })
    }

    pub fn css(&self) -> &str {
        &self.css
    }

    /// Every non-empty value this strategy finds, in document order
    pub fn values(&self, document: &Html) -> Vec<String> {
        document
            .select(&self.selector)
            .filter_map(|element| self.read(element))
            .collect()
    }

    /// The first non-empty value, if any
    pub fn first(&self, document: &Html) -> Option<String> {
        document.select(&self.selector).find_map(|element| self.read(element))
    }

    fn read(&self, element: ElementRef<'_>) -> Option<String> {
        let value = match &self.source {
            ValueSource::Text => normalize_whitespace(&element.text().collect::<String>()),
            ValueSource::Attr(attribute) => element.value().attr(attribute)?.trim().to_string(),
        };

        if value.is_empty() {
            return None;
        }
        if let Some(needle) = &self.reject_containing {
            if value.contains(needle.as_str()) {
                return None;
            }
        }
        Some(value)
    }
}

/// Run `strategies` in order and return the first hit with the strategy's name
pub fn first_match<'s>(strategies: &'s [Strategy], document: &Html) -> Option<(&'s str, String)> {
    strategies
        .iter()
        .find_map(|strategy| strategy.first(document).map(|value| (strategy.name.as_str(), value)))
}

/// Union of all strategies' values, first-seen order, no duplicates
pub fn collect_all(strategies: &[Strategy], document: &Html) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    strategies
        .iter()
        .flat_map(|strategy| strategy.values(document))
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

/// A named selector for the element holding the discourse text
#[derive(Debug, Clone)]
pub struct ContainerStrategy {
    pub name: String,
    selector: Selector,
}

impl ContainerStrategy {
    pub fn new(name: &str, css: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            selector: parse_selector(css)?,
        })
    }

    /// First matching element that contains any text
    pub fn find<'a>(&self, document: &'a Html) -> Option<ElementRef<'a>> {
        document
            .select(&self.selector)
            .find(|element| element.text().any(|t| !t.trim().is_empty()))
    }
}

/// Ordered strategies for every extracted field
#[derive(Debug, Clone)]
pub struct FieldStrategies {
    pub title: Vec<Strategy>,
    pub media: Vec<Strategy>,
    pub image: Vec<Strategy>,
    pub tags: Vec<Strategy>,
    pub container: Vec<ContainerStrategy>,
}

impl FieldStrategies {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let title = vec![
            Strategy::text("entry-title", "h1.entry-title")?,
            Strategy::text("post-title", "h1.post-title")?,
            Strategy::text("page-title", "h1.page-title")?,
            Strategy::text("h1", "h1")?,
            Strategy::attr("og:title", r#"meta[property="og:title"]"#, "content")?,
            Strategy::text("document-title", "title")?,
        ];

        let media = vec![
            Strategy::attr("anchor", "a[href]", "href")?,
            Strategy::attr("audio-src", "audio[src], audio source[src]", "src")?,
            Strategy::attr("audio-data-src", "audio[data-src], audio source[data-src]", "data-src")?,
        ];

        let image = vec![
            Strategy::attr("og:image", r#"meta[property="og:image"]"#, "content")?,
            Strategy::attr(
                "cdn-image",
                &format!(r#"img[src*="{}"]"#, config.image_cdn_pattern.replace('"', "")),
                "src",
            )?,
            Strategy::attr("first-image", "img[src]", "src")?.rejecting(&config.no_image_marker),
        ];

        let tags = vec![
            Strategy::text("rel-tag", r#"a[rel~="tag"]"#)?,
            Strategy::text("tag-path", r#"a[href*="/tag/"]"#)?,
            Strategy::text("category-path", r#"a[href*="/category/"]"#)?,
        ];

        let container = vec![
            ContainerStrategy::new("entry-content", ".entry-content")?,
            ContainerStrategy::new("post-content", ".post-content")?,
            ContainerStrategy::new("td-post-content", ".td-post-content")?,
            ContainerStrategy::new("tdb-block-inner", ".tdb-block-inner")?,
            ContainerStrategy::new("article", "article")?,
            ContainerStrategy::new("main-content", ".main-content")?,
            ContainerStrategy::new("content", "#content")?,
            ContainerStrategy::new("main", "#main")?,
            ContainerStrategy::new("body", "body")?,
        ];

        Ok(Self { title, media, image, tags, container })
    }

    /// First container strategy that matches, with its name
    pub fn container<'a>(&self, document: &'a Html) -> Option<(&str, ElementRef<'a>)> {
        self.container
            .iter()
            .find_map(|strategy| strategy.find(document).map(|element| (strategy.name.as_str(), element)))
    }
}

/// First `H:MM:SS` or `HH:MM:SS` token in the raw markup
pub fn find_duration(markup: &str) -> Option<String> {
    DURATION.find(markup).map(|m| m.as_str().to_string())
}

/// Language declared by the page
///
/// Checks a visible `Language : X` label, then the share of Devanagari in the
/// transcript, then the `lang` attribute of the root element.
pub fn detect_language(document: &Html, transcript: Option<&[String]>) -> Language {
    let body_text = normalize_whitespace(&document.root_element().text().collect::<Vec<_>>().join(" "));
    for caps in LANGUAGE_LABEL.captures_iter(&body_text) {
        let language = Language::from_label(&caps[1]);
        if language != Language::Unknown {
            return language;
        }
    }

    if let Some(lines) = transcript {
        let (devanagari, latin) = lines.iter().flat_map(|l| l.chars()).fold((0usize, 0usize), |(d, l), c| {
            if ('\u{0900}'..='\u{097F}').contains(&c) {
                (d + 1, l)
            } else if c.is_ascii_alphabetic() {
                (d, l + 1)
            } else {
                (d, l)
            }
        });
        if devanagari + latin > 0 {
            return if devanagari * 10 >= (devanagari + latin) * 3 {
                Language::Hindi
            } else {
                Language::English
            };
        }
    }

    document
        .root_element()
        .value()
        .attr("lang")
        .map(|lang| Language::from_label(lang.split('-').next().unwrap_or(lang)))
        .unwrap_or_default()
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {:?}: {}", css, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategies() -> FieldStrategies {
        FieldStrategies::new(&ExtractionConfig::default()).unwrap()
    }

    #[test]
    fn test_title_cascade_prefers_specific_heading() {
        let doc = Html::parse_document(
            r#"<html><head><title>Doc Title</title></head>
               <body><h1>Generic</h1><h1 class="entry-title"> Specific  Title </h1></body></html>"#,
        );
        assert_eq!(
            first_match(&strategies().title, &doc),
            Some(("entry-title", "Specific Title".to_string()))
        );
    }

    #[test]
    fn test_title_falls_back_to_meta_then_document_title() {
        let doc = Html::parse_document(
            r#"<html><head><meta property="og:title" content="OG Title"><title>Doc</title></head>
               <body><h1>   </h1></body></html>"#,
        );
        assert_eq!(first_match(&strategies().title, &doc), Some(("og:title", "OG Title".to_string())));

        let doc = Html::parse_document("<html><head><title>Only Doc</title></head><body></body></html>");
        assert_eq!(
            first_match(&strategies().title, &doc),
            Some(("document-title", "Only Doc".to_string()))
        );
    }

    #[test]
    fn test_image_skips_placeholder() {
        let doc = Html::parse_document(
            r#"<body><img src="/img/no_image.png"><img src="/img/cover.jpg"></body>"#,
        );
        assert_eq!(
            first_match(&strategies().image, &doc),
            Some(("first-image", "/img/cover.jpg".to_string()))
        );

        let doc = Html::parse_document(
            r#"<body><img src="/img/cover.jpg"><img src="/_next/image?url=%2Fa.jpg&w=640"></body>"#,
        );
        assert_eq!(first_match(&strategies().image, &doc).unwrap().0, "cdn-image");
    }

    #[test]
    fn test_tags_union_in_order() {
        let doc = Html::parse_document(
            r#"<body>
                 <a rel="tag" href="/t/love">Love</a>
                 <a href="/tag/meditation/">Meditation</a>
                 <a href="/category/talks/">Talks</a>
                 <a href="/tag/love/">Love</a>
               </body>"#,
        );
        assert_eq!(collect_all(&strategies().tags, &doc), vec!["Love", "Meditation", "Talks"]);
    }

    #[test]
    fn test_container_prefers_theme_class_and_skips_empty() {
        let doc = Html::parse_document(
            r#"<body><div class="entry-content">  </div><article><p>Text</p></article></body>"#,
        );
        let strategies = strategies();
        let (name, _) = strategies.container(&doc).unwrap();
        assert_eq!(name, "article");
    }

    #[test]
    fn test_find_duration() {
        assert_eq!(find_duration("<span>Duration 1:02:03</span>"), Some("1:02:03".to_string()));
        assert_eq!(find_duration("<span>12:34</span>"), None);
    }

    #[test]
    fn test_detect_language() {
        let labelled = Html::parse_document(r#"<html lang="en"><body><span>Language :</span> <span>Hindi</span></body></html>"#);
        assert_eq!(detect_language(&labelled, None), Language::Hindi);

        let plain = Html::parse_document(r#"<html lang="en-US"><body><p>Text</p></body></html>"#);
        let hindi_lines = vec!["प्रेम एक अवस्था है".to_string()];
        assert_eq!(detect_language(&plain, Some(&hindi_lines)), Language::Hindi);
        assert_eq!(detect_language(&plain, None), Language::English);
    }

    #[test]
    fn test_invalid_selector_is_error() {
        assert!(Strategy::text("broken", "a[[").is_err());
    }
}
