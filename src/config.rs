use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::Language;

/// Configuration for the discourse harvester
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Page loading and retry settings
    pub scraper: ScraperConfig,

    /// Headless browser settings (used with the `browser` backend)
    pub browser: BrowserConfig,

    /// Field extraction settings
    pub extraction: ExtractionConfig,

    /// Transcript cleaning heuristics
    pub transcript: TranscriptConfig,

    /// Output and ledger locations
    pub output: OutputConfig,

    /// Media download settings
    pub download: DownloadConfig,

    /// Performance and resource settings
    pub performance: PerformanceConfig,

    /// Read-only API settings
    pub api: ApiConfig,
}

/// Which page session implementation workers use
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// Plain HTTP GET through reqwest
    Http,
    /// Headless Chromium through the DevTools protocol
    Browser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub backend: SessionBackend,

    /// Upper bound for a single page load (seconds)
    pub page_load_timeout_secs: u64,

    /// How long to wait for a readiness selector (seconds)
    pub ready_timeout_secs: u64,

    /// How long to look for a cookie-consent button (seconds)
    pub cookie_timeout_secs: u64,

    /// Retries after the first failed load of a URL
    pub max_retries: u32,

    /// Pause between retries (milliseconds)
    pub retry_delay_ms: u64,

    pub user_agent: String,

    /// Any of these being present marks the page as ready
    pub ready_selectors: Vec<String>,

    /// Visible text of the consent button to click
    pub cookie_button_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub chrome_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Title the site serves when a slug is unknown
    pub homepage_title: String,

    /// Extension identifying audio links
    pub audio_extension: String,

    /// Path fragment of the site's image CDN
    pub image_cdn_pattern: String,

    /// Marker contained in placeholder image URLs
    pub no_image_marker: String,

    /// Longer anchor texts are not treated as tags
    pub max_tag_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Brand name checked together with "Copyright"
    pub brand: String,

    /// Similarity to the discourse name above which numbered lines are dropped
    pub similarity_threshold: f64,

    /// Similarity above which a line counts as a pure repetition of the name
    pub near_identical_threshold: f64,

    /// Upper-case lines shorter than this are treated as headers
    pub header_max_length: usize,

    /// Exact-match navigation and footer phrases
    pub boilerplate: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving one JSON file per discourse
    pub output_dir: PathBuf,

    /// Catalog consumed by the crawl
    pub catalog_file: PathBuf,

    /// Progress ledger location
    pub progress_file: PathBuf,

    /// Run statistics location
    pub stats_file: PathBuf,

    /// Media catalog written by the media-link expansion
    pub media_file: PathBuf,
}

/// A language-specific media catalog offered by the download manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaSource {
    pub label: String,
    pub file: PathBuf,
    /// Used for entries whose own language is unknown
    #[serde(default)]
    pub language: Language,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub base_dir: PathBuf,
    pub state_file: PathBuf,
    pub max_threads: usize,
    pub request_timeout_secs: u64,
    pub sources: Vec<MediaSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Parallel crawl workers, each owning one page session
    pub workers: usize,
}

/// Files republished by the read-only API, keyed by lowercase language
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
    pub files: BTreeMap<String, PathBuf>,
}

impl ScraperConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn cookie_timeout(&self) -> Duration {
        Duration::from_secs(self.cookie_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Http,
            page_load_timeout_secs: 15,
            ready_timeout_secs: 3,
            cookie_timeout_secs: 1,
            max_retries: 2,
            retry_delay_ms: 1000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            ready_selectors: vec![
                ".entry-content".to_string(),
                "article".to_string(),
                "#content".to_string(),
                "main".to_string(),
            ],
            cookie_button_text: "Accept".to_string(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            chrome_args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
                "--window-size=1920,1080".to_string(),
            ],
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            homepage_title: "Osho World".to_string(),
            audio_extension: ".mp3".to_string(),
            image_cdn_pattern: "/_next/image?url=".to_string(),
            no_image_marker: "no_image".to_string(),
            max_tag_length: 50,
        }
    }
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            brand: "Osho".to_string(),
            similarity_threshold: 0.8,
            near_identical_threshold: 0.95,
            header_max_length: 50,
            boilerplate: default_boilerplate(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            catalog_file: PathBuf::from("chapter_links.json"),
            progress_file: PathBuf::from("progress.json"),
            stats_file: PathBuf::from("stats.json"),
            media_file: PathBuf::from("media_links.json"),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("Downloads"),
            state_file: PathBuf::from("download_state.json"),
            max_threads: 16,
            request_timeout_secs: 30,
            sources: vec![
                MediaSource {
                    label: "Hindi".to_string(),
                    file: PathBuf::from("osho_mp3_links.json"),
                    language: Language::Hindi,
                },
                MediaSource {
                    label: "English".to_string(),
                    file: PathBuf::from("osho_mp3_links_english.json"),
                    language: Language::English,
                },
            ],
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            files: BTreeMap::from([
                ("hindi".to_string(), PathBuf::from("hindi.json")),
                ("english".to_string(), PathBuf::from("english.json")),
            ]),
        }
    }
}

/// Navigation, footer and social labels that never belong to a transcript
pub fn default_boilerplate() -> Vec<String> {
    [
        "Home", "OSHO", "About Osho", "Osho Biography", "Osho on Mystic",
        "Osho Photo Gallery", "Osho Dham", "Upcoming Events", "Meditation Programs",
        "Meditation", "Active Meditation", "Passive Meditation", "Discourses",
        "Hindi Audio Discourses", "English Audio Discourses", "Hindi E-Books",
        "English E-Books", "Search Archive", "Video", "News & Media", "News",
        "Osho Art News", "Shop", "Pearls", "Music", "Magazine", "Tarot", "FAQ",
        "Login", "Share", "Whatsapp", "Facebook", "Instagram", "X", "Gmail",
        "Pinterest", "Copied !", "Language :", "Download", "UP NEXT", "Previous",
        "Next", "Related", "Menu", "Search", "0", "/", "#", "english", "hindi",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_paths = [
            "discourse-harvester.toml",
            "config/discourse-harvester.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config.with_env_overrides());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from an explicit TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read config {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&config_str)?;
        Ok(config.with_env_overrides())
    }

    /// Defaults with environment variable overrides
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(workers) = std::env::var("HARVESTER_WORKERS") {
            self.performance.workers = workers.parse().unwrap_or(self.performance.workers);
        }

        if let Ok(output_dir) = std::env::var("HARVESTER_OUTPUT_DIR") {
            self.output.output_dir = PathBuf::from(output_dir);
        }

        if let Ok(progress_file) = std::env::var("HARVESTER_PROGRESS_FILE") {
            self.output.progress_file = PathBuf::from(progress_file);
        }

        if let Ok(threshold) = std::env::var("HARVESTER_SIMILARITY_THRESHOLD") {
            self.transcript.similarity_threshold =
                threshold.parse().unwrap_or(self.transcript.similarity_threshold);
        }

        if let Ok(backend) = std::env::var("HARVESTER_BACKEND") {
            match backend.to_lowercase().as_str() {
                "browser" => self.scraper.backend = SessionBackend::Browser,
                "http" => self.scraper.backend = SessionBackend::Http,
                other => tracing::warn!("Ignoring unknown HARVESTER_BACKEND value: {}", other),
            }
        }

        if let Ok(base_dir) = std::env::var("HARVESTER_DOWNLOAD_DIR") {
            self.download.base_dir = PathBuf::from(base_dir);
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.performance.workers == 0 {
            return Err(anyhow!("workers must be greater than 0"));
        }

        if self.download.max_threads == 0 {
            return Err(anyhow!("download.max_threads must be greater than 0"));
        }

        if self.scraper.page_load_timeout_secs == 0 {
            return Err(anyhow!("page_load_timeout_secs must be greater than 0"));
        }

        for (name, value) in [
            ("similarity_threshold", self.transcript.similarity_threshold),
            ("near_identical_threshold", self.transcript.near_identical_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(anyhow!("{} must be in (0, 1], got {}", name, value));
            }
        }

        if self.scraper.backend == SessionBackend::Browser && !cfg!(feature = "browser") {
            return Err(anyhow!("browser backend requires building with the `browser` feature"));
        }

        if self.scraper.backend == SessionBackend::Browser && self.performance.workers > num_cpus::get() {
            tracing::warn!(
                "⚠️  {} browser workers on {} CPUs; sessions will contend for cores",
                self.performance.workers,
                num_cpus::get()
            );
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Discourse Harvester Configuration:\n\
            - Backend: {:?}\n\
            - Workers: {}\n\
            - Page Load Timeout: {}s (retries: {})\n\
            - Similarity Threshold: {}\n\
            - Output Directory: {}\n\
            - Progress Ledger: {}",
            self.scraper.backend,
            self.performance.workers,
            self.scraper.page_load_timeout_secs,
            self.scraper.max_retries,
            self.transcript.similarity_threshold,
            self.output.output_dir.display(),
            self.output.progress_file.display(),
        )
    }
}

/// Builder for programmatic configuration overrides
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.performance.workers = workers;
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.output_dir = dir;
        self
    }

    pub fn with_progress_file(mut self, path: PathBuf) -> Self {
        self.config.output.progress_file = path;
        self
    }

    pub fn with_stats_file(mut self, path: PathBuf) -> Self {
        self.config.output.stats_file = path;
        self
    }

    pub fn with_backend(mut self, backend: SessionBackend) -> Self {
        self.config.scraper.backend = backend;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.config.transcript.similarity_threshold = threshold;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.config.scraper.max_retries = max_retries;
        self.config.scraper.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
