/// Discourse Harvester
///
/// Crawls multi-episode discourse series from oshoworld.com into one JSON
/// record per series, with resumable progress, and downloads the series audio.

pub mod catalog;
pub mod chapters;
pub mod config;
pub mod download;
pub mod error;
pub mod links;
pub mod persist;
pub mod processing;
pub mod session;
pub mod state;

#[cfg(feature = "api")]
pub mod api;

// Re-export main types for easy access
pub use crate::catalog::{ChapterTask, Language, SeriesEntry};
pub use crate::chapters::{ChapterRecord, ChapterResolver, DiscourseRecord, PageExtractor, TranscriptCleaner};
pub use crate::config::{Config, ConfigBuilder, SessionBackend};
pub use crate::download::{DownloadJob, DownloadManager, DownloadState};
pub use crate::error::HarvestError;
pub use crate::processing::{RunOptions, RunSummary, Scheduler};
pub use crate::session::{LoadedPage, PageSession, SessionFactory};
pub use crate::state::{ChapterLog, ChapterStatus, LedgerState, ProgressLedger};
