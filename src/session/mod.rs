//! Page sessions: how workers load rendered pages
//!
//! A [`PageSession`] is owned by exactly one worker. Workers create it lazily
//! through a [`SessionFactory`] on first use, reuse it across units, and shut
//! it down when they stop or when it fails.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, SessionBackend};
use crate::error::{HarvestError, Result};

#[cfg(feature = "browser")]
pub mod browser;
pub mod http;

#[cfg(feature = "browser")]
pub use browser::{BrowserSession, BrowserSessionFactory};
pub use http::{HttpSession, HttpSessionFactory};

/// A page after navigation and the readiness wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPage {
    /// URL passed to [`PageSession::load`]
    pub requested_url: String,
    /// URL after redirects
    pub final_url: String,
    /// Page source at the time of capture
    pub html: String,
}

/// Navigate, wait for content, read the page source
#[async_trait]
pub trait PageSession: Send {
    /// Navigate to `url`, wait for readiness (bounded), dismiss consent
    /// overlays if present, and return the page source
    async fn load(&mut self, url: &str) -> Result<LoadedPage>;

    /// Release the underlying resources
    async fn shutdown(&mut self);
}

/// Creates page sessions for workers
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn PageSession>>;

    /// Short label for logs
    fn name(&self) -> &'static str;
}

/// Build the session factory selected by `config.scraper.backend`
pub fn factory_from_config(config: &Config) -> anyhow::Result<Arc<dyn SessionFactory>> {
    match config.scraper.backend {
        SessionBackend::Http => Ok(Arc::new(HttpSessionFactory::new(config))),
        #[cfg(feature = "browser")]
        SessionBackend::Browser => Ok(Arc::new(BrowserSessionFactory::new(config))),
        #[cfg(not(feature = "browser"))]
        SessionBackend::Browser => Err(anyhow::anyhow!(
            "browser backend requires building with the `browser` feature"
        )),
    }
}

/// Wrap a driver failure as a session error
pub(crate) fn session_error(context: &str, err: impl std::fmt::Display) -> HarvestError {
    HarvestError::Session(format!("{}: {}", context, err))
}
