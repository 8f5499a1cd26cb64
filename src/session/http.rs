/// Plain HTTP page session backed by reqwest
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::{session_error, LoadedPage, PageSession, SessionFactory};
use crate::config::Config;
use crate::error::{HarvestError, Result};

/// Fetches pages with a single GET; no script execution
///
/// Markup arrives complete, so there is nothing to wait for once the body
/// is read.
pub struct HttpSession {
    client: Client,
    timeout: Duration,
}

impl HttpSession {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.scraper.page_load_timeout())
            .user_agent(config.scraper.user_agent.clone())
            .build()
            .map_err(|e| session_error("Failed to build HTTP client", e))?;

        Ok(Self {
            client,
            timeout: config.scraper.page_load_timeout(),
        })
    }
}

#[async_trait]
impl PageSession for HttpSession {
    async fn load(&mut self, url: &str) -> Result<LoadedPage> {
        debug!("📄 Fetching page: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                HarvestError::Timeout(self.timeout, url.to_string())
            } else {
                HarvestError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let final_url = response.url().to_string();
        let html = response.text().await?;

        Ok(LoadedPage {
            requested_url: url.to_string(),
            final_url,
            html,
        })
    }

    async fn shutdown(&mut self) {}
}

/// Creates [`HttpSession`]s sharing one configuration
pub struct HttpSessionFactory {
    config: Config,
}

impl HttpSessionFactory {
    pub fn new(config: &Config) -> Self {
        Self { config: config.clone() }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn create(&self) -> Result<Box<dyn PageSession>> {
        info!("🌐 Opening HTTP session");
        Ok(Box::new(HttpSession::new(&self.config)?))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
