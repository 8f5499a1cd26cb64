//! Headless Chromium page session over the DevTools protocol
//!
//! One session owns one browser process and reuses a single tab for every
//! page it loads.

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig as CdpBrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{session_error, LoadedPage, PageSession, SessionFactory};
use crate::config::Config;
use crate::error::{HarvestError, Result};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    page_load_timeout: Duration,
    ready_timeout: Duration,
    cookie_timeout: Duration,
    ready_selectors: Vec<String>,
    cookie_button_text: String,
}

impl BrowserSession {
    /// Launch a browser process and open a blank tab
    pub async fn launch(config: &Config) -> Result<Self> {
        info!("🚀 Launching browser (headless={})", config.browser.headless);

        let mut builder = CdpBrowserConfig::builder().request_timeout(config.scraper.page_load_timeout());
        if let Some(ref executable) = config.browser.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        if !config.browser.headless {
            builder = builder.with_head();
        }
        builder = builder.arg(format!("--user-agent={}", config.scraper.user_agent));
        for arg in &config.browser.chrome_args {
            builder = builder.arg(arg);
        }

        let cdp_config = builder
            .build()
            .map_err(|e| session_error("Failed to build browser config", e))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| session_error("Failed to launch browser", e))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| session_error("Failed to open tab", e))?;

        Ok(Self {
            browser,
            page,
            handler,
            page_load_timeout: config.scraper.page_load_timeout(),
            ready_timeout: config.scraper.ready_timeout(),
            cookie_timeout: config.scraper.cookie_timeout(),
            ready_selectors: config.scraper.ready_selectors.clone(),
            cookie_button_text: config.scraper.cookie_button_text.clone(),
        })
    }

    /// Poll for any ready selector until the readiness timeout
    async fn wait_until_ready(&self) -> bool {
        if self.ready_selectors.is_empty() {
            return true;
        }

        let deadline = tokio::time::Instant::now() + self.ready_timeout;
        loop {
            for selector in &self.ready_selectors {
                if self.page.find_element(selector.as_str()).await.is_ok() {
                    return true;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Click a consent button if one shows up quickly
    async fn dismiss_cookie_banner(&self) {
        let wanted = self.cookie_button_text.trim().to_lowercase();
        if wanted.is_empty() {
            return;
        }

        let attempt = async {
            let buttons = self.page.find_elements("button").await.ok()?;
            for button in buttons {
                let text = button.inner_text().await.ok().flatten().unwrap_or_default();
                if text.trim().to_lowercase() == wanted {
                    button.click().await.ok()?;
                    return Some(());
                }
            }
            None
        };

        match tokio::time::timeout(self.cookie_timeout, attempt).await {
            Ok(Some(())) => debug!("🍪 Dismissed consent banner"),
            _ => debug!("No consent banner"),
        }
    }
}

#[async_trait]
impl PageSession for BrowserSession {
    async fn load(&mut self, url: &str) -> Result<LoadedPage> {
        debug!("📄 Navigating to: {}", url);

        match tokio::time::timeout(self.page_load_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(HarvestError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(HarvestError::Timeout(self.page_load_timeout, url.to_string())),
        }

        if !self.wait_until_ready().await {
            warn!("⏳ No content marker on {} after {:?}", url, self.ready_timeout);
        }
        self.dismiss_cookie_banner().await;

        let html = self
            .page
            .content()
            .await
            .map_err(|e| session_error("Failed to read page source", e))?;
        let final_url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        Ok(LoadedPage {
            requested_url: url.to_string(),
            final_url,
            html,
        })
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        info!("🛑 Browser session closed");
    }
}

/// Launches one browser process per session
pub struct BrowserSessionFactory {
    config: Config,
}

impl BrowserSessionFactory {
    pub fn new(config: &Config) -> Self {
        Self { config: config.clone() }
    }
}

#[async_trait]
impl SessionFactory for BrowserSessionFactory {
    async fn create(&self) -> Result<Box<dyn PageSession>> {
        Ok(Box::new(BrowserSession::launch(&self.config).await?))
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}
