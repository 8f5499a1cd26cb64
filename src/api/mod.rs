//! Read-only HTTP API republishing the discourse lists

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

pub mod handlers;
pub mod server;

/// API server serving static discourse JSON files
#[derive(Debug)]
pub struct ApiServer {
    config: Arc<Config>,
    port: u16,
}

impl ApiServer {
    pub fn new(config: Arc<Config>, port: u16) -> Self {
        Self { config, port }
    }

    /// Serve until the listener fails
    pub async fn start(self) -> Result<()> {
        info!("🚀 Starting API server on port {}", self.port);
        for (language, path) in &self.config.api.files {
            info!("📄 /api/discourses/{} -> {}", language, path.display());
        }

        server::start_http_server(self.config, self.port).await
    }
}
