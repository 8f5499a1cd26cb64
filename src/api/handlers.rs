//! Request handling logic, independent of axum

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Failure modes surfaced as HTTP statuses by the server
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("No discourse list for language '{0}'")]
    UnknownLanguage(String),

    #[error("Discourse list {0} is not available")]
    Missing(PathBuf),

    #[error("Discourse list {path} is unreadable: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

pub fn welcome() -> Value {
    serde_json::json!({
        "message": "Welcome to the Osho Discourse API"
    })
}

pub fn health_check() -> Value {
    serde_json::json!({
        "status": "healthy",
        "service": "discourse-harvester",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })
}

/// Read the JSON file configured for `language`
///
/// The file is read on every request so a fresh crawl is visible without a
/// restart.
pub async fn load_discourses(files: &BTreeMap<String, PathBuf>, language: &str) -> Result<Value, ApiError> {
    let key = language.trim().to_lowercase();
    let path = files
        .get(&key)
        .ok_or_else(|| ApiError::UnknownLanguage(key.clone()))?;

    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ApiError::Missing(path.clone())),
        Err(e) => {
            return Err(ApiError::Unreadable {
                path: path.clone(),
                reason: e.to_string(),
            })
        }
    };

    serde_json::from_str(&content).map_err(|e| ApiError::Unreadable {
        path: path.clone(),
        reason: e.to_string(),
    })
}
