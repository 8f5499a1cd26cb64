use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::persist::write_json_atomic;

/// Current on-disk ledger schema
///
/// - 0: bare JSON array of completed discourse URLs
/// - 1: `{"completed_discourses": [...]}` without a version field
/// - 2: `{"version": 2, "completed_discourses": [...], "chapter_logs": [...]}`
pub const LEDGER_VERSION: u32 = 2;

/// Outcome of one chapter attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChapterStatus {
    Passed,
    Failed,
}

/// Append-only record of a chapter attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChapterLog {
    pub chapter_id: String,
    pub discourse_id: String,
    pub status: ChapterStatus,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default = "Utc::now")]
    pub logged_at: DateTime<Utc>,
}

/// Persisted ledger contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerState {
    pub version: u32,

    /// Discourse URLs whose record has been written
    pub completed_discourses: BTreeSet<String>,

    #[serde(default)]
    pub chapter_logs: Vec<ChapterLog>,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            completed_discourses: BTreeSet::new(),
            chapter_logs: Vec::new(),
        }
    }
}

/// Schema version of a raw ledger document
fn detect_version(value: &Value) -> Result<u32> {
    match value {
        Value::Array(_) => Ok(0),
        Value::Object(map) => match map.get("version") {
            None => Ok(1),
            Some(v) => v
                .as_u64()
                .map(|v| v as u32)
                .ok_or_else(|| anyhow!("Ledger version is not an integer: {}", v)),
        },
        other => Err(anyhow!("Unrecognised ledger shape: {}", other)),
    }
}

/// Upgrade a raw ledger document one version at a time, then decode it
pub fn migrate(mut value: Value) -> Result<LedgerState> {
    let mut version = detect_version(&value)?;
    if version > LEDGER_VERSION {
        return Err(anyhow!(
            "Ledger version {} is newer than supported version {}",
            version,
            LEDGER_VERSION
        ));
    }

    while version < LEDGER_VERSION {
        value = match version {
            0 => json!({ "completed_discourses": value }),
            1 => {
                let mut map = match value {
                    Value::Object(map) => map,
                    other => return Err(anyhow!("Expected an object for version 1, got {}", other)),
                };
                map.entry("completed_discourses").or_insert_with(|| json!([]));
                map.entry("chapter_logs").or_insert_with(|| json!([]));
                map.insert("version".to_string(), json!(2));
                Value::Object(map)
            }
            _ => unreachable!("versions above {} rejected earlier", LEDGER_VERSION),
        };
        version += 1;
        debug!("⬆️  Migrated ledger to version {}", version);
    }

    serde_json::from_value(value).context("Ledger does not match the current schema")
}

/// Read a ledger file, migrating older shapes; a missing file is an empty ledger
pub async fn load_state(path: &Path) -> Result<LedgerState> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No ledger at {}, starting fresh", path.display());
            return Ok(LedgerState::default());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read ledger {}", path.display())),
    };

    if content.trim().is_empty() {
        warn!("Ledger {} is empty, starting fresh", path.display());
        return Ok(LedgerState::default());
    }

    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Ledger {} is not valid JSON", path.display()))?;
    let original_version = detect_version(&value)?;
    let state = migrate(value)?;

    if original_version < LEDGER_VERSION {
        info!(
            "⬆️  Upgraded ledger {} from version {} to {}",
            path.display(),
            original_version,
            LEDGER_VERSION
        );
    }

    Ok(state)
}

/// Atomically replace the ledger file with `state`
pub async fn save_state(path: &Path, state: &LedgerState) -> Result<()> {
    write_json_atomic(path, state).await
}

/// Progress ledger shared between the scheduler and its reporting
///
/// Workers never touch the ledger; the coordinating task mutates it and
/// saves after each completed discourse.
#[derive(Debug, Clone)]
pub struct ProgressLedger {
    path: PathBuf,
    state: Arc<RwLock<LedgerState>>,
}

impl ProgressLedger {
    /// Load the ledger at `path`
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = load_state(&path).await?;
        info!(
            "📊 Ledger loaded: {} completed discourses, {} chapter logs",
            state.completed_discourses.len(),
            state.chapter_logs.len()
        );

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> LedgerState {
        self.state.read().await.clone()
    }

    pub async fn completed(&self) -> BTreeSet<String> {
        self.state.read().await.completed_discourses.clone()
    }

    pub async fn is_completed(&self, discourse_url: &str) -> bool {
        self.state.read().await.completed_discourses.contains(discourse_url)
    }

    /// Record a discourse whose output file has already been written
    pub async fn mark_completed(&self, discourse_url: &str) {
        self.state
            .write()
            .await
            .completed_discourses
            .insert(discourse_url.to_string());
    }

    pub async fn append_logs(&self, logs: impl IntoIterator<Item = ChapterLog>) {
        self.state.write().await.chapter_logs.extend(logs);
    }

    /// Remove a discourse so the next run redoes it
    pub async fn reset(&self, discourse_url: &str) -> bool {
        self.state.write().await.completed_discourses.remove(discourse_url)
    }

    /// Persist the current state atomically
    pub async fn save(&self) -> Result<()> {
        let state = self.snapshot().await;
        save_state(&self.path, &state).await?;
        debug!("💾 Ledger saved to {}", self.path.display());
        Ok(())
    }

    pub async fn stats(&self) -> LedgerStats {
        let state = self.state.read().await;
        let passed = state
            .chapter_logs
            .iter()
            .filter(|log| log.status == ChapterStatus::Passed)
            .count();

        LedgerStats {
            completed_discourses: state.completed_discourses.len(),
            chapter_attempts: state.chapter_logs.len(),
            chapters_passed: passed,
            chapters_failed: state.chapter_logs.len() - passed,
        }
    }
}

/// Ledger statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerStats {
    pub completed_discourses: usize,
    pub chapter_attempts: usize,
    pub chapters_passed: usize,
    pub chapters_failed: usize,
}
