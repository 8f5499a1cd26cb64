use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};
use walkdir::WalkDir;

use discourse_harvester::catalog::load_catalog;
use discourse_harvester::processing::DiscourseWriter;
use discourse_harvester::state::{load_state, ChapterStatus, ProgressLedger, LEDGER_VERSION};

#[derive(Parser)]
#[command(name = "progress-manager")]
#[command(about = "Progress ledger inspection and maintenance utility")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "progress.json")]
    ledger: PathBuf,

    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Show ledger statistics
    Stats,
    /// List completed discourses
    List {
        /// Also list failed chapter attempts
        #[arg(long)]
        failures: bool,
    },
    /// Rewrite a legacy ledger in the current schema
    Migrate,
    /// Forget a completed discourse so the next run redoes it
    Reset {
        /// Discourse URL as recorded in the ledger
        discourse_url: String,
    },
    /// Report completed discourses whose output file is missing
    Verify {
        /// Catalog used to map discourse URLs to names
        #[arg(long, default_value = "chapter_links.json")]
        catalog: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let cli = Cli::parse();
    let ledger = ProgressLedger::load(cli.ledger.clone()).await?;

    match cli.command {
        Commands::Stats => {
            let stats = ledger.stats().await;
            info!("📊 Ledger statistics ({}):", cli.ledger.display());
            info!("  Completed discourses: {}", stats.completed_discourses);
            info!("  Chapter attempts: {}", stats.chapter_attempts);
            info!("  Passed: {}", stats.chapters_passed);
            info!("  Failed: {}", stats.chapters_failed);
        }

        Commands::List { failures } => {
            let state = ledger.snapshot().await;
            if state.completed_discourses.is_empty() {
                info!("📭 No completed discourses");
            }
            for url in &state.completed_discourses {
                info!("  ✅ {}", url);
            }

            if failures {
                for log in state.chapter_logs.iter().filter(|log| log.status == ChapterStatus::Failed) {
                    info!(
                        "  ❌ {} {} ({})",
                        log.chapter_id,
                        log.url,
                        log.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }

        Commands::Migrate => {
            let raw: serde_json::Value = match tokio::fs::read_to_string(&cli.ledger).await {
                Ok(content) => serde_json::from_str(&content)?,
                Err(_) => return Err(anyhow!("No ledger at {}", cli.ledger.display())),
            };
            let before = raw.get("version").and_then(|v| v.as_u64());

            // `load` already migrated in memory; saving writes the new shape
            ledger.save().await?;
            let after = load_state(&cli.ledger).await?;
            info!(
                "⬆️  Ledger {} migrated from {} to version {} ({} discourses kept)",
                cli.ledger.display(),
                before.map_or_else(|| "an unversioned shape".to_string(), |v| format!("version {}", v)),
                LEDGER_VERSION,
                after.completed_discourses.len()
            );
        }

        Commands::Reset { discourse_url } => {
            if ledger.reset(&discourse_url).await {
                ledger.save().await?;
                info!("🔄 Reset {}", discourse_url);
            } else {
                warn!("Discourse not found in ledger: {}", discourse_url);
            }
        }

        Commands::Verify { catalog } => {
            let catalog = load_catalog(&catalog).await?;
            let writer = DiscourseWriter::new(cli.output_dir.clone());

            let on_disk: HashSet<PathBuf> = WalkDir::new(&cli.output_dir)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .collect();

            let mut missing = 0;
            for url in ledger.completed().await {
                match catalog.iter().find(|entry| entry.url == url) {
                    Some(entry) => {
                        let expected = writer.path_for(&entry.title);
                        if !on_disk.contains(&expected) {
                            warn!("❌ Missing {} for {}", expected.display(), url);
                            missing += 1;
                        }
                    }
                    None => warn!("⚠️  {} is not in the catalog", url),
                }
            }

            if missing == 0 {
                info!("✅ Every completed discourse has its output file ({} files on disk)", on_disk.len());
            } else {
                warn!("{} completed discourse(s) are missing output; run `reset` on them to redo", missing);
            }
        }
    }

    Ok(())
}
