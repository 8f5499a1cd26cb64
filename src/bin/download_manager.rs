use anyhow::Result;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use discourse_harvester::config::{Config, MediaSource};
use discourse_harvester::download::{flatten_jobs, DownloadManager, DownloadState};
use discourse_harvester::links::load_media_catalog;

#[derive(Parser)]
#[command(name = "download-manager")]
#[command(about = "Interactive, resumable downloader for discourse audio")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the download directory
    #[arg(long)]
    base_dir: Option<PathBuf>,
}

type Input = Lines<BufReader<Stdin>>;

/// Print `prompt` and read one line; `None` on EOF or interrupt
async fn ask(input: &mut Input, prompt: &str, cancel: &CancellationToken) -> Result<Option<String>> {
    print!("{}", prompt);
    std::io::stdout().flush()?;

    tokio::select! {
        _ = cancel.cancelled() => Ok(None),
        line = input.next_line() => Ok(line?.map(|l| l.trim().to_string())),
    }
}

async fn choose_source<'a>(
    sources: &'a [MediaSource],
    input: &mut Input,
    cancel: &CancellationToken,
) -> Result<Option<&'a MediaSource>> {
    println!("Which discourses to download?");
    for (index, source) in sources.iter().enumerate() {
        println!("  {}. {}", index + 1, source.label);
    }

    let Some(answer) = ask(input, &format!("Enter choice (1-{}): ", sources.len()), cancel).await? else {
        return Ok(None);
    };
    let choice = answer
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| sources.get(i));
    if choice.is_none() {
        println!("Invalid choice. Exiting.");
    }
    Ok(choice)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("discourse_harvester=info,warn")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    if let Some(base_dir) = cli.base_dir {
        config.download.base_dir = base_dir;
    }
    config.validate()?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n\n🛑 Ctrl+C detected! Stopping downloads and saving state...");
            signal_token.cancel();
        }
    });

    let state = DownloadState::load(config.download.state_file.clone()).await?;
    let manager = DownloadManager::new(&config.download, state)?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let result = run_loop(&config, &manager, &mut input, &cancel).await;

    if let Err(e) = manager.state().save().await {
        error!("❌ Error saving state: {}", e);
    }
    result
}

async fn run_loop(
    config: &Config,
    manager: &DownloadManager,
    input: &mut Input,
    cancel: &CancellationToken,
) -> Result<()> {
    let Some(source) = choose_source(&config.download.sources, input, cancel).await? else {
        return Ok(());
    };

    let entries = match load_media_catalog(&source.file).await {
        Ok(entries) => entries,
        Err(e) => {
            println!("❌ Error: cannot read '{}': {}", source.file.display(), e);
            println!("Run `discourse-harvester media` first to generate it.");
            return Ok(());
        }
    };

    let jobs = flatten_jobs(&config.download.base_dir, source.language, &entries);
    println!("📚 Found {} total MP3s for {}.", jobs.len(), source.label);

    while !cancel.is_cancelled() {
        let pending = manager.pending(&jobs).await.len();
        if pending == 0 {
            println!("\n🎉 All files have been downloaded! 🎉");
            break;
        }
        println!(
            "📊 Status: {} downloaded | {} remaining.",
            jobs.len() - pending,
            pending
        );

        let Some(answer) = ask(input, "How many to download next? (e.g., 10, or 0 to exit): ", cancel).await? else {
            break;
        };
        let batch_size: usize = match answer.parse() {
            Ok(n) => n,
            Err(_) => {
                println!("Invalid number. Please try again.");
                continue;
            }
        };
        if batch_size == 0 {
            break;
        }

        let report = manager
            .run(&jobs, batch_size, config.download.max_threads, cancel)
            .await?;
        info!(
            "Batch: {} downloaded, {} failed, {} interrupted ({:.1} MB)",
            report.downloaded,
            report.failed,
            report.interrupted,
            report.bytes as f64 / 1_048_576.0
        );
        if report.failed > 0 {
            warn!("⚠️  {} file(s) failed and remain pending", report.failed);
        }
    }

    Ok(())
}
