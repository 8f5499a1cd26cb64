use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use discourse_harvester::catalog::{load_catalog, save_catalog};
use discourse_harvester::chapters::PageExtractor;
use discourse_harvester::config::{Config, ConfigBuilder};
use discourse_harvester::links::{build_catalog, expand_media, save_media_catalog};
use discourse_harvester::processing::{RunOptions, Scheduler};
use discourse_harvester::session::factory_from_config;
use discourse_harvester::state::ProgressLedger;

fn cli() -> Command {
    let command = Command::new("Discourse Harvester")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Crawl oshoworld.com discourse series into per-series JSON records")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("links")
                .about("Expand series name lists into the chapter-links catalog")
                .arg(
                    Arg::new("names")
                        .value_name("FILE")
                        .help("Series list files, e.g. eng-names.json hindi-names.json")
                        .num_args(1..)
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Catalog to write (defaults to output.catalog_file)"),
                ),
        )
        .subcommand(
            Command::new("media")
                .about("Build a media catalog from each series' first audio link")
                .arg(
                    Arg::new("catalog")
                        .value_name("FILE")
                        .help("Series list or catalog to expand")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Media catalog to write (defaults to output.media_file)"),
                ),
        )
        .subcommand(
            Command::new("crawl")
                .about("Scrape every pending series in the catalog")
                .arg(
                    Arg::new("catalog")
                        .long("catalog")
                        .value_name("FILE")
                        .help("Catalog to crawl (defaults to output.catalog_file)"),
                )
                .arg(
                    Arg::new("count")
                        .short('n')
                        .long("count")
                        .value_name("NUM")
                        .help("Maximum number of not-yet-completed series to process")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("workers")
                        .short('w')
                        .long("workers")
                        .value_name("NUM")
                        .help("Number of parallel workers")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("output-dir")
                        .short('o')
                        .long("output-dir")
                        .value_name("DIR")
                        .help("Directory for discourse JSON files"),
                ),
        );

    #[cfg(feature = "api")]
    let command = command.subcommand(
        Command::new("serve")
            .about("Serve discourse lists over HTTP")
            .arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .help("Port to listen on (defaults to api.port)")
                    .value_parser(clap::value_parser!(u16)),
            ),
    );

    command
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let default_filter = if matches.get_flag("verbose") {
        "discourse_harvester=debug,info"
    } else {
        "discourse_harvester=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(&PathBuf::from(path))?,
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received: finishing in-flight work and saving progress");
            signal_token.cancel();
        }
    });

    match matches.subcommand() {
        Some(("links", sub)) => run_links(config, sub).await,
        Some(("media", sub)) => run_media(config, sub, cancel).await,
        Some(("crawl", sub)) => run_crawl(config, sub, cancel).await,
        #[cfg(feature = "api")]
        Some(("serve", sub)) => run_serve(config, sub).await,
        _ => Err(anyhow!("Unknown command")),
    }
}

async fn run_links(config: Config, matches: &ArgMatches) -> Result<()> {
    let names: Vec<PathBuf> = matches
        .get_many::<String>("names")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default();
    let output = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.output.catalog_file.clone());

    let catalog = build_catalog(&names).await?;
    save_catalog(&output, &catalog).await?;
    info!("💾 Catalog with {} series saved to {}", catalog.len(), output.display());
    Ok(())
}

async fn run_media(config: Config, matches: &ArgMatches, cancel: CancellationToken) -> Result<()> {
    let input = matches
        .get_one::<String>("catalog")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("A series list is required"))?;
    let output = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.output.media_file.clone());

    config.validate()?;
    let series = load_catalog(&input).await?;
    let extractor = PageExtractor::new(&config)?;
    let factory = factory_from_config(&config)?;

    let mut session = factory.create().await?;
    let report = expand_media(&series, session.as_mut(), &extractor, &cancel).await;
    session.shutdown().await;

    info!(
        "🎧 {} series expanded into {} files ({} failed, {} duplicates)",
        report.entries.len(),
        report.total_links(),
        report.failed.len(),
        report.duplicates
    );
    save_media_catalog(&output, &report.entries).await
}

async fn run_crawl(config: Config, matches: &ArgMatches, cancel: CancellationToken) -> Result<()> {
    let mut builder = ConfigBuilder::from_config(config);
    if let Some(workers) = matches.get_one::<usize>("workers") {
        builder = builder.with_workers(*workers);
    }
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        builder = builder.with_output_dir(PathBuf::from(dir));
    }
    let config = builder.build();
    config.validate()?;

    let catalog_path = matches
        .get_one::<String>("catalog")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.output.catalog_file.clone());

    info!("🚀 Discourse Harvester starting...");
    info!("{}", config.summary());

    let catalog = load_catalog(&catalog_path).await?;
    let ledger = ProgressLedger::load(config.output.progress_file.clone()).await?;
    let factory = factory_from_config(&config)?;
    let scheduler = Scheduler::new(&config, factory, ledger)?;

    let options = RunOptions {
        count: matches.get_one::<usize>("count").copied(),
        workers: config.performance.workers,
    };

    let summary = scheduler.run(&catalog, options, cancel).await?;
    if summary.interrupted {
        warn!("⏸️  Run interrupted; rerun to resume from the ledger");
    }
    if summary.chapters_failed > 0 {
        error!("❌ {} chapter(s) failed; see chapter_logs in {}", summary.chapters_failed, config.output.progress_file.display());
    }

    Ok(())
}

#[cfg(feature = "api")]
async fn run_serve(config: Config, matches: &ArgMatches) -> Result<()> {
    use discourse_harvester::api::ApiServer;
    use std::sync::Arc;

    let port = matches.get_one::<u16>("port").copied().unwrap_or(config.api.port);
    ApiServer::new(Arc::new(config), port).start().await
}
