use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lib_consolidator::configs::ConsolidatorConfig;
use lib_consolidator::loggers::setup_logging;
use lib_consolidator::retrieve::HttpFetcher;
use lib_consolidator::Consolidator;
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "poll-watch",
    version,
    about = "Poll a set of paths through one consolidated set of requests and print every event as a JSON line"
)]
struct Args {
    /// Paths to watch, e.g. /vessels/self/navigation/speed
    #[arg(required = true)]
    paths: Vec<String>,

    /// JSON5 configuration file
    #[arg(short, long, env = "CONSOLIDATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL the paths are resolved against (overrides the config file)
    #[arg(short, long, env = "CONSOLIDATOR_BASE_URL")]
    base_url: Option<String>,

    /// Poll rate in milliseconds for every path (defaults to the configured rate)
    #[arg(short, long)]
    rate_ms: Option<u64>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Print the path tree after registering and exit without polling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ConsolidatorConfig::load(path).context(format!("Failed to load config: {:?}", path))?,
        None => ConsolidatorConfig::default(),
    };
    if let Some(base_url) = args.base_url {
        config.base_url = Some(base_url);
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    setup_logging(&config.log_level, config.log_file.as_deref()).context("Failed to initialize logging")?;

    let fetcher = HttpFetcher::with_options(config.require_base_url()?, config.http_options())
        .context("Failed to build HTTP transport")?;
    let engine = Consolidator::with_options(fetcher, config.engine_options());
    let mut events = engine.subscribe();

    let rate = args.rate_ms.map(Duration::from_millis);
    for path in &args.paths {
        let point = engine
            .register(path, rate)
            .context(format!("Failed to register {}", path))?;
        info!("Watching {} (served by {})", path, point);
    }
    info!("Polling {:?}", engine.polled_paths());

    if args.dry_run {
        engine.shutdown();
        println!("{}", serde_json::to_string_pretty(&engine.tree_snapshot())?);
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted. Stopping.");
                engine.shutdown();
                break;
            }
            event = events.recv() => match event {
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => {
                    warn!("Event channel closed");
                    break;
                }
            },
        }
    }

    Ok(())
}
