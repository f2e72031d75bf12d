use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

use newsroll::feed::{CachingFetcher, Fetcher, HttpFetcher};
use newsroll::store::Template;
use newsroll::{Aggregator, Config, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "newsroll",
    version,
    about = "Fold RSS/Atom feeds into paginated static HTML pages"
)]
struct Args {
    /// Directory holding the pages [default: news]
    #[arg(long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Items kept on the primary page (2-500) [default: 500]
    #[arg(long, value_name = "N")]
    items_per_page: Option<usize>,

    /// Minutes between update cycles (1-1440) [default: 10]
    #[arg(long, value_name = "MINUTES")]
    interval: Option<u64>,

    /// Fetch timeout in seconds (1-60) [default: 10]
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Minimum seconds between two requests to the same host [default: 30]
    #[arg(long, value_name = "SECONDS")]
    min_interval: Option<u64>,

    /// Custom page template with {{sources}}, {{items}} and {{next}} slots
    #[arg(long, value_name = "FILE")]
    template: Option<PathBuf>,

    /// Register every feed listed in an OPML file
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Cache fetched feeds on disk (development aid)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE", default_value = "newsroll.toml")]
    config: PathBuf,

    /// Run a single update cycle and exit
    #[arg(long)]
    once: bool,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Lays command-line values over the file configuration.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(dir) = &self.dir {
            config.directory = dir.clone();
        }
        if let Some(n) = self.items_per_page {
            config.items_per_page = n;
        }
        if let Some(minutes) = self.interval {
            config.update_interval_minutes = minutes;
        }
        if let Some(seconds) = self.timeout {
            config.timeout_seconds = seconds;
        }
        if let Some(seconds) = self.min_interval {
            config.min_request_interval_seconds = seconds;
        }
        if self.template.is_some() {
            config.template = self.template.clone();
        }
        if self.cache_dir.is_some() {
            config.cache_dir = self.cache_dir.clone();
        }
        config.verbose |= self.verbose;
        config.clamped()
    }
}

/// Log sink handed to the aggregator. `RUST_LOG` wins over `verbose`.
fn log_dispatch(verbose: bool) -> Dispatch {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    Dispatch::new(tracing_subscriber::fmt().with_env_filter(filter).finish())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file_config = tracing::dispatcher::with_default(&log_dispatch(args.verbose), || {
        Config::load(&args.config)
    })
    .with_context(|| format!("Failed to load config file '{}'", args.config.display()))?;
    let config = args.apply(file_config);

    let log = log_dispatch(config.verbose);
    run(args, config, log.clone()).with_subscriber(log).await
}

async fn run(args: Args, config: Config, log: Dispatch) -> Result<()> {
    let template = match &config.template {
        Some(path) => Template::load(path).context("Failed to load page template")?,
        None => Template::default(),
    };
    let settings = Settings {
        directory: config.directory.clone(),
        items_per_page: config.items_per_page,
        min_host_interval: config.min_request_interval(),
        template,
    };

    let fetcher = HttpFetcher::new(config.timeout()).context("Failed to build HTTP client")?;
    match &config.cache_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "Serving feeds from development cache");
            serve(args, &config, settings, CachingFetcher::new(fetcher, dir.clone()), log).await
        }
        None => serve(args, &config, settings, fetcher, log).await,
    }
}

async fn serve<F: Fetcher>(
    args: Args,
    config: &Config,
    settings: Settings,
    fetcher: F,
    log: Dispatch,
) -> Result<()> {
    let mut shutdown = shutdown_signal();
    let mut aggregator = Aggregator::new(settings, fetcher, log)
        .await
        .with_context(|| format!("Failed to open page directory '{}'", config.directory.display()))?;

    if let Some(path) = &args.import {
        let count = aggregator
            .import_opml(path)
            .await
            .with_context(|| format!("Failed to import '{}'", path.display()))?;
        println!("Imported {} feeds from {}", count, path.display());
    }

    let interval = config.update_interval();
    loop {
        aggregator.update().await.context("Update cycle failed")?;

        if args.once {
            break;
        }
        tracing::info!(minutes = interval.as_secs() / 60, "Waiting for next cycle");
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                tracing::info!("Received shutdown signal, exiting");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
    Ok(())
}

/// Flips to `true` on Ctrl-C or SIGTERM.
///
/// Installing the handlers replaces the default "terminate now" behavior, so a
/// signal arriving mid-cycle is only noticed once the cycle has finished.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = interrupt => {}
            _ = terminate => {}
        }
        let _ = tx.send(true);
    });
    rx
}
