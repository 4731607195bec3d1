use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::Parser;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio::time::MissedTickBehavior;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use baltrack::{
    config::{load_pools_config, PoolConfig},
    db::{models::PoolRecord, HistoryView},
    report::print_results,
    Database, Settings, Tracker,
};

/// Track Balancer pool metrics.
#[derive(Parser, Debug)]
#[command(name = "baltrack", version)]
struct Args {
    /// Chain to query
    #[arg(short, long, default_value = "ethereum")]
    chain: String,

    /// Single pool address or full pool id
    #[arg(short, long)]
    pool: Option<String>,

    /// JSON file with the pool list (defaults to the configured pools file)
    #[arg(short = 'P', long)]
    pools: Option<PathBuf>,

    /// Show the top N pools by TVL
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// Attach Aura Finance staking data to every pool
    #[arg(long)]
    aura: bool,

    /// Print only, do not write the JSON files
    #[arg(long)]
    no_json: bool,

    /// Minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Debug logging
    #[arg(long, conflicts_with = "quiet")]
    verbose: bool,

    /// Keep at most N history entries per pool
    #[arg(long, value_name = "N")]
    max_snapshots: Option<usize>,

    /// Also write a dated archive copy of the snapshot
    #[arg(long, conflicts_with = "no_json")]
    archive: bool,

    /// Print stored history as JSON (all pools, or one pool key) and exit
    #[arg(long, value_name = "KEY", num_args = 0..=1, default_missing_value = "")]
    history: Option<String>,

    /// Restrict --history to the last N days
    #[arg(long, value_name = "N", requires = "history")]
    days: Option<u32>,

    /// Repeat the run every SECS seconds until interrupted
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,

    /// Config file name (extension optional)
    #[arg(long, env = "BALTRACK_CONFIG", default_value = "config")]
    config: String,
}

/// What a single run fetches.
enum Mode {
    Single(String),
    Top(usize),
    Configured(Vec<PoolConfig>),
}

struct Runner {
    tracker: Tracker,
    db: Database,
    mode: Mode,
    chain: String,
    overlay_default: bool,
    save_json: bool,
    archive: bool,
    quiet: bool,
}

impl Runner {
    async fn run_once(&self) -> anyhow::Result<Vec<PoolRecord>> {
        let (records, persisted) = match &self.mode {
            Mode::Single(identifier) => {
                let record = self
                    .tracker
                    .get_pool(&self.chain, identifier, self.tracker.has_overlay_source())
                    .await;
                (record.into_iter().collect::<Vec<_>>(), false)
            },
            Mode::Top(limit) => {
                info!("Fetching top {} pools on {}...", limit, self.chain);
                (self.tracker.top_pools(&self.chain, *limit).await, false)
            },
            Mode::Configured(configs) if self.save_json => {
                let (records, outcome) = self
                    .tracker
                    .fetch_and_save(&self.db, configs, self.overlay_default)
                    .await?;
                (records, outcome.is_some())
            },
            Mode::Configured(configs) => (
                self.tracker.track_pools(configs, self.overlay_default).await,
                false,
            ),
        };

        if self.save_json && !records.is_empty() {
            if !persisted {
                self.db.persist(&records)?;
            }
            if self.archive {
                self.db.snapshots.save_archive(&records)?;
            }
        }

        self.report(&records);
        Ok(records)
    }

    fn report(&self, records: &[PoolRecord]) {
        if !self.quiet {
            print_results(records);
        }
    }
}

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };

    SimpleLogger::new()
        .with_level(level)
        .with_module_level("reqwest", LevelFilter::Warn)
        .with_module_level("hyper_util", LevelFilter::Warn)
        .init()
        .context("Failed to initialise logger")?;

    let mut settings = Settings::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    if args.max_snapshots.is_some() {
        settings.history.max_snapshots = args.max_snapshots;
    }

    if let Some(key) = args.history.as_deref() {
        let db = Database::new(&settings).context("Failed to open data directory")?;
        return print_history(&db, key, args.days);
    }

    let pools_path = args
        .pools
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.pools_file));
    let (pool_configs, file_overlay) = load_pools_config(&pools_path);

    let overlay_default = args.aura || settings.aura.enabled;
    let enable_overlay = overlay_default || file_overlay;
    if enable_overlay {
        info!("Aura Finance integration enabled");
    }

    let mode = if let Some(pool) = args.pool.clone() {
        Mode::Single(pool)
    } else if let Some(top) = args.top {
        Mode::Top(top)
    } else if !pool_configs.is_empty() {
        Mode::Configured(pool_configs)
    } else {
        println!("No pools configured.");
        println!("Use --pool ADDRESS, --top N, or configure {}", pools_path.display());
        return Ok(());
    };

    let runner = Runner {
        tracker: Tracker::from_settings(&settings, enable_overlay)
            .context("Failed to build API clients")?,
        db: Database::new(&settings).context("Failed to open data directory")?,
        mode,
        chain: args.chain.clone(),
        overlay_default,
        save_json: !args.no_json,
        archive: args.archive,
        quiet: args.quiet,
    };

    match args.watch {
        None => {
            runner.run_once().await?;
        },
        Some(secs) => watch(&runner, Duration::from_secs(secs.max(1))).await?,
    }

    Ok(())
}

/// Print the stored history for `key` (empty for every pool) as JSON.
fn print_history(db: &Database, key: &str, days: Option<u32>) -> anyhow::Result<()> {
    let key = Some(key).filter(|k| !k.is_empty());

    let json = match db.history.get(key, days) {
        HistoryView::All(file) => serde_json::to_string_pretty(&file)?,
        HistoryView::Pool(Some(series)) => serde_json::to_string_pretty(&series)?,
        HistoryView::Pool(None) => {
            println!("No history for {}", key.unwrap_or_default());
            return Ok(());
        },
    };

    println!("{json}");
    Ok(())
}

/// Repeat runs on a fixed interval until Ctrl+C or SIGTERM.
///
/// A failed run is logged and the loop keeps going.
async fn watch(runner: &Runner, every: Duration) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("Watching every {:?}. Press Ctrl+C to stop.", every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match runner.run_once().await {
                    Ok(records) => info!("Run finished with {} pools", records.len()),
                    Err(e) => error!("Run failed: {:#}", e),
                }
            },
            res = &mut shutdown => {
                res?;
                break;
            },
        }
    }

    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm_stream =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
    }

    Ok(())
}
