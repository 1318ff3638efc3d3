//! memc-load - load device-install logs into memcached

use anyhow::Result;
use clap::Parser;
use memc_common::logging::{init_logging, LogConfig, LogLevel};
use memc_load::config::{
    LoaderConfig, DEFAULT_ADID_ADDR, DEFAULT_DVID_ADDR, DEFAULT_GAID_ADDR, DEFAULT_IDFA_ADDR,
    DEFAULT_PATTERN, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS,
};
use memc_load::selftest::run_self_test;
use memc_load::stats::DEFAULT_ERROR_THRESHOLD;
use memc_load::store::MemcacheConnector;
use memc_load::JobScheduler;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "memc-load")]
#[command(author, version, about = "Load device-install logs into memcached")]
struct Cli {
    /// Run the built-in self-test and exit
    #[arg(short, long)]
    test: bool,

    /// Write logs to this file instead of stdout
    #[arg(short, long, env = "MEMC_LOAD_LOG")]
    log: Option<PathBuf>,

    /// Log payloads instead of writing them
    #[arg(long, env = "MEMC_LOAD_DRY")]
    dry: bool,

    /// Glob pattern for input files
    #[arg(long, env = "MEMC_LOAD_PATTERN", default_value = DEFAULT_PATTERN)]
    pattern: String,

    /// memcached address for idfa records
    #[arg(long, env = "MEMC_LOAD_IDFA", default_value = DEFAULT_IDFA_ADDR)]
    idfa: String,

    /// memcached address for gaid records
    #[arg(long, env = "MEMC_LOAD_GAID", default_value = DEFAULT_GAID_ADDR)]
    gaid: String,

    /// memcached address for adid records
    #[arg(long, env = "MEMC_LOAD_ADID", default_value = DEFAULT_ADID_ADDR)]
    adid: String,

    /// memcached address for dvid records
    #[arg(long, env = "MEMC_LOAD_DVID", default_value = DEFAULT_DVID_ADDR)]
    dvid: String,

    /// Number of files loaded concurrently
    #[arg(short, long, env = "MEMC_LOAD_WORKERS", default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Highest acceptable error rate per file (exclusive)
    #[arg(long, env = "MEMC_LOAD_ERR_THRESHOLD", default_value_t = DEFAULT_ERROR_THRESHOLD)]
    err_threshold: f64,

    /// Capacity of each per-type queue
    #[arg(long, env = "MEMC_LOAD_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,
}

impl Cli {
    fn loader_config(&self) -> LoaderConfig {
        LoaderConfig::new()
            .with_pattern(&self.pattern)
            .with_device_memc([
                ("idfa", &self.idfa),
                ("gaid", &self.gaid),
                ("adid", &self.adid),
                ("dvid", &self.dvid),
            ])
            .with_workers(self.workers)
            .with_dry_run(self.dry)
            .with_error_threshold(self.err_threshold)
            .with_queue_capacity(self.queue_capacity)
    }

    fn log_config(&self) -> Result<LogConfig> {
        let mut builder = LogConfig::builder().level(if self.dry {
            LogLevel::Debug
        } else {
            LogLevel::Info
        });
        if let Some(ref path) = self.log {
            builder = builder.log_file(path);
        }

        // Environment variables take precedence
        builder.build().merge_env()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _guard = init_logging(&cli.log_config()?)?;

    if cli.test {
        run_self_test()?;
        info!("Self-test passed");
        return Ok(());
    }

    let config = cli.loader_config();
    info!(options = %serde_json::to_string(&config)?, "memc-load started");

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let connector = Arc::new(MemcacheConnector::new(config.store_timeout));
    let scheduler = JobScheduler::new(config, connector, shutdown)?;

    match scheduler.run().await {
        Ok(summary) => {
            info!(summary = %serde_json::to_string(&summary)?, "memc-load finished");
            Ok(())
        },
        Err(e) => {
            error!("Unexpected error: {:#}", e);
            Err(e)
        },
    }
}

/// Cancel `token` on Ctrl+C or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, finishing running jobs"),
        _ = terminate => info!("Received terminate signal, finishing running jobs"),
    }
    token.cancel();
}
