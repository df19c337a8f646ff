//! linecardd - Line Card Lifecycle Daemon
//!
//! Entry point for the linecardd daemon.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sonic_linecardd::{
    init_logging, LinecardError, LinecardEventOps, LinecardSet, LinecardTransport,
    LinecarddConfig, MemoryTransport, ScanDriver, SubscriberContext, DEFAULT_CONFIG_PATH,
};

/// SONiC Line Card Lifecycle Daemon
#[derive(Parser, Debug)]
#[command(name = "linecardd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// Scan interval in milliseconds
    #[arg(long)]
    scan_interval: Option<u64>,

    /// Bring the line cards up, scan once and exit
    #[arg(long)]
    once: bool,
}

/// Subscriber that records every slot transition in the daemon log.
fn slot_logger() -> LinecardEventOps {
    LinecardEventOps::new()
        .on_provisioned(|slot, state, _| {
            info!(slot, card_type = ?state.card_type(), "Line card provisioned");
            Ok(())
        })
        .on_active(|slot, state, _| {
            info!(
                slot,
                hw_revision = ?state.hw_revision(),
                firmware = ?state.firmware_version().map(|fw| fw.to_string()),
                "Line card active"
            );
        })
        .on_inactive(|slot, _, _| info!(slot, "Line card inactive"))
        .on_unprovisioned(|slot, _, _| info!(slot, "Line card unprovisioned"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("linecardd failed: {:#}", e);
            eprintln!("linecardd: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config_found = args.config.exists();
    let mut config = LinecarddConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.json = true;
    }
    if let Some(interval) = args.scan_interval {
        config.scan.interval_ms = interval;
    }
    config.validate().context("invalid configuration")?;

    init_logging(&config.logging.level, config.logging.json)?;

    info!("--- Starting linecardd (Rust) ---");
    if !config_found {
        warn!(path = %args.config.display(), "Config file not found, using defaults");
    }

    let chassis = Arc::new(MemoryTransport::from_slots(config.chassis.slot_infos()?));
    let transport: Arc<dyn LinecardTransport> = chassis;

    let Some(linecards) = LinecardSet::init(transport).context("line card init")? else {
        info!("No line card slots, nothing to manage");
        return Ok(());
    };
    let linecards = Arc::new(linecards);

    let ops = Arc::new(slot_logger());
    let context: SubscriberContext = Arc::new(());
    linecards.register(ops.clone(), context.clone())?;

    let set = linecards.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || set.post_init()).await? {
        linecards.unregister(&ops, &context);
        return Err(anyhow::Error::new(e).context("line card post-init"));
    }

    let driver = if args.once {
        let set = linecards.clone();
        let report = tokio::task::spawn_blocking(move || set.scan_all()).await?;
        info!(
            scanned = report.scanned,
            changed = report.transitions.len(),
            failed = report.failures.len(),
            "Single scan complete"
        );
        None
    } else {
        let token = CancellationToken::new();
        let (driver, _handle) = ScanDriver::new(
            linecards.clone(),
            config.scan_interval(),
            config.scan.event_queue_depth,
            token.clone(),
        );
        let task = tokio::spawn(driver.run());

        signal::ctrl_c().await?;
        info!("Received shutdown signal");
        Some((token, task))
    };

    shutdown(linecards, driver, &ops, &context).await
}

/// Stops event processing, drains the driver and releases the line cards.
async fn shutdown(
    linecards: Arc<LinecardSet>,
    driver: Option<(CancellationToken, JoinHandle<Result<(), LinecardError>>)>,
    ops: &Arc<LinecardEventOps>,
    context: &SubscriberContext,
) -> Result<()> {
    let set = linecards.clone();
    tokio::task::spawn_blocking(move || set.pre_fini()).await?;

    if let Some((token, task)) = driver {
        token.cancel();
        task.await??;
    }

    info!(stats = ?linecards.stats(), "Line card statistics");
    linecards.unregister(ops, context);

    let linecards = Arc::try_unwrap(linecards)
        .map_err(|_| anyhow!("line cards still referenced at teardown"))?;
    linecards.fini()?;

    info!("linecardd exiting");
    Ok(())
}
