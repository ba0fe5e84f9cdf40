//! Site Watcher Binary

use clap::{Parser, Subcommand};
use site_watcher::clock::SystemClock;
use site_watcher::{
    AlertDispatcher, Checker, Config, FileLockStore, GatewayClient, ReachabilityChecker, Result,
    RunLock, SiteRegistry, Watcher, WatcherError, phone,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "site_watcher", version, about = "Endpoint reachability watcher with SMS alerts")]
struct Cli {
    /// Directory with one file of phone numbers per endpoint
    #[arg(long, global = true)]
    sites_dir: Option<PathBuf>,

    /// Directory for debounce and run locks
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one watch cycle over the registry
    Watch,
    /// Check a single endpoint and print the result
    Check { endpoint: String },
    /// Send one SMS through the gateway
    Send {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    initialize_tracing();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(sites_dir) = cli.sites_dir {
        config.sites_dir = sites_dir;
    }
    if let Some(state_dir) = cli.state_dir {
        config.state_dir = state_dir;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    let outcome = match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(config).await,
        Command::Check { endpoint } => check(config, &endpoint).await,
        Command::Send { phone, text } => send(config, &phone, &text).await,
    };

    if let Err(e) = outcome {
        error!("Site watcher failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn watch(config: Config) -> Result<()> {
    config.validate_credentials().map_err(WatcherError::Config)?;

    info!("Starting site watcher v{}", env!("CARGO_PKG_VERSION"));

    let Some(_run_lock) = RunLock::acquire(&config.state_dir, config.cooldown).await? else {
        info!("Another watcher run holds the lock in {}, exiting", config.state_dir.display());
        return Ok(());
    };

    let clock = Arc::new(SystemClock);
    let gateway = Arc::new(GatewayClient::from_config(&config)?);
    let checker = Arc::new(ReachabilityChecker::new(
        config.check_timeout,
        config.ping_program.clone(),
        config.follow_redirects,
    )?);
    let locks = Arc::new(FileLockStore::open(&config.state_dir, config.cooldown, clock.clone()).await?);

    let watcher = Watcher::new(
        SiteRegistry::new(&config.sites_dir, config.phone_prefix.clone()),
        checker,
        locks,
        AlertDispatcher::new(gateway),
        clock,
    );

    let summary = watcher.run_cycle().await?;
    info!(
        "Cycle summary: {}",
        serde_json::to_string(&summary).unwrap_or_default()
    );

    Ok(())
}

async fn check(config: Config, endpoint: &str) -> Result<()> {
    let checker = ReachabilityChecker::new(
        config.check_timeout,
        config.ping_program.clone(),
        config.follow_redirects,
    )?;

    let result = checker.check(endpoint).await;
    let rendered = serde_json::to_string(&result)
        .map_err(|e| WatcherError::Other(format!("cannot render result: {}", e)))?;
    println!("{}", rendered);

    Ok(())
}

async fn send(config: Config, raw_phone: &str, text: &str) -> Result<()> {
    config.validate_credentials().map_err(WatcherError::Config)?;

    let phone = phone::normalize(raw_phone, &config.phone_prefix)
        .ok_or_else(|| WatcherError::Config(format!("invalid phone number: {}", raw_phone)))?;

    let gateway = GatewayClient::from_config(&config)?;
    let result = gateway.send(&phone, text, &[]).await;

    if let Err(e) = gateway.logout().await {
        warn!("Gateway logout failed: {}", e);
    }

    let receipt = result?;
    let rendered = serde_json::to_string(&receipt)
        .map_err(|e| WatcherError::Other(format!("cannot render receipt: {}", e)))?;
    println!("{}", rendered);

    Ok(())
}

/// Initialize structured logging
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
