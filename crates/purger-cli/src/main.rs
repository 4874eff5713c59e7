//! purger: keeps the member roster in line with the activity policy.
//!
//! `purger run` pulls the member list on the feed's schedule and keeps the
//! strip / boot candidate roster current. `purger stats` prints the counts
//! and reasons from the last saved state.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use purger_core::app::ClaimLeaseManager;
use purger_core::domain::{RosterStats, StoreError};
use purger_core::impls::JsonFileStore;
use purger_core::ports::{Clock, StateStore, SystemClock};
use purger_core::{PurgerBuilder, Roster};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;

#[derive(Parser)]
#[command(name = "purger")]
#[command(about = "Flags idle and unregistered members for stripping and removal")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "PURGER_CONFIG", default_value = "purger.toml")]
    config: PathBuf,

    /// State file (overrides config file)
    #[arg(long, env = "PURGER_STATE")]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, Default)]
enum Command {
    /// Keep the roster current until SIGINT / SIGTERM
    #[default]
    Run,
    /// Print counts and reasons from the saved state
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("purger=info,purger_core=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if let Some(state) = cli.state {
        config.state.path = state;
    }

    match cli.command.unwrap_or_default() {
        Command::Run => run(config).await,
        Command::Stats => stats(config).await,
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut builder = PurgerBuilder::new()
        .snapshot_source(config.snapshot_source()?)
        .state_store(Arc::new(JsonFileStore::new(config.state.path.clone())))
        .clock(Arc::clone(&clock))
        .purge_policy(config.purge_policy())
        .lease_policy(config.lease_policy());
    if let Some(registry) = config.registry(Arc::clone(&clock)) {
        builder = builder.registry(registry);
    } else {
        info!("no registry configured; every member counts as registered");
    }
    let purger = builder.build()?;

    info!(state = %config.state.path.display(), "starting purger");
    if let Err(err) = purger.restore().await {
        warn!(error = %err, "could not restore saved state; starting empty");
    }

    let reconciliation = purger.spawn_reconciliation();

    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT")?;
    let mut sighup = signal(SignalKind::hangup()).context("registering SIGHUP")?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT");
                break;
            }
            _ = sighup.recv() => {
                info!("received SIGHUP; saving state");
                if let Err(err) = purger.save_now().await {
                    error!(error = %err, "failed to save state");
                }
            }
        }
    }

    reconciliation.abort();
    purger.save_now().await.context("saving state on shutdown")?;
    info!("state saved; exiting");
    Ok(())
}

async fn stats(config: Config) -> anyhow::Result<()> {
    let store = JsonFileStore::new(config.state.path.clone());
    let state = match store.load_all().await {
        Ok(state) => state,
        Err(StoreError::NeverSaved) => {
            println!("No saved state at {}.", config.state.path.display());
            return Ok(());
        }
        Err(err) => return Err(err).context("loading saved state"),
    };

    let roster = Roster::new();
    roster.restore(state, None).await;
    let claims = ClaimLeaseManager::new(roster, config.lease_policy(), Arc::new(SystemClock));

    let stats = claims.snapshot_stats().await;
    let summaries = claims.candidate_summaries().await;
    print!("{}", render_stats(&stats, &summaries));
    Ok(())
}

fn render_stats(stats: &RosterStats, summaries: &[(String, String)]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Total:          {}\n", stats.total));
    out.push_str(&format!("Claimed:        {}\n", stats.claimed));
    out.push_str(&format!("Needs purged:   {}\n", stats.needs_purged));
    out.push_str(&format!("Needs stripped: {}\n", stats.needs_stripped));
    out.push_str(&format!("In stasis:      {}\n", stats.in_stasis));
    if !summaries.is_empty() {
        out.push('\n');
        for (name, reason) in summaries {
            out.push_str(&format!("{name}: {reason}\n"));
        }
    }
    out
}
