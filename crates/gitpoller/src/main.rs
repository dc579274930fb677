// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use gitpoller::change::{ChangeSink, LoggingChangeSink, WebhookChangeSink};
use gitpoller::command::{CommandRunner, RealCommandRunner};
use gitpoller::config::load_configs;
use gitpoller::cursor::{JsonFileStateStore, StateStore};
use gitpoller::poller::GitPoller;

/// gitpoller — polls git remotes for new commits and emits change records
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll every configured repository on its own interval until interrupted
    Run(RunArgs),

    /// Poll a single configured repository once and exit
    PollOnce(PollOnceArgs),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the TOML config file listing `[[repo]]` entries
    #[arg(long)]
    config: PathBuf,

    /// Path to the JSON cursor state file
    #[arg(long)]
    state: Option<PathBuf>,

    /// POST change records to this URL instead of just logging them
    #[arg(long)]
    webhook_url: Option<String>,
}

#[derive(Parser, Debug)]
struct PollOnceArgs {
    /// Path to the TOML config file listing `[[repo]]` entries
    #[arg(long)]
    config: PathBuf,

    /// Name of the `[[repo]]` entry to poll (defaults to its repourl)
    #[arg(long)]
    repo: String,

    /// Path to the JSON cursor state file
    #[arg(long)]
    state: Option<PathBuf>,

    /// POST change records to this URL instead of just logging them
    #[arg(long)]
    webhook_url: Option<String>,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = format!("gitpoller={level}");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(false)
        .without_time()
        .init();
}

fn default_basedir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("gitpoller")
}

fn default_state_path(basedir: &std::path::Path) -> PathBuf {
    basedir.join("state.json")
}

async fn build_sink(webhook_url: Option<String>) -> Result<Arc<dyn ChangeSink>> {
    match webhook_url {
        Some(url) => Ok(Arc::new(WebhookChangeSink::new(url)?)),
        None => Ok(Arc::new(LoggingChangeSink)),
    }
}

async fn build_pollers(
    config_path: &std::path::Path,
    state_path: &std::path::Path,
    webhook_url: Option<String>,
) -> Result<Vec<GitPoller>> {
    let basedir = default_basedir();
    let contents = std::fs::read_to_string(config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let configs = load_configs(&contents, &basedir)
        .with_context(|| format!("parsing {}", config_path.display()))?;

    let runner: Arc<dyn CommandRunner> = Arc::new(RealCommandRunner::default());
    let sink = build_sink(webhook_url).await?;
    let store: Arc<dyn StateStore> = Arc::new(JsonFileStateStore::open(state_path).await?);

    Ok(configs
        .into_iter()
        .map(|config| GitPoller::new(config, runner.clone(), sink.clone(), store.clone()))
        .collect())
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let state_path = args
        .state
        .unwrap_or_else(|| default_state_path(&default_basedir()));
    let pollers = build_pollers(&args.config, &state_path, args.webhook_url).await?;
    if pollers.is_empty() {
        anyhow::bail!("no [[repo]] entries found in {}", args.config.display());
    }

    // Cancellation is cooperative at subprocess boundaries (spec §5): on
    // Ctrl-C each poller task finishes whatever `poll()` call is in flight,
    // then exits instead of starting another cycle.
    let (shutdown_tx, _) = tokio::sync::watch::channel(false);

    let mut handles = Vec::with_capacity(pollers.len());
    for poller in pollers {
        let poller = Arc::new(poller);
        let mut shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(async move {
            loop {
                if let Err(err) = poller.poll().await {
                    tracing::error!(repo = %poller.name(), error = %err, "poll failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(poller.poll_interval()) => {}
                    _ = shutdown_rx.changed() => break,
                }
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }));
    }

    let join_all = async move {
        for handle in handles {
            handle.await.context("poller task panicked")?;
        }
        Ok::<(), anyhow::Error>(())
    };
    tokio::pin!(join_all);

    tokio::select! {
        result = &mut join_all => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt, waiting for in-flight polls to finish");
            let _ = shutdown_tx.send(true);
            (&mut join_all).await?;
        }
    }
    Ok(())
}

async fn cmd_poll_once(args: PollOnceArgs) -> Result<()> {
    let state_path = args
        .state
        .unwrap_or_else(|| default_state_path(&default_basedir()));
    let pollers = build_pollers(&args.config, &state_path, args.webhook_url).await?;
    let poller = pollers
        .into_iter()
        .find(|p| p.name() == args.repo)
        .ok_or_else(|| anyhow::anyhow!("no repo named {:?} in {}", args.repo, args.config.display()))?;
    poller.poll().await.context("poll failed")
}

fn cmd_completions(shell: clap_complete::Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "gitpoller", &mut std::io::stdout());
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::PollOnce(args) => cmd_poll_once(args).await,
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
