//! Shelver launcher
//!
//! - `run`: watch every configured root and reconcile on a schedule
//! - `reconcile`: one full pass, then exit
//! - `check`: validate the configuration and print the rule table
//! - `purge-tags`: drop every tag under the samples root

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shelver::config::default_config_path;
use shelver::{Daemon, Dispatcher, JsonTagStore, LocalFileOps, Reconciler, ShelverConfig};
use shelver_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "shelver", about = "Rule-driven sample library organizer", version)]
struct Cli {
    /// Configuration file (defaults to ~/.shelver/shelver.toml)
    #[arg(short, long, global = true, env = "SHELVER_CONFIG")]
    config: Option<PathBuf>,

    /// Log every action without performing it
    #[arg(long, global = true)]
    dry_run: bool,

    /// Debug output on stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch all roots and reconcile periodically until Ctrl-C
    Run,
    /// Run a single reconciliation pass
    Reconcile,
    /// Validate the configuration and print the resolved rule table
    Check,
    /// Remove every tag from every file under the samples root
    PurgeTags,
}

fn load_config(cli: &Cli) -> Result<ShelverConfig> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = ShelverConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.dry_run |= cli.dry_run;
    Ok(config)
}

fn build_dispatcher(config: ShelverConfig) -> Result<Arc<Dispatcher>> {
    let store = JsonTagStore::open(&config.tag_store)
        .with_context(|| format!("Failed to open tag store {}", config.tag_store.display()))?;
    let dispatcher = Dispatcher::new(
        Arc::new(config),
        Arc::new(store),
        Arc::new(LocalFileOps::new()),
    )
    .context("Failed to build rule table")?;
    Ok(Arc::new(dispatcher))
}

fn run_daemon(dispatcher: Arc<Dispatcher>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Received Ctrl-C"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
            }
            let _ = shutdown_tx.send(true);
        });
        Daemon::new(dispatcher)
            .run(shutdown_rx)
            .await
            .context("Daemon stopped with an error")
    })
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    if let Commands::Check = cli.command {
        let table = shelver::RuleTable::from_config(&config).context("Invalid rule table")?;
        println!("Configuration OK");
        for root in &config.roots {
            println!(
                "  {:<14} {}{}",
                root.role.as_str(),
                root.path.display(),
                if root.recursive { "" } else { " (non-recursive)" }
            );
        }
        print!("{table}");
        return Ok(());
    }

    let dispatcher = build_dispatcher(config)?;
    match cli.command {
        Commands::Run => run_daemon(dispatcher),
        Commands::Reconcile => {
            let stats = Reconciler::new(dispatcher).run_once()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::PurgeTags => {
            let stats = Reconciler::new(dispatcher).purge_tags()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Check => Ok(()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "shelver",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        eprintln!("Warning: {err:#}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
