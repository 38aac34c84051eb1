//! ---
//! hct_section: "01-core-functionality"
//! hct_subsection: "binary"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Binary entrypoint for the update agent daemon."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use hct_common::{init_tracing, AppConfig, Component};
use hct_core::{BackupStore, HttpNotifier, UpdateOrchestrator, UpdateRequest, UpdateScheduler};
use hct_metrics::{new_registry, spawn_http_server, DaemonMetrics, UpdateMetrics};
use hct_persistence::{FileStateStore, StateStore};
use hct_versioning::VersionInfo;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    version = concat!("HomeCore Tools ", env!("CARGO_PKG_VERSION")),
    about = "HomeCore Tools update agent",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print extended version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the periodic update scheduler until terminated")]
    Run {
        #[arg(long, help = "Run a single pass over all components and exit")]
        once: bool,
    },
    #[command(about = "Update one component and print the result")]
    Update {
        component: Component,
        #[arg(long, help = "Re-apply even when the version is unchanged")]
        force: bool,
        #[arg(long, env = "HCT_TOKEN", hide_env_values = true, help = "Manifest token")]
        token: Option<String>,
        #[arg(long, help = "Client identifier forwarded to the manifest endpoint")]
        client_id: Option<String>,
    },
    #[command(about = "Check for updates but do not apply them")]
    Check {
        component: Option<Component>,
        #[arg(long, env = "HCT_TOKEN", hide_env_values = true, help = "Manifest token")]
        token: Option<String>,
    },
    #[command(about = "Print the last recorded status of every component")]
    Status,
    #[command(about = "List the run logs of a component, newest first")]
    Logs { component: Component },
    #[command(about = "List the stored artifact backups of a component, oldest first")]
    Backups { component: Component },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let version = VersionInfo::current();
    if cli.version {
        println!("{}", version.extended());
        return Ok(ExitCode::SUCCESS);
    }
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("/config/homecore/hct.toml"));
    candidates.push(PathBuf::from("configs/hct.example.toml"));

    let load_started = Instant::now();
    let loaded_config = AppConfig::load_with_source(&candidates)?;
    let config = loaded_config.config;
    let load_duration = load_started.elapsed();

    let metrics_registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(metrics_registry.clone())?;
    daemon_metrics.observe_config_load(load_duration.as_secs_f64());
    daemon_metrics.inc_start();
    daemon_metrics.set_build_info(&version.semver, &version.git_sha, &version.profile);

    let _logging = init_tracing("hctd", &config.logging)?;
    info!(config_path = %loaded_config.source.display(), version = %version.cli_string(), "configuration loaded");

    let update_metrics = UpdateMetrics::new(metrics_registry.clone())?;
    let orchestrator = Arc::new(
        UpdateOrchestrator::from_config(&config, &version)?.with_metrics(update_metrics),
    );

    match cli.command.unwrap_or(Commands::Run { once: false }) {
        Commands::Run { once: true } => {
            let scheduler = build_scheduler(&config, orchestrator, &version)?;
            let outcomes = scheduler.run_once().await;
            info!(components = outcomes.len(), "single pass complete");
        }
        Commands::Run { once: false } => {
            let scheduler = build_scheduler(&config, orchestrator, &version)?;
            run_daemon(&config, scheduler, metrics_registry).await?;
        }
        Commands::Update {
            component,
            force,
            token,
            client_id,
        } => {
            let request = UpdateRequest {
                token,
                client_id,
                force,
            };
            let response = orchestrator.run_update(component, &request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.is_success() {
                return Ok(ExitCode::from(exit_status(response.exit_code)));
            }
        }
        Commands::Check { component, token } => {
            let request = UpdateRequest {
                token,
                ..UpdateRequest::default()
            };
            let components = match component {
                Some(component) => vec![component],
                None => orchestrator.components(),
            };
            for component in components {
                match orchestrator.check(component, &request).await {
                    Ok(check) => println!(
                        "{component}: local {} / remote {} / update available: {}",
                        check.local_version.as_deref().unwrap_or("none"),
                        check.remote_version.as_deref().unwrap_or("none"),
                        check.update_available()
                    ),
                    Err(err) => println!("{component}: check failed: {err}"),
                }
            }
        }
        Commands::Status => {
            let store = FileStateStore::new(config.layout());
            let report = store.load_all_status().context("failed to read status")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Logs { component } => {
            let logs = config
                .layout()
                .run_logs(component)
                .with_context(|| format!("failed to list {component} run logs"))?;
            for log in logs {
                println!("{}", log.display());
            }
        }
        Commands::Backups { component } => {
            let backups = BackupStore::new(config.layout())
                .list(component)
                .await
                .with_context(|| format!("failed to list {component} backups"))?;
            for backup in backups {
                println!("{}", backup.display());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Process status for a run exit code; anything outside `1..=255` reads as a failure.
fn exit_status(code: i32) -> u8 {
    match u8::try_from(code) {
        Ok(0) | Err(_) => 1,
        Ok(code) => code,
    }
}

fn build_scheduler(
    config: &AppConfig,
    orchestrator: Arc<UpdateOrchestrator>,
    version: &VersionInfo,
) -> Result<UpdateScheduler> {
    let scheduler = UpdateScheduler::from_config(orchestrator, &config.scheduler);
    match HttpNotifier::from_config(&config.notifications, &version.user_agent())? {
        Some(notifier) => {
            info!(endpoint = %config.notifications.endpoint, "update notifications enabled");
            Ok(scheduler.with_notifier(Arc::new(notifier)))
        }
        None => Ok(scheduler),
    }
}

async fn run_daemon(
    config: &AppConfig,
    scheduler: UpdateScheduler,
    metrics_registry: hct_metrics::SharedRegistry,
) -> Result<()> {
    if !config.scheduler.enabled {
        info!("scheduler disabled by configuration; nothing to run");
        return Ok(());
    }

    let metrics_server = if config.metrics.enabled {
        info!(address = %config.metrics.listen, "metrics exporter enabled");
        Some(spawn_http_server(metrics_registry, config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    info!("daemon running; waiting for termination signal");
    wait_for_termination().await?;
    info!("termination signal received; shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(err) = scheduler_task.await {
        warn!(error = %err, "scheduler task ended abnormally");
    }

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() -> Result<()> {
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_termination() -> Result<()> {
    signal::ctrl_c().await?;
    Ok(())
}
