//! Main entry point for the vexar binary
//!
//! Wires the real service implementations into the supervisor and the
//! connection orchestrator, then reads user intent from stdin.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

use shared::{Component, component_info, component_warn, logging};
use vexar::config::{self, Settings, default_settings_path};
use vexar::core::BINARY_NAME;
use vexar::orchestrator::HEALTH_CHECK_INTERVAL;
use vexar::services::{
    DnsCatalog, HomebrewInstaller, JsonSettingsStore, SystemReaper, TcpReachabilityMonitor, TokioProxyLauncher,
    TracingTelemetry,
};
use vexar::{
    BinaryLocator, ConnectionOrchestrator, DnsProvider, Installer, LogSink, OrchestratorHandle, OrchestratorOptions,
    ProcessSupervisor, SettingsStore, SupervisorConfig,
};

/// Keeps a local spoofdpi proxy running and connected
#[derive(Parser)]
#[command(name = "vexar")]
#[command(about = "Supervises a local spoofdpi DPI-bypass proxy")]
pub struct Args {
    /// Settings file (defaults to ~/.vexar.json)
    #[arg(long, env = "VEXAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); also passed to the proxy
    #[arg(long, env = "VEXAR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Proxy binary to try before the standard install locations
    #[arg(long, env = "VEXAR_BINARY")]
    pub binary: Option<PathBuf>,

    /// Listening port candidates, e.g. 8080-8090
    #[arg(long, env = "VEXAR_PORTS", default_value = "8080-8090")]
    pub ports: String,

    /// Disable the periodic proxy health check
    #[arg(long)]
    pub no_health_check: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
pub enum Command {
    /// Supervise the proxy and read commands from stdin (default)
    Run,
    /// Print install state and settings
    Status,
    /// Install the proxy through Homebrew
    Install,
    /// Measure DNS server latencies and print the ranking
    Dns,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenv::dotenv();
    let args = Args::parse();

    let log_level = logging::validate_log_level(&args.log_level)?;
    logging::init_tracing_with_level(Some(&log_level));

    let settings_path = args.config.clone().unwrap_or_else(default_settings_path);
    let store = JsonSettingsStore::new(&settings_path);
    let mut settings = store
        .load()
        .with_context(|| format!("loading settings from {}", settings_path.display()))?;
    if settings.ensure_anonymous_id() {
        store.save(&settings).context("saving new anonymous id")?;
    }

    let mut locator = BinaryLocator::for_binary(BINARY_NAME);
    if let Some(binary) = &args.binary {
        locator = locator.with_override(binary.clone());
    }

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&args, log_level, settings, store, locator).await,
        Command::Status => {
            print_status(&settings, &locator);
            Ok(())
        }
        Command::Install => install(locator).await,
        Command::Dns => {
            print_dns_ranking().await;
            Ok(())
        }
    }
}

async fn run(
    args: &Args,
    log_level: String,
    settings: Settings,
    store: JsonSettingsStore,
    locator: BinaryLocator,
) -> anyhow::Result<()> {
    let port_range = config::parse_port_range(&args.ports)?;
    logging::log_startup(Component::App, "vexar");

    let logs = LogSink::new();
    let supervisor_config = SupervisorConfig::default()
        .with_log_level(log_level)
        .with_port_range(port_range);
    let supervisor = ProcessSupervisor::new(TokioProxyLauncher::new(), SystemReaper::new(), locator, supervisor_config, logs.clone());

    let telemetry = TracingTelemetry::new(
        settings.analytics_enabled,
        settings.anonymous_user_id.clone().unwrap_or_default(),
    );
    let options = OrchestratorOptions {
        health_interval: (!args.no_health_check).then_some(HEALTH_CHECK_INTERVAL),
    };
    let reachability = TcpReachabilityMonitor::new().spawn();

    let (orchestrator, handle) = ConnectionOrchestrator::new(
        supervisor,
        DnsCatalog::default(),
        telemetry,
        store,
        settings,
        Some(reachability),
        options,
    );
    let actor = tokio::spawn(orchestrator.run());
    tokio::spawn(print_log_tail(logs));

    println!("Commands: connect | disconnect | status | logs | clear | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_input(&handle, line.trim()).await? {
                            break;
                        }
                    }
                    // stdin closed: keep supervising until Ctrl-C
                    Ok(None) => {
                        signal::ctrl_c().await?;
                        break;
                    }
                    Err(e) => {
                        component_warn!(Component::App, "Reading stdin failed: {}", e);
                        break;
                    }
                }
            },
            _ = signal::ctrl_c() => {
                component_info!(Component::App, "Received Ctrl-C");
                break;
            },
        }
    }

    handle.shutdown().await.context("shutting down orchestrator")?;
    actor.await.context("orchestrator task panicked")?;
    logging::log_shutdown(Component::App, "bye");
    Ok(())
}

/// Returns false when the user asked to quit
async fn handle_input(handle: &OrchestratorHandle, input: &str) -> anyhow::Result<bool> {
    match input {
        "" => {}
        "connect" | "c" => handle.connect().await?,
        "disconnect" | "d" => handle.disconnect().await?,
        "clear" => handle.clear_logs().await?,
        "logs" | "l" => {
            for entry in handle.logs().entries() {
                println!("{entry}");
            }
        }
        "status" | "s" => {
            let snapshot = handle.snapshot().await?;
            println!("status: {}", snapshot.projection.status());
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        "quit" | "q" | "exit" => return Ok(false),
        other => println!("Unknown command '{other}'. Try connect, disconnect, status, logs, clear or quit."),
    }
    Ok(true)
}

async fn print_log_tail(logs: LogSink) {
    let mut rx = logs.subscribe();
    loop {
        match rx.recv().await {
            Ok(entry) => println!("{entry}"),
            Err(RecvError::Lagged(skipped)) => println!("... {skipped} log lines skipped"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_status(settings: &Settings, locator: &BinaryLocator) {
    match locator.find_binary() {
        Some(path) => println!("{BINARY_NAME}: {}", path.display()),
        None => println!("{BINARY_NAME}: not installed (run `vexar install`)"),
    }
    println!("auto connect:  {}", settings.auto_connect);
    println!("auto DNS:      {}", settings.auto_dns);
    println!(
        "selected DNS:  {}",
        settings.selected_dns_server.as_deref().unwrap_or("-")
    );
    println!("disconnected by user: {}", settings.user_initiated_disconnect);
}

async fn install(locator: BinaryLocator) -> anyhow::Result<()> {
    let installer = HomebrewInstaller::new(locator);
    if installer.is_installed() {
        println!("{BINARY_NAME} is already installed");
        return Ok(());
    }
    installer.install().await?;
    println!("✅ {BINARY_NAME} installed");
    Ok(())
}

async fn print_dns_ranking() {
    let catalog = DnsCatalog::default();
    catalog.measure_all_latencies().await;
    let latencies = catalog.latencies();

    let mut ranking: Vec<_> = catalog
        .servers()
        .into_iter()
        .map(|server| (latencies.get(&server.id).copied(), server))
        .collect();
    // Reachable servers first, fastest first
    ranking.sort_by_key(|(latency, _)| latency.unwrap_or(u64::MAX));

    for (latency, server) in ranking {
        let measured = latency.map_or_else(|| "unreachable".to_string(), |ms| format!("{ms} ms"));
        println!("{:<12} {:<16} {}", server.name, server.address, measured);
    }
}
