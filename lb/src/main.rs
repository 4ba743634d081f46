//! lb - load-balancer configuration orchestrator
//!
//! Operator entry point: submit requests, inspect requests, queue and
//! services, print the global snapshot, and run the queue worker.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use lborch::cli::{Cli, Command, QueueCommand};
use lborch::config::{Config, StoreBackend};
use lborch::{
    CoordinationStore, GlobalStateAggregator, Request, RequestLifecycleState, RequestQueue, RequestRecordStore,
    ServiceDefinition, ServiceStateStore, UpstreamInfo, Worker, generate_request_id,
};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lborch")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("lborch.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn open_store(config: &Config, override_path: Option<PathBuf>) -> Result<CoordinationStore> {
    let mut store_config = config.store.clone();
    if let Some(path) = override_path {
        store_config.backend = StoreBackend::Sqlite;
        store_config.path = path;
    }
    if store_config.backend == StoreBackend::Memory {
        eprintln!("{} Using the in-memory store; nothing will persist", "!".yellow());
    }
    store_config
        .open()
        .context(format!("Failed to open store at {}", store_config.path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn state_label(state: RequestLifecycleState) -> ColoredString {
    let label = state.to_string();
    match state {
        RequestLifecycleState::Pending => label.yellow(),
        RequestLifecycleState::Success => label.green(),
        RequestLifecycleState::Failed => label.red(),
        RequestLifecycleState::Canceled | RequestLifecycleState::InvalidRequestNoop => label.dimmed(),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_submit(
    store: &CoordinationStore,
    service: String,
    request_id: Option<String>,
    replace: Vec<UpstreamInfo>,
    add: Vec<UpstreamInfo>,
    remove: Vec<UpstreamInfo>,
    base_path: Option<String>,
    lb_groups: Vec<String>,
    upstream_only: bool,
) -> Result<()> {
    let request_id = request_id.unwrap_or_else(generate_request_id);
    let stamp = |upstreams: Vec<UpstreamInfo>| -> Vec<UpstreamInfo> {
        upstreams
            .into_iter()
            .map(|u| match u.request_id {
                Some(_) => u,
                None => u.with_request_id(request_id.clone()),
            })
            .collect()
    };

    let mut definition = ServiceDefinition::new(service);
    definition.service_base_path = base_path;
    definition.load_balancer_groups.extend(lb_groups);

    let mut request = if replace.is_empty() {
        Request::new(request_id.clone(), definition, stamp(add), remove)
    } else {
        Request::replace(request_id.clone(), definition, stamp(replace))
    };
    request.upstream_update_only = upstream_only;

    let queued = RequestQueue::new(store.clone())
        .enqueue(&request, RequestLifecycleState::Pending)
        .context(format!("Failed to submit request {}", request_id))?;
    println!(
        "{} Queued {} for {} (sequence {})",
        "✓".green(),
        request_id.cyan(),
        queued.service_id,
        queued.sequence
    );
    Ok(())
}

fn cmd_status(store: &CoordinationStore, request_id: &str) -> Result<()> {
    let records = RequestRecordStore::new(store.clone());
    let response = records.response(request_id)?;
    println!("Request: {}", response.load_balancer_request_id.cyan());
    println!("  state: {}", state_label(response.load_balancer_state));
    if let Some(message) = &response.message {
        println!("  message: {}", message);
    }
    if let Some(updated_at) = records.get_updated_at(request_id)? {
        println!("  updated: {}", updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}

fn cmd_queue(store: &CoordinationStore, command: QueueCommand) -> Result<()> {
    let queue = RequestQueue::new(store.clone());
    match command {
        QueueCommand::List => {
            let queued = queue.list_queued()?;
            if queued.is_empty() {
                println!("Queue is empty");
            }
            for entry in queued {
                println!("{:>10}  {}  {}", entry.sequence, entry.service_id.cyan(), entry.request_id);
            }
        }
        QueueCommand::Size => println!("{}", queue.size()?),
        QueueCommand::Age => println!("{}ms", queue.oldest_age()?.as_millis()),
    }
    Ok(())
}

fn cmd_service(store: &CoordinationStore, service_id: &str) -> Result<()> {
    let services = ServiceStateStore::new(store.clone());
    let Some(service) = services.get_service(service_id)? else {
        eprintln!("{} No such service: {}", "✗".red(), service_id);
        std::process::exit(1);
    };
    print_json(&service)?;
    for upstream in services.get_upstreams(service_id)? {
        println!("  {} {}", "→".cyan(), upstream);
    }
    Ok(())
}

async fn cmd_worker(store: CoordinationStore, config: &Config, once: bool) -> Result<()> {
    let worker = Worker::new(store, config.worker.clone());
    if once {
        let stats = tokio::task::spawn_blocking(move || worker.run_once()).await??;
        println!(
            "Processed {}: {} succeeded, {} failed, {} invalid, {} canceled",
            stats.processed, stats.succeeded, stats.failed, stats.invalid, stats.canceled
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("cmd_worker: ctrl-c received");
            let _ = shutdown_tx.send(()).await;
        }
    });

    println!("Worker running, press Ctrl-C to stop");
    worker.run(shutdown_rx).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let store = open_store(&config, cli.store)?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Submit {
            service,
            request_id,
            replace,
            add,
            remove,
            base_path,
            lb_groups,
            upstream_only,
        } => cmd_submit(
            &store,
            service,
            request_id,
            replace,
            add,
            remove,
            base_path,
            lb_groups,
            upstream_only,
        ),
        Command::Status { request_id } => cmd_status(&store, &request_id),
        Command::Cancel { request_id } => {
            match RequestRecordStore::new(store.clone()).delete(&request_id)? {
                Some(_) => println!("{} Canceled {}", "✓".green(), request_id.cyan()),
                None => println!("No such request: {}", request_id),
            }
            Ok(())
        }
        Command::Queue { command } => cmd_queue(&store, command),
        Command::Services => {
            for service_id in ServiceStateStore::new(store.clone()).list_services()? {
                println!("{}", service_id);
            }
            Ok(())
        }
        Command::Service { service_id } => cmd_service(&store, &service_id),
        Command::RemoveService { service_id } => {
            if ServiceStateStore::new(store.clone()).remove_service(&service_id)? {
                println!("{} Removed {}", "✓".green(), service_id.cyan());
            } else {
                println!("No such service: {}", service_id);
            }
            Ok(())
        }
        Command::Snapshot => {
            let aggregator = GlobalStateAggregator::new(store.clone(), config.fetch_concurrency);
            let snapshot = aggregator.compute_snapshot().await?;
            print_json(&snapshot)
        }
        Command::Version => {
            let aggregator = GlobalStateAggregator::new(store.clone(), config.fetch_concurrency);
            match aggregator.get_state_version()? {
                Some(version) => println!("{}", version),
                None => println!("No state changes recorded"),
            }
            Ok(())
        }
        Command::BumpVersion => {
            let aggregator = GlobalStateAggregator::new(store.clone(), config.fetch_concurrency);
            println!("{}", aggregator.increment_state_version()?);
            Ok(())
        }
        Command::Worker { once } => cmd_worker(store, &config, once).await,
    }
}
