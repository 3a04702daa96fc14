// ABOUTME: Main entry point for the raduno group-sync agent
// ABOUTME: Initializes logging and config, connects to XMTP and Base, then runs the sync and DM loops

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use raduno::{
    bridge::BridgeTransport,
    inbound,
    rpc::{RpcClient, RpcEventContracts},
    scheduler,
};
use raduno_core::{
    assistant::{Assistant, AssistantOptions},
    chain::ChainReader,
    config::Config,
    deadline::Deadline,
    metrics,
    paths,
    reconciler::Reconciler,
    store::GroupStore,
    traits::{MessagingTransport, SharedTransport},
};
use raduno_llm::{BackendRegistry, SharedBackend};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "raduno", version, about = "Keeps XMTP groups in sync with onchain event participants")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sync loop and the DM assistant (default)
    Run,
    /// Print the stored event-to-group mappings and exit
    Mappings {
        /// Mapping database; defaults to the configured sync.database_path
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n╔══════════════════════════════════════════════════════════╗");
        eprintln!("║ PANIC! Agent crashed with the following error:          ║");
        eprintln!("╚══════════════════════════════════════════════════════════╝\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    // .env next to the binary, or two levels up when run from a nested checkout
    if dotenvy::dotenv().is_err() {
        dotenvy::from_filename("../../.env").ok();
    }

    let _log_guard = init_logging()?;
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run().await,
        Command::Mappings { db } => print_mappings(db),
    }
}

/// Console logging, JSON when LOG_FORMAT=json, plus a daily file under the data
/// directory unless LOG_DIR moves it or turns it off
fn init_logging() -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,raduno=info,raduno_core=info,raduno_llm=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json());
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer());

    let setting = std::env::var("LOG_DIR").ok();
    let (file_layer, guard) = match paths::resolve_log_dir(setting.as_deref()) {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(&dir, "raduno.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn print_mappings(db: Option<PathBuf>) -> Result<()> {
    let db = match db {
        Some(db) => db,
        None => PathBuf::from(
            Config::load()
                .map(|c| c.sync.database_path)
                .unwrap_or_else(|_| Config::default().sync.database_path),
        ),
    };

    let store = GroupStore::new(&db)?;
    let mappings = store.list_all()?;
    if mappings.is_empty() {
        println!("No group mappings in {}", db.display());
        return Ok(());
    }

    println!("{} mapping(s) in {}", mappings.len(), db.display());
    for mapping in mappings {
        println!(
            "{}  group={}  name={}  owner={}  last_synced={}",
            mapping.event_address,
            mapping.group_id,
            mapping.group_name.as_deref().unwrap_or("-"),
            mapping.agent_address.as_deref().unwrap_or("(legacy)"),
            mapping.last_synced_at,
        );
    }
    Ok(())
}

fn build_llm(config: &Config) -> Result<Option<SharedBackend>> {
    if !config.llm.is_enabled() {
        return Ok(None);
    }
    let backend = BackendRegistry::default()
        .create(&config.llm.backend, &config.llm.backend_config())
        .with_context(|| format!("Failed to create completion backend '{}'", config.llm.backend))?;
    tracing::info!(backend = backend.name(), model = %config.llm.model, "Completion backend ready");
    Ok(Some(backend))
}

async fn run() -> Result<()> {
    tracing::info!("Starting raduno agent");

    let config = Config::load()?;
    tracing::info!(
        xmtp_env = %config.xmtp.env,
        bridge = %config.xmtp.bridge_url,
        rpc = %config.chain.rpc_url,
        root_domain = %config.chain.root_domain,
        interval_secs = config.sync.interval_secs,
        allow_small_groups = config.sync.allow_small_groups,
        "Configuration loaded"
    );

    let store = GroupStore::new(&config.sync.database_path)?;
    let mappings = store.list_all()?;
    tracing::info!(
        path = %config.sync.database_path,
        mappings = mappings.len(),
        "Group store initialized"
    );
    for mapping in &mappings {
        tracing::info!(
            event = %mapping.event_address,
            group_id = %mapping.group_id.chars().take(12).collect::<String>(),
            name = mapping.group_name.as_deref().unwrap_or("-"),
            last_synced = %mapping.last_synced_at,
            "Stored group mapping"
        );
    }

    if let Some(port) = config.metrics.port {
        metrics::init_metrics(port)?;
    }

    let deadline = Deadline::from_secs(config.sync.call_timeout_secs);
    let call_timeout = Duration::from_secs(config.sync.call_timeout_secs);

    let bridge = BridgeTransport::connect(&config.xmtp, call_timeout).await?;
    let agent_address = bridge.agent_address().to_string();
    let transport: SharedTransport = Arc::new(bridge);

    let owned = mappings
        .iter()
        .filter(|m| m.is_owned_by(&agent_address))
        .count();
    if owned < mappings.len() {
        tracing::warn!(
            owned,
            total = mappings.len(),
            agent = %agent_address,
            "Some stored mappings belong to another agent and will be ignored"
        );
    }

    let rpc = Arc::new(RpcClient::new(&config.chain.rpc_url, call_timeout)?);
    let contracts = RpcEventContracts::new(
        rpc,
        config.factory_address()?,
        &config.chain.registry_address,
    )?;
    let chain = ChainReader::new(Arc::new(contracts), &config.chain.root_domain, deadline);

    let llm = build_llm(&config)?;

    let reconciler = Reconciler::new(
        transport.clone(),
        chain.clone(),
        store,
        deadline,
        config.sync.allow_small_groups,
    );
    let assistant = Assistant::new(
        transport.clone(),
        chain,
        llm,
        deadline,
        AssistantOptions::from_config(&config),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sync_task = tokio::spawn(scheduler::run_sync_loop(
        reconciler,
        Duration::from_secs(config.sync.interval_secs),
        shutdown_rx.clone(),
    ));

    let stream = transport
        .event_stream()
        .await
        .context("Failed to open inbound message stream")?;
    let inbound_task = tokio::spawn(inbound::run_message_loop(assistant, stream, shutdown_rx));

    tracing::info!(agent = %agent_address, "Agent ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");
    shutdown_tx.send(true).ok();

    let passes = sync_task.await.context("Sync loop task failed")?;
    let messages = inbound_task.await.context("Message loop task failed")?;
    tracing::info!(passes, messages, "Raduno agent stopped");
    Ok(())
}
