//! Strategy Engine - Main Entry Point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use strategy_engine::bus::{RedisStreamSource, StreamSource, FILL_EVENTS};
use strategy_engine::catalog::{SqliteStrategyStore, StrategyCatalog};
use strategy_engine::config::{Config, LoggingConfig};
use strategy_engine::execution::CommandDispatcher;
use strategy_engine::model::{Document, Event};
use strategy_engine::strategy::{register_defaults, StrategyRegistry};
use strategy_engine::{Engine, EngineOptions};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

/// Strategy Engine CLI
#[derive(Parser)]
#[command(name = "strategy-engine")]
#[command(version, about = "Hedges prediction-market fills across paired accounts")]
struct Cli {
    /// Send orders with confirm=false regardless of configuration
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine (default)
    Run,

    /// List active strategies, or show one strategy by id
    Strategies {
        /// Strategy id
        #[arg(long)]
        id: Option<String>,
    },

    /// Publish an event to a stream
    Publish {
        /// Target stream
        #[arg(short, long, default_value = FILL_EVENTS)]
        stream: String,

        /// Event type (fill, trade_executed, account_created, ...)
        #[arg(short = 't', long = "type")]
        event_type: String,

        /// Originating platform
        #[arg(short, long, default_value = "predict")]
        platform: String,

        /// Event payload as a JSON object
        #[arg(short, long)]
        data: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if cli.dry_run {
        config.execution.dry_run = true;
    }
    config.validate()?;

    init_logging(&config.logging)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_engine(config).await,
        Commands::Strategies { id } => show_strategies(&config, id.as_deref()),
        Commands::Publish {
            stream,
            event_type,
            platform,
            data,
        } => publish_event(&config, &stream, event_type, platform, data.as_deref()).await,
    }
}

/// Start the engine and run until Ctrl-C or SIGTERM.
async fn run_engine(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        dry_run = config.execution.dry_run,
        bus = %config.bus.url,
        store = %config.store.path,
        "Starting strategy engine"
    );
    if config.execution.dry_run {
        warn!("Dry-run mode: orders are sent with confirm=false");
    }

    let store = SqliteStrategyStore::open(&config.store.path)
        .context("Failed to open strategy store")?;
    let source = RedisStreamSource::connect(&config.bus.url, config.block_timeout())
        .await
        .context("Failed to connect to event bus")?;
    let dispatcher = CommandDispatcher::new(&config.execution)?;

    let engine = Arc::new(Engine::new(
        Arc::new(StrategyCatalog::new(Arc::new(store))),
        Arc::new(source),
        Arc::new(dispatcher),
        EngineOptions::from(&config),
    ));
    register_defaults(engine.registry());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut engine_task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.start(shutdown_rx).await })
    };

    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown signal received"),
        result = &mut engine_task => {
            // The engine only returns on its own when startup fails
            result??;
            return Ok(());
        }
    }

    shutdown_tx.send(true).ok();

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    match tokio::time::timeout(grace, engine_task).await {
        Ok(Ok(Ok(()))) => info!("Shutdown complete"),
        Ok(Ok(Err(e))) => error!(error = %e, "Engine stopped with error"),
        Ok(Err(e)) => error!(error = %e, "Engine task failed"),
        Err(_) => warn!(
            grace_secs = config.shutdown_grace_secs,
            "Engine still busy after grace period, exiting"
        ),
    }

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    tokio::signal::ctrl_c().await.ok();
}

/// Print the active catalog, or a single strategy as JSON.
fn show_strategies(config: &Config, id: Option<&str>) -> Result<()> {
    let store =
        SqliteStrategyStore::open(&config.store.path).context("Failed to open strategy store")?;
    let catalog = StrategyCatalog::new(Arc::new(store));

    if let Some(id) = id {
        let strategy = catalog
            .get_strategy(id)?
            .with_context(|| format!("No strategy with id {id}"))?;
        println!("{}", serde_json::to_string_pretty(&strategy)?);
        return Ok(());
    }

    let registry = StrategyRegistry::new();
    register_defaults(&registry);

    let snapshot = catalog.reload()?;

    println!();
    println!(
        "Active strategies ({}), loaded {}:",
        snapshot.strategies.len(),
        snapshot.loaded_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    println!(
        "   {:<38} {:<24} {:<20} {:<10}",
        "ID", "Name", "Type", "Evaluator"
    );
    println!("   {}", "-".repeat(94));

    for strategy in &snapshot.strategies {
        let evaluator = if registry.resolve(&strategy.strategy_type).is_some() {
            "yes"
        } else {
            "missing"
        };
        println!(
            "   {:<38} {:<24} {:<20} {:<10}",
            strategy.id, strategy.name, strategy.strategy_type, evaluator
        );
    }
    println!();

    Ok(())
}

/// Publish one event and print the id the bus assigned to it.
async fn publish_event(
    config: &Config,
    stream: &str,
    event_type: String,
    platform: String,
    data: Option<&str>,
) -> Result<()> {
    let data = match data {
        Some(text) => Document::from_json_str(text).context("--data must be a JSON object")?,
        None => Document::new(),
    };
    let event = Event::new(event_type, platform).with_data(data);

    let source = RedisStreamSource::connect(&config.bus.url, config.block_timeout())
        .await
        .context("Failed to connect to event bus")?;
    let id = source.publish(stream, &event).await?;

    info!(%stream, %id, event_type = %event.event_type, "Event published");
    println!("{id}");
    Ok(())
}

/// Initialize logging to stdout, plus hourly-rolling files when a log
/// directory is configured. `RUST_LOG` overrides the configured level.
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log level")?;

    let writer = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;

            let file_appender = tracing_appender::rolling::hourly(directory, "strategy-engine.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

            // Leak the guard to keep it alive for the program duration
            Box::leak(Box::new(guard));

            BoxMakeWriter::new(std::io::stdout.and(file_writer))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if config.json {
        builder.json().init();
    } else {
        builder.with_ansi(config.directory.is_none()).init();
    }

    Ok(())
}
