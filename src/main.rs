use chrono::Utc;
use clap::{Parser, Subcommand};
use configuration::Settings;
use core_types::{Clock, StrategyId, StrategyRun, SystemClock};
use database::{PgStore, Store, connect, run_migrations};
use dispatch::{OrderDispatchWorker, PendingOrderQueue};
use executor::{RestoreManager, StrategyExecutor};
use sink::{DryRunSink, SignalSink, WebhookSink};
use std::sync::Arc;
use strategies::MarketDataSource;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod market;

/// The main entry point for the Meridian runtime.
#[tokio::main]
async fn main() {
    // Load environment variables from .env file, if present.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse command-line arguments
    let cli = Cli::parse();

    let settings = configuration::load_settings_from(&cli.config)
        .expect("Failed to load runtime configuration");

    // Initialize the database connection and run migrations
    let db_pool = connect().await.expect("Failed to connect to the database");
    run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");
    let store: Arc<dyn Store> = Arc::new(PgStore::new(db_pool));

    // Execute the appropriate command
    let result = match cli.command {
        Commands::Serve => handle_serve(settings, store).await,
        Commands::StartRun(args) => handle_start_run(args, store).await,
        Commands::StopRun(args) => handle_stop_run(args, store).await,
        Commands::ListRuns => handle_list_runs(store).await,
        Commands::CancelOrder(args) => handle_cancel_order(args, store).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// The strategy execution and order dispatch runtime.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the runtime configuration file.
    #[arg(long, default_value = "runtime.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the strategy execution and order dispatch service.
    Serve,
    /// Register a strategy run and mark it Running; the serving process
    /// attaches an execution unit on its next restore pass.
    StartRun(StartRunArgs),
    /// Terminalize a run as Stopped. A live execution unit observes the
    /// terminal status at its next tick and exits.
    StopRun(StopRunArgs),
    /// List all registered runs and their statuses.
    ListRuns,
    /// Cancel a pending order that has not been leased for dispatch yet.
    CancelOrder(CancelOrderArgs),
}

#[derive(Parser)]
struct StartRunArgs {
    /// The strategy to execute (e.g., "dual_ma_crossover").
    #[arg(long)]
    strategy: StrategyId,

    /// The instrument to trade (e.g., "BTCUSDT").
    #[arg(long)]
    symbol: String,

    /// Strategy parameters as inline JSON.
    #[arg(long, default_value = "{}")]
    params: String,
}

#[derive(Parser)]
struct StopRunArgs {
    #[arg(long)]
    run_id: Uuid,
}

#[derive(Parser)]
struct CancelOrderArgs {
    #[arg(long)]
    order_id: Uuid,
}

// ==============================================================================
// Command Logic
// ==============================================================================

/// Wires up and runs the long-lived service: restore pass, execution pool,
/// dispatch worker, shutdown handling.
async fn handle_serve(settings: Settings, store: Arc<dyn Store>) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let queue = PendingOrderQueue::new(store.clone(), clock.clone());
    let market_data: Arc<dyn MarketDataSource> =
        Arc::new(market::RestMarketData::new(&settings.market)?);

    let executor = Arc::new(StrategyExecutor::new(
        settings.executor.clone(),
        store.clone(),
        market_data,
        queue,
        clock.clone(),
    ));

    if settings.executor.restore_on_boot {
        let report = RestoreManager::new(store.clone(), executor.clone())
            .restore()
            .await?;
        tracing::info!(
            restored = report.restored,
            failed = report.failed,
            "boot restore finished"
        );
    } else {
        tracing::info!("restore-on-boot disabled by configuration");
    }

    let webhook: Arc<dyn SignalSink> = if settings.sink.webhook_url.is_empty() {
        tracing::warn!("sink.webhook_url not configured; dispatching in dry-run mode");
        Arc::new(DryRunSink)
    } else {
        Arc::new(WebhookSink::new(&settings.sink)?)
    };
    let worker = OrderDispatchWorker::new(
        store.clone(),
        webhook,
        clock.clone(),
        settings.dispatch.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    tracing::info!(
        live_runs = executor.live_run_count().await,
        "meridian runtime is up"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    // Stop the dispatch worker; execution units die with the process and
    // their runs stay Running in the store, which is exactly what the next
    // boot's restore pass expects.
    shutdown_tx.send(true)?;
    worker_handle.await?;

    Ok(())
}

async fn handle_start_run(args: StartRunArgs, store: Arc<dyn Store>) -> anyhow::Result<()> {
    let parameters: serde_json::Value = serde_json::from_str(&args.params)?;

    // Validate the parameters up front so a typo fails here, not at attach
    // time inside the service.
    strategies::create_strategy(args.strategy, &args.symbol, &parameters)
        .map_err(|e| anyhow::anyhow!("invalid strategy parameters: {}", e))?;

    let run = StrategyRun::new(args.strategy, &args.symbol, parameters, Utc::now());
    store.create_run(&run).await?;
    store
        .set_run_status(run.run_id, core_types::RunStatus::Running, None)
        .await?;

    println!("Registered run {} ({} on {})", run.run_id, args.strategy, args.symbol);
    println!("The serving process will attach it on its next restore pass.");
    Ok(())
}

async fn handle_stop_run(args: StopRunArgs, store: Arc<dyn Store>) -> anyhow::Result<()> {
    let run = store
        .get_run(args.run_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("run {} not found", args.run_id))?;

    if store
        .set_run_status(args.run_id, core_types::RunStatus::Stopped, None)
        .await?
    {
        println!("Run {} stopped (was {}).", args.run_id, run.status);
    } else {
        println!("Run {} is already terminal ({}).", args.run_id, run.status);
    }
    Ok(())
}

async fn handle_list_runs(store: Arc<dyn Store>) -> anyhow::Result<()> {
    let runs = store.list_runs().await?;
    if runs.is_empty() {
        println!("No runs registered.");
        return Ok(());
    }

    println!(
        "{:<38} {:<20} {:<12} {:<9} {:<22} HEARTBEAT",
        "RUN ID", "STRATEGY", "SYMBOL", "STATUS", "CREATED"
    );
    for run in runs {
        let heartbeat = run
            .last_heartbeat
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<20} {:<12} {:<9} {:<22} {}",
            run.run_id,
            run.strategy_id.to_string(),
            run.symbol,
            run.status.to_string(),
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
            heartbeat
        );
    }
    Ok(())
}

async fn handle_cancel_order(args: CancelOrderArgs, store: Arc<dyn Store>) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let queue = PendingOrderQueue::new(store, clock);
    queue.cancel(args.order_id).await?;
    println!("Order {} cancelled.", args.order_id);
    Ok(())
}
