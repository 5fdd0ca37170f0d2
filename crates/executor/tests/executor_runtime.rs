//! Integration tests for the strategy executor and the restore pass, run
//! against the in-memory store with scripted market data.

use async_trait::async_trait;
use chrono::Utc;
use configuration::ExecutorSettings;
use core_types::{Clock, OrderStatus, RunStatus, StrategyId, StrategyRun, SystemClock};
use database::{MemoryStore, Store};
use dispatch::PendingOrderQueue;
use executor::{ExecutorError, RestoreManager, StrategyExecutor, StrategyFactory};
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use strategies::{MarketContext, MarketDataSource, StaticMarketData, Strategy, StrategyError};
use uuid::Uuid;

fn settings() -> ExecutorSettings {
    ExecutorSettings {
        max_concurrent_runs: 8,
        tick_interval_secs: 1,
        stop_grace_secs: 1,
        restore_on_boot: true,
    }
}

fn world(
    settings: ExecutorSettings,
) -> (Arc<MemoryStore>, Arc<StaticMarketData>, Arc<StrategyExecutor>) {
    let store = Arc::new(MemoryStore::new());
    let market = Arc::new(StaticMarketData::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let queue = PendingOrderQueue::new(store.clone(), clock.clone());
    let executor = Arc::new(StrategyExecutor::new(
        settings,
        store.clone(),
        market.clone(),
        queue,
        clock,
    ));
    (store, market, executor)
}

/// Seeds a price-threshold run (band 50k/55k, no cooldown) in the given
/// state.
async fn seed_run(store: &MemoryStore, symbol: &str, status: RunStatus) -> Uuid {
    let mut run = StrategyRun::new(
        StrategyId::PriceThreshold,
        symbol,
        json!({ "buy_below": 50000, "sell_above": 55000, "quantity": 1, "cooldown_secs": 0 }),
        Utc::now(),
    );
    run.status = status;
    store.create_run(&run).await.unwrap();
    run.run_id
}

#[tokio::test]
async fn start_unknown_run_is_not_found() {
    let (_store, _market, executor) = world(settings());
    assert!(matches!(
        executor.start(Uuid::new_v4()).await,
        Err(ExecutorError::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn double_start_reports_already_running() {
    let (store, _market, executor) = world(settings());
    let run_id = seed_run(&store, "BTCUSDT", RunStatus::Pending).await;

    executor.start(run_id).await.unwrap();
    assert!(matches!(
        executor.start(run_id).await,
        Err(ExecutorError::AlreadyRunning(_))
    ));
    assert_eq!(executor.live_run_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn pool_exhaustion_is_reported_as_backpressure() {
    let mut small = settings();
    small.max_concurrent_runs = 1;
    let (store, _market, executor) = world(small);

    let first = seed_run(&store, "BTCUSDT", RunStatus::Pending).await;
    let second = seed_run(&store, "ETHUSDT", RunStatus::Pending).await;

    executor.start(first).await.unwrap();
    assert!(matches!(
        executor.start(second).await,
        Err(ExecutorError::PoolExhausted(1))
    ));
    // The rejected run was not touched.
    let run = executor.status(second).await.unwrap();
    assert_eq!(run.status, RunStatus::Pending);
}

#[tokio::test]
async fn terminal_runs_cannot_be_started() {
    let (store, _market, executor) = world(settings());
    let run_id = seed_run(&store, "BTCUSDT", RunStatus::Stopped).await;

    assert!(matches!(
        executor.start(run_id).await,
        Err(ExecutorError::InvalidState { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_yield_exactly_one_context() {
    let (store, _market, executor) = world(settings());
    let run_id = seed_run(&store, "BTCUSDT", RunStatus::Pending).await;

    let attempts = futures::future::join_all(
        (0..8).map(|_| {
            let executor = executor.clone();
            tokio::spawn(async move { executor.start(run_id).await })
        }),
    )
    .await;

    let successes = attempts
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(Result::is_ok)
        .count();

    assert_eq!(successes, 1);
    assert_eq!(executor.live_run_count().await, 1);

    executor.stop(run_id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn execution_unit_turns_signals_into_queued_orders() {
    let (store, market, executor) = world(settings());
    let run_id = seed_run(&store, "BTCUSDT", RunStatus::Pending).await;
    market.set_price("BTCUSDT", dec!(49000));

    executor.start(run_id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let orders = store.list_orders_for_run(run_id).await.unwrap();
    // Below the buy threshold: exactly one buy until the notional position
    // is sold back.
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Queued);
    assert_eq!(orders[0].symbol, "BTCUSDT");
    assert_eq!(orders[0].quantity, dec!(1));

    // The unit heartbeats as it ticks.
    let run = executor.status(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.last_heartbeat.is_some());
}

/// A strategy that fails its first evaluation.
struct FailingStrategy;

impl Strategy for FailingStrategy {
    fn evaluate(&mut self, _ctx: &MarketContext) -> Result<Vec<core_types::SignalIntent>, StrategyError> {
        Err(StrategyError::Indicator("synthetic failure".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn a_failing_strategy_terminates_only_its_own_run() {
    let (store, market, _) = world(settings());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let queue = PendingOrderQueue::new(store.clone(), clock.clone());
    let factory: StrategyFactory = Arc::new(|id, symbol, params| {
        if symbol == "FAILUSDT" {
            Ok(Box::new(FailingStrategy))
        } else {
            strategies::create_strategy(id, symbol, params)
        }
    });
    let executor = Arc::new(StrategyExecutor::with_factory(
        settings(),
        store.clone(),
        market.clone(),
        queue,
        clock,
        factory,
    ));

    let failing = seed_run(&store, "FAILUSDT", RunStatus::Pending).await;
    let healthy = seed_run(&store, "BTCUSDT", RunStatus::Pending).await;
    market.set_price("FAILUSDT", dec!(100));
    market.set_price("BTCUSDT", dec!(52000));

    executor.start(failing).await.unwrap();
    executor.start(healthy).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let failed_run = executor.status(failing).await.unwrap();
    assert_eq!(failed_run.status, RunStatus::Failed);
    assert!(failed_run.error.as_deref().unwrap().contains("synthetic failure"));
    assert!(!executor.is_live(failing).await);

    // The sibling keeps running, untouched.
    let healthy_run = executor.status(healthy).await.unwrap();
    assert_eq!(healthy_run.status, RunStatus::Running);
    assert!(executor.is_live(healthy).await);
}

#[tokio::test(start_paused = true)]
async fn stop_is_clean_when_the_unit_cooperates() {
    let (store, _market, executor) = world(settings());
    let run_id = seed_run(&store, "BTCUSDT", RunStatus::Pending).await;

    executor.start(run_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    executor.stop(run_id).await.unwrap();

    assert!(!executor.is_live(run_id).await);
    let run = executor.status(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Stopped);
}

/// A market-data source that never answers, pinning its caller inside a
/// tick.
struct HangingMarketData;

#[async_trait]
impl MarketDataSource for HangingMarketData {
    async fn snapshot(&self, _symbol: &str) -> Result<MarketContext, StrategyError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn stop_force_marks_a_run_whose_unit_ignores_cancellation() {
    let store = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let queue = PendingOrderQueue::new(store.clone(), clock.clone());
    let executor = Arc::new(StrategyExecutor::new(
        settings(),
        store.clone(),
        Arc::new(HangingMarketData),
        queue,
        clock,
    ));
    let run_id = seed_run(&store, "BTCUSDT", RunStatus::Pending).await;

    executor.start(run_id).await.unwrap();
    // Let the unit enter its tick and hang on the market-data await, where
    // it cannot observe cancellation.
    tokio::time::sleep(Duration::from_millis(100)).await;

    executor.stop(run_id).await.unwrap();

    let run = executor.status(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Stopped);
    assert!(!executor.is_live(run_id).await);
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_toggle_without_replacing_the_unit() {
    let (store, _market, executor) = world(settings());
    let run_id = seed_run(&store, "BTCUSDT", RunStatus::Pending).await;

    executor.start(run_id).await.unwrap();
    executor.pause(run_id).await.unwrap();
    assert_eq!(executor.status(run_id).await.unwrap().status, RunStatus::Paused);
    // The unit stays attached while paused.
    assert!(executor.is_live(run_id).await);

    // Pausing a paused run is an invalid transition.
    assert!(matches!(
        executor.pause(run_id).await,
        Err(ExecutorError::InvalidState { .. })
    ));

    executor.resume(run_id).await.unwrap();
    assert_eq!(executor.status(run_id).await.unwrap().status, RunStatus::Running);
    assert_eq!(executor.live_run_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn restore_attaches_exactly_one_context_per_orphaned_run() {
    let (store, _market, executor) = world(settings());

    // Three runs left Running by a "crashed" process: no live contexts.
    let mut run_ids = Vec::new();
    for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT"] {
        run_ids.push(seed_run(&store, symbol, RunStatus::Running).await);
    }
    assert_eq!(executor.live_run_count().await, 0);

    let manager = RestoreManager::new(store.clone(), executor.clone());
    let report = manager.restore().await.unwrap();

    assert_eq!(report.restored, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(executor.live_run_count().await, 3);
    for run_id in &run_ids {
        assert!(executor.is_live(*run_id).await);
    }

    // Idempotent: the second pass finds nothing left to reattach.
    let second = manager.restore().await.unwrap();
    assert_eq!(second.restored, 0);
    assert_eq!(second.already_running, 3);
    assert_eq!(executor.live_run_count().await, 3);
}

#[tokio::test(start_paused = true)]
async fn restore_isolates_a_bad_record_and_continues() {
    let (store, _market, executor) = world(settings());

    let good_a = seed_run(&store, "BTCUSDT", RunStatus::Running).await;
    let good_b = seed_run(&store, "ETHUSDT", RunStatus::Running).await;

    // A run whose parameters no longer deserialize; its strategy cannot be
    // rebuilt.
    let mut broken = StrategyRun::new(
        StrategyId::PriceThreshold,
        "DOGEUSDT",
        json!({ "buy_below": "not a number" }),
        Utc::now(),
    );
    broken.status = RunStatus::Running;
    store.create_run(&broken).await.unwrap();

    let manager = RestoreManager::new(store.clone(), executor.clone());
    let report = manager.restore().await.unwrap();

    assert_eq!(report.restored, 2);
    assert_eq!(report.failed, 1);
    assert!(executor.is_live(good_a).await);
    assert!(executor.is_live(good_b).await);

    let broken_run = executor.status(broken.run_id).await.unwrap();
    assert_eq!(broken_run.status, RunStatus::Failed);
    assert!(broken_run.error.as_deref().unwrap().contains("restore failed"));
    assert!(!executor.is_live(broken.run_id).await);
}
