//! # Meridian Executor Crate
//!
//! The strategy execution runtime: a bounded pool of concurrent execution
//! units, one per live strategy run, plus the boot-time restore pass that
//! survives process restarts.
//!
//! ## Architectural Principles
//!
//! - **Explicit ownership:** the `StrategyExecutor` owns the map from run id
//!   to execution handle. There is no process-wide registry; everything is
//!   reached through the executor object.
//! - **Failure isolation:** an error inside one strategy terminates only that
//!   run's unit and records the cause on that run. Sibling runs and the
//!   process itself are never affected.
//! - **Cooperative cancellation with a hard deadline:** units observe their
//!   cancellation signal at tick boundaries only. `stop` waits a configured
//!   grace period, then force-marks the run Stopped whether or not the unit
//!   exited — a misbehaving strategy can leak a task, but it can never block
//!   a caller indefinitely.
//!
//! ## Public API
//!
//! - `StrategyExecutor`: start/stop/pause/resume/status over the run pool.
//! - `RestoreManager`: reattaches units to runs left Running at last shutdown.
//! - `ExecutorError`: the specific error types that can be returned from this crate.

use chrono::{DateTime, Utc};
use configuration::ExecutorSettings;
use core_types::{Clock, RunStatus, StrategyId, StrategyRun};
use database::Store;
use dispatch::PendingOrderQueue;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use strategies::{MarketDataSource, Strategy, StrategyError};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use uuid::Uuid;

pub mod error;
pub mod restore;

pub use error::ExecutorError;
pub use restore::{RestoreManager, RestoreReport};

/// Builds a strategy instance for a run. Injected so tests can substitute
/// scripted strategies; production uses `strategies::create_strategy`.
pub type StrategyFactory =
    Arc<dyn Fn(StrategyId, &str, &JsonValue) -> Result<Box<dyn Strategy>, StrategyError> + Send + Sync>;

/// The in-memory handle for one run's live execution unit.
///
/// Holds the cancellation signal and the task handle; destroyed when the
/// unit terminates. Never persisted — after a crash, the restore pass
/// rebuilds contexts from run statuses alone.
pub struct ExecutionContext {
    /// Distinguishes this context from any successor for the same run id, so
    /// a finished unit only ever deregisters itself.
    context_id: Uuid,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
    #[allow(dead_code)]
    started_at: DateTime<Utc>,
}

/// The central orchestrator for strategy execution.
pub struct StrategyExecutor {
    settings: ExecutorSettings,

    // --- Shared, Thread-Safe Components ---
    store: Arc<dyn Store>,
    market_data: Arc<dyn MarketDataSource>,
    queue: PendingOrderQueue,
    clock: Arc<dyn Clock>,
    factory: StrategyFactory,

    // --- Run Management ---
    contexts: Arc<Mutex<HashMap<Uuid, ExecutionContext>>>,
}

impl StrategyExecutor {
    /// Creates a new `StrategyExecutor` with all its required components.
    pub fn new(
        settings: ExecutorSettings,
        store: Arc<dyn Store>,
        market_data: Arc<dyn MarketDataSource>,
        queue: PendingOrderQueue,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_factory(
            settings,
            store,
            market_data,
            queue,
            clock,
            Arc::new(|id, symbol, params| strategies::create_strategy(id, symbol, params)),
        )
    }

    /// Like `new`, but with an explicit strategy factory.
    pub fn with_factory(
        settings: ExecutorSettings,
        store: Arc<dyn Store>,
        market_data: Arc<dyn MarketDataSource>,
        queue: PendingOrderQueue,
        clock: Arc<dyn Clock>,
        factory: StrategyFactory,
    ) -> Self {
        Self {
            settings,
            store,
            market_data,
            queue,
            clock,
            factory,
            contexts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Starts the execution unit for a registered run.
    ///
    /// Marks the run Running and returns as soon as the unit is spawned; the
    /// first evaluation happens asynchronously. `PoolExhausted` is the
    /// backpressure signal — the caller decides whether to queue or reject.
    pub async fn start(&self, run_id: Uuid) -> Result<(), ExecutorError> {
        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or(ExecutorError::NotFound(run_id))?;
        if run.status.is_terminal() {
            return Err(ExecutorError::InvalidState {
                run_id,
                status: run.status,
            });
        }

        // The context lock is held across the status write so that a storm
        // of concurrent starts serializes here and exactly one wins.
        let mut contexts = self.contexts.lock().await;
        if contexts.contains_key(&run_id) {
            return Err(ExecutorError::AlreadyRunning(run_id));
        }
        if contexts.len() >= self.settings.max_concurrent_runs {
            return Err(ExecutorError::PoolExhausted(self.settings.max_concurrent_runs));
        }

        // Build the strategy up front so bad parameters fail this call
        // instead of the freshly spawned unit.
        let strategy = (self.factory)(run.strategy_id, &run.symbol, &run.parameters)?;

        if !self
            .store
            .set_run_status(run_id, RunStatus::Running, None)
            .await?
        {
            // Terminalized between our read and the write.
            let status = self
                .store
                .get_run(run_id)
                .await?
                .map(|r| r.status)
                .unwrap_or(run.status);
            return Err(ExecutorError::InvalidState { run_id, status });
        }

        self.spawn_unit(&run, strategy, &mut contexts);
        tracing::info!(run_id = %run_id, strategy = %run.strategy_id, symbol = %run.symbol, "run started");
        Ok(())
    }

    /// Stops a run.
    ///
    /// Signals cancellation, waits up to the configured grace period for the
    /// unit to observe it, then force-marks the run Stopped either way. If
    /// the unit is stuck it gets aborted at its next await point; a strategy
    /// spinning in pure compute can leak its task — the documented price for
    /// never blocking the caller.
    pub async fn stop(&self, run_id: Uuid) -> Result<(), ExecutorError> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or(ExecutorError::NotFound(run_id))?;

        let context = self.contexts.lock().await.remove(&run_id);
        if let Some(mut context) = context {
            let _ = context.cancel.send(true);
            match tokio::time::timeout(self.settings.stop_grace(), &mut context.handle).await {
                Ok(_) => {
                    tracing::debug!(run_id = %run_id, "execution unit exited within grace period")
                }
                Err(_) => {
                    tracing::warn!(
                        run_id = %run_id,
                        grace_secs = self.settings.stop_grace_secs,
                        "execution unit ignored cancellation; force-stopping"
                    );
                    context.handle.abort();
                }
            }
        }

        // Force-mark regardless of what the unit did. A run that already
        // terminalized itself (e.g. Failed during the grace period) wins.
        self.store
            .set_run_status(run_id, RunStatus::Stopped, None)
            .await?;
        tracing::info!(run_id = %run_id, "run stopped");
        Ok(())
    }

    /// Pauses a Running run. Its unit keeps ticking and heartbeating but
    /// skips evaluation until resumed.
    pub async fn pause(&self, run_id: Uuid) -> Result<(), ExecutorError> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or(ExecutorError::NotFound(run_id))?;

        if self
            .store
            .compare_and_set_run_status(run_id, RunStatus::Running, RunStatus::Paused, None)
            .await?
        {
            tracing::info!(run_id = %run_id, "run paused");
            Ok(())
        } else {
            Err(self.invalid_state(run_id).await)
        }
    }

    /// Resumes a Paused run, respawning its execution unit if the previous
    /// one did not survive a restart.
    pub async fn resume(&self, run_id: Uuid) -> Result<(), ExecutorError> {
        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or(ExecutorError::NotFound(run_id))?;

        if !self
            .store
            .compare_and_set_run_status(run_id, RunStatus::Paused, RunStatus::Running, None)
            .await?
        {
            return Err(self.invalid_state(run_id).await);
        }

        let mut contexts = self.contexts.lock().await;
        if !contexts.contains_key(&run_id) {
            if contexts.len() >= self.settings.max_concurrent_runs {
                return Err(ExecutorError::PoolExhausted(self.settings.max_concurrent_runs));
            }
            let strategy = (self.factory)(run.strategy_id, &run.symbol, &run.parameters)?;
            self.spawn_unit(&run, strategy, &mut contexts);
        }
        tracing::info!(run_id = %run_id, "run resumed");
        Ok(())
    }

    /// Returns the persisted state of a run.
    pub async fn status(&self, run_id: Uuid) -> Result<StrategyRun, ExecutorError> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or(ExecutorError::NotFound(run_id))
    }

    /// Number of live execution units.
    pub async fn live_run_count(&self) -> usize {
        self.contexts.lock().await.len()
    }

    /// Whether a run currently owns a live execution unit.
    pub async fn is_live(&self, run_id: Uuid) -> bool {
        self.contexts.lock().await.contains_key(&run_id)
    }

    async fn invalid_state(&self, run_id: Uuid) -> ExecutorError {
        match self.store.get_run(run_id).await {
            Ok(Some(run)) => ExecutorError::InvalidState {
                run_id,
                status: run.status,
            },
            Ok(None) => ExecutorError::NotFound(run_id),
            Err(e) => e.into(),
        }
    }

    fn spawn_unit(
        &self,
        run: &StrategyRun,
        strategy: Box<dyn Strategy>,
        contexts: &mut HashMap<Uuid, ExecutionContext>,
    ) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let context_id = Uuid::new_v4();
        let unit = ExecutionUnit {
            run_id: run.run_id,
            context_id,
            symbol: run.symbol.clone(),
            strategy,
            store: Arc::clone(&self.store),
            market_data: Arc::clone(&self.market_data),
            queue: self.queue.clone(),
            clock: Arc::clone(&self.clock),
            tick_interval: self.settings.tick_interval(),
            contexts: Arc::clone(&self.contexts),
        };
        let handle = tokio::spawn(unit.run(cancel_rx));
        contexts.insert(
            run.run_id,
            ExecutionContext {
                context_id,
                cancel: cancel_tx,
                handle,
                started_at: self.clock.now(),
            },
        );
    }
}

enum TickFlow {
    Continue,
    Exit,
}

/// One run's execution loop, spawned as its own task.
struct ExecutionUnit {
    run_id: Uuid,
    context_id: Uuid,
    symbol: String,
    strategy: Box<dyn Strategy>,
    store: Arc<dyn Store>,
    market_data: Arc<dyn MarketDataSource>,
    queue: PendingOrderQueue,
    clock: Arc<dyn Clock>,
    tick_interval: std::time::Duration,
    contexts: Arc<Mutex<HashMap<Uuid, ExecutionContext>>>,
}

impl ExecutionUnit {
    async fn run(mut self, mut cancel_rx: watch::Receiver<bool>) {
        tracing::info!(run_id = %self.run_id, symbol = %self.symbol, "execution unit started");

        let mut timer = interval(self.tick_interval);

        let outcome: Result<(), ExecutorError> = loop {
            tokio::select! {
                biased;

                // Cancellation is observed here and only here; within a tick
                // the unit runs to completion.
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        break Ok(());
                    }
                }

                _ = timer.tick() => {
                    match self.tick().await {
                        Ok(TickFlow::Continue) => {}
                        Ok(TickFlow::Exit) => break Ok(()),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        if let Err(e) = outcome {
            // Isolate the failure: record it on this run and die quietly.
            tracing::error!(run_id = %self.run_id, error = %e, "execution unit failed");
            if let Err(mark_err) = self
                .store
                .set_run_status(self.run_id, RunStatus::Failed, Some(&e.to_string()))
                .await
            {
                tracing::error!(
                    run_id = %self.run_id,
                    error = %mark_err,
                    "could not record run failure"
                );
            }
        }

        self.deregister().await;
        tracing::info!(run_id = %self.run_id, "execution unit exited");
    }

    async fn tick(&mut self) -> Result<TickFlow, ExecutorError> {
        self.store
            .record_heartbeat(self.run_id, self.clock.now())
            .await?;

        let run = self
            .store
            .get_run(self.run_id)
            .await?
            .ok_or(ExecutorError::NotFound(self.run_id))?;
        match run.status {
            // Paused runs stay alive but idle.
            RunStatus::Paused => return Ok(TickFlow::Continue),
            // Someone terminalized the run out from under us (e.g. a force
            // stop whose cancel signal we haven't observed yet).
            RunStatus::Stopped | RunStatus::Failed => return Ok(TickFlow::Exit),
            RunStatus::Pending | RunStatus::Running => {}
        }

        let ctx = match self.market_data.snapshot(&self.symbol).await {
            Ok(ctx) => ctx,
            Err(e) => {
                // Market data hiccups are transient; skip the tick.
                tracing::warn!(run_id = %self.run_id, error = %e, "market data unavailable; skipping tick");
                return Ok(TickFlow::Continue);
            }
        };

        let intents = self.strategy.evaluate(&ctx)?;
        for intent in &intents {
            let order = self.queue.enqueue(self.run_id, intent).await?;
            tracing::debug!(
                run_id = %self.run_id,
                order_id = %order.order_id,
                reason = ?intent.reason,
                "signal queued for dispatch"
            );
        }

        Ok(TickFlow::Continue)
    }

    /// Removes this unit's context, and only this unit's: if a stop already
    /// removed it (or, in principle, a successor replaced it), leave the map
    /// alone.
    async fn deregister(&self) {
        let mut contexts = self.contexts.lock().await;
        if contexts
            .get(&self.run_id)
            .is_some_and(|c| c.context_id == self.context_id)
        {
            contexts.remove(&self.run_id);
        }
    }
}
