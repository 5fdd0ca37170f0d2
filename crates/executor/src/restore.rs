use crate::{ExecutorError, StrategyExecutor};
use core_types::RunStatus;
use database::Store;
use std::sync::Arc;

/// What a restore pass did, for boot logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub already_running: usize,
    pub failed: usize,
}

/// The boot-time reconciliation pass.
///
/// A crash leaves runs marked Running with no execution unit attached. On
/// the next boot, `restore` lists those runs and starts a fresh unit for
/// each. Restore is idempotent: a second pass finds every Running run
/// already owning a context and does nothing.
pub struct RestoreManager {
    store: Arc<dyn Store>,
    executor: Arc<StrategyExecutor>,
}

impl RestoreManager {
    pub fn new(store: Arc<dyn Store>, executor: Arc<StrategyExecutor>) -> Self {
        Self { store, executor }
    }

    /// Reattaches execution units to runs left Running at last shutdown.
    ///
    /// A failure to restore one run is isolated: that run is marked Failed
    /// with the cause recorded and the pass continues. Only a failure to
    /// list the runs at all aborts the pass.
    pub async fn restore(&self) -> Result<RestoreReport, ExecutorError> {
        tracing::info!("restore: reconciling runs left Running by the previous process");

        let runs = self.store.list_runs_by_status(RunStatus::Running).await?;
        let mut report = RestoreReport::default();

        for run in runs {
            match self.executor.start(run.run_id).await {
                Ok(()) => {
                    report.restored += 1;
                    tracing::info!(run_id = %run.run_id, symbol = %run.symbol, "run restored");
                }
                Err(ExecutorError::AlreadyRunning(_)) => {
                    // A live unit already owns this run; nothing to do.
                    report.already_running += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(run_id = %run.run_id, error = %e, "failed to restore run");
                    let cause = format!("restore failed: {}", e);
                    if let Err(mark_err) = self
                        .store
                        .set_run_status(run.run_id, RunStatus::Failed, Some(&cause))
                        .await
                    {
                        tracing::error!(
                            run_id = %run.run_id,
                            error = %mark_err,
                            "could not record restore failure"
                        );
                    }
                }
            }
        }

        tracing::info!(
            restored = report.restored,
            already_running = report.already_running,
            failed = report.failed,
            "restore complete"
        );
        Ok(report)
    }
}
