use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{PendingOrder, RunStatus, StrategyRun};
use uuid::Uuid;

/// The persistence seam for strategy runs and pending orders.
///
/// Every mutating order operation after `create_order`, and every guarded run
/// transition, is an atomic single-row compare-and-set in the backend: the
/// update applies only if the row is still in the expected state (and, where
/// a lease is involved, still owned by the caller). A `false` return means
/// the row moved underneath the caller — for lease operations that is not an
/// error, just "another worker got there first".
#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // Strategy runs
    // ------------------------------------------------------------------

    async fn create_run(&self, run: &StrategyRun) -> Result<(), StoreError>;

    async fn get_run(&self, run_id: Uuid) -> Result<Option<StrategyRun>, StoreError>;

    async fn list_runs(&self) -> Result<Vec<StrategyRun>, StoreError>;

    async fn list_runs_by_status(&self, status: RunStatus)
    -> Result<Vec<StrategyRun>, StoreError>;

    /// Sets a run's status unless the run is already terminal.
    ///
    /// Returns whether the update applied. A run that reached Stopped or
    /// Failed stays there; this is what lets a force-stop race a unit's own
    /// failure marking without either side clobbering the other.
    async fn set_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Atomically moves a run from `expected` to `new`. Returns whether the
    /// transition applied.
    async fn compare_and_set_run_status(
        &self,
        run_id: Uuid,
        expected: RunStatus,
        new: RunStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Stamps the run's liveness marker; written by its execution unit once
    /// per tick.
    async fn record_heartbeat(&self, run_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    // ------------------------------------------------------------------
    // Pending orders
    // ------------------------------------------------------------------

    async fn create_order(&self, order: &PendingOrder) -> Result<(), StoreError>;

    async fn get_order(&self, order_id: Uuid) -> Result<Option<PendingOrder>, StoreError>;

    async fn list_orders_for_run(&self, run_id: Uuid) -> Result<Vec<PendingOrder>, StoreError>;

    /// Selects orders ready to be leased, preserving per-run FIFO.
    ///
    /// Only the oldest Queued order of each run is offered, and only when the
    /// run has nothing currently Dispatching and the order's backoff gate
    /// (`next_attempt_at`) has elapsed. Cross-run ordering is oldest-first
    /// but carries no guarantee.
    async fn list_dispatchable_orders(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PendingOrder>, StoreError>;

    /// CAS Queued -> Dispatching, claiming the lease for `owner` until
    /// `expires_at`. Returns whether the lease was acquired.
    async fn try_lease_order(
        &self,
        order_id: Uuid,
        owner: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// CAS Dispatching -> Dispatched, only while `owner` still holds the
    /// lease. Clears the lease and stamps `dispatched_at`.
    async fn complete_dispatch(
        &self,
        order_id: Uuid,
        owner: Uuid,
        dispatched_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// CAS Dispatching -> Queued after a transient failure, only while
    /// `owner` still holds the lease. Increments `retry_count` and arms the
    /// backoff gate.
    async fn requeue_for_retry(
        &self,
        order_id: Uuid,
        owner: Uuid,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// CAS Dispatching -> Failed with the recorded cause, only while `owner`
    /// still holds the lease. `retry_count` is left as-is.
    async fn fail_order(&self, order_id: Uuid, owner: Uuid, error: &str)
    -> Result<bool, StoreError>;

    /// CAS Queued -> Cancelled. Returns `false` when the order is already
    /// dispatching or terminal.
    async fn cancel_order(&self, order_id: Uuid) -> Result<bool, StoreError>;

    /// Returns every Dispatching order whose lease expired before `now` to
    /// Queued, clearing the lease and leaving `retry_count` untouched.
    /// Returns the number of orders released.
    async fn release_expired_leases(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
