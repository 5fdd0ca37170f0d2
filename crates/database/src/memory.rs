use crate::error::StoreError;
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{OrderStatus, PendingOrder, RunStatus, StrategyRun};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// An in-process `Store` with the same compare-and-set semantics as
/// `PgStore`.
///
/// Both maps live behind one mutex so that every operation observes and
/// mutates a consistent snapshot, mirroring the row-level atomicity the
/// Postgres backend gets from single-statement updates. Used by the test
/// suites and by local dry runs that have no database at hand.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    runs: HashMap<Uuid, StrategyRun>,
    orders: HashMap<Uuid, PendingOrder>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_run(&self, run: &StrategyRun) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.runs.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<StrategyRun>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.runs.get(&run_id).cloned())
    }

    async fn list_runs(&self) -> Result<Vec<StrategyRun>, StoreError> {
        let inner = self.inner.lock().await;
        let mut runs: Vec<_> = inner.runs.values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    async fn list_runs_by_status(
        &self,
        status: RunStatus,
    ) -> Result<Vec<StrategyRun>, StoreError> {
        let inner = self.inner.lock().await;
        let mut runs: Vec<_> = inner
            .runs
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(runs)
    }

    async fn set_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.runs.get_mut(&run_id) {
            Some(run) if !run.status.is_terminal() => {
                run.status = status;
                if let Some(cause) = error {
                    run.error = Some(cause.to_string());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_set_run_status(
        &self,
        run_id: Uuid,
        expected: RunStatus,
        new: RunStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.runs.get_mut(&run_id) {
            Some(run) if run.status == expected => {
                run.status = new;
                if let Some(cause) = error {
                    run.error = Some(cause.to_string());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_heartbeat(&self, run_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(run) = inner.runs.get_mut(&run_id) {
            run.last_heartbeat = Some(at);
        }
        Ok(())
    }

    async fn create_order(&self, order: &PendingOrder) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.orders.insert(order.order_id, order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<PendingOrder>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.get(&order_id).cloned())
    }

    async fn list_orders_for_run(&self, run_id: Uuid) -> Result<Vec<PendingOrder>, StoreError> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<_> = inner
            .orders
            .values()
            .filter(|o| o.run_id == run_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn list_dispatchable_orders(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PendingOrder>, StoreError> {
        let inner = self.inner.lock().await;

        // Runs with an order mid-dispatch keep the rest of their queue held
        // back, same as the Postgres query.
        let busy_runs: Vec<Uuid> = inner
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Dispatching)
            .map(|o| o.run_id)
            .collect();

        let mut heads: HashMap<Uuid, &PendingOrder> = HashMap::new();
        for order in inner.orders.values() {
            if order.status != OrderStatus::Queued || busy_runs.contains(&order.run_id) {
                continue;
            }
            let head = heads.entry(order.run_id).or_insert(order);
            if order.created_at < head.created_at {
                *head = order;
            }
        }

        let mut ready: Vec<PendingOrder> = heads
            .into_values()
            .filter(|o| o.next_attempt_at.is_none_or(|at| at <= now))
            .cloned()
            .collect();
        ready.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        ready.truncate(limit.max(0) as usize);
        Ok(ready)
    }

    async fn try_lease_order(
        &self,
        order_id: Uuid,
        owner: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(&order_id) {
            Some(order) if order.status == OrderStatus::Queued => {
                order.status = OrderStatus::Dispatching;
                order.lease_owner = Some(owner);
                order.lease_expires_at = Some(expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_dispatch(
        &self,
        order_id: Uuid,
        owner: Uuid,
        dispatched_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(&order_id) {
            Some(order)
                if order.status == OrderStatus::Dispatching
                    && order.lease_owner == Some(owner) =>
            {
                order.status = OrderStatus::Dispatched;
                order.dispatched_at = Some(dispatched_at);
                order.lease_owner = None;
                order.lease_expires_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn requeue_for_retry(
        &self,
        order_id: Uuid,
        owner: Uuid,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(&order_id) {
            Some(order)
                if order.status == OrderStatus::Dispatching
                    && order.lease_owner == Some(owner) =>
            {
                order.status = OrderStatus::Queued;
                order.retry_count += 1;
                order.lease_owner = None;
                order.lease_expires_at = None;
                order.next_attempt_at = Some(next_attempt_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_order(
        &self,
        order_id: Uuid,
        owner: Uuid,
        error: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(&order_id) {
            Some(order)
                if order.status == OrderStatus::Dispatching
                    && order.lease_owner == Some(owner) =>
            {
                order.status = OrderStatus::Failed;
                order.error = Some(error.to_string());
                order.lease_owner = None;
                order.lease_expires_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_order(&self, order_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(&order_id) {
            Some(order) if order.status == OrderStatus::Queued => {
                order.status = OrderStatus::Cancelled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_expired_leases(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut released = 0;
        for order in inner.orders.values_mut() {
            if order.status == OrderStatus::Dispatching
                && order.lease_expires_at.is_some_and(|at| at < now)
            {
                order.status = OrderStatus::Queued;
                order.lease_owner = None;
                order.lease_expires_at = None;
                released += 1;
            }
        }
        Ok(released)
    }
}
