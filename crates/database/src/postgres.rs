use crate::error::StoreError;
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{OrderStatus, PendingOrder, RunStatus, StrategyRun};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use sqlx::postgres::PgPool;
use uuid::Uuid;

/// The Postgres-backed `Store`.
///
/// All status/lease mutations are single-row `UPDATE ... WHERE` statements
/// whose predicate carries the expected prior state, so each one is an atomic
/// compare-and-set; `rows_affected` tells the caller whether it won.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// A row fetched from the `strategy_runs` table. Statuses live as TEXT in
/// the schema and are parsed on the way out.
#[derive(Debug, Clone, FromRow)]
struct RunRow {
    run_id: Uuid,
    strategy_id: String,
    symbol: String,
    parameters: JsonValue,
    status: String,
    error: Option<String>,
    created_at: DateTime<Utc>,
    last_heartbeat: Option<DateTime<Utc>>,
}

impl TryFrom<RunRow> for StrategyRun {
    type Error = StoreError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(StrategyRun {
            run_id: row.run_id,
            strategy_id: row.strategy_id.parse()?,
            symbol: row.symbol,
            parameters: row.parameters,
            status: row.status.parse()?,
            error: row.error,
            created_at: row.created_at,
            last_heartbeat: row.last_heartbeat,
        })
    }
}

/// A row fetched from the `pending_orders` table.
#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    order_id: Uuid,
    run_id: Uuid,
    symbol: String,
    side: String,
    order_type: String,
    quantity: Decimal,
    price: Option<Decimal>,
    status: String,
    retry_count: i32,
    lease_owner: Option<Uuid>,
    lease_expires_at: Option<DateTime<Utc>>,
    next_attempt_at: Option<DateTime<Utc>>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    dispatched_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for PendingOrder {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(PendingOrder {
            order_id: row.order_id,
            run_id: row.run_id,
            symbol: row.symbol,
            side: row.side.parse()?,
            order_type: row.order_type.parse()?,
            quantity: row.quantity,
            price: row.price,
            status: row.status.parse()?,
            retry_count: row.retry_count,
            lease_owner: row.lease_owner,
            lease_expires_at: row.lease_expires_at,
            next_attempt_at: row.next_attempt_at,
            error: row.error,
            created_at: row.created_at,
            dispatched_at: row.dispatched_at,
        })
    }
}

const SELECT_RUN: &str = "SELECT run_id, strategy_id, symbol, parameters, status, error, \
     created_at, last_heartbeat FROM strategy_runs";

const SELECT_ORDER: &str = "SELECT order_id, run_id, symbol, side, order_type, quantity, price, \
     status, retry_count, lease_owner, lease_expires_at, next_attempt_at, error, \
     created_at, dispatched_at FROM pending_orders";

#[async_trait]
impl Store for PgStore {
    async fn create_run(&self, run: &StrategyRun) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO strategy_runs (run_id, strategy_id, symbol, parameters, status, error, created_at, last_heartbeat)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(run.run_id)
        .bind(run.strategy_id.to_string())
        .bind(&run.symbol)
        .bind(&run.parameters)
        .bind(run.status.to_string())
        .bind(&run.error)
        .bind(run.created_at)
        .bind(run.last_heartbeat)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<StrategyRun>, StoreError> {
        let row = sqlx::query_as::<_, RunRow>(&format!("{SELECT_RUN} WHERE run_id = $1"))
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(StrategyRun::try_from).transpose()
    }

    async fn list_runs(&self) -> Result<Vec<StrategyRun>, StoreError> {
        let rows = sqlx::query_as::<_, RunRow>(&format!("{SELECT_RUN} ORDER BY created_at DESC"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(StrategyRun::try_from).collect()
    }

    async fn list_runs_by_status(
        &self,
        status: RunStatus,
    ) -> Result<Vec<StrategyRun>, StoreError> {
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            "{SELECT_RUN} WHERE status = $1 ORDER BY created_at ASC"
        ))
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(StrategyRun::try_from).collect()
    }

    async fn set_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE strategy_runs
            SET status = $1, error = COALESCE($2, error)
            WHERE run_id = $3 AND status NOT IN ($4, $5)
            "#,
        )
        .bind(status.to_string())
        .bind(error)
        .bind(run_id)
        .bind(RunStatus::Stopped.to_string())
        .bind(RunStatus::Failed.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn compare_and_set_run_status(
        &self,
        run_id: Uuid,
        expected: RunStatus,
        new: RunStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE strategy_runs
            SET status = $1, error = COALESCE($2, error)
            WHERE run_id = $3 AND status = $4
            "#,
        )
        .bind(new.to_string())
        .bind(error)
        .bind(run_id)
        .bind(expected.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_heartbeat(&self, run_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE strategy_runs SET last_heartbeat = $1 WHERE run_id = $2")
            .bind(at)
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_order(&self, order: &PendingOrder) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pending_orders (
                order_id, run_id, symbol, side, order_type, quantity, price, status,
                retry_count, lease_owner, lease_expires_at, next_attempt_at, error,
                created_at, dispatched_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(order.order_id)
        .bind(order.run_id)
        .bind(&order.symbol)
        .bind(order.side.to_string())
        .bind(order.order_type.to_string())
        .bind(order.quantity)
        .bind(order.price)
        .bind(order.status.to_string())
        .bind(order.retry_count)
        .bind(order.lease_owner)
        .bind(order.lease_expires_at)
        .bind(order.next_attempt_at)
        .bind(&order.error)
        .bind(order.created_at)
        .bind(order.dispatched_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<PendingOrder>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("{SELECT_ORDER} WHERE order_id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PendingOrder::try_from).transpose()
    }

    async fn list_orders_for_run(&self, run_id: Uuid) -> Result<Vec<PendingOrder>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "{SELECT_ORDER} WHERE run_id = $1 ORDER BY created_at ASC"
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PendingOrder::try_from).collect()
    }

    async fn list_dispatchable_orders(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PendingOrder>, StoreError> {
        // The inner DISTINCT ON picks each run's queue head; the outer filter
        // drops heads whose backoff gate has not elapsed, so a run in backoff
        // blocks (rather than reorders) its own queue.
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT * FROM (
                SELECT DISTINCT ON (run_id)
                    order_id, run_id, symbol, side, order_type, quantity, price,
                    status, retry_count, lease_owner, lease_expires_at, next_attempt_at,
                    error, created_at, dispatched_at
                FROM pending_orders
                WHERE status = $1
                  AND run_id NOT IN (
                      SELECT run_id FROM pending_orders WHERE status = $2
                  )
                ORDER BY run_id, created_at ASC
            ) head
            WHERE head.next_attempt_at IS NULL OR head.next_attempt_at <= $3
            ORDER BY head.created_at ASC
            LIMIT $4
            "#,
        )
        .bind(OrderStatus::Queued.to_string())
        .bind(OrderStatus::Dispatching.to_string())
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PendingOrder::try_from).collect()
    }

    async fn try_lease_order(
        &self,
        order_id: Uuid,
        owner: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_orders
            SET status = $1, lease_owner = $2, lease_expires_at = $3
            WHERE order_id = $4 AND status = $5
            "#,
        )
        .bind(OrderStatus::Dispatching.to_string())
        .bind(owner)
        .bind(expires_at)
        .bind(order_id)
        .bind(OrderStatus::Queued.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_dispatch(
        &self,
        order_id: Uuid,
        owner: Uuid,
        dispatched_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_orders
            SET status = $1, dispatched_at = $2, lease_owner = NULL, lease_expires_at = NULL
            WHERE order_id = $3 AND status = $4 AND lease_owner = $5
            "#,
        )
        .bind(OrderStatus::Dispatched.to_string())
        .bind(dispatched_at)
        .bind(order_id)
        .bind(OrderStatus::Dispatching.to_string())
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn requeue_for_retry(
        &self,
        order_id: Uuid,
        owner: Uuid,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_orders
            SET status = $1, retry_count = retry_count + 1,
                lease_owner = NULL, lease_expires_at = NULL, next_attempt_at = $2
            WHERE order_id = $3 AND status = $4 AND lease_owner = $5
            "#,
        )
        .bind(OrderStatus::Queued.to_string())
        .bind(next_attempt_at)
        .bind(order_id)
        .bind(OrderStatus::Dispatching.to_string())
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail_order(
        &self,
        order_id: Uuid,
        owner: Uuid,
        error: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_orders
            SET status = $1, error = $2, lease_owner = NULL, lease_expires_at = NULL
            WHERE order_id = $3 AND status = $4 AND lease_owner = $5
            "#,
        )
        .bind(OrderStatus::Failed.to_string())
        .bind(error)
        .bind(order_id)
        .bind(OrderStatus::Dispatching.to_string())
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel_order(&self, order_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_orders
            SET status = $1
            WHERE order_id = $2 AND status = $3
            "#,
        )
        .bind(OrderStatus::Cancelled.to_string())
        .bind(order_id)
        .bind(OrderStatus::Queued.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_expired_leases(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_orders
            SET status = $1, lease_owner = NULL, lease_expires_at = NULL
            WHERE status = $2 AND lease_expires_at < $3
            "#,
        )
        .bind(OrderStatus::Queued.to_string())
        .bind(OrderStatus::Dispatching.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
