use crate::enums::{OrderSide, OrderStatus, OrderType, RunStatus, StrategyId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A registered, potentially executing instance of a trading strategy.
///
/// Run records are never deleted; they are only terminalized. The
/// `last_heartbeat` column is written by the run's own execution unit on
/// every tick, which is what lets a restore pass (or an operator) tell a
/// live run from one orphaned by a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRun {
    pub run_id: Uuid,
    pub strategy_id: StrategyId,
    /// The instrument this run trades (e.g., "BTCUSDT").
    pub symbol: String,
    /// Strategy-specific parameters, deserialized by the strategy factory.
    pub parameters: JsonValue,
    pub status: RunStatus,
    /// The recorded cause when `status` is `Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl StrategyRun {
    /// Creates a new run record in the `Pending` state.
    pub fn new(
        strategy_id: StrategyId,
        symbol: impl Into<String>,
        parameters: JsonValue,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            strategy_id,
            symbol: symbol.into(),
            parameters,
            status: RunStatus::Pending,
            error: None,
            created_at,
            last_heartbeat: None,
        }
    }
}

/// A trade intent emitted by a strategy evaluation.
///
/// This is the pure output of `Strategy::evaluate`; the execution unit turns
/// it into a durable `PendingOrder` before anything leaves the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalIntent {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Limit price; `None` for market orders.
    pub price: Option<Decimal>,
    /// Human-readable explanation of why the strategy fired.
    pub reason: Option<String>,
}

impl SignalIntent {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            reason: None,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A durable trade intent awaiting dispatch to the signal sink.
///
/// Once queued, an order is mutated exclusively through single-row
/// compare-and-set updates, so several dispatch workers can share the queue
/// without any in-memory coordination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_id: Uuid,
    /// The run that emitted this order.
    pub run_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    /// Completed delivery attempts that failed transiently.
    pub retry_count: i32,
    /// Lease token of the worker currently dispatching, if any.
    pub lease_owner: Option<Uuid>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Earliest time the order may be leased again (backoff gate).
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// The recorded cause when `status` is `Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl PendingOrder {
    /// Creates a `Queued` order from a strategy-emitted intent.
    pub fn from_intent(run_id: Uuid, intent: &SignalIntent, created_at: DateTime<Utc>) -> Self {
        Self {
            order_id: Uuid::new_v4(),
            run_id,
            symbol: intent.symbol.clone(),
            side: intent.side,
            order_type: intent.order_type,
            quantity: intent.quantity,
            price: intent.price,
            status: OrderStatus::Queued,
            retry_count: 0,
            lease_owner: None,
            lease_expires_at: None,
            next_attempt_at: None,
            error: None,
            created_at,
            dispatched_at: None,
        }
    }
}

/// The payload handed to the signal sink for one dispatch attempt.
///
/// `idempotency_key` is the `PendingOrder` id; a sink that enforces the key
/// turns a duplicate delivery (e.g. after a lease expired mid-flight) into a
/// no-op on the receiving side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundSignal {
    pub idempotency_key: Uuid,
    pub run_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub queued_at: DateTime<Utc>,
}

impl OutboundSignal {
    pub fn from_order(order: &PendingOrder) -> Self {
        Self {
            idempotency_key: order.order_id,
            run_id: order.run_id,
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            quantity: order.quantity,
            price: order.price,
            queued_at: order.created_at,
        }
    }
}
