use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side of the order
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "Buy"),
            OrderSide::Sell => write!(f, "Sell"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Buy" => Ok(OrderSide::Buy),
            "Sell" => Ok(OrderSide::Sell),
            other => Err(CoreError::InvalidInput(
                "OrderSide".to_string(),
                other.to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "Market"),
            OrderType::Limit => write!(f, "Limit"),
        }
    }
}

impl FromStr for OrderType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Market" => Ok(OrderType::Market),
            "Limit" => Ok(OrderType::Limit),
            other => Err(CoreError::InvalidInput(
                "OrderType".to_string(),
                other.to_string(),
            )),
        }
    }
}

/// Identifies which strategy implementation a run executes.
///
/// The string forms are what get persisted in the `strategy_id` column, so
/// they must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    DualMaCrossover,
    PriceThreshold,
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyId::DualMaCrossover => write!(f, "dual_ma_crossover"),
            StrategyId::PriceThreshold => write!(f, "price_threshold"),
        }
    }
}

impl FromStr for StrategyId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dual_ma_crossover" => Ok(StrategyId::DualMaCrossover),
            "price_threshold" => Ok(StrategyId::PriceThreshold),
            other => Err(CoreError::InvalidInput(
                "StrategyId".to_string(),
                other.to_string(),
            )),
        }
    }
}

/// The lifecycle state of a `StrategyRun`.
///
/// Transitions are monotonic except for `Running` <-> `Paused`. `Stopped` and
/// `Failed` are terminal and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Stopped,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Stopped | RunStatus::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Same-state "transitions" are allowed so that idempotent updates (e.g.
    /// restore re-marking a run as Running) don't need a special case.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        if *self == next {
            return true;
        }
        match (self, next) {
            (RunStatus::Pending, RunStatus::Running)
            | (RunStatus::Pending, RunStatus::Stopped)
            | (RunStatus::Pending, RunStatus::Failed)
            | (RunStatus::Running, RunStatus::Paused)
            | (RunStatus::Running, RunStatus::Stopped)
            | (RunStatus::Running, RunStatus::Failed)
            | (RunStatus::Paused, RunStatus::Running)
            | (RunStatus::Paused, RunStatus::Stopped)
            | (RunStatus::Paused, RunStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "Pending",
            RunStatus::Running => "Running",
            RunStatus::Paused => "Paused",
            RunStatus::Stopped => "Stopped",
            RunStatus::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(RunStatus::Pending),
            "Running" => Ok(RunStatus::Running),
            "Paused" => Ok(RunStatus::Paused),
            "Stopped" => Ok(RunStatus::Stopped),
            "Failed" => Ok(RunStatus::Failed),
            other => Err(CoreError::InvalidInput(
                "RunStatus".to_string(),
                other.to_string(),
            )),
        }
    }
}

/// The lifecycle state of a `PendingOrder`.
///
/// An order is only ever handed to the signal sink while `Dispatching` under
/// a non-expired lease. `Dispatched`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Queued,
    Dispatching,
    Dispatched,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Dispatched | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (OrderStatus::Queued, OrderStatus::Dispatching)
            | (OrderStatus::Queued, OrderStatus::Cancelled)
            | (OrderStatus::Dispatching, OrderStatus::Dispatched)
            | (OrderStatus::Dispatching, OrderStatus::Queued)
            | (OrderStatus::Dispatching, OrderStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Queued => "Queued",
            OrderStatus::Dispatching => "Dispatching",
            OrderStatus::Dispatched => "Dispatched",
            OrderStatus::Failed => "Failed",
            OrderStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(OrderStatus::Queued),
            "Dispatching" => Ok(OrderStatus::Dispatching),
            "Dispatched" => Ok(OrderStatus::Dispatched),
            "Failed" => Ok(OrderStatus::Failed),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(CoreError::InvalidInput(
                "OrderStatus".to_string(),
                other.to_string(),
            )),
        }
    }
}
