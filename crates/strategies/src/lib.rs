//! # Meridian Strategy Library
//!
//! This crate contains the trading logic for the Meridian runtime. It defines
//! a universal `Strategy` trait and provides the concrete implementations.
//!
//! ## Architectural Principles
//!
//! - **Pure logic:** strategies have no knowledge of databases, queues, or
//!   dispatch. They consume a `MarketContext` and emit `SignalIntent`s; the
//!   executor owns everything after that.
//! - **Strategy-agnostic runtime:** the executor operates on `Box<dyn
//!   Strategy>` and never learns which strategy a run executes.
//! - **Extensibility:** adding a strategy means a new module, a `StrategyId`
//!   variant, and a factory arm. The compiler flags the missing arm.
//!
//! ## Public API
//!
//! - `Strategy`: the core trait all strategies implement.
//! - `create_strategy`: the factory constructing a strategy from a run's
//!   persisted id + JSON parameters.
//! - `MarketDataSource` / `MarketContext`: the market-data seam the executor
//!   feeds evaluations from.

// Declare all the modules that constitute this crate.
pub mod context;
pub mod dual_ma;
pub mod error;
pub mod factory;
pub mod price_threshold;

// Re-export the key components to create a clean, public-facing API.
pub use context::{MarketContext, MarketDataSource, StaticMarketData};
pub use dual_ma::DualMaCrossover;
pub use error::StrategyError;
pub use factory::create_strategy;
pub use price_threshold::PriceThreshold;

// Re-export StrategyId from core_types
pub use core_types::enums::StrategyId;

use core_types::SignalIntent;

/// The core trait that all trading strategies must implement.
///
/// The `&mut self` in `evaluate` is crucial, as most strategies maintain
/// internal state between ticks (e.g., rolling indicator windows). The
/// `Send + Sync` bounds let a strategy live inside its run's spawned
/// execution unit.
///
/// `evaluate` must stay a pure computation over the given context: no I/O,
/// no sleeping. Failures terminate only the owning run.
pub trait Strategy: Send + Sync {
    /// Evaluates the strategy against the latest market context.
    ///
    /// Returns the trade intents this tick produced; an empty vector means
    /// no action.
    fn evaluate(&mut self, ctx: &MarketContext) -> Result<Vec<SignalIntent>, StrategyError>;
}
