pub mod clock;
pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use clock::{Clock, ManualClock, SystemClock};
pub use enums::{OrderSide, OrderStatus, OrderType, RunStatus, StrategyId};
pub use error::CoreError;
pub use structs::{OutboundSignal, PendingOrder, SignalIntent, StrategyRun};
