//! # Meridian Dispatch Crate
//!
//! The durable pending-order queue and the worker that drains it.
//!
//! ## Architectural Principles
//!
//! - **The lease is the lock:** workers coordinate exclusively through the
//!   store's compare-and-set lease operations. Any number of worker
//!   processes can poll the same queue; a CAS miss just means another worker
//!   got there first.
//! - **Exactly-once by layering:** the queue guarantees at-least-once
//!   delivery attempts (a lease that expires mid-flight gets re-dispatched);
//!   the sink's idempotency key turns that into exactly-once external
//!   effect.
//! - **Per-run FIFO:** the store only ever offers each run's queue head, so
//!   a run's orders leave in the order its strategy emitted them, no matter
//!   how many workers are draining.
//!
//! ## Public API
//!
//! - `PendingOrderQueue`: enqueue (from execution units) and cancel.
//! - `OrderDispatchWorker`: the polling dispatch loop.
//! - `RetryBackoff`: bounded exponential retry delays.
//! - `DispatchError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod backoff;
pub mod error;
pub mod queue;
pub mod worker;

// Re-export the key components to create a clean, public-facing API.
pub use backoff::RetryBackoff;
pub use error::DispatchError;
pub use queue::PendingOrderQueue;
pub use worker::OrderDispatchWorker;
