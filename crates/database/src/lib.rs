//! # Meridian Database Crate
//!
//! This crate is the runtime's durable store. It persists strategy runs and
//! pending orders and is the only shared mutable resource between the
//! executor, the dispatch workers, and any sibling worker processes.
//!
//! ## Architectural Principles
//!
//! - **Compare-and-set everywhere:** after creation, run and order rows are
//!   mutated exclusively through single-row conditional updates. Correctness
//!   must hold across process restarts, so no in-memory lock is ever part of
//!   the concurrency story.
//! - **Trait seam:** consumers depend on the `Store` trait, never a concrete
//!   backend. `PgStore` is the production backend; `MemoryStore` implements
//!   identical semantics in-process for tests and dry runs.
//! - **Asynchronous & Pooled:** all operations are asynchronous, and the
//!   Postgres backend uses a connection pool (`PgPool`) for concurrent access.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: connection-pool setup and schema upkeep.
//! - `Store`: the persistence trait the rest of the system consumes.
//! - `PgStore` / `MemoryStore`: the two backends.
//! - `StoreError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::Store;
