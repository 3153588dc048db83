//! Database layer for the Flashback collector.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode
//! initialization, embedded SQL migrations, and the schema every other
//! collector crate builds on. Every table is created through versioned
//! migrations managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: a replay collector is a single-server
//!   append-heavy workload; WAL allows concurrent readers with a single
//!   writer, which matches it well, and needs no external database
//!   process.
//! - **`r2d2` connection pool**: bounded connection reuse without
//!   manual lifetime management.
//! - **Embedded migrations**: SQL files are compiled into the binary
//!   via `include_str!`, so migrations ship with the collector and
//!   cannot drift from the code that depends on them.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
