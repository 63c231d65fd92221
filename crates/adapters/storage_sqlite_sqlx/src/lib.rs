//! # mindhub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the storage port traits defined in `mindhub-app::ports::storage`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `mindhub-app` (for port traits) and `mindhub-domain` (for domain
//! types). The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod log_repo;
pub mod pool;
pub mod signal_repo;

pub use error::StorageError;
pub use log_repo::SqliteLogStore;
pub use pool::{Config, Database};
pub use signal_repo::SqliteSignalStore;
