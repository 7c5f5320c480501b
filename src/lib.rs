//! dbflow
//!
//! A shared, lazily-initialized database connection pool with model migration,
//! plus a transaction wrapper that commits on success and rolls back on failure.

pub mod config;
pub mod db;
pub mod error;
pub mod probe;
pub mod service;

pub use config::{ConfigSource, DatabaseSettings, EnvSource};
pub use db::{ConnectionManager, Connector, Model, ModelRegistry, PgConnector, TransactionExecutor};
pub use error::{DbError, DbResult, TransactionError};
pub use service::DbService;
