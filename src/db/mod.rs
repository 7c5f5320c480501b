//! Database layer.
//!
//! - Model registry: schemas to migrate when the pool is created
//! - Connection manager: lazily created, process-wide connection pool
//! - Transaction executor: commit/rollback envelope around a unit of work

pub mod pool;
pub mod registry;
pub mod transaction;

pub use pool::{ConnectionManager, Connector, PgConnector};
pub use registry::{Model, ModelRegistry};
pub use transaction::TransactionExecutor;
