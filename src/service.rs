//! Top-level composition of the database layer.

use crate::config::EnvSource;
use crate::db::{ConnectionManager, Connector, Model, ModelRegistry, PgConnector, TransactionExecutor};
use crate::error::{DbResult, TransactionError};
use futures_util::future::BoxFuture;
use sqlx::{Database, Pool, Postgres, Transaction};
use std::path::Path;
use std::sync::Arc;

/// One registry, one lazily created pool and a transaction executor on top.
///
/// Construct it once at startup and share it (it is cheap to clone).
pub struct DbService<DB: Database> {
    registry: Arc<ModelRegistry<DB>>,
    connections: Arc<ConnectionManager<DB>>,
    transactions: TransactionExecutor<DB>,
}

impl<DB: Database> DbService<DB> {
    pub fn new(connector: impl Connector<DB> + 'static) -> Self {
        let registry = Arc::new(ModelRegistry::new());
        let connections = Arc::new(ConnectionManager::new(Arc::clone(&registry), connector));
        let transactions = TransactionExecutor::new(Arc::clone(&connections));
        Self {
            registry,
            connections,
            transactions,
        }
    }

    /// Register the models to migrate. See [`ModelRegistry::register`].
    pub fn register_models(&self, models: Vec<Box<dyn Model<DB>>>) -> bool {
        self.registry.register(models)
    }

    /// The shared pool. See [`ConnectionManager::get_handle`].
    pub async fn get_handle(&self) -> DbResult<&Pool<DB>> {
        self.connections.get_handle().await
    }

    /// Run a unit of work in a transaction. See [`TransactionExecutor::run`].
    pub async fn run_in_transaction<F, T, E>(&self, unit_of_work: F) -> Result<T, TransactionError<E>>
    where
        F: for<'t> FnOnce(&'t mut Transaction<'static, DB>) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: Send,
    {
        self.transactions.run(unit_of_work).await
    }

    /// Close the pool, if it was created.
    pub async fn close(&self) {
        self.connections.close().await;
    }

    pub fn registry(&self) -> &ModelRegistry<DB> {
        &self.registry
    }

    pub fn connections(&self) -> &Arc<ConnectionManager<DB>> {
        &self.connections
    }
}

impl DbService<Postgres> {
    /// PostgreSQL service configured from the environment, after merging `env_file`.
    pub fn from_env(env_file: impl AsRef<Path>) -> Self {
        Self::new(PgConnector::new(EnvSource::load(env_file)))
    }
}

impl<DB: Database> Clone for DbService<DB> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            connections: Arc::clone(&self.connections),
            transactions: self.transactions.clone(),
        }
    }
}

impl<DB: Database> std::fmt::Debug for DbService<DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbService")
            .field("connections", &self.connections)
            .finish()
    }
}
