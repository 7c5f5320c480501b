//! Transaction executor.
//!
//! Runs a caller-supplied unit of work inside a transaction on the shared pool:
//! commit when the unit of work succeeds, roll back when it fails. Exactly one of
//! commit or rollback is issued for every transaction that was begun.

use crate::db::pool::ConnectionManager;
use crate::error::TransactionError;
use futures_util::future::BoxFuture;
use sqlx::{Database, Transaction};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TransactionExecutor<DB: Database> {
    connections: Arc<ConnectionManager<DB>>,
}

impl<DB: Database> Clone for TransactionExecutor<DB> {
    fn clone(&self) -> Self {
        Self {
            connections: Arc::clone(&self.connections),
        }
    }
}

impl<DB: Database> TransactionExecutor<DB> {
    pub fn new(connections: Arc<ConnectionManager<DB>>) -> Self {
        Self { connections }
    }

    /// Run `unit_of_work` inside a new transaction.
    ///
    /// The unit of work borrows the transaction mutably for its whole duration and
    /// cannot keep it afterwards. Execute statements against it with `&mut **tx`:
    ///
    /// ```ignore
    /// executor
    ///     .run(|tx| {
    ///         Box::pin(async move {
    ///             sqlx::query("UPDATE accounts SET balance = balance - 10 WHERE id = 1")
    ///                 .execute(&mut **tx)
    ///                 .await?;
    ///             Ok::<_, sqlx::Error>(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// - [`TransactionError::Handle`] if the pool could not be obtained.
    /// - [`TransactionError::Begin`] if the transaction could not be started. The
    ///   unit of work is not called.
    /// - [`TransactionError::RolledBack`] wrapping the unit of work's error, after a
    ///   best-effort rollback.
    /// - [`TransactionError::Commit`] if the commit failed.
    #[tracing::instrument(name = "HandleTransaction", skip_all)]
    pub async fn run<F, T, E>(&self, unit_of_work: F) -> Result<T, TransactionError<E>>
    where
        F: for<'t> FnOnce(&'t mut Transaction<'static, DB>) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: Send,
    {
        let pool = self
            .connections
            .get_handle()
            .await
            .map_err(TransactionError::Handle)?;

        let mut tx = pool.begin().await.map_err(TransactionError::Begin)?;
        debug!("Transaction started");

        match unit_of_work(&mut tx).await {
            Ok(value) => {
                tx.commit().await.map_err(TransactionError::Commit)?;
                debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                } else {
                    debug!("Transaction rolled back");
                }
                Err(TransactionError::RolledBack(err))
            }
        }
    }
}
