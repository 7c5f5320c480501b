//! Connection management.
//!
//! [`ConnectionManager`] owns the single connection pool of the service. The pool
//! is created lazily by the first [`get_handle`](ConnectionManager::get_handle)
//! call, which also migrates every registered model before the pool becomes
//! visible to anyone.
//!
//! # Concurrency
//!
//! - The pool lives in a `tokio::sync::OnceCell`. Concurrent first callers wait on
//!   the in-flight initializer and all receive the same pool.
//! - A failed initialization leaves the cell empty; the next caller runs the
//!   initializer again.
//! - There is no timeout on waiting for the initializer. The connect attempt
//!   itself is bounded by the connector's acquire timeout.

use crate::config::{ConfigSource, DatabaseSettings};
use crate::db::registry::{Model, ModelRegistry};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Database, Pool, Postgres};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{Instrument, debug, info, info_span, warn};

/// Opens the pool for a [`ConnectionManager`].
///
/// Called from inside the manager's one-time initializer, so implementations may
/// resolve their configuration lazily.
#[async_trait]
pub trait Connector<DB: Database>: Send + Sync {
    async fn connect(&self) -> DbResult<Pool<DB>>;
}

/// PostgreSQL connector that reads [`DatabaseSettings`] from a config source at
/// connect time.
pub struct PgConnector<S> {
    source: S,
}

impl<S: ConfigSource> PgConnector<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: ConfigSource> Connector<Postgres> for PgConnector<S> {
    async fn connect(&self) -> DbResult<Pool<Postgres>> {
        let settings = DatabaseSettings::resolve(&self.source);

        info!(dsn = %settings, "Connecting to database");

        PgPoolOptions::new()
            .acquire_timeout(settings.connect_timeout)
            .connect_with(settings.connect_options())
            .await
            .map_err(|e| {
                let err = DbError::from(e);
                warn!(host = %settings.host, port = settings.port, error = %err, "Connection failed");
                err
            })
    }
}

pub struct ConnectionManager<DB: Database> {
    registry: Arc<ModelRegistry<DB>>,
    connector: Box<dyn Connector<DB>>,
    handle: OnceCell<Pool<DB>>,
}

impl<DB: Database> ConnectionManager<DB> {
    /// Create a manager that migrates the models of `registry`.
    ///
    /// Nothing is connected until the first [`get_handle`](Self::get_handle).
    pub fn new(registry: Arc<ModelRegistry<DB>>, connector: impl Connector<DB> + 'static) -> Self {
        Self {
            registry,
            connector: Box::new(connector),
            handle: OnceCell::new(),
        }
    }

    /// The shared pool, connecting and migrating on first use.
    ///
    /// Returns [`DbError::ModelsNotRegistered`] if no models have been registered
    /// yet; callers must register during startup.
    #[tracing::instrument(name = "GetHandle", skip_all)]
    pub async fn get_handle(&self) -> DbResult<&Pool<DB>> {
        let Some(models) = self.registry.models() else {
            return Err(DbError::ModelsNotRegistered);
        };

        self.handle
            .get_or_try_init(|| {
                self.initialize(models)
                    .instrument(info_span!("InitializeDatabase", models = models.len()))
            })
            .await
    }

    /// Whether the pool has been created.
    pub fn is_initialized(&self) -> bool {
        self.handle.initialized()
    }

    /// Close the pool, if it was created.
    pub async fn close(&self) {
        if let Some(pool) = self.handle.get() {
            info!("Closing connection pool");
            pool.close().await;
        }
    }

    async fn initialize(&self, models: &[Box<dyn Model<DB>>]) -> DbResult<Pool<DB>> {
        let pool = self.connector.connect().await?;

        if let Err(e) = Self::migrate(&pool, models).await {
            // Never publish a pool whose schema is incomplete
            pool.close().await;
            return Err(e);
        }

        info!(models = models.len(), "Database connected and migrated");
        Ok(pool)
    }

    async fn migrate(pool: &Pool<DB>, models: &[Box<dyn Model<DB>>]) -> DbResult<()> {
        let mut conn = pool.acquire().await.map_err(DbError::from)?;

        for model in models {
            debug!(model = model.name(), "Migrating model");
            model
                .migrate(&mut *conn)
                .await
                .map_err(|e| DbError::migration(model.name(), e.to_string()))?;
        }

        Ok(())
    }
}

impl<DB: Database> fmt::Debug for ConnectionManager<DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("registry", &self.registry)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
