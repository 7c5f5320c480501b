//! Model registry: the schemas migrated when the connection pool is created.
//!
//! Models are registered once, before the first handle is requested. The
//! registry is backed by a `OnceLock`, so concurrent registration attempts
//! race on a single atomic set: exactly one wins and the rest become logged
//! no-ops.

use async_trait::async_trait;
use sqlx::Database;
use std::fmt;
use std::sync::OnceLock;
use tracing::{error, info};

/// A persisted entity that knows how to create or update its own storage.
///
/// Implementations should be idempotent (`CREATE TABLE IF NOT EXISTS`, guarded
/// `ALTER TABLE`), since they run on every process start.
#[async_trait]
pub trait Model<DB: Database>: Send + Sync {
    /// Name used in logs and migration errors.
    fn name(&self) -> &str;

    /// Apply this model's schema on `conn`.
    async fn migrate(&self, conn: &mut DB::Connection) -> Result<(), sqlx::Error>;
}

pub struct ModelRegistry<DB: Database> {
    models: OnceLock<Vec<Box<dyn Model<DB>>>>,
}

impl<DB: Database> ModelRegistry<DB> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            models: OnceLock::new(),
        }
    }

    /// Register the models to migrate, in migration order.
    ///
    /// Only the first call has any effect. Later calls log an error and return
    /// `false`; they are not failures for the caller.
    #[tracing::instrument(name = "RegisterModels", skip_all, fields(count = models.len()))]
    pub fn register(&self, models: Vec<Box<dyn Model<DB>>>) -> bool {
        let names: Vec<String> = models.iter().map(|m| m.name().to_string()).collect();

        match self.models.set(models) {
            Ok(()) => {
                info!(models = ?names, "Models registered");
                true
            }
            Err(_rejected) => {
                error!(rejected = ?names, "Models have already been registered");
                false
            }
        }
    }

    /// Whether [`register`](Self::register) has succeeded.
    pub fn is_registered(&self) -> bool {
        self.models.get().is_some()
    }

    /// The registered models, or `None` before registration.
    pub fn models(&self) -> Option<&[Box<dyn Model<DB>>]> {
        self.models.get().map(Vec::as_slice)
    }

    /// Names of the registered models, in registration order.
    pub fn model_names(&self) -> Vec<&str> {
        self.models()
            .map(|models| models.iter().map(|m| m.name()).collect())
            .unwrap_or_default()
    }
}

impl<DB: Database> Default for ModelRegistry<DB> {
    fn default() -> Self {
        Self::new()
    }
}

impl<DB: Database> fmt::Debug for ModelRegistry<DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("registered", &self.is_registered())
            .field("models", &self.model_names())
            .finish()
    }
}
