//! Error types for dbflow.
//!
//! `DbError` covers the startup path (registration precondition, connecting,
//! migrating). Those failures leave no usable database behind, so the embedding
//! application is expected to stop when it sees one. `TransactionError` covers a
//! single `run_in_transaction` call and is always recoverable by the caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error(
        "Models must be registered before requesting a database handle. Call register_models first."
    )]
    ModelsNotRegistered,

    #[error("Failed to connect to the database: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Failed to migrate model '{model}': {message}")]
    Migration { model: String, message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a migration error for the named model.
    pub fn migration(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Migration {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::ModelsNotRegistered => Some("Register models during application startup"),
            Self::Migration { .. } => None,
        }
    }
}

/// Convert sqlx errors raised while opening the pool.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check DB_HOST, DB_PORT, DB_USERNAME and DB_NAME",
            ),
            sqlx::Error::Database(db_err) => DbError::connection(
                db_err.message(),
                "Check the credentials and that the database exists",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a connection",
                "Check that the database is reachable or raise CONNECT_TIMEOUT_SECONDS",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify DB_SSL_MODE and the server's TLS configuration",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            _ => DbError::connection(
                format!("Unknown database error: {}", err),
                "Check database driver configuration",
            ),
        }
    }
}

/// Result type alias for startup operations.
pub type DbResult<T> = Result<T, DbError>;

/// Failure of a single transactional unit of work, tagged with the phase that failed.
#[derive(Error, Debug)]
pub enum TransactionError<E> {
    /// The shared handle could not be obtained; nothing was begun.
    #[error("failed to obtain database handle: {0}")]
    Handle(#[source] DbError),

    /// The transaction could not be started; the unit of work never ran.
    #[error("failed to start transaction: {0}")]
    Begin(#[source] sqlx::Error),

    /// The unit of work returned an error and the transaction was rolled back.
    #[error("transaction failed, rolled back: {0}")]
    RolledBack(#[source] E),

    /// The unit of work succeeded but the commit did not.
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] sqlx::Error),
}

impl<E> TransactionError<E> {
    /// The unit of work's own error, if that is what failed.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::RolledBack(err) => Some(err),
            _ => None,
        }
    }

    /// True if a rollback was issued for this failure.
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, Self::RolledBack(_))
    }
}
