//! Shared SQLite fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dbflow::{Connector, DbResult, Model};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Connects to a file-backed SQLite database and counts connect calls.
#[derive(Clone)]
pub struct FileConnector {
    pub path: PathBuf,
    pub connects: Arc<AtomicUsize>,
    pub delay: Option<Duration>,
}

impl FileConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            connects: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector<Sqlite> for FileConnector {
    async fn connect(&self) -> DbResult<Pool<Sqlite>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", self.path.display()))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        Ok(SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?)
    }
}

/// `accounts(id, owner, balance)`; counts how often it was migrated.
#[derive(Clone, Default)]
pub struct Accounts {
    pub migrations: Arc<AtomicUsize>,
}

impl Accounts {
    pub fn migration_count(&self) -> usize {
        self.migrations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Model<Sqlite> for Accounts {
    fn name(&self) -> &str {
        "accounts"
    }

    async fn migrate(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        self.migrations.fetch_add(1, Ordering::SeqCst);
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                owner TEXT NOT NULL,
                balance INTEGER NOT NULL CHECK (balance >= 0)
            )",
        )
        .execute(conn)
        .await?;
        Ok(())
    }
}

/// `transfers(id, from_id, to_id, amount)`; depends on `accounts`.
pub struct Transfers;

#[async_trait]
impl Model<Sqlite> for Transfers {
    fn name(&self) -> &str {
        "transfers"
    }

    async fn migrate(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transfers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                from_id INTEGER NOT NULL REFERENCES accounts(id),
                to_id INTEGER NOT NULL REFERENCES accounts(id),
                amount INTEGER NOT NULL
            )",
        )
        .execute(conn)
        .await?;
        Ok(())
    }
}
