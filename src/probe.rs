//! Connectivity probe used by the `dbflow` binary.
//!
//! Registers a one-row bookkeeping table and verifies a full transaction round
//! trip against it.

use crate::db::Model;
use crate::error::TransactionError;
use crate::service::DbService;
use async_trait::async_trait;
use sqlx::{PgConnection, Postgres};
use tracing::info;

pub const PROBE_TABLE: &str = "dbflow_probe";

/// Bookkeeping table recording the last successful probe.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectivityProbe;

#[async_trait]
impl Model<Postgres> for ConnectivityProbe {
    fn name(&self) -> &str {
        PROBE_TABLE
    }

    async fn migrate(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS dbflow_probe (
                id SMALLINT PRIMARY KEY,
                checks BIGINT NOT NULL DEFAULT 0,
                checked_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub server_version: String,
    pub timezone: String,
    /// Number of successful probes recorded, including this one.
    pub checks: i64,
}

/// Record a probe and read back server details, all in one transaction.
pub async fn run_probe(
    service: &DbService<Postgres>,
) -> Result<ProbeReport, TransactionError<sqlx::Error>> {
    let report = service
        .run_in_transaction(|tx| {
            Box::pin(async move {
                let checks: i64 = sqlx::query_scalar(
                    "INSERT INTO dbflow_probe (id, checks) VALUES (1, 1)
                     ON CONFLICT (id) DO UPDATE
                     SET checks = dbflow_probe.checks + 1, checked_at = now()
                     RETURNING checks",
                )
                .fetch_one(&mut **tx)
                .await?;

                let server_version: String = sqlx::query_scalar("SELECT version()")
                    .fetch_one(&mut **tx)
                    .await?;

                let timezone: String = sqlx::query_scalar("SHOW TimeZone")
                    .fetch_one(&mut **tx)
                    .await?;

                Ok::<_, sqlx::Error>(ProbeReport {
                    server_version,
                    timezone,
                    checks,
                })
            })
        })
        .await?;

    info!(
        server_version = %report.server_version,
        timezone = %report.timezone,
        checks = report.checks,
        "Probe committed"
    );
    Ok(report)
}
