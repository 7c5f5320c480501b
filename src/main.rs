//! dbflow - connectivity probe.
//!
//! Connects to the database configured through DB_* environment variables,
//! migrates the registered models and verifies a transaction round trip.

use clap::Parser;
use dbflow::config::Config;
use dbflow::probe::{ConnectivityProbe, run_probe};
use dbflow::{DbService, TransactionError};
use sqlx::Postgres;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    init_tracing(&config);

    info!("Starting dbflow v{}", env!("CARGO_PKG_VERSION"));

    let service = DbService::<Postgres>::from_env(&config.env_file);
    service.register_models(vec![Box::new(ConnectivityProbe)]);

    let result = run_probe(&service).await;
    service.close().await;

    match result {
        Ok(report) => {
            println!("connected: {}", report.server_version);
            println!("timezone:  {}", report.timezone);
            println!("probes:    {}", report.checks);
            Ok(())
        }
        Err(TransactionError::Handle(e)) => {
            // No database means nothing to continue with
            error!(error = %e, suggestion = e.suggestion().unwrap_or_default(), "Database unavailable");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "Probe transaction failed");
            Err(e.into())
        }
    }
}
