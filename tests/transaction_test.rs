//! Integration tests for the transaction wrapper.

mod common;

use common::{Accounts, FileConnector, Transfers};
use dbflow::{DbService, TransactionError};
use sqlx::{Sqlite, SqliteConnection};
use std::error::Error as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

#[derive(Debug, thiserror::Error)]
enum TransferError {
    #[error("account {account} has insufficient funds")]
    InsufficientFunds { account: i64 },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

async fn setup() -> (TempDir, DbService<Sqlite>) {
    let dir = TempDir::new().unwrap();
    let service: DbService<Sqlite> = DbService::new(FileConnector::new(dir.path().join("bank.db")));
    service.register_models(vec![Box::new(Accounts::default()), Box::new(Transfers)]);

    let pool = service.get_handle().await.unwrap();
    sqlx::query("INSERT INTO accounts (id, owner, balance) VALUES (1, 'alice', 100), (2, 'bob', 20)")
        .execute(pool)
        .await
        .unwrap();

    (dir, service)
}

async fn balance(service: &DbService<Sqlite>, id: i64) -> i64 {
    sqlx::query_scalar("SELECT balance FROM accounts WHERE id = ?")
        .bind(id)
        .fetch_one(service.get_handle().await.unwrap())
        .await
        .unwrap()
}

async fn transfer_count(service: &DbService<Sqlite>) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transfers")
        .fetch_one(service.get_handle().await.unwrap())
        .await
        .unwrap()
}

/// Move `amount` from one account to another, checking the balance in between.
async fn transfer(
    conn: &mut SqliteConnection,
    from: i64,
    to: i64,
    amount: i64,
) -> Result<i64, TransferError> {
    sqlx::query("UPDATE accounts SET balance = balance + ? WHERE id = ?")
        .bind(amount)
        .bind(to)
        .execute(&mut *conn)
        .await?;

    let available: i64 = sqlx::query_scalar("SELECT balance FROM accounts WHERE id = ?")
        .bind(from)
        .fetch_one(&mut *conn)
        .await?;
    if available < amount {
        return Err(TransferError::InsufficientFunds { account: from });
    }

    sqlx::query("UPDATE accounts SET balance = balance - ? WHERE id = ?")
        .bind(amount)
        .bind(from)
        .execute(&mut *conn)
        .await?;

    let id = sqlx::query("INSERT INTO transfers (from_id, to_id, amount) VALUES (?, ?, ?)")
        .bind(from)
        .bind(to)
        .bind(amount)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
    Ok(id)
}

#[tokio::test]
async fn test_successful_unit_of_work_commits() {
    let (_dir, service) = setup().await;

    let transfer_id = service
        .run_in_transaction(|tx| Box::pin(transfer(&mut **tx, 1, 2, 30)))
        .await
        .expect("transfer should commit");

    assert_eq!(transfer_id, 1);
    assert_eq!(balance(&service, 1).await, 70);
    assert_eq!(balance(&service, 2).await, 50);
    assert_eq!(transfer_count(&service).await, 1);
}

#[tokio::test]
async fn test_failed_unit_of_work_rolls_back() {
    let (_dir, service) = setup().await;

    let err = service
        .run_in_transaction(|tx| Box::pin(transfer(&mut **tx, 2, 1, 500)))
        .await
        .unwrap_err();

    // The credit to account 1 happened inside the transaction and must be gone
    assert_eq!(balance(&service, 1).await, 100);
    assert_eq!(balance(&service, 2).await, 20);
    assert_eq!(transfer_count(&service).await, 0);

    assert!(err.to_string().contains("transaction failed, rolled back"));
    let source = err.source().expect("original error is the source");
    assert!(matches!(
        source.downcast_ref::<TransferError>(),
        Some(TransferError::InsufficientFunds { account: 2 })
    ));
}

#[tokio::test]
async fn test_database_error_inside_unit_of_work_rolls_back() {
    let (_dir, service) = setup().await;

    let err = service
        .run_in_transaction(|tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO transfers (from_id, to_id, amount) VALUES (1, 2, 5)")
                    .execute(&mut **tx)
                    .await?;
                // Violates the CHECK constraint
                sqlx::query("UPDATE accounts SET balance = -1 WHERE id = 1")
                    .execute(&mut **tx)
                    .await?;
                Ok::<_, sqlx::Error>(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransactionError::RolledBack(sqlx::Error::Database(_))
    ));
    assert_eq!(transfer_count(&service).await, 0);
    assert_eq!(balance(&service, 1).await, 100);
}

#[tokio::test]
async fn test_begin_failure_skips_unit_of_work() {
    let (_dir, service) = setup().await;
    service.get_handle().await.unwrap().close().await;

    let invoked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&invoked);

    let err = service
        .run_in_transaction(move |_tx| {
            flag.store(true, Ordering::SeqCst);
            Box::pin(async move { Ok::<_, sqlx::Error>(()) })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TransactionError::Begin(sqlx::Error::PoolClosed)));
    assert!(err.to_string().starts_with("failed to start transaction"));
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_sequential_transactions_share_pool() {
    let (_dir, service) = setup().await;

    for _ in 0..3 {
        service
            .run_in_transaction(|tx| Box::pin(transfer(&mut **tx, 1, 2, 10)))
            .await
            .unwrap();
    }
    let err = service
        .run_in_transaction(|tx| Box::pin(transfer(&mut **tx, 2, 1, 1_000)))
        .await
        .unwrap_err();
    assert!(err.is_rolled_back());

    assert_eq!(balance(&service, 1).await, 70);
    assert_eq!(balance(&service, 2).await, 50);
    assert_eq!(transfer_count(&service).await, 3);
}

#[tokio::test]
async fn test_run_in_transaction_before_registration() {
    let dir = TempDir::new().unwrap();
    let connector = FileConnector::new(dir.path().join("empty.db"));
    let service: DbService<Sqlite> = DbService::new(connector.clone());

    let err = service
        .run_in_transaction(|_tx| Box::pin(async move { Ok::<_, sqlx::Error>(()) }))
        .await
        .unwrap_err();

    assert!(matches!(err, TransactionError::Handle(_)));
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn test_commit_failure_is_reported_and_discards_changes() {
    let (_dir, service) = setup().await;

    let err = service
        .run_in_transaction(|tx| {
            Box::pin(async move {
                // Foreign keys are checked at COMMIT instead of per statement
                sqlx::query("PRAGMA defer_foreign_keys = ON")
                    .execute(&mut **tx)
                    .await?;
                sqlx::query("INSERT INTO transfers (from_id, to_id, amount) VALUES (99, 1, 5)")
                    .execute(&mut **tx)
                    .await?;
                Ok::<_, sqlx::Error>(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TransactionError::Commit(_)));
    assert!(err.to_string().starts_with("failed to commit"));
    assert!(!err.is_rolled_back());
    assert_eq!(transfer_count(&service).await, 0);
}

#[tokio::test]
async fn test_rollback_failure_is_not_surfaced() {
    let (_dir, service) = setup().await;

    let err = service
        .run_in_transaction(|tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO transfers (from_id, to_id, amount) VALUES (1, 2, 5)")
                    .execute(&mut **tx)
                    .await?;
                // Ends the transaction behind the wrapper's back, so its ROLLBACK fails
                sqlx::query("COMMIT").execute(&mut **tx).await?;
                Err::<(), _>(TransferError::InsufficientFunds { account: 1 })
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.into_inner(),
        Some(TransferError::InsufficientFunds { account: 1 })
    ));
    assert_eq!(transfer_count(&service).await, 1);
}
