mod common;

use std::time::Duration;

use anyhow::Result;
use cashier::application::{BalanceQuery, Page, Rejection, TransactionService};
use cashier::storage::{database_url, ApplyOutcome};
use cashier::Direction;
use common::{test_store, OPENING_BALANCE};
use sqlx::{Connection, SqliteConnection};

#[tokio::test]
async fn test_withdraw_debits_balance() -> Result<()> {
    let (store, _temp) = test_store(OPENING_BALANCE).await?;
    let service = TransactionService::new(store.clone());

    let result = service
        .withdraw("player-1", 10000, "bet-1", "key-1")
        .await?;

    assert!(result.success);
    assert!(result.transaction_id.is_some());
    assert_eq!(result.balance, Some(90000));
    assert_eq!(result.error, None);
    assert_eq!(store.get_or_init_balance("player-1").await?, 90000);

    let entries = store.list_entries("player-1", 10, 0).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].direction, Direction::Debit);
    assert_eq!(entries[0].amount_cents, 10000);
    assert_eq!(entries[0].reference, "bet-1");
    assert_eq!(Some(entries[0].id), result.transaction_id);

    Ok(())
}

#[tokio::test]
async fn test_deposit_for_new_player_starts_from_opening_balance() -> Result<()> {
    let (store, _temp) = test_store(OPENING_BALANCE).await?;
    let service = TransactionService::new(store.clone());

    let result = service.deposit("newcomer", 50000, "win-1", "key-1").await?;

    assert!(result.success);
    assert_eq!(result.balance, Some(150000));

    let account = store.get_account("newcomer").await?.unwrap();
    assert_eq!(account.balance_cents, 150000);
    assert_eq!(account.opening_cents, OPENING_BALANCE);

    Ok(())
}

#[tokio::test]
async fn test_repeated_idempotency_key_applies_once() -> Result<()> {
    let (store, _temp) = test_store(OPENING_BALANCE).await?;
    let service = TransactionService::new(store.clone());

    let first = service
        .withdraw("player-1", 10000, "bet-1", "round-42")
        .await?;
    let second = service
        .withdraw("player-1", 10000, "bet-1", "round-42")
        .await?;

    assert!(first.success && second.success);
    assert_eq!(first.transaction_id, second.transaction_id);
    assert_eq!(first.balance, Some(90000));
    assert_eq!(second.balance, Some(90000));
    assert_eq!(store.list_entries("player-1", 10, 0).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_reused_key_returns_original_entry() -> Result<()> {
    let (store, _temp) = test_store(OPENING_BALANCE).await?;
    let service = TransactionService::new(store.clone());

    let deposit = service.deposit("player-1", 2500, "win", "shared-key").await?;
    // Different operation under the same key: answered from the journal.
    let withdraw = service
        .withdraw("player-1", 99999, "bet", "shared-key")
        .await?;

    assert!(withdraw.success);
    assert_eq!(withdraw.transaction_id, deposit.transaction_id);
    assert_eq!(withdraw.balance, Some(102500));
    assert_eq!(store.get_or_init_balance("player-1").await?, 102500);

    Ok(())
}

#[tokio::test]
async fn test_insufficient_funds_writes_nothing() -> Result<()> {
    let (store, _temp) = test_store(5000).await?;
    let service = TransactionService::new(store.clone());

    // Touch the account first so it exists at 50.00.
    assert_eq!(store.get_or_init_balance("player-1").await?, 5000);

    let result = service
        .withdraw("player-1", 10000, "bet-1", "key-1")
        .await?;

    assert!(!result.success);
    assert_eq!(result.error, Some(Rejection::InsufficientFunds));
    assert_eq!(result.transaction_id, None);
    assert_eq!(result.balance, Some(5000));

    assert_eq!(store.get_account("player-1").await?.unwrap().balance_cents, 5000);
    assert!(store.list_entries("player-1", 10, 0).await?.is_empty());
    assert!(store.find_by_idempotency_key("key-1").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_refused_first_withdraw_leaves_no_account() -> Result<()> {
    let (store, _temp) = test_store(OPENING_BALANCE).await?;
    let service = TransactionService::new(store.clone());

    let result = service
        .withdraw("stranger", OPENING_BALANCE + 1, "bet", "key-1")
        .await?;

    assert_eq!(result.error, Some(Rejection::InsufficientFunds));
    assert_eq!(result.balance, Some(OPENING_BALANCE));
    assert!(store.get_account("stranger").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_withdraw_exact_balance_reaches_zero() -> Result<()> {
    let (store, _temp) = test_store(OPENING_BALANCE).await?;
    let service = TransactionService::new(store);

    let result = service
        .withdraw("player-1", OPENING_BALANCE, "all-in", "key-1")
        .await?;
    assert!(result.success);
    assert_eq!(result.balance, Some(0));

    let result = service.withdraw("player-1", 1, "bet", "key-2").await?;
    assert_eq!(result.error, Some(Rejection::InsufficientFunds));
    assert_eq!(result.balance, Some(0));

    Ok(())
}

#[tokio::test]
async fn test_non_positive_amount_is_rejected_before_storage() -> Result<()> {
    let (store, _temp) = test_store(OPENING_BALANCE).await?;
    let service = TransactionService::new(store.clone());

    for amount in [0, -100] {
        let result = service.withdraw("player-1", amount, "bet", "key-w").await?;
        assert!(!result.success);
        assert_eq!(result.error, Some(Rejection::InvalidAmount));
        assert_eq!(result.balance, None);

        let result = service.deposit("player-1", amount, "win", "key-d").await?;
        assert_eq!(result.error, Some(Rejection::InvalidAmount));
    }

    assert!(store.get_account("player-1").await?.is_none());
    assert!(store.find_by_idempotency_key("key-w").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_blank_identifiers_are_rejected() -> Result<()> {
    let (store, _temp) = test_store(OPENING_BALANCE).await?;
    let service = TransactionService::new(store.clone());

    let result = service.deposit("  ", 100, "win", "key-1").await?;
    assert!(matches!(result.error, Some(Rejection::InvalidRequest(_))));

    let result = service.deposit("player-1", 100, "win", "").await?;
    assert!(matches!(result.error, Some(Rejection::InvalidRequest(_))));

    assert!(store.get_account("player-1").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_deposit_past_balance_limit_is_refused() -> Result<()> {
    let (store, _temp) = test_store(0).await?;
    let service = TransactionService::new(store.clone());

    let result = service.deposit("whale", i64::MAX - 5, "jackpot", "key-1").await?;
    assert!(result.success);

    let result = service.deposit("whale", 10, "bonus", "key-2").await?;
    assert!(!result.success);
    assert_eq!(result.error, Some(Rejection::BalanceOverflow));
    assert_eq!(result.balance, Some(i64::MAX - 5));

    assert_eq!(store.get_or_init_balance("whale").await?, i64::MAX - 5);
    assert_eq!(store.list_entries("whale", 10, 0).await?.len(), 1);
    assert!(store.find_by_idempotency_key("key-2").await?.is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdraws_never_overdraw() -> Result<()> {
    let (store, _temp) = test_store(15000).await?;
    let service = TransactionService::new(store.clone());

    let a = {
        let service = service.clone();
        tokio::spawn(async move { service.withdraw("player-1", 10000, "bet-a", "key-a").await })
    };
    let b = {
        let service = service.clone();
        tokio::spawn(async move { service.withdraw("player-1", 10000, "bet-b", "key-b").await })
    };

    let results = [a.await??, b.await??];
    let succeeded = results.iter().filter(|r| r.success).count();
    let refused = results
        .iter()
        .filter(|r| r.error == Some(Rejection::InsufficientFunds))
        .count();

    assert_eq!(succeeded, 1);
    assert_eq!(refused, 1);
    assert_eq!(store.get_or_init_balance("player-1").await?, 5000);
    assert_eq!(store.list_entries("player-1", 10, 0).await?.len(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_key_applies_once() -> Result<()> {
    let (store, _temp) = test_store(OPENING_BALANCE).await?;
    let service = TransactionService::new(store.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.deposit("player-1", 1000, "win", "dup-key").await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let result = handle.await??;
        assert!(result.success);
        ids.push(result.transaction_id);
    }
    ids.dedup();

    assert_eq!(ids.len(), 1);
    assert_eq!(store.get_or_init_balance("player-1").await?, 101000);
    assert_eq!(store.list_entries("player-1", 10, 0).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_reconciliation_after_mixed_operations() -> Result<()> {
    let (store, _temp) = test_store(OPENING_BALANCE).await?;
    let service = TransactionService::new(store.clone());
    let query = BalanceQuery::new(store.clone());

    service.withdraw("alice", 2500, "bet", "a-1").await?;
    service.deposit("alice", 7000, "win", "a-2").await?;
    service.withdraw("alice", 2500, "bet", "a-1").await?;
    service.withdraw("bob", 500000, "bet", "b-1").await?;
    service.deposit("bob", 100, "bonus", "b-2").await?;

    let report = query.reconcile().await?;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    assert_eq!(report.account_count, 2);
    assert_eq!(report.entry_count, 3);
    assert_eq!(report.total_balance, 104500 + 100100);

    let history = query.get_transactions("alice", Page::default()).await?;
    assert_eq!(history.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_aborted_apply_leaves_no_partial_state() -> Result<()> {
    let (store, temp) = test_store(OPENING_BALANCE).await?;
    assert_eq!(store.get_or_init_balance("player-1").await?, OPENING_BALANCE);

    // Hold the write lock so the apply blocks inside its transaction.
    let db_path = temp.path().join("test.db");
    let mut blocker = SqliteConnection::connect(&database_url(db_path.to_str().unwrap(), false)).await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut blocker).await?;

    let pending = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .apply_entry("player-1", 10000, Direction::Debit, "bet", "key-1")
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());

    sqlx::query("ROLLBACK").execute(&mut blocker).await?;
    blocker.close().await?;

    assert_eq!(store.get_or_init_balance("player-1").await?, OPENING_BALANCE);
    assert!(store.list_entries("player-1", 10, 0).await?.is_empty());
    assert!(store.find_by_idempotency_key("key-1").await?.is_none());

    // The key was never consumed.
    let outcome = store
        .apply_entry("player-1", 10000, Direction::Debit, "bet", "key-1")
        .await?;
    assert!(matches!(outcome, ApplyOutcome::Applied { balance: 90000, .. }));

    Ok(())
}
