//! End-to-end lifecycle scenarios against the in-memory store.

mod common;

use common::{fixture, usd};
use rust_decimal_macros::dec;
use tally_core::{LedgerError, TransactionStatus};
use tally_shared::LedgerConfig;

#[tokio::test]
async fn test_create_then_commit_moves_balances() {
    let f = fixture(LedgerConfig::default());
    let a = f.funded("a", dec!(100)).await;
    let b = f.wallet("b").await;

    let tx = f
        .ledger
        .transactions()
        .create(&a, &b, usd(dec!(40)), None, None)
        .await
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Started);
    assert_eq!(f.balance(&a).await, dec!(100));

    let tx = f.ledger.transactions().commit(tx.key).await.unwrap();

    assert_eq!(tx.status, TransactionStatus::Committed);
    assert!(tx.finished_at.is_some());
    assert!(tx.digest.is_some());
    assert_eq!(f.balance(&a).await, dec!(60));
    assert_eq!(f.balance(&b).await, dec!(40));
    assert_eq!(f.ledger_sum(), dec!(0));
}

#[tokio::test]
async fn test_identical_endpoints_rejected() {
    let f = fixture(LedgerConfig::default());
    let a = f.funded("a", dec!(100)).await;

    let err = f
        .ledger
        .transactions()
        .create(&a, &a, usd(dec!(10)), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::IdenticalEndpoints(key) if key == a.key));
}

#[tokio::test]
async fn test_zero_transfer_rejected_by_default() {
    let f = fixture(LedgerConfig::default());
    let a = f.funded("a", dec!(100)).await;
    let b = f.wallet("b").await;
    let before = f.store.transactions().len();

    let err = f
        .ledger
        .transactions()
        .create(&a, &b, usd(dec!(0)), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::ZeroTransfer));
    assert_eq!(f.store.transactions().len(), before);
}

#[tokio::test]
async fn test_zero_transfer_allowed_commits_without_balance_change() {
    let mut config = LedgerConfig::default();
    config.transaction.allow_zero_transfers = true;
    let f = fixture(config);
    let a = f.funded("a", dec!(100)).await;
    let b = f.wallet("b").await;

    let tx = f
        .ledger
        .transactions()
        .create(&a, &b, usd(dec!(0)), None, None)
        .await
        .unwrap();
    let tx = f.ledger.transactions().commit(tx.key).await.unwrap();

    assert_eq!(tx.status, TransactionStatus::Committed);
    assert_eq!(f.balance(&a).await, dec!(100));
    assert_eq!(f.balance(&b).await, dec!(0));
}

#[tokio::test]
async fn test_partial_revert_then_oversized_revert_is_canceled() {
    let f = fixture(LedgerConfig::default());
    let a = f.funded("a", dec!(100)).await;
    let b = f.wallet("b").await;
    let engine = f.ledger.transactions();

    let tx = engine.create(&a, &b, usd(dec!(100)), None, None).await.unwrap();
    let tx = engine.commit(tx.key).await.unwrap();

    let child = engine.revert(tx.key, Some(usd(dec!(60)))).await.unwrap();
    assert_eq!(child.origin, b.key);
    assert_eq!(child.destination, a.key);
    assert_eq!(child.amount, dec!(60));
    assert_eq!(child.parent, Some(tx.key));

    let child = engine.commit(child.key).await.unwrap();
    assert_eq!(child.status, TransactionStatus::Committed);
    assert_eq!(engine.remaining_amount(tx.key).await.unwrap().amount, dec!(40));
    assert!(!engine.is_reverted(tx.key).await.unwrap());

    let second = engine.revert(tx.key, Some(usd(dec!(50)))).await.unwrap();
    let second = engine.commit(second.key).await.unwrap();

    assert_eq!(second.status, TransactionStatus::Canceled);
    assert_eq!(engine.remaining_amount(tx.key).await.unwrap().amount, dec!(40));
    assert_eq!(f.balance(&a).await, dec!(60));
    assert_eq!(f.balance(&b).await, dec!(40));
}

#[tokio::test]
async fn test_revert_without_amount_takes_remaining() {
    let f = fixture(LedgerConfig::default());
    let a = f.funded("a", dec!(100)).await;
    let b = f.wallet("b").await;
    let engine = f.ledger.transactions();

    let tx = engine.create(&a, &b, usd(dec!(70)), None, None).await.unwrap();
    engine.commit(tx.key).await.unwrap();
    let first = engine.revert(tx.key, Some(usd(dec!(20)))).await.unwrap();
    engine.commit(first.key).await.unwrap();

    let rest = engine.revert(tx.key, None).await.unwrap();
    assert_eq!(rest.amount, dec!(50));
    engine.commit(rest.key).await.unwrap();

    assert!(engine.is_reverted(tx.key).await.unwrap());
    assert_eq!(f.balance(&a).await, dec!(100));
    assert_eq!(f.balance(&b).await, dec!(0));

    let again = engine.revert(tx.key, None).await.unwrap_err();
    assert!(matches!(again, LedgerError::ZeroTransfer));
}

#[tokio::test]
async fn test_revert_of_started_transaction_fails() {
    let f = fixture(LedgerConfig::default());
    let a = f.funded("a", dec!(100)).await;
    let b = f.wallet("b").await;

    let tx = f
        .ledger
        .transactions()
        .create(&a, &b, usd(dec!(10)), None, None)
        .await
        .unwrap();
    let err = f.ledger.transactions().revert(tx.key, None).await.unwrap_err();

    assert!(matches!(
        err,
        LedgerError::StatusMismatch {
            operation: "revert",
            expected: TransactionStatus::Committed,
            actual: TransactionStatus::Started,
            ..
        }
    ));
}

#[tokio::test]
async fn test_revert_carries_parent_payload() {
    let f = fixture(LedgerConfig::default());
    let a = f.funded("a", dec!(100)).await;
    let b = f.wallet("b").await;
    let engine = f.ledger.transactions();
    let payload = serde_json::json!({"order": 42});

    let tx = engine
        .create(&a, &b, usd(dec!(10)), Some(payload.clone()), None)
        .await
        .unwrap();
    engine.commit(tx.key).await.unwrap();
    let child = engine.revert(tx.key, None).await.unwrap();

    assert_eq!(child.payload, Some(payload));
    assert!(engine.is_revert_transaction(&child));
    assert_eq!(engine.children(tx.key).await.unwrap().len(), 1);
}
