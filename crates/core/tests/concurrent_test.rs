//! Concurrent commits against overlapping accounts, and digest maintenance
//! racing them.

mod common;

use std::sync::Arc;

use common::{fixture, usd};
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tally_core::{RecordStore, RehashFrom, TransactionStatus};
use tally_shared::LedgerConfig;
use tokio::sync::Barrier;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_commits_serialize_without_deadlock() {
    let f = fixture(LedgerConfig::default());
    let a = f.funded("a", dec!(100)).await;
    let b = f.funded("b", dec!(100)).await;
    let engine = f.ledger.transactions();

    let forward = engine.create(&a, &b, usd(dec!(30)), None, None).await.unwrap();
    let backward = engine.create(&b, &a, usd(dec!(50)), None, None).await.unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [forward.key, backward.key]
        .into_iter()
        .map(|key| {
            let engine = engine.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                engine.commit(key).await
            })
        })
        .collect();

    let results = tokio::time::timeout(std::time::Duration::from_secs(10), join_all(handles))
        .await
        .expect("commits should not deadlock");
    for result in results {
        assert_eq!(result.unwrap().unwrap().status, TransactionStatus::Committed);
    }

    assert_eq!(f.balance(&a).await, dec!(120));
    assert_eq!(f.balance(&b).await, dec!(80));
    assert_eq!(f.ledger_sum(), Decimal::ZERO);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_commit_storm_keeps_ledger_consistent() {
    let f = fixture(LedgerConfig::default());
    let wallets = [
        f.funded("a", dec!(500)).await,
        f.funded("b", dec!(500)).await,
        f.funded("c", dec!(500)).await,
    ];
    let engine = f.ledger.transactions();

    let mut keys = Vec::new();
    for i in 0..30_usize {
        let origin = &wallets[i % 3];
        let destination = &wallets[(i + 1) % 3];
        let amount = Decimal::from(i + 1);
        keys.push(engine.create(origin, destination, usd(amount), None, None).await.unwrap().key);
    }

    let handles: Vec<_> = keys
        .into_iter()
        .map(|key| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.commit(key).await })
        })
        .collect();
    for result in join_all(handles).await {
        assert_eq!(result.unwrap().unwrap().status, TransactionStatus::Committed);
    }

    assert_eq!(f.ledger_sum(), Decimal::ZERO);
    assert!(f.ledger.accounts().is_valid(true).await.unwrap());
    assert!(f.ledger.digests().verify_chain().await.unwrap().is_empty());

    let committed = engine.committed(false).await.unwrap();
    assert!(committed.windows(2).all(|w| w[0].finished_at < w[1].finished_at));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reverts_cannot_exceed_parent() {
    let f = fixture(LedgerConfig::default());
    let a = f.funded("a", dec!(100)).await;
    let b = f.wallet("b").await;
    let engine = f.ledger.transactions();

    let tx = engine.create(&a, &b, usd(dec!(100)), None, None).await.unwrap();
    engine.commit(tx.key).await.unwrap();

    let first = engine.revert(tx.key, Some(usd(dec!(60)))).await.unwrap();
    let second = engine.revert(tx.key, Some(usd(dec!(60)))).await.unwrap();

    let handles: Vec<_> = [first.key, second.key]
        .into_iter()
        .map(|key| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.commit(key).await })
        })
        .collect();
    let statuses: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap().status)
        .collect();

    assert_eq!(
        statuses.iter().filter(|s| **s == TransactionStatus::Committed).count(),
        1
    );
    assert_eq!(
        statuses.iter().filter(|s| **s == TransactionStatus::Canceled).count(),
        1
    );
    assert_eq!(engine.reverted_amount(tx.key).await.unwrap().amount, dec!(60));
    assert_eq!(f.balance(&a).await, dec!(60));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rehash_waits_for_chain_lock() {
    let f = fixture(LedgerConfig::default());
    let a = f.funded("a", dec!(100)).await;
    let b = f.wallet("b").await;
    let engine = f.ledger.transactions();
    let tx = engine.create(&a, &b, usd(dec!(10)), None, None).await.unwrap();
    engine.commit(tx.key).await.unwrap();

    let mut holder = f.store.begin().await.unwrap();
    holder.lock_chain().await.unwrap();

    let digests = f.ledger.digests().clone();
    let rehash = tokio::spawn(async move { digests.rehash(RehashFrom::Beginning).await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!rehash.is_finished());

    holder.rollback().await;
    assert_eq!(rehash.await.unwrap().unwrap(), 2);
    assert!(f.ledger.digests().verify_chain().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rehash_during_commits_keeps_chain_valid() {
    let f = fixture(LedgerConfig::default());
    let a = f.funded("a", dec!(1000)).await;
    let b = f.funded("b", dec!(1000)).await;
    let engine = f.ledger.transactions();

    let mut keys = Vec::new();
    for i in 0..20_usize {
        let (origin, destination) = if i % 2 == 0 { (&a, &b) } else { (&b, &a) };
        let amount = Decimal::from(i + 1);
        keys.push(engine.create(origin, destination, usd(amount), None, None).await.unwrap().key);
    }

    let commits: Vec<_> = keys
        .into_iter()
        .map(|key| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.commit(key).await.map(|_| ()) })
        })
        .collect();
    let rehashes: Vec<_> = (0..5)
        .map(|_| {
            let digests = f.ledger.digests().clone();
            tokio::spawn(async move { digests.rehash(RehashFrom::Beginning).await.map(|_| ()) })
        })
        .collect();
    for result in join_all(commits.into_iter().chain(rehashes)).await {
        result.unwrap().unwrap();
    }

    let committed = engine.committed(false).await.unwrap();
    assert_eq!(committed.len(), 22);
    assert!(committed.iter().all(|tx| tx.digest.is_some()));
    assert!(f.ledger.digests().verify_chain().await.unwrap().is_empty());
    assert_eq!(f.ledger_sum(), Decimal::ZERO);
}
