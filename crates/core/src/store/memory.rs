//! In-memory record store with real row locks.
//!
//! Each row has its own async mutex; a unit of work holds the guards of the
//! rows it locked until it commits or is dropped. Writes are buffered in the
//! unit of work and applied atomically on commit, so an aborted unit of work
//! leaves no trace.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tally_shared::types::{AccountKey, Currency, TransactionKey};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

use super::{RecordStore, StoreResult, StoreTransaction, TransactionFilter};
use crate::error::StoreError;
use crate::model::{Account, OwnerRef, Transaction, TransactionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Account(AccountKey),
    Transaction(TransactionKey),
    Chain,
}

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<AccountKey, Account>,
    transactions: BTreeMap<TransactionKey, Transaction>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    commit_failures: Mutex<VecDeque<StoreError>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Record store kept entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next unit of work that reaches `commit` fail with `error`.
    ///
    /// Queued failures are consumed one per commit attempt.
    pub fn fail_next_commit(&self, error: StoreError) {
        lock(&self.shared.commit_failures).push_back(error);
    }

    /// Snapshot of every account, ordered by key.
    #[must_use]
    pub fn accounts(&self) -> Vec<Account> {
        lock(&self.shared.tables).accounts.values().cloned().collect()
    }

    /// Snapshot of every transaction, ordered by key.
    #[must_use]
    pub fn transactions(&self) -> Vec<Transaction> {
        lock(&self.shared.tables).transactions.values().cloned().collect()
    }

    /// Overwrites a stored transaction, bypassing every rule.
    ///
    /// Exists to simulate tampering in audits and tests.
    pub fn overwrite_transaction(&self, transaction: Transaction) {
        lock(&self.shared.tables)
            .transactions
            .insert(transaction.key, transaction);
    }

    /// Overwrites a cached balance, bypassing every rule.
    pub fn overwrite_balance(&self, key: AccountKey, balance: Decimal) {
        if let Some(account) = lock(&self.shared.tables).accounts.get_mut(&key) {
            account.balance = balance;
        }
    }

    fn row_lock(&self, row: RowKey) -> Arc<RowMutex<()>> {
        Arc::clone(lock(&self.shared.row_locks).entry(row).or_default())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            guards: HashMap::new(),
            accounts: BTreeMap::new(),
            new_accounts: BTreeSet::new(),
            transactions: BTreeMap::new(),
            new_transactions: BTreeSet::new(),
            digest_writes: Vec::new(),
        }))
    }
}

#[derive(Debug)]
enum DigestWrite {
    IfAbsent(TransactionKey, String),
    Clear(TransactionKey),
}

/// A unit of work against a [`MemoryStore`].
struct MemoryTransaction {
    store: MemoryStore,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    accounts: BTreeMap<AccountKey, Account>,
    new_accounts: BTreeSet<AccountKey>,
    transactions: BTreeMap<TransactionKey, Transaction>,
    new_transactions: BTreeSet<TransactionKey>,
    digest_writes: Vec<DigestWrite>,
}

impl MemoryTransaction {
    async fn acquire(&mut self, row: RowKey) {
        if self.guards.contains_key(&row) {
            return;
        }
        let guard = self.store.row_lock(row).lock_owned().await;
        self.guards.insert(row, guard);
    }

    fn view_account(&self, key: AccountKey) -> Option<Account> {
        self.accounts
            .get(&key)
            .cloned()
            .or_else(|| lock(&self.store.shared.tables).accounts.get(&key).cloned())
    }

    fn view_transaction(&self, key: TransactionKey) -> Option<Transaction> {
        self.transactions
            .get(&key)
            .cloned()
            .or_else(|| lock(&self.store.shared.tables).transactions.get(&key).cloned())
    }

    fn all_accounts(&self) -> Vec<Account> {
        let mut merged = lock(&self.store.shared.tables).accounts.clone();
        merged.extend(self.accounts.iter().map(|(k, v)| (*k, v.clone())));
        merged.into_values().collect()
    }

    fn all_transactions(&self) -> Vec<Transaction> {
        let mut merged = lock(&self.store.shared.tables).transactions.clone();
        merged.extend(self.transactions.iter().map(|(k, v)| (*k, v.clone())));
        merged.into_values().collect()
    }

    fn account_not_found(key: AccountKey) -> StoreError {
        StoreError::NotFound(format!("account {key}"))
    }

    fn transaction_not_found(key: TransactionKey) -> StoreError {
        StoreError::NotFound(format!("transaction {key}"))
    }

    fn same_triple(a: &Account, b: &Account) -> bool {
        a.key != b.key && a.owner == b.owner && a.account_type == b.account_type && a.currency == b.currency
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_account(&mut self, key: AccountKey) -> StoreResult<Account> {
        self.acquire(RowKey::Account(key)).await;
        self.view_account(key).ok_or_else(|| Self::account_not_found(key))
    }

    async fn find_account(&mut self, key: AccountKey) -> StoreResult<Option<Account>> {
        Ok(self.view_account(key))
    }

    async fn find_account_by_owner(
        &mut self,
        owner: &OwnerRef,
        account_type: &str,
        currency: Currency,
    ) -> StoreResult<Option<Account>> {
        Ok(self.all_accounts().into_iter().find(|a| {
            &a.owner == owner && a.account_type == account_type && a.currency == currency
        }))
    }

    async fn accounts(&mut self, owner: Option<&OwnerRef>) -> StoreResult<Vec<Account>> {
        Ok(self
            .all_accounts()
            .into_iter()
            .filter(|a| owner.is_none_or(|o| &a.owner == o))
            .collect())
    }

    async fn insert_account(&mut self, account: &Account) -> StoreResult<()> {
        if self.view_account(account.key).is_some() {
            return Err(StoreError::Conflict(format!("account {} exists", account.key)));
        }
        if self.all_accounts().iter().any(|a| Self::same_triple(a, account)) {
            return Err(StoreError::Conflict(format!(
                "account {}:{}:{} exists",
                account.owner, account.account_type, account.currency
            )));
        }
        self.new_accounts.insert(account.key);
        self.accounts.insert(account.key, account.clone());
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> StoreResult<()> {
        if self.view_account(account.key).is_none() {
            return Err(Self::account_not_found(account.key));
        }
        self.accounts.insert(account.key, account.clone());
        Ok(())
    }

    async fn increment_balance(&mut self, key: AccountKey, delta: Decimal) -> StoreResult<Decimal> {
        let mut account = self.view_account(key).ok_or_else(|| Self::account_not_found(key))?;
        account.balance = account
            .balance
            .checked_add(delta)
            .ok_or_else(|| StoreError::Backend(format!("balance of account {key} overflows")))?;
        account.updated_at = chrono::Utc::now();
        let balance = account.balance;
        self.accounts.insert(key, account);
        Ok(balance)
    }

    async fn lock_transaction(&mut self, key: TransactionKey) -> StoreResult<Transaction> {
        self.acquire(RowKey::Transaction(key)).await;
        self.view_transaction(key)
            .ok_or_else(|| Self::transaction_not_found(key))
    }

    async fn lock_uncommitted(&mut self) -> StoreResult<Vec<TransactionKey>> {
        let keys: Vec<TransactionKey> = lock(&self.store.shared.tables)
            .transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Started)
            .map(|t| t.key)
            .collect();
        for key in &keys {
            self.acquire(RowKey::Transaction(*key)).await;
        }
        Ok(keys)
    }

    async fn lock_chain(&mut self) -> StoreResult<()> {
        self.acquire(RowKey::Chain).await;
        Ok(())
    }

    async fn find_transaction(&mut self, key: TransactionKey) -> StoreResult<Option<Transaction>> {
        Ok(self.view_transaction(key))
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        if self.view_transaction(transaction.key).is_some() {
            return Err(StoreError::Conflict(format!(
                "transaction {} exists",
                transaction.key
            )));
        }
        self.new_transactions.insert(transaction.key);
        self.transactions.insert(transaction.key, transaction.clone());
        Ok(())
    }

    async fn update_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        let current = self
            .view_transaction(transaction.key)
            .ok_or_else(|| Self::transaction_not_found(transaction.key))?;
        let mut record = transaction.clone();
        record.digest = current.digest;
        self.transactions.insert(record.key, record);
        Ok(())
    }

    async fn query_transactions(&mut self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>> {
        let mut found: Vec<Transaction> = self
            .all_transactions()
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect();
        filter.arrange(&mut found);
        Ok(found)
    }

    async fn set_digest_if_absent(&mut self, key: TransactionKey, digest: &str) -> StoreResult<bool> {
        let mut record = self
            .view_transaction(key)
            .ok_or_else(|| Self::transaction_not_found(key))?;
        if record.digest.is_some() {
            return Ok(false);
        }
        record.digest = Some(digest.to_string());
        self.transactions.insert(key, record);
        self.digest_writes
            .push(DigestWrite::IfAbsent(key, digest.to_string()));
        Ok(true)
    }

    async fn clear_digest(&mut self, key: TransactionKey) -> StoreResult<()> {
        let mut record = self
            .view_transaction(key)
            .ok_or_else(|| Self::transaction_not_found(key))?;
        record.digest = None;
        self.transactions.insert(key, record);
        self.digest_writes.push(DigestWrite::Clear(key));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if let Some(error) = lock(&self.store.shared.commit_failures).pop_front() {
            return Err(error);
        }

        let mut tables = lock(&self.store.shared.tables);

        for key in &self.new_accounts {
            let Some(account) = self.accounts.get(key) else {
                continue;
            };
            if tables.accounts.values().any(|a| Self::same_triple(a, account)) {
                return Err(StoreError::Conflict(format!(
                    "account {}:{}:{} exists",
                    account.owner, account.account_type, account.currency
                )));
            }
        }

        for (key, account) in &self.accounts {
            tables.accounts.insert(*key, account.clone());
        }

        for (key, transaction) in &self.transactions {
            let mut record = transaction.clone();
            if !self.new_transactions.contains(key) {
                record.digest = tables.transactions.get(key).and_then(|t| t.digest.clone());
            }
            tables.transactions.insert(*key, record);
        }

        for write in &self.digest_writes {
            match write {
                DigestWrite::IfAbsent(key, digest) => {
                    if let Some(record) = tables.transactions.get_mut(key) {
                        record.digest.get_or_insert_with(|| digest.clone());
                    }
                }
                DigestWrite::Clear(key) => {
                    if let Some(record) = tables.transactions.get_mut(key) {
                        record.digest = None;
                    }
                }
            }
        }

        // Row guards are released when `self` drops, after the tables are updated.
        drop(tables);
        Ok(())
    }

    async fn rollback(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tally_shared::types::Money;

    fn account(owner: &str) -> Account {
        Account::new(OwnerRef::new("user", owner), "default", Currency::USD)
    }

    #[tokio::test]
    async fn test_writes_invisible_until_commit() {
        let store = MemoryStore::new();
        let a = account("1");

        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&a).await.unwrap();
        assert!(tx.find_account(a.key).await.unwrap().is_some());
        assert!(store.accounts().is_empty());

        tx.commit().await.unwrap();
        assert_eq!(store.accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&account("1")).await.unwrap();
        tx.rollback().await;
        assert!(store.accounts().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_triple_conflicts() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&account("1")).await.unwrap();
        let err = tx.insert_account(&account("1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_insert_rejected_on_commit() {
        let store = MemoryStore::new();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_account(&account("1")).await.unwrap();
        second.insert_account(&account("1")).await.unwrap();

        first.commit().await.unwrap();
        assert!(matches!(second.commit().await, Err(StoreError::Conflict(_))));
        assert_eq!(store.accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_applies_nothing() {
        let store = MemoryStore::new();
        store.fail_next_commit(StoreError::Serialization("boom".into()));

        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&account("1")).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Serialization(_))));
        assert!(store.accounts().is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&account("1")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_holder() {
        let store = MemoryStore::new();
        let a = account("1");
        let mut setup = store.begin().await.unwrap();
        setup.insert_account(&a).await.unwrap();
        setup.commit().await.unwrap();

        let mut holder = store.begin().await.unwrap();
        holder.lock_account(a.key).await.unwrap();
        holder.increment_balance(a.key, dec!(5)).await.unwrap();

        let contender_store = store.clone();
        let contender = tokio::spawn(async move {
            let mut tx = contender_store.begin().await.unwrap();
            tx.lock_account(a.key).await.unwrap().balance
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        holder.commit().await.unwrap();
        assert_eq!(contender.await.unwrap(), dec!(5));
    }

    #[tokio::test]
    async fn test_balance_overflow_is_backend_error() {
        let store = MemoryStore::new();
        let a = account("1");
        let mut setup = store.begin().await.unwrap();
        setup.insert_account(&a).await.unwrap();
        setup.increment_balance(a.key, Decimal::MAX).await.unwrap();
        setup.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.increment_balance(a.key, Decimal::MAX).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        tx.rollback().await;
        assert_eq!(store.accounts()[0].balance, Decimal::MAX);
    }

    #[tokio::test]
    async fn test_chain_lock_blocks_second_holder() {
        let store = MemoryStore::new();
        let mut holder = store.begin().await.unwrap();
        holder.lock_chain().await.unwrap();

        let contender_store = store.clone();
        let contender = tokio::spawn(async move {
            let mut tx = contender_store.begin().await.unwrap();
            tx.lock_chain().await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        holder.rollback().await;
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_update_keeps_digest_and_if_absent_is_once() {
        let store = MemoryStore::new();
        let mut record = Transaction::started(
            AccountKey::new(),
            AccountKey::new(),
            Money::new(dec!(1), Currency::USD),
            None,
            None,
        );
        record.finish(TransactionStatus::Committed, chrono::Utc::now());

        let mut tx = store.begin().await.unwrap();
        tx.insert_transaction(&record).await.unwrap();
        assert!(tx.set_digest_if_absent(record.key, "first").await.unwrap());
        assert!(!tx.set_digest_if_absent(record.key, "second").await.unwrap());
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut changed = record.clone();
        changed.digest = None;
        changed.payload = Some(serde_json::json!({"note": "x"}));
        tx.update_transaction(&changed).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.transactions()[0].digest.as_deref(), Some("first"));
    }
}
