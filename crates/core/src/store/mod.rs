//! Record store seam.
//!
//! The engine never touches storage directly. It opens a unit of work with
//! [`RecordStore::begin`], locks and reads rows through the returned
//! [`StoreTransaction`], and finishes with `commit` or `rollback`. Dropping a
//! unit of work without committing discards its writes and releases its locks.
//!
//! Writes are explicit: `update_transaction` never changes the stored digest;
//! only `set_digest_if_absent` and `clear_digest` do. Both run under
//! `lock_chain`, so digest writers never interleave.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tally_shared::types::{AccountKey, Currency, TransactionKey};

use crate::error::StoreError;
use crate::model::{Account, OwnerRef, Transaction, TransactionStatus};

pub use memory::MemoryStore;

/// Result type alias using `StoreError`.
pub type StoreResult<T> = Result<T, StoreError>;

/// A transactional record store with row-level locking.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Opens a unit of work.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// One atomic unit of work against the store.
#[async_trait]
pub trait StoreTransaction: Send {
    // ========== Accounts ==========

    /// Locks an account row for the rest of the unit of work and reads it.
    async fn lock_account(&mut self, key: AccountKey) -> StoreResult<Account>;

    /// Reads an account without locking.
    async fn find_account(&mut self, key: AccountKey) -> StoreResult<Option<Account>>;

    /// Reads the account identified by its unique triple.
    async fn find_account_by_owner(
        &mut self,
        owner: &OwnerRef,
        account_type: &str,
        currency: Currency,
    ) -> StoreResult<Option<Account>>;

    /// Lists accounts, optionally restricted to one owner, ordered by key.
    async fn accounts(&mut self, owner: Option<&OwnerRef>) -> StoreResult<Vec<Account>>;

    /// Inserts an account; `Conflict` if its triple is already taken.
    async fn insert_account(&mut self, account: &Account) -> StoreResult<()>;

    /// Replaces an existing account row.
    async fn update_account(&mut self, account: &Account) -> StoreResult<()>;

    /// Adds `delta` to the cached balance and returns the new balance.
    async fn increment_balance(&mut self, key: AccountKey, delta: Decimal) -> StoreResult<Decimal>;

    // ========== Transactions ==========

    /// Locks a transaction row for the rest of the unit of work and reads it.
    async fn lock_transaction(&mut self, key: TransactionKey) -> StoreResult<Transaction>;

    /// Locks every STARTED transaction, in key order, returning their keys.
    async fn lock_uncommitted(&mut self) -> StoreResult<Vec<TransactionKey>>;

    /// Locks the digest chain for the rest of the unit of work.
    ///
    /// Commits never take this lock; only digest assignment and rehashing do.
    async fn lock_chain(&mut self) -> StoreResult<()>;

    /// Reads a transaction without locking.
    async fn find_transaction(&mut self, key: TransactionKey) -> StoreResult<Option<Transaction>>;

    /// Inserts a new transaction.
    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()>;

    /// Replaces an existing transaction row, keeping its stored digest.
    async fn update_transaction(&mut self, transaction: &Transaction) -> StoreResult<()>;

    /// Lists transactions matching `filter`.
    async fn query_transactions(&mut self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>>;

    /// Assigns a digest unless one is already stored; returns whether it was written.
    async fn set_digest_if_absent(&mut self, key: TransactionKey, digest: &str) -> StoreResult<bool>;

    /// Clears a stored digest.
    async fn clear_digest(&mut self, key: TransactionKey) -> StoreResult<()>;

    // ========== Boundary ==========

    /// Applies every write atomically and releases all locks.
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discards every write and releases all locks.
    async fn rollback(self: Box<Self>);
}

/// Result ordering for transaction queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionOrder {
    /// Creation order.
    #[default]
    KeyAsc,
    /// Reverse creation order.
    KeyDesc,
    /// Finish time, ties broken by key.
    FinishedAsc,
    /// Reverse finish time.
    FinishedDesc,
}

/// Filter for [`StoreTransaction::query_transactions`].
///
/// Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Allowed statuses.
    pub statuses: Vec<TransactionStatus>,
    /// Only children of this transaction.
    pub parent: Option<TransactionKey>,
    /// Only transactions that revert something.
    pub reverts_only: bool,
    /// Only transactions debiting this account.
    pub origin: Option<AccountKey>,
    /// Only transactions crediting this account.
    pub destination: Option<AccountKey>,
    /// Only transactions finished at or before this instant.
    pub finished_until: Option<DateTime<Utc>>,
    /// Only transactions strictly before this chain position.
    pub chain_before: Option<(DateTime<Utc>, TransactionKey)>,
    /// Only transactions strictly after this chain position.
    pub chain_after: Option<(DateTime<Utc>, TransactionKey)>,
    /// Result ordering.
    pub order: TransactionOrder,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl TransactionFilter {
    /// Matches transactions in one of `statuses`.
    #[must_use]
    pub fn with_status(statuses: &[TransactionStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    /// Committed transactions in chain order.
    #[must_use]
    pub fn committed() -> Self {
        Self {
            statuses: vec![TransactionStatus::Committed],
            order: TransactionOrder::FinishedAsc,
            ..Self::default()
        }
    }

    /// Sets the ordering.
    #[must_use]
    pub fn ordered(mut self, order: TransactionOrder) -> Self {
        self.order = order;
        self
    }

    /// Restricts to children of `parent`.
    #[must_use]
    pub fn children_of(mut self, parent: TransactionKey) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Restricts to transactions debiting `account`.
    #[must_use]
    pub fn from_account(mut self, account: AccountKey) -> Self {
        self.origin = Some(account);
        self
    }

    /// Restricts to transactions crediting `account`.
    #[must_use]
    pub fn to_account(mut self, account: AccountKey) -> Self {
        self.destination = Some(account);
        self
    }

    /// Restricts to transactions finished at or before `at`.
    #[must_use]
    pub fn until(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.finished_until = at;
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limited(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `transaction` passes every criterion except ordering and limit.
    #[must_use]
    pub fn matches(&self, transaction: &Transaction) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&transaction.status) {
            return false;
        }
        if self.parent.is_some() && transaction.parent != self.parent {
            return false;
        }
        if self.reverts_only && transaction.parent.is_none() {
            return false;
        }
        if self.origin.is_some_and(|key| transaction.origin != key) {
            return false;
        }
        if self.destination.is_some_and(|key| transaction.destination != key) {
            return false;
        }
        if let Some(until) = self.finished_until {
            if transaction.finished_at.is_none_or(|at| at > until) {
                return false;
            }
        }
        if self.chain_before.is_some() || self.chain_after.is_some() {
            let Some(position) = transaction.chain_position() else {
                return false;
            };
            if self.chain_before.is_some_and(|before| position >= before) {
                return false;
            }
            if self.chain_after.is_some_and(|after| position <= after) {
                return false;
            }
        }
        true
    }

    /// Sorts and truncates `transactions` according to this filter.
    pub fn arrange(&self, transactions: &mut Vec<Transaction>) {
        match self.order {
            TransactionOrder::KeyAsc => transactions.sort_by_key(|t| t.key),
            TransactionOrder::KeyDesc => transactions.sort_by_key(|t| std::cmp::Reverse(t.key)),
            TransactionOrder::FinishedAsc => transactions.sort_by_key(|t| (t.finished_at, t.key)),
            TransactionOrder::FinishedDesc => {
                transactions.sort_by_key(|t| std::cmp::Reverse((t.finished_at, t.key)));
            }
        }
        if let Some(limit) = self.limit {
            transactions.truncate(limit);
        }
    }
}
