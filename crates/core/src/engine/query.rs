use std::collections::HashSet;

use tally_shared::types::{Money, TransactionKey};

use super::TransactionEngine;
use crate::error::{LedgerError, LedgerResult};
use crate::model::{Transaction, TransactionStatus};
use crate::store::{TransactionFilter, TransactionOrder};

fn by_key(desc: bool) -> TransactionOrder {
    if desc { TransactionOrder::KeyDesc } else { TransactionOrder::KeyAsc }
}

impl TransactionEngine {
    /// Reads a transaction as stored, without touching its digest.
    pub(crate) async fn load(&self, key: TransactionKey) -> LedgerResult<Transaction> {
        let mut uow = self.ctx.begin().await?;
        let found = uow.find_transaction(key).await?;
        uow.rollback().await;
        found.ok_or(LedgerError::TransactionNotFound(key))
    }

    async fn list(&self, filter: TransactionFilter) -> LedgerResult<Vec<Transaction>> {
        let mut uow = self.ctx.begin().await?;
        let found = uow.query_transactions(&filter).await?;
        uow.rollback().await;
        Ok(found)
    }

    /// Reads a transaction, filling its digest first if it is committed
    /// and still has none.
    pub async fn get(&self, key: TransactionKey) -> LedgerResult<Transaction> {
        let transaction = self.load(key).await?;
        if transaction.status == TransactionStatus::Committed && transaction.digest.is_none() {
            return self.digests.ensure(key).await;
        }
        Ok(transaction)
    }

    /// The most recently created transaction.
    pub async fn last(&self) -> LedgerResult<Option<Transaction>> {
        let filter = TransactionFilter::default().ordered(TransactionOrder::KeyDesc).limited(1);
        Ok(self.list(filter).await?.into_iter().next())
    }

    /// Every transaction in creation order.
    pub async fn all(&self, desc: bool) -> LedgerResult<Vec<Transaction>> {
        self.list(TransactionFilter::default().ordered(by_key(desc))).await
    }

    /// STARTED transactions in creation order.
    pub async fn uncommitted(&self, desc: bool) -> LedgerResult<Vec<Transaction>> {
        self.list(TransactionFilter::with_status(&[TransactionStatus::Started]).ordered(by_key(desc)))
            .await
    }

    /// COMMITTED transactions in chain order.
    pub async fn committed(&self, desc: bool) -> LedgerResult<Vec<Transaction>> {
        let order = if desc {
            TransactionOrder::FinishedDesc
        } else {
            TransactionOrder::FinishedAsc
        };
        self.list(TransactionFilter::committed().ordered(order)).await
    }

    /// CANCELED transactions in creation order.
    pub async fn canceled(&self, desc: bool) -> LedgerResult<Vec<Transaction>> {
        self.list(TransactionFilter::with_status(&[TransactionStatus::Canceled]).ordered(by_key(desc)))
            .await
    }

    /// COMMITTED transactions nothing has been created to revert yet.
    pub async fn revertable(&self, desc: bool) -> LedgerResult<Vec<Transaction>> {
        let mut all = self.all(desc).await?;
        let parents: HashSet<TransactionKey> = all.iter().filter_map(|t| t.parent).collect();
        all.retain(|t| t.status == TransactionStatus::Committed && !parents.contains(&t.key));
        Ok(all)
    }

    /// Revert transactions created for `key`, in creation order.
    pub async fn children(&self, key: TransactionKey) -> LedgerResult<Vec<Transaction>> {
        self.list(TransactionFilter::default().children_of(key)).await
    }

    /// Sum of the committed reverts of `key`.
    pub async fn reverted_amount(&self, key: TransactionKey) -> LedgerResult<Money> {
        let parent = self.load(key).await?;
        let mut uow = self.ctx.begin().await?;
        let reverted = self.ctx.reverted_amount(uow.as_mut(), &parent).await?;
        uow.rollback().await;
        Ok(Money::new(reverted, parent.currency))
    }

    /// What can still be reverted of `key`.
    pub async fn remaining_amount(&self, key: TransactionKey) -> LedgerResult<Money> {
        let parent = self.load(key).await?;
        let reverted = self.reverted_amount(key).await?;
        Ok(Money::new(parent.amount - reverted.amount, parent.currency))
    }

    /// Returns true once committed reverts cover the whole amount of `key`.
    pub async fn is_reverted(&self, key: TransactionKey) -> LedgerResult<bool> {
        Ok(!self.remaining_amount(key).await?.is_positive())
    }

    /// Returns true if `transaction` reverts another one.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn is_revert_transaction(&self, transaction: &Transaction) -> bool {
        transaction.is_revert()
    }
}
