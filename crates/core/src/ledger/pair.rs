//! Figures of one account restricted to a single counterparty.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_shared::types::Money;

use super::balance::AccountLedger;
use crate::context::LedgerContext;
use crate::error::LedgerResult;
use crate::model::{Account, Transaction};
use crate::store::TransactionFilter;

/// An ordered pair of accounts.
///
/// Every figure is seen from `origin` and only counts transactions exchanged
/// with `destination`.
#[derive(Clone)]
pub struct AccountPair {
    ctx: Arc<LedgerContext>,
    origin: Account,
    destination: Account,
}

impl AccountPair {
    pub(crate) fn new(ctx: Arc<LedgerContext>, origin: Account, destination: Account) -> Self {
        Self {
            ctx,
            origin,
            destination,
        }
    }

    /// The same pair seen from the other side.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self::new(Arc::clone(&self.ctx), self.destination.clone(), self.origin.clone())
    }

    /// The account figures are reported for.
    #[must_use]
    pub fn origin(&self) -> &Account {
        &self.origin
    }

    /// The counterparty.
    #[must_use]
    pub fn destination(&self) -> &Account {
        &self.destination
    }

    /// Transactions from origin to destination, or both ways if `bidirectional`.
    pub async fn transactions(&self, bidirectional: bool) -> LedgerResult<Vec<Transaction>> {
        let mut uow = self.ctx.begin().await?;
        let forward = TransactionFilter::default()
            .from_account(self.origin.key)
            .to_account(self.destination.key);
        let mut found = uow.query_transactions(&forward).await?;
        if bidirectional {
            let backward = TransactionFilter::default()
                .from_account(self.destination.key)
                .to_account(self.origin.key);
            found.extend(uow.query_transactions(&backward).await?);
            found.sort_by_key(|t| t.key);
        }
        uow.rollback().await;
        Ok(found)
    }

    fn ledger(&self) -> AccountLedger {
        AccountLedger::new(Arc::clone(&self.ctx))
    }

    /// Received by origin from destination.
    pub async fn income(&self, as_of: Option<DateTime<Utc>>) -> LedgerResult<Money> {
        self.ledger()
            .income(self.origin.key, as_of, Some(self.destination.key))
            .await
    }

    /// Sent by origin to destination.
    pub async fn expense(&self, as_of: Option<DateTime<Utc>>) -> LedgerResult<Money> {
        self.ledger()
            .expense(self.origin.key, as_of, Some(self.destination.key))
            .await
    }

    /// Net position of origin against destination.
    pub async fn balance(&self, as_of: Option<DateTime<Utc>>) -> LedgerResult<Money> {
        self.ledger()
            .computed_balance(self.origin.key, as_of, Some(self.destination.key))
            .await
    }
}
