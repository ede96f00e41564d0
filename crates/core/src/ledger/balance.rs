//! Account balance mutation and audit.
//!
//! The cached balance on an account is only ever moved by a commit, through
//! [`AccountLedger::increment`] and [`AccountLedger::decrement`], while the
//! commit holds the account's row lock. Everything else here reads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tally_shared::types::{AccountKey, Money};

use crate::context::LedgerContext;
use crate::error::{LedgerError, LedgerResult, StoreError};
use crate::model::{Account, Transaction, TransactionStatus};
use crate::store::{StoreTransaction, TransactionFilter};

/// Which side of a transaction an account sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Incoming,
    Outgoing,
}

/// Balance state of accounts.
#[derive(Clone)]
pub struct AccountLedger {
    ctx: Arc<LedgerContext>,
}

impl AccountLedger {
    pub(crate) fn new(ctx: Arc<LedgerContext>) -> Self {
        Self { ctx }
    }

    /// Credits `account` with `amount`, converted into the account currency.
    ///
    /// The caller must hold the account's row lock in `uow`.
    pub async fn increment(
        &self,
        uow: &mut dyn StoreTransaction,
        account: &Account,
        amount: &Money,
    ) -> LedgerResult<Money> {
        let delta = self.ctx.amount_in(amount, account.currency)?;
        self.apply(uow, account, delta).await
    }

    /// Debits `account` by `amount`, converted into the account currency.
    ///
    /// The caller must hold the account's row lock in `uow`.
    pub async fn decrement(
        &self,
        uow: &mut dyn StoreTransaction,
        account: &Account,
        amount: &Money,
    ) -> LedgerResult<Money> {
        let delta = self.ctx.amount_in(amount, account.currency)?;
        self.apply(uow, account, -delta).await
    }

    async fn apply(
        &self,
        uow: &mut dyn StoreTransaction,
        account: &Account,
        delta: Decimal,
    ) -> LedgerResult<Money> {
        let balance = if self.ctx.config.account.use_money_calculator {
            let mut current = uow.lock_account(account.key).await.map_err(account_lookup(account.key))?;
            current.balance = current.balance().checked_add(&Money::new(delta, account.currency))?.amount;
            current.updated_at = Utc::now();
            uow.update_account(&current).await?;
            current.balance
        } else {
            uow.increment_balance(account.key, delta)
                .await
                .map_err(account_lookup(account.key))?
        };

        tracing::debug!(account = %account.key, delta = %delta, balance = %balance, "Balance updated");
        Ok(Money::new(balance, account.currency))
    }

    /// Balance of `account`.
    ///
    /// Without a date or counterparty this is the cached balance; otherwise it
    /// is recomputed from committed transactions finished by `as_of` and, when
    /// given, exchanged with `counterparty` only.
    pub async fn balance(
        &self,
        account: AccountKey,
        as_of: Option<DateTime<Utc>>,
        counterparty: Option<AccountKey>,
    ) -> LedgerResult<Money> {
        if as_of.is_none() && counterparty.is_none() {
            let mut uow = self.ctx.begin().await?;
            let found = uow.find_account(account).await?;
            uow.rollback().await;
            return found
                .map(|a| a.balance())
                .ok_or_else(|| LedgerError::AccountNotFound(account.to_string()));
        }
        self.computed_balance(account, as_of, counterparty).await
    }

    /// Balance recomputed from committed transactions, ignoring the cache.
    pub async fn computed_balance(
        &self,
        account: AccountKey,
        as_of: Option<DateTime<Utc>>,
        counterparty: Option<AccountKey>,
    ) -> LedgerResult<Money> {
        let income = self.income(account, as_of, counterparty).await?;
        let expense = self.expense(account, as_of, counterparty).await?;
        Ok(income.checked_sub(&expense)?)
    }

    /// Sum received by `account` from committed transactions.
    pub async fn income(
        &self,
        account: AccountKey,
        as_of: Option<DateTime<Utc>>,
        counterparty: Option<AccountKey>,
    ) -> LedgerResult<Money> {
        self.flow(account, Side::Incoming, as_of, counterparty).await
    }

    /// Sum sent by `account` through committed transactions.
    pub async fn expense(
        &self,
        account: AccountKey,
        as_of: Option<DateTime<Utc>>,
        counterparty: Option<AccountKey>,
    ) -> LedgerResult<Money> {
        self.flow(account, Side::Outgoing, as_of, counterparty).await
    }

    async fn flow(
        &self,
        account: AccountKey,
        side: Side,
        as_of: Option<DateTime<Utc>>,
        counterparty: Option<AccountKey>,
    ) -> LedgerResult<Money> {
        let mut uow = self.ctx.begin().await?;
        let target = uow
            .find_account(account)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account.to_string()))?;

        let mut filter = TransactionFilter::with_status(&[TransactionStatus::Committed]).until(as_of);
        filter = match side {
            Side::Incoming => filter.to_account(account),
            Side::Outgoing => filter.from_account(account),
        };
        if let Some(other) = counterparty {
            filter = match side {
                Side::Incoming => filter.from_account(other),
                Side::Outgoing => filter.to_account(other),
            };
        }
        let transactions = uow.query_transactions(&filter).await?;
        uow.rollback().await;

        let total = transactions.iter().try_fold(Decimal::ZERO, |sum, tx| {
            Ok::<_, LedgerError>(sum + self.frozen_amount(tx, &target, side)?)
        })?;
        Ok(Money::new(total, target.currency))
    }

    /// Amount of `tx` as seen from `account`, frozen if available.
    pub(crate) fn frozen_amount(&self, tx: &Transaction, account: &Account, side: Side) -> LedgerResult<Decimal> {
        let frozen = match side {
            Side::Incoming => tx.destination_amount,
            Side::Outgoing => tx.origin_amount,
        };
        match frozen {
            Some(amount) => Ok(amount),
            None => self.ctx.amount_in(&tx.amount(), account.currency),
        }
    }

    /// Returns true if the cached balance matches the recomputed one.
    pub async fn is_valid(&self, account: AccountKey) -> LedgerResult<bool> {
        let cached = self.balance(account, None, None).await?;
        let computed = self.computed_balance(account, None, None).await?;
        Ok(cached == computed)
    }

    /// Overwrites the cached balance with the recomputed one.
    ///
    /// Administrative repair; returns the repaired account.
    pub async fn fix_balance(&self, account: AccountKey) -> LedgerResult<Account> {
        let mut uow = self.ctx.begin().await?;
        let mut locked = uow.lock_account(account).await.map_err(account_lookup(account))?;
        let computed = self.computed_balance(account, None, None).await?;

        if locked.balance != computed.amount {
            tracing::warn!(
                account = %account,
                cached = %locked.balance,
                computed = %computed.amount,
                "Repairing cached balance"
            );
            locked.balance = computed.amount;
            locked.updated_at = Utc::now();
            uow.update_account(&locked).await?;
        }
        uow.commit().await?;
        Ok(locked)
    }
}

/// Maps a missing account row to `AccountNotFound`.
pub(crate) fn account_lookup(key: AccountKey) -> impl FnOnce(StoreError) -> LedgerError {
    move |error| match error {
        StoreError::NotFound(_) => LedgerError::AccountNotFound(key.to_string()),
        other => LedgerError::Store(other),
    }
}
