use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tally_shared::types::{Currency, Money, TransactionKey};

use super::{TransactionEngine, ensure_status};
use crate::context::transaction_lookup;
use crate::error::{LedgerError, LedgerResult};
use crate::hooks::{CommitContext, FailureDecision, HookDecision, LedgerHooks, RevertState};
use crate::ledger::balance::account_lookup;
use crate::model::{Account, Transaction, TransactionStatus};
use crate::store::{StoreTransaction, TransactionFilter, TransactionOrder};

/// How a single commit attempt ended.
enum CommitOutcome {
    Committed(Transaction),
    Vetoed(Transaction, String),
}

impl TransactionEngine {
    /// Applies a STARTED transaction to the balances.
    ///
    /// A veto from `on_committing` cancels the transaction instead; that is a
    /// normal outcome, not an error. Transient store failures are retried up
    /// to `transaction.commit_attempts` times.
    ///
    /// # Errors
    ///
    /// - `StatusMismatch` unless the transaction is STARTED
    /// - `CommitFailed` when the store keeps failing, unless `on_failed`
    ///   suppresses it; the transaction is then returned still STARTED
    pub async fn commit(&self, key: TransactionKey) -> LedgerResult<Transaction> {
        let attempts = self.ctx.config.transaction.commit_attempts.max(1);
        let mut attempt = 0;

        let failure = loop {
            attempt += 1;
            match self.try_commit(key).await {
                Ok(outcome) => return Ok(self.finish_commit(outcome).await),
                Err(LedgerError::Store(error)) => {
                    if error.is_transient() && attempt < attempts {
                        tracing::warn!(transaction = %key, attempt, error = %error, "Commit attempt failed, retrying");
                        continue;
                    }
                    break error;
                }
                Err(error) => return Err(error),
            }
        };

        let error = LedgerError::CommitFailed {
            operation: "commit",
            key,
            attempts: attempt,
            source: failure,
        };
        let current = self.load(key).await?;
        if self.ctx.hooks.on_failed("commit", &current, &error) == FailureDecision::Suppress {
            tracing::warn!(transaction = %key, attempts = attempt, error = %error, "Commit failure suppressed by hook");
            return Ok(current);
        }

        tracing::error!(transaction = %key, attempts = attempt, error = %error, "Commit failed");
        Err(error)
    }

    /// One commit attempt inside a single unit of work.
    async fn try_commit(&self, key: TransactionKey) -> LedgerResult<CommitOutcome> {
        let mut uow = self.ctx.begin().await?;
        uow.lock_uncommitted().await?;

        let mut transaction = uow
            .lock_transaction(key)
            .await
            .map_err(transaction_lookup(key))?;
        ensure_status(&transaction, "commit", TransactionStatus::Started)?;

        let (origin, destination) = lock_endpoints(uow.as_mut(), &transaction).await?;
        let (debit, credit) = self.freeze_amounts(&mut transaction, &origin, &destination)?;

        let revert = match transaction.parent {
            Some(parent) => Some(self.revert_state(uow.as_mut(), &transaction, parent).await?),
            None => None,
        };
        let finished_at = next_finish_time(uow.as_mut()).await?;

        let context = CommitContext {
            transaction: &transaction,
            origin: &origin,
            destination: &destination,
            revert: revert.as_ref(),
        };
        if let HookDecision::Veto(reason) = self.ctx.hooks.on_committing(&context) {
            transaction.finish(TransactionStatus::Canceled, finished_at);
            uow.update_transaction(&transaction).await?;
            uow.commit().await?;
            return Ok(CommitOutcome::Vetoed(transaction, reason));
        }

        let fresh = uow
            .find_transaction(key)
            .await?
            .ok_or(LedgerError::TransactionNotFound(key))?;
        ensure_status(&fresh, "commit", TransactionStatus::Started)?;

        self.balances.decrement(uow.as_mut(), &origin, &debit).await?;
        self.balances.increment(uow.as_mut(), &destination, &credit).await?;

        transaction.finish(TransactionStatus::Committed, finished_at);
        uow.update_transaction(&transaction).await?;
        uow.commit().await?;
        Ok(CommitOutcome::Committed(transaction))
    }

    async fn finish_commit(&self, outcome: CommitOutcome) -> Transaction {
        match outcome {
            CommitOutcome::Committed(transaction) => {
                tracing::info!(
                    transaction = %transaction.key,
                    origin = %transaction.origin,
                    destination = %transaction.destination,
                    amount = %transaction.amount(),
                    "Transaction committed"
                );
                let transaction = match self.digests.ensure(transaction.key).await {
                    Ok(digested) => digested,
                    Err(error) => {
                        tracing::warn!(transaction = %transaction.key, error = %error, "Digest deferred");
                        transaction
                    }
                };
                self.ctx.hooks.on_committed(&transaction);
                transaction
            }
            CommitOutcome::Vetoed(transaction, reason) => {
                tracing::info!(
                    transaction = %transaction.key,
                    hook = "committing",
                    reason = %reason,
                    "Commit vetoed, transaction canceled"
                );
                self.ctx.hooks.on_canceled(&transaction);
                transaction
            }
        }
    }

    /// Freezes the base, origin and destination amounts once.
    ///
    /// Returns the debit in origin currency and the credit in destination currency.
    fn freeze_amounts(
        &self,
        transaction: &mut Transaction,
        origin: &Account,
        destination: &Account,
    ) -> LedgerResult<(Money, Money)> {
        let amount = transaction.amount();
        let freeze = |slot: Option<Decimal>, currency: Currency| match slot {
            Some(frozen) => Ok(frozen),
            None => self.ctx.amount_in(&amount, currency),
        };

        let base = freeze(transaction.base_amount, self.ctx.base_currency())?;
        let debit = freeze(transaction.origin_amount, origin.currency)?;
        let credit = freeze(transaction.destination_amount, destination.currency)?;

        transaction.base_amount = Some(base);
        transaction.origin_amount = Some(debit);
        transaction.destination_amount = Some(credit);
        Ok((
            Money::new(debit, origin.currency),
            Money::new(credit, destination.currency),
        ))
    }

    async fn revert_state(
        &self,
        uow: &mut dyn StoreTransaction,
        transaction: &Transaction,
        parent: TransactionKey,
    ) -> LedgerResult<RevertState> {
        let parent = uow
            .find_transaction(parent)
            .await?
            .ok_or(LedgerError::TransactionNotFound(parent))?;
        let reverted = self.ctx.reverted_amount(uow, &parent).await?;
        let requested = self.ctx.amount_in(&transaction.amount(), parent.currency)?;
        Ok(RevertState {
            parent,
            reverted,
            requested,
        })
    }

    /// Cancels a STARTED transaction. Balances are not touched.
    pub async fn cancel(&self, key: TransactionKey) -> LedgerResult<Transaction> {
        let mut uow = self.ctx.begin().await?;
        let mut transaction = uow
            .lock_transaction(key)
            .await
            .map_err(transaction_lookup(key))?;
        ensure_status(&transaction, "cancel", TransactionStatus::Started)?;

        transaction.finish(TransactionStatus::Canceled, Utc::now());
        uow.update_transaction(&transaction).await?;
        uow.commit().await?;

        tracing::info!(transaction = %key, "Transaction canceled");
        self.ctx.hooks.on_canceled(&transaction);
        Ok(transaction)
    }
}

/// Locks both endpoint accounts in key order, returning (origin, destination).
async fn lock_endpoints(
    uow: &mut dyn StoreTransaction,
    transaction: &Transaction,
) -> LedgerResult<(Account, Account)> {
    let (first, second) = if transaction.origin <= transaction.destination {
        (transaction.origin, transaction.destination)
    } else {
        (transaction.destination, transaction.origin)
    };

    let first = uow.lock_account(first).await.map_err(account_lookup(first))?;
    let second = uow.lock_account(second).await.map_err(account_lookup(second))?;

    if first.key == transaction.origin {
        Ok((first, second))
    } else {
        Ok((second, first))
    }
}

/// Finish time for the next commit, strictly after the last committed one.
async fn next_finish_time(uow: &mut dyn StoreTransaction) -> LedgerResult<DateTime<Utc>> {
    let now = Utc::now();
    let last = uow
        .query_transactions(
            &TransactionFilter::committed()
                .ordered(TransactionOrder::FinishedDesc)
                .limited(1),
        )
        .await?
        .into_iter()
        .next()
        .and_then(|t| t.finished_at);

    Ok(match last {
        Some(last) if last >= now => last + Duration::microseconds(1),
        _ => now,
    })
}
