use tally_shared::types::{Money, TransactionKey};

use super::{TransactionEngine, ensure_status};
use crate::context::transaction_lookup;
use crate::error::{LedgerError, LedgerResult};
use crate::hooks::{HookDecision, LedgerHooks};
use crate::model::{Transaction, TransactionStatus};

impl TransactionEngine {
    /// Reverts `amount` of a committed transaction, or all that remains of it.
    ///
    /// The revert is a new transaction with swapped endpoints, parented to the
    /// original and created through [`TransactionEngine::create`]. Whether it
    /// fits in what remains is decided again when it commits.
    ///
    /// # Errors
    ///
    /// - `StatusMismatch` unless the transaction is COMMITTED
    /// - `NegativeAmount` for a negative `amount`
    /// - `CreateAborted` when `on_reverting` vetoes
    pub async fn revert(&self, key: TransactionKey, amount: Option<Money>) -> LedgerResult<Transaction> {
        let mut uow = self.ctx.begin().await?;
        let parent = uow
            .lock_transaction(key)
            .await
            .map_err(transaction_lookup(key))?;
        ensure_status(&parent, "revert", TransactionStatus::Committed)?;

        let amount = match amount {
            Some(requested) => Money::new(self.ctx.amount_in(&requested, parent.currency)?, parent.currency),
            None => {
                let reverted = self.ctx.reverted_amount(uow.as_mut(), &parent).await?;
                Money::new(parent.amount - reverted, parent.currency)
            }
        };
        if amount.is_negative() {
            return Err(LedgerError::NegativeAmount(amount.amount));
        }

        if let HookDecision::Veto(reason) = self.ctx.hooks.on_reverting(&parent, &amount) {
            uow.rollback().await;
            tracing::info!(transaction = %key, hook = "reverting", reason = %reason, "Revert vetoed");
            return Err(LedgerError::CreateAborted(reason));
        }

        let origin = uow
            .find_account(parent.destination)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(parent.destination.to_string()))?;
        let destination = uow
            .find_account(parent.origin)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(parent.origin.to_string()))?;
        uow.rollback().await;

        tracing::info!(transaction = %key, amount = %amount, "Reverting transaction");
        self.create(&origin, &destination, amount, parent.payload.clone(), Some(parent.key))
            .await
    }
}
