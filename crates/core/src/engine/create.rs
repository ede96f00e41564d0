use serde_json::Value;
use tally_shared::config::CurrencyPolicy;
use tally_shared::types::{Money, TransactionKey};

use super::{TransactionEngine, TransferAmount};
use crate::error::{LedgerError, LedgerResult};
use crate::hooks::{HookDecision, LedgerHooks};
use crate::model::{Account, Transaction};

impl TransactionEngine {
    /// Creates a STARTED transaction moving `amount` from `origin` to `destination`.
    ///
    /// Commits it right away when `transaction.auto_commit` is on.
    ///
    /// # Errors
    ///
    /// - `IdenticalEndpoints` when both sides are the same account
    /// - `ZeroTransfer` / `NegativeAmount` when the amount is not allowed
    /// - `CreateAborted` when a hook vetoes; nothing is persisted then
    pub async fn create(
        &self,
        origin: &Account,
        destination: &Account,
        amount: impl Into<TransferAmount>,
        payload: Option<Value>,
        parent: Option<TransactionKey>,
    ) -> LedgerResult<Transaction> {
        let (mut origin, mut destination) = (origin, destination);
        if origin.key == destination.key {
            return Err(LedgerError::IdenticalEndpoints(origin.key));
        }

        let rules = &self.ctx.config.transaction;
        let mut money = self.resolve_amount(amount.into(), origin, destination);

        if money.is_zero() && !rules.allow_zero_transfers {
            return Err(LedgerError::ZeroTransfer);
        }
        if money.is_negative() {
            if !rules.handle_negative_amounts {
                return Err(LedgerError::NegativeAmount(money.amount));
            }
            std::mem::swap(&mut origin, &mut destination);
            money = money.abs();
        }

        let mut transaction = Transaction::started(origin.key, destination.key, money, payload, parent);
        if rules.origin_forward_conversion {
            transaction.origin_amount = Some(self.ctx.amount_in(&money, origin.currency)?);
        }

        let mut uow = self.ctx.begin().await?;
        for account in [origin.key, destination.key] {
            if uow.find_account(account).await?.is_none() {
                return Err(LedgerError::AccountNotFound(account.to_string()));
            }
        }
        if let Some(parent) = parent {
            uow.find_transaction(parent)
                .await?
                .ok_or(LedgerError::TransactionNotFound(parent))?;
        }

        uow.insert_transaction(&transaction).await?;
        if let HookDecision::Veto(reason) = self.ctx.hooks.on_creating(&transaction) {
            uow.rollback().await;
            tracing::info!(origin = %origin.key, destination = %destination.key, reason = %reason, "Transaction creation vetoed");
            return Err(LedgerError::CreateAborted(reason));
        }
        uow.commit().await?;

        tracing::info!(
            transaction = %transaction.key,
            origin = %transaction.origin,
            destination = %transaction.destination,
            amount = %transaction.amount(),
            parent = ?transaction.parent,
            "Transaction created"
        );
        self.ctx.hooks.on_created(&transaction);

        if rules.auto_commit {
            return self.commit(transaction.key).await;
        }
        Ok(transaction)
    }

    fn resolve_amount(&self, amount: TransferAmount, origin: &Account, destination: &Account) -> Money {
        match amount {
            TransferAmount::Money(money) => money,
            TransferAmount::Bare(value) => {
                let currency = match self.ctx.config.transaction.default_currency {
                    CurrencyPolicy::Origin => origin.currency,
                    CurrencyPolicy::Destination => destination.currency,
                    CurrencyPolicy::Base => self.ctx.base_currency(),
                    CurrencyPolicy::Explicit(currency) => currency,
                };
                Money::new(value, currency)
            }
        }
    }
}
