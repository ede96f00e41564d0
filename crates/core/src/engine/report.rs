use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tally_shared::types::{AccountKey, Money};

use super::TransactionEngine;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::balance::Side;
use crate::model::{Account, Transaction, TransactionStatus};
use crate::store::TransactionFilter;

impl TransactionEngine {
    async fn committed_until(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> LedgerResult<(HashMap<AccountKey, Account>, Vec<Transaction>)> {
        let mut uow = self.ctx.begin().await?;
        let accounts = uow
            .accounts(None)
            .await?
            .into_iter()
            .map(|a| (a.key, a))
            .collect();
        let transactions = uow
            .query_transactions(&TransactionFilter::with_status(&[TransactionStatus::Committed]).until(as_of))
            .await?;
        uow.rollback().await;
        Ok((accounts, transactions))
    }

    /// Turnover in the base currency: the sum of committed amounts finished by `as_of`.
    pub async fn total(&self, as_of: Option<DateTime<Utc>>) -> LedgerResult<Money> {
        let (_, transactions) = self.committed_until(as_of).await?;
        let base = self.ctx.base_currency();
        let total = transactions.iter().try_fold(Decimal::ZERO, |sum, tx| {
            let amount = match tx.base_amount {
                Some(frozen) => frozen,
                None => self.ctx.amount_in(&tx.amount(), base)?,
            };
            Ok::<_, LedgerError>(sum + amount)
        })?;
        Ok(Money::new(total, base))
    }

    /// Received per account, in each account's currency.
    pub async fn income_per_account(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> LedgerResult<BTreeMap<AccountKey, Money>> {
        let (accounts, transactions) = self.committed_until(as_of).await?;
        self.per_account(&accounts, &transactions, &[Side::Incoming])
    }

    /// Sent per account, in each account's currency.
    pub async fn expense_per_account(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> LedgerResult<BTreeMap<AccountKey, Money>> {
        let (accounts, transactions) = self.committed_until(as_of).await?;
        self.per_account(&accounts, &transactions, &[Side::Outgoing])
    }

    /// Net position per account, in each account's currency.
    pub async fn total_per_account(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> LedgerResult<BTreeMap<AccountKey, Money>> {
        let (accounts, transactions) = self.committed_until(as_of).await?;
        self.per_account(&accounts, &transactions, &[Side::Incoming, Side::Outgoing])
    }

    fn per_account(
        &self,
        accounts: &HashMap<AccountKey, Account>,
        transactions: &[Transaction],
        sides: &[Side],
    ) -> LedgerResult<BTreeMap<AccountKey, Money>> {
        let mut sums: BTreeMap<AccountKey, Decimal> = BTreeMap::new();
        for tx in transactions {
            for side in sides {
                let (key, sign) = match side {
                    Side::Incoming => (tx.destination, Decimal::ONE),
                    Side::Outgoing => (tx.origin, Decimal::NEGATIVE_ONE),
                };
                let Some(account) = accounts.get(&key) else {
                    continue;
                };
                let amount = self.balances.frozen_amount(tx, account, *side)?;
                // A single side reports a positive figure.
                let signed = if sides.len() == 1 { amount } else { amount * sign };
                *sums.entry(key).or_default() += signed;
            }
        }

        Ok(sums
            .into_iter()
            .filter_map(|(key, sum)| accounts.get(&key).map(|a| (key, Money::new(sum, a.currency))))
            .collect())
    }
}
