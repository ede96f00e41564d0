//! Account lookup, creation and ledger-wide audits.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;
use tally_shared::types::{AccountKey, Currency, Money};

use super::balance::{AccountLedger, Side};
use super::pair::AccountPair;
use crate::context::LedgerContext;
use crate::error::{LedgerError, LedgerResult, StoreError};
use crate::hooks::{HookDecision, LedgerHooks};
use crate::model::{Account, AccountAddress, OwnerRef, TransactionStatus};
use crate::store::TransactionFilter;

/// Finds, creates and audits accounts.
#[derive(Clone)]
pub struct AccountManager {
    ctx: Arc<LedgerContext>,
    balances: AccountLedger,
}

impl AccountManager {
    pub(crate) fn new(ctx: Arc<LedgerContext>) -> Self {
        let balances = AccountLedger::new(Arc::clone(&ctx));
        Self { ctx, balances }
    }

    fn account_type<'a>(&'a self, account_type: Option<&'a str>) -> &'a str {
        account_type.unwrap_or(&self.ctx.config.account.default_type)
    }

    fn currency(&self, currency: Option<Currency>) -> Currency {
        currency.unwrap_or(self.ctx.config.account.default_currency)
    }

    /// Returns the account of `owner` with the given type and currency,
    /// creating it if it does not exist yet.
    ///
    /// Missing type and currency fall back to the configured defaults.
    pub async fn create(
        &self,
        owner: &OwnerRef,
        account_type: Option<&str>,
        currency: Option<Currency>,
    ) -> LedgerResult<Account> {
        let account_type = self.account_type(account_type);
        let currency = self.currency(currency);
        let rules = &self.ctx.config.account;

        if !rules.allowed_types.is_empty() && !rules.allowed_types.iter().any(|t| t == account_type) {
            return Err(LedgerError::AccountCreateAborted(format!(
                "account type '{account_type}' is not allowed"
            )));
        }
        if !rules.allowed_currencies.is_empty() && !rules.allowed_currencies.contains(&currency) {
            return Err(LedgerError::AccountCreateAborted(format!(
                "currency {currency} is not allowed"
            )));
        }

        let mut uow = self.ctx.begin().await?;
        if let Some(existing) = uow.find_account_by_owner(owner, account_type, currency).await? {
            uow.rollback().await;
            return Ok(existing);
        }

        let account = Account::new(owner.clone(), account_type, currency);
        if let HookDecision::Veto(reason) = self.ctx.hooks.on_account_creating(&account) {
            uow.rollback().await;
            tracing::info!(owner = %owner, account_type, currency = %currency, reason = %reason, "Account creation vetoed");
            return Err(LedgerError::AccountCreateAborted(reason));
        }

        uow.insert_account(&account).await?;
        match uow.commit().await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                // Lost a creation race; the winner's account is the one.
                return self
                    .existing(owner, account_type, currency)
                    .await?
                    .ok_or_else(|| LedgerError::AccountNotFound(format!("{owner}:{account_type}:{currency}")));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(account = %account.key, owner = %owner, account_type, currency = %currency, "Account created");
        self.ctx.hooks.on_account_created(&account);
        Ok(account)
    }

    async fn existing(&self, owner: &OwnerRef, account_type: &str, currency: Currency) -> LedgerResult<Option<Account>> {
        let mut uow = self.ctx.begin().await?;
        let found = uow.find_account_by_owner(owner, account_type, currency).await?;
        uow.rollback().await;
        Ok(found)
    }

    /// Looks an account up by owner, type and currency.
    ///
    /// Creates it when `account.auto_create` is on, otherwise fails with
    /// `AccountNotFound`.
    pub async fn find(
        &self,
        owner: &OwnerRef,
        account_type: Option<&str>,
        currency: Option<Currency>,
    ) -> LedgerResult<Account> {
        let account_type = self.account_type(account_type);
        let currency = self.currency(currency);

        if let Some(account) = self.existing(owner, account_type, currency).await? {
            return Ok(account);
        }
        if self.ctx.config.account.auto_create {
            return self.create(owner, Some(account_type), Some(currency)).await;
        }
        Err(LedgerError::AccountNotFound(format!(
            "{owner}:{account_type}:{currency}"
        )))
    }

    /// Reads an account by key.
    pub async fn get(&self, key: AccountKey) -> LedgerResult<Account> {
        let mut uow = self.ctx.begin().await?;
        let found = uow.find_account(key).await?;
        uow.rollback().await;
        found.ok_or_else(|| LedgerError::AccountNotFound(key.to_string()))
    }

    /// Every account, or every account of `owner`.
    pub async fn all(&self, owner: Option<&OwnerRef>) -> LedgerResult<Vec<Account>> {
        let mut uow = self.ctx.begin().await?;
        let accounts = uow.accounts(owner).await?;
        uow.rollback().await;
        Ok(accounts)
    }

    /// Resolves an `ownerType:ownerId:accountType:accountCurrency` address.
    pub async fn locate(&self, address: &str) -> LedgerResult<Account> {
        let address = AccountAddress::parse(address)?;
        let owner_type = address
            .owner_type
            .as_deref()
            .unwrap_or(&self.ctx.config.owner.default_type);
        let owner = self.ctx.owners.resolve(owner_type, &address.owner_id)?;
        self.find(&owner, address.account_type.as_deref(), address.currency)
            .await
    }

    /// The pair `origin` → `destination`, for counterparty-scoped figures.
    pub async fn pair(&self, origin: AccountKey, destination: AccountKey) -> LedgerResult<AccountPair> {
        let origin = self.get(origin).await?;
        let destination = self.get(destination).await?;
        Ok(AccountPair::new(Arc::clone(&self.ctx), origin, destination))
    }

    /// Balance of every account recomputed from committed transactions.
    pub async fn total_per_account(&self) -> LedgerResult<BTreeMap<AccountKey, Money>> {
        let mut uow = self.ctx.begin().await?;
        let accounts: HashMap<AccountKey, Account> = uow
            .accounts(None)
            .await?
            .into_iter()
            .map(|a| (a.key, a))
            .collect();
        let committed = uow
            .query_transactions(&TransactionFilter::with_status(&[TransactionStatus::Committed]))
            .await?;
        uow.rollback().await;

        let mut totals: BTreeMap<AccountKey, Decimal> = accounts.keys().map(|k| (*k, Decimal::ZERO)).collect();
        for tx in &committed {
            if let Some(destination) = accounts.get(&tx.destination) {
                *totals.entry(tx.destination).or_default() +=
                    self.balances.frozen_amount(tx, destination, Side::Incoming)?;
            }
            if let Some(origin) = accounts.get(&tx.origin) {
                *totals.entry(tx.origin).or_default() -= self.balances.frozen_amount(tx, origin, Side::Outgoing)?;
            }
        }

        Ok(totals
            .into_iter()
            .filter_map(|(key, total)| accounts.get(&key).map(|a| (key, Money::new(total, a.currency))))
            .collect())
    }

    /// Accounts whose cached balance differs from the recomputed one,
    /// paired with the recomputed balance.
    pub async fn invalid_total_per_account(&self) -> LedgerResult<Vec<(Account, Money)>> {
        let totals = self.total_per_account().await?;
        let accounts = self.all(None).await?;
        Ok(accounts
            .into_iter()
            .filter_map(|account| {
                let total = totals.get(&account.key).copied()?;
                (account.balance != total.amount).then_some((account, total))
            })
            .collect())
    }

    /// Checks the ledger-wide invariants.
    ///
    /// The cheap check requires cached balances to sum to zero per currency.
    /// The aggressive check recomputes every account from its transactions.
    pub async fn is_valid(&self, aggressive: bool) -> LedgerResult<bool> {
        if aggressive {
            return Ok(self.invalid_total_per_account().await?.is_empty());
        }

        let mut sums: HashMap<Currency, Decimal> = HashMap::new();
        for account in self.all(None).await? {
            *sums.entry(account.currency).or_default() += account.balance;
        }
        Ok(sums.values().all(Decimal::is_zero))
    }

    /// Repairs every account whose cached balance drifted. Returns how many.
    pub async fn fix(&self) -> LedgerResult<usize> {
        let invalid = self.invalid_total_per_account().await?;
        for (account, _) in &invalid {
            self.balances.fix_balance(account.key).await?;
        }
        Ok(invalid.len())
    }
}
