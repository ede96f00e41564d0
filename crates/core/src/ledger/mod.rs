//! Accounts, balances and the wired-up ledger.
//!
//! [`LedgerBuilder`] assembles the collaborators once. Every component
//! handed out by [`Ledger`] shares them.

pub(crate) mod balance;
mod directory;
mod manager;
mod pair;

use std::sync::Arc;

use serde_json::Value;
use tally_shared::LedgerConfig;
use tally_shared::types::Money;

pub use balance::AccountLedger;
pub use directory::{AliasDirectory, FallbackDirectory, OpenOwnerDirectory, OwnerDirectory, StaticOwnerDirectory};
pub use manager::AccountManager;
pub use pair::AccountPair;

use crate::context::LedgerContext;
use crate::currency::{CurrencyService, MoneyConverter};
use crate::digest::DigestChain;
use crate::engine::{TransactionEngine, TransferAmount};
use crate::error::{LedgerError, LedgerResult};
use crate::hooks::{HookChain, LedgerHooks, RevertGuard};
use crate::model::{Account, Transaction};
use crate::store::RecordStore;

/// Assembles a [`Ledger`] from configuration and collaborators.
pub struct LedgerBuilder {
    config: LedgerConfig,
    store: Arc<dyn RecordStore>,
    converter: Option<Arc<dyn MoneyConverter>>,
    hooks: HookChain,
    owners: Option<Arc<dyn OwnerDirectory>>,
}

impl LedgerBuilder {
    /// Starts a builder over `store`.
    #[must_use]
    pub fn new(config: LedgerConfig, store: Arc<dyn RecordStore>) -> Self {
        Self {
            config,
            store,
            converter: None,
            hooks: HookChain::new(),
            owners: None,
        }
    }

    /// Sets the money converter. Without one, only same-currency moves work.
    #[must_use]
    pub fn converter(mut self, converter: impl MoneyConverter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    /// Registers a hook. Hooks run in registration order, after the
    /// built-in revert guard.
    #[must_use]
    pub fn hook(mut self, hook: impl LedgerHooks + 'static) -> Self {
        self.hooks = self.hooks.with(hook);
        self
    }

    /// Sets the owner directory. Configured owner aliases still apply.
    #[must_use]
    pub fn owners(mut self, owners: impl OwnerDirectory + 'static) -> Self {
        self.owners = Some(Arc::new(owners));
        self
    }

    /// Wires the ledger.
    ///
    /// # Errors
    ///
    /// Returns `Misconfiguration` when `transaction.commit_attempts` is zero.
    pub fn build(self) -> LedgerResult<Ledger> {
        if self.config.transaction.commit_attempts == 0 {
            return Err(LedgerError::Misconfiguration(
                "transaction.commit_attempts must be at least 1".into(),
            ));
        }

        let mut hooks = HookChain::new().with(RevertGuard::new(self.config.transaction.revert_limit));
        for hook in self.hooks.iter() {
            hooks.push(Arc::clone(hook));
        }

        let aliases = self.config.owner.aliases.clone();
        let owners: Arc<dyn OwnerDirectory> = match self.owners {
            Some(owners) => Arc::new(AliasDirectory::new(aliases, owners)),
            None => Arc::new(AliasDirectory::new(aliases, OpenOwnerDirectory)),
        };

        let currency = CurrencyService::new(
            self.converter,
            self.config.rounding_mode,
            self.config.account.default_currency,
        );

        tracing::debug!(
            base_currency = %self.config.base_currency,
            hooks = hooks.len(),
            auto_commit = self.config.transaction.auto_commit,
            commit_attempts = self.config.transaction.commit_attempts,
            "Ledger assembled"
        );

        let ctx = Arc::new(LedgerContext {
            store: self.store,
            config: self.config,
            currency,
            hooks,
            owners,
        });
        Ok(Ledger {
            accounts: AccountManager::new(Arc::clone(&ctx)),
            balances: AccountLedger::new(Arc::clone(&ctx)),
            transactions: TransactionEngine::new(Arc::clone(&ctx)),
            digests: DigestChain::new(Arc::clone(&ctx)),
            ctx,
        })
    }
}

/// Entry point to a wired ledger.
#[derive(Clone)]
pub struct Ledger {
    ctx: Arc<LedgerContext>,
    accounts: AccountManager,
    balances: AccountLedger,
    transactions: TransactionEngine,
    digests: DigestChain,
}

impl Ledger {
    /// Shortcut for [`LedgerBuilder::new`].
    #[must_use]
    pub fn builder(config: LedgerConfig, store: Arc<dyn RecordStore>) -> LedgerBuilder {
        LedgerBuilder::new(config, store)
    }

    /// Account lookup, creation and audits.
    #[must_use]
    pub fn accounts(&self) -> &AccountManager {
        &self.accounts
    }

    /// Balance reads and repairs.
    #[must_use]
    pub fn balances(&self) -> &AccountLedger {
        &self.balances
    }

    /// The transaction lifecycle.
    #[must_use]
    pub fn transactions(&self) -> &TransactionEngine {
        &self.transactions
    }

    /// Digest chain maintenance.
    #[must_use]
    pub fn digests(&self) -> &DigestChain {
        &self.digests
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.ctx.config
    }

    /// Money conversion and formatting.
    #[must_use]
    pub fn currency(&self) -> &CurrencyService {
        &self.ctx.currency
    }

    /// Moves `amount` from `origin` to `destination`.
    ///
    /// Same as [`TransactionEngine::create`] without a parent, so the
    /// transaction is committed right away only under `auto_commit`.
    pub async fn transfer(
        &self,
        origin: &Account,
        destination: &Account,
        amount: impl Into<TransferAmount>,
        payload: Option<Value>,
    ) -> LedgerResult<Transaction> {
        self.transactions
            .create(origin, destination, amount, payload, None)
            .await
    }

    /// Moves `amount` from `account` to the same owner's account of
    /// `account_type` in the amount's currency, creating that account if needed.
    ///
    /// This is how funds get set aside, e.g. from `wallet` into `locked`.
    pub async fn transfer_to_sibling_type(
        &self,
        account: &Account,
        account_type: &str,
        amount: Money,
        payload: Option<Value>,
    ) -> LedgerResult<Transaction> {
        let sibling = self.sibling(account, account_type, amount).await?;
        self.transfer(account, &sibling, amount, payload).await
    }

    /// Moves `amount` back from the same owner's account of `account_type`
    /// into `account`.
    pub async fn transfer_from_sibling_type(
        &self,
        account: &Account,
        account_type: &str,
        amount: Money,
        payload: Option<Value>,
    ) -> LedgerResult<Transaction> {
        let sibling = self.sibling(account, account_type, amount).await?;
        self.transfer(&sibling, account, amount, payload).await
    }

    async fn sibling(&self, account: &Account, account_type: &str, amount: Money) -> LedgerResult<Account> {
        self.accounts
            .create(&account.owner, Some(account_type), Some(amount.currency))
            .await
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("base_currency", &self.ctx.config.base_currency)
            .field("hooks", &self.ctx.hooks)
            .field("currency", &self.ctx.currency)
            .finish_non_exhaustive()
    }
}
