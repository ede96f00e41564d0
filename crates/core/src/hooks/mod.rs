//! Typed lifecycle hooks.
//!
//! One method per lifecycle point. Decision points return [`HookDecision`];
//! the others are observational. Every method defaults to "no opinion", so an
//! implementation only overrides the points it cares about.

mod policies;

use std::sync::Arc;

use rust_decimal::Decimal;
use tally_shared::types::Money;

use crate::error::LedgerError;
use crate::model::{Account, Transaction};

pub use policies::{CheckBalance, RevertGuard};

/// Outcome of a vetoable hook.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HookDecision {
    /// Let the operation proceed.
    #[default]
    Continue,
    /// Refuse the operation, with a reason.
    Veto(String),
}

impl HookDecision {
    /// Vetoes with `reason`.
    pub fn veto(reason: impl Into<String>) -> Self {
        Self::Veto(reason.into())
    }

    /// Returns true for a veto.
    #[must_use]
    pub fn is_veto(&self) -> bool {
        matches!(self, Self::Veto(_))
    }
}

/// What to do with a commit that exhausted its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureDecision {
    /// Surface the failure to the caller.
    #[default]
    Propagate,
    /// Swallow it; the transaction stays STARTED.
    Suppress,
}

/// State of the reverted transaction, read under the commit locks.
#[derive(Debug, Clone)]
pub struct RevertState {
    /// The reverted transaction.
    pub parent: Transaction,
    /// Sum of its committed children, in its currency.
    pub reverted: Decimal,
    /// The committing child's amount, in the parent's currency.
    pub requested: Decimal,
}

impl RevertState {
    /// What can still be reverted.
    #[must_use]
    pub fn remaining(&self) -> Decimal {
        self.parent.amount - self.reverted
    }
}

/// Everything a commit hook can inspect.
#[derive(Debug, Clone, Copy)]
pub struct CommitContext<'a> {
    /// The transaction, with its amounts frozen.
    pub transaction: &'a Transaction,
    /// Origin account as locked by the commit.
    pub origin: &'a Account,
    /// Destination account as locked by the commit.
    pub destination: &'a Account,
    /// Set when the transaction reverts another one.
    pub revert: Option<&'a RevertState>,
}

/// Lifecycle hook points of the ledger.
pub trait LedgerHooks: Send + Sync {
    /// Before a new transaction is persisted. A veto aborts creation.
    fn on_creating(&self, _transaction: &Transaction) -> HookDecision {
        HookDecision::Continue
    }

    /// After a new transaction is persisted.
    fn on_created(&self, _transaction: &Transaction) {}

    /// Before balances move. A veto cancels the transaction.
    fn on_committing(&self, _context: &CommitContext<'_>) -> HookDecision {
        HookDecision::Continue
    }

    /// After a commit.
    fn on_committed(&self, _transaction: &Transaction) {}

    /// After a cancel, including a vetoed commit.
    fn on_canceled(&self, _transaction: &Transaction) {}

    /// Before a revert child is created. A veto aborts the revert.
    fn on_reverting(&self, _transaction: &Transaction, _amount: &Money) -> HookDecision {
        HookDecision::Continue
    }

    /// When an operation has exhausted its attempts.
    fn on_failed(&self, _operation: &str, _transaction: &Transaction, _error: &LedgerError) -> FailureDecision {
        FailureDecision::Propagate
    }

    /// Before a new account is persisted. A veto aborts account creation.
    fn on_account_creating(&self, _account: &Account) -> HookDecision {
        HookDecision::Continue
    }

    /// After a new account is persisted.
    fn on_account_created(&self, _account: &Account) {}
}

/// Hooks run in registration order.
///
/// Decision points stop at the first veto. A failure is suppressed if any
/// hook suppresses it.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn LedgerHooks>>,
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookChain").field("hooks", &self.hooks.len()).finish()
    }
}

impl HookChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook.
    #[must_use]
    pub fn with(mut self, hook: impl LedgerHooks + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Appends a shared hook.
    pub fn push(&mut self, hook: Arc<dyn LedgerHooks>) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if no hook is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Registered hooks in call order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn LedgerHooks>> {
        self.hooks.iter()
    }

    fn decide(&self, ask: impl Fn(&dyn LedgerHooks) -> HookDecision) -> HookDecision {
        self.hooks
            .iter()
            .map(|hook| ask(hook.as_ref()))
            .find(HookDecision::is_veto)
            .unwrap_or_default()
    }
}

impl LedgerHooks for HookChain {
    fn on_creating(&self, transaction: &Transaction) -> HookDecision {
        self.decide(|hook| hook.on_creating(transaction))
    }

    fn on_created(&self, transaction: &Transaction) {
        self.hooks.iter().for_each(|hook| hook.on_created(transaction));
    }

    fn on_committing(&self, context: &CommitContext<'_>) -> HookDecision {
        self.decide(|hook| hook.on_committing(context))
    }

    fn on_committed(&self, transaction: &Transaction) {
        self.hooks.iter().for_each(|hook| hook.on_committed(transaction));
    }

    fn on_canceled(&self, transaction: &Transaction) {
        self.hooks.iter().for_each(|hook| hook.on_canceled(transaction));
    }

    fn on_reverting(&self, transaction: &Transaction, amount: &Money) -> HookDecision {
        self.decide(|hook| hook.on_reverting(transaction, amount))
    }

    fn on_failed(&self, operation: &str, transaction: &Transaction, error: &LedgerError) -> FailureDecision {
        let mut decision = FailureDecision::Propagate;
        for hook in &self.hooks {
            if hook.on_failed(operation, transaction, error) == FailureDecision::Suppress {
                decision = FailureDecision::Suppress;
            }
        }
        decision
    }

    fn on_account_creating(&self, account: &Account) -> HookDecision {
        self.decide(|hook| hook.on_account_creating(account))
    }

    fn on_account_created(&self, account: &Account) {
        self.hooks.iter().for_each(|hook| hook.on_account_created(account));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal_macros::dec;
    use tally_shared::types::{AccountKey, Currency};

    struct Counting(Arc<AtomicUsize>);

    impl LedgerHooks for Counting {
        fn on_creating(&self, _transaction: &Transaction) -> HookDecision {
            self.0.fetch_add(1, Ordering::SeqCst);
            HookDecision::Continue
        }
    }

    struct Refuse;

    impl LedgerHooks for Refuse {
        fn on_creating(&self, _transaction: &Transaction) -> HookDecision {
            HookDecision::veto("closed")
        }

        fn on_failed(&self, _operation: &str, _transaction: &Transaction, _error: &LedgerError) -> FailureDecision {
            FailureDecision::Suppress
        }
    }

    fn transaction() -> Transaction {
        Transaction::started(
            AccountKey::new(),
            AccountKey::new(),
            Money::new(dec!(1), Currency::USD),
            None,
            None,
        )
    }

    #[test]
    fn test_empty_chain_continues() {
        let chain = HookChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.on_creating(&transaction()), HookDecision::Continue);
    }

    #[test]
    fn test_first_veto_halts() {
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        let chain = HookChain::new()
            .with(Counting(Arc::clone(&before)))
            .with(Refuse)
            .with(Counting(Arc::clone(&after)));

        assert_eq!(chain.on_creating(&transaction()), HookDecision::veto("closed"));
        assert_eq!(before.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_any_hook_can_suppress_failure() {
        let error = LedgerError::ZeroTransfer;
        let tx = transaction();

        assert_eq!(
            HookChain::new().on_failed("commit", &tx, &error),
            FailureDecision::Propagate
        );
        assert_eq!(
            HookChain::new().with(Refuse).on_failed("commit", &tx, &error),
            FailureDecision::Suppress
        );
    }
}
