//! Ready-made commit policies.

use std::collections::HashSet;

use tally_shared::config::RevertLimit;

use super::{CommitContext, HookDecision, LedgerHooks};

/// Cancels a commit whose origin cannot cover the amount.
///
/// Accounts of the types listed in `overdraft_types` may go negative.
#[derive(Debug, Clone, Default)]
pub struct CheckBalance {
    overdraft_types: HashSet<String>,
}

impl CheckBalance {
    /// Creates the policy with no overdraft exemptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets accounts of `account_type` go negative.
    #[must_use]
    pub fn allow_overdraft(mut self, account_type: impl Into<String>) -> Self {
        self.overdraft_types.insert(account_type.into());
        self
    }
}

impl LedgerHooks for CheckBalance {
    fn on_committing(&self, context: &CommitContext<'_>) -> HookDecision {
        let origin = context.origin;
        if self.overdraft_types.contains(&origin.account_type) {
            return HookDecision::Continue;
        }

        let Some(required) = context.transaction.origin_amount else {
            return HookDecision::veto("origin amount is not frozen");
        };
        if origin.balance < required {
            return HookDecision::veto(format!(
                "insufficient funds on {}: balance {}, required {}",
                origin.key, origin.balance, required
            ));
        }
        HookDecision::Continue
    }
}

/// Cancels a revert that exceeds what its parent allows.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevertGuard {
    limit: RevertLimit,
}

impl RevertGuard {
    /// Creates the guard with the given limit.
    #[must_use]
    pub fn new(limit: RevertLimit) -> Self {
        Self { limit }
    }
}

impl LedgerHooks for RevertGuard {
    fn on_committing(&self, context: &CommitContext<'_>) -> HookDecision {
        let Some(revert) = context.revert else {
            return HookDecision::Continue;
        };

        match self.limit {
            RevertLimit::Remaining => {
                if revert.remaining() <= rust_decimal::Decimal::ZERO {
                    return HookDecision::veto(format!(
                        "transaction {} is already fully reverted",
                        revert.parent.key
                    ));
                }
                if revert.requested > revert.remaining() {
                    return HookDecision::veto(format!(
                        "revert of {} exceeds remaining {} of transaction {}",
                        revert.requested,
                        revert.remaining(),
                        revert.parent.key
                    ));
                }
            }
            RevertLimit::FullAmount => {
                if revert.requested > revert.parent.amount {
                    return HookDecision::veto(format!(
                        "revert of {} exceeds amount {} of transaction {}",
                        revert.requested, revert.parent.amount, revert.parent.key
                    ));
                }
            }
        }
        HookDecision::Continue
    }
}
