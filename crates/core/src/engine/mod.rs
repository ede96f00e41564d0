//! Transaction lifecycle engine.
//!
//! ```text
//!            commit ok
//! STARTED ───────────────► COMMITTED ──revert──► new STARTED child
//!    │
//!    └── cancel / veto ───► CANCELED
//! ```
//!
//! Lock order inside a commit is fixed: every STARTED transaction row by key,
//! then the two endpoint accounts by key. Two commits moving money in
//! opposite directions between the same accounts therefore queue instead of
//! deadlocking.

mod commit;
mod create;
mod query;
mod report;
mod revert;

use std::sync::Arc;

use rust_decimal::Decimal;
use tally_shared::types::Money;

use crate::context::LedgerContext;
use crate::digest::DigestChain;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::AccountLedger;
use crate::model::{Transaction, TransactionStatus};

/// Amount handed to `create`.
///
/// A bare decimal takes its currency from `transaction.default_currency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAmount {
    /// Amount with an explicit currency.
    Money(Money),
    /// Amount in the configured default currency.
    Bare(Decimal),
}

impl From<Money> for TransferAmount {
    fn from(money: Money) -> Self {
        Self::Money(money)
    }
}

impl From<Decimal> for TransferAmount {
    fn from(amount: Decimal) -> Self {
        Self::Bare(amount)
    }
}

/// Creates, commits, cancels and reverts transactions.
#[derive(Clone)]
pub struct TransactionEngine {
    ctx: Arc<LedgerContext>,
    balances: AccountLedger,
    digests: DigestChain,
}

impl TransactionEngine {
    pub(crate) fn new(ctx: Arc<LedgerContext>) -> Self {
        Self {
            balances: AccountLedger::new(Arc::clone(&ctx)),
            digests: DigestChain::new(Arc::clone(&ctx)),
            ctx,
        }
    }
}

/// Fails with `StatusMismatch` unless `transaction` is in `expected`.
fn ensure_status(
    transaction: &Transaction,
    operation: &'static str,
    expected: TransactionStatus,
) -> LedgerResult<()> {
    if transaction.status == expected {
        return Ok(());
    }
    Err(LedgerError::StatusMismatch {
        operation,
        key: transaction.key,
        expected,
        actual: transaction.status,
    })
}
