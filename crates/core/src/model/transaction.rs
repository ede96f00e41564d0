//! Transaction record and its status machine.
//!
//! The valid transitions are:
//! - Started → Committed (commit)
//! - Started → Canceled (cancel, or a vetoed commit)
//!
//! Both targets are terminal. After finishing, the only field that may change
//! is `digest`, and only from `None` to `Some`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_shared::types::{AccountKey, Currency, Money, TransactionKey};

/// Transaction lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Created, balances untouched.
    Started,
    /// Balances applied.
    Committed,
    /// Finished without balance effect.
    Canceled,
}

impl TransactionStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Committed => "committed",
            Self::Canceled => "canceled",
        }
    }

    /// Returns true once the transaction can no longer change status.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Started)
    }

    /// Returns true if moving from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Started, Self::Committed | Self::Canceled)
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of value moving from `origin` to `destination`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Time-sortable key.
    pub key: TransactionKey,
    /// The reverted transaction, set only on revert transactions.
    pub parent: Option<TransactionKey>,
    /// Debited account.
    pub origin: AccountKey,
    /// Credited account.
    pub destination: AccountKey,
    /// Transaction currency.
    pub currency: Currency,
    /// Non-negative amount in `currency`.
    pub amount: Decimal,
    /// Frozen amount in the ledger base currency.
    pub base_amount: Option<Decimal>,
    /// Frozen amount in the origin account currency.
    pub origin_amount: Option<Decimal>,
    /// Frozen amount in the destination account currency.
    pub destination_amount: Option<Decimal>,
    /// Free-form payload.
    pub payload: Option<Value>,
    /// Lifecycle status.
    pub status: TransactionStatus,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Set when the status leaves `Started`.
    pub finished_at: Option<DateTime<Utc>>,
    /// Chain digest, set once committed.
    pub digest: Option<String>,
}

impl Transaction {
    /// Creates a STARTED transaction.
    #[must_use]
    pub fn started(
        origin: AccountKey,
        destination: AccountKey,
        amount: Money,
        payload: Option<Value>,
        parent: Option<TransactionKey>,
    ) -> Self {
        Self {
            key: TransactionKey::new(),
            parent,
            origin,
            destination,
            currency: amount.currency,
            amount: amount.amount,
            base_amount: None,
            origin_amount: None,
            destination_amount: None,
            payload,
            status: TransactionStatus::Started,
            started_at: Utc::now(),
            finished_at: None,
            digest: None,
        }
    }

    /// Amount as money in the transaction currency.
    #[must_use]
    pub fn amount(&self) -> Money {
        Money::new(self.amount, self.currency)
    }

    /// Returns true if this transaction reverts another one.
    #[must_use]
    pub fn is_revert(&self) -> bool {
        self.parent.is_some()
    }

    /// Returns true if this transaction touches `account`.
    #[must_use]
    pub fn involves(&self, account: AccountKey) -> bool {
        self.origin == account || self.destination == account
    }

    /// Returns true if all three per-currency snapshots are frozen.
    #[must_use]
    pub fn amounts_frozen(&self) -> bool {
        self.base_amount.is_some() && self.origin_amount.is_some() && self.destination_amount.is_some()
    }

    /// Moves the transaction to a terminal status, stamping `finished_at`.
    ///
    /// Returns false, leaving the record untouched, if the transition is not allowed.
    pub fn finish(&mut self, status: TransactionStatus, at: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(status) {
            return false;
        }
        self.status = status;
        self.finished_at = Some(at);
        true
    }

    /// Position of this transaction in the digest chain.
    #[must_use]
    pub fn chain_position(&self) -> Option<(DateTime<Utc>, TransactionKey)> {
        match self.status {
            TransactionStatus::Committed => self.finished_at.map(|at| (at, self.key)),
            _ => None,
        }
    }
}
