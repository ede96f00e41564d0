//! Error types for the transaction engine and the record store seam.
//!
//! Business-policy rejections (insufficient funds, an over-sized revert) are
//! not errors: they end as a CANCELED transaction. Everything here is a hard
//! failure that reaches the caller.

use rust_decimal::Decimal;
use tally_shared::types::{AccountKey, Currency, CurrencyError, TransactionKey};
use thiserror::Error;

use crate::model::TransactionStatus;

/// Result type alias using `LedgerError`.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Origin and destination are the same account.
    #[error("Transaction endpoints are identical: {0}")]
    IdenticalEndpoints(AccountKey),

    /// Zero transfers are disabled.
    #[error("Transaction of zero amount is forbidden")]
    ZeroTransfer,

    /// Negative transfers are disabled.
    #[error("Transaction of negative amount is forbidden: {0}")]
    NegativeAmount(Decimal),

    // ========== Veto Errors ==========
    /// A hook vetoed the creation of a transaction or of a revert.
    #[error("Transaction creation aborted: {0}")]
    CreateAborted(String),

    /// A hook or a creation constraint vetoed the creation of an account.
    #[error("Account creation aborted: {0}")]
    AccountCreateAborted(String),

    // ========== State Errors ==========
    /// The operation requires a different transaction status.
    #[error("Cannot {operation} transaction {key}: expected {expected}, found {actual}")]
    StatusMismatch {
        /// The attempted operation.
        operation: &'static str,
        /// The transaction.
        key: TransactionKey,
        /// Status the operation requires.
        expected: TransactionStatus,
        /// Status the transaction actually has.
        actual: TransactionStatus,
    },

    // ========== Lookup Errors ==========
    /// Account lookup failed.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Transaction lookup failed.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionKey),

    /// Owner lookup failed.
    #[error("Owner not found: {owner_type}:{owner_id}")]
    OwnerNotFound {
        /// Owner type tag.
        owner_type: String,
        /// Owner id.
        owner_id: String,
    },

    /// An account address could not be parsed.
    #[error("Invalid account address: {0}")]
    InvalidAddress(String),

    // ========== Money Errors ==========
    /// Cross-currency operation without a usable converter.
    #[error("Cannot convert {from} to {to}: no converter available")]
    ConversionUnavailable {
        /// Source currency.
        from: Currency,
        /// Target currency.
        to: Currency,
    },

    /// A money string could not be parsed.
    #[error("Invalid money value: {0}")]
    InvalidMoney(String),

    /// Currency arithmetic error.
    #[error(transparent)]
    Currency(#[from] CurrencyError),

    // ========== Commit Errors ==========
    /// Store failures outlasted every commit attempt.
    #[error("Transaction {operation} has failed for {key} after {attempts} attempt(s)")]
    CommitFailed {
        /// The operation that failed.
        operation: &'static str,
        /// The transaction, left STARTED.
        key: TransactionKey,
        /// Attempts made.
        attempts: u32,
        /// The last store failure.
        #[source]
        source: StoreError,
    },

    // ========== Infrastructure Errors ==========
    /// Configuration is inconsistent.
    #[error("Ledger misconfiguration: {0}")]
    Misconfiguration(String),

    /// Record store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Returns a stable error code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::IdenticalEndpoints(_) => "IDENTICAL_ENDPOINTS",
            Self::ZeroTransfer => "ZERO_TRANSFER",
            Self::NegativeAmount(_) => "NEGATIVE_AMOUNT",
            Self::CreateAborted(_) => "CREATE_ABORTED",
            Self::AccountCreateAborted(_) => "ACCOUNT_CREATE_ABORTED",
            Self::StatusMismatch { .. } => "STATUS_MISMATCH",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            Self::OwnerNotFound { .. } => "OWNER_NOT_FOUND",
            Self::InvalidAddress(_) => "INVALID_ADDRESS",
            Self::ConversionUnavailable { .. } => "CONVERSION_UNAVAILABLE",
            Self::InvalidMoney(_) => "INVALID_MONEY",
            Self::Currency(_) => "CURRENCY_ERROR",
            Self::CommitFailed { .. } => "COMMIT_FAILED",
            Self::Misconfiguration(_) => "MISCONFIGURATION",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Returns true if repeating the operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Errors reported by a record store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Serialization conflict between concurrent store transactions.
    #[error("Serialization failure: {0}")]
    Serialization(String),

    /// The store broke a lock cycle by aborting this transaction.
    #[error("Deadlock detected: {0}")]
    Deadlock(String),

    /// Unique constraint violation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A row expected to exist is missing.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Any other backend failure.
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true for failures that a retry of the whole unit of work can cure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Deadlock(_))
    }
}
