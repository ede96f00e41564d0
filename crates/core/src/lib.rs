//! Core engine for Tally, a double-entry ledger.
//!
//! Money moves between accounts only through transactions. A transaction is
//! created STARTED, then committed (balances move, a digest is chained onto
//! the history) or canceled. A committed transaction can be reverted by a
//! new transaction flowing the other way.
//!
//! # Modules
//!
//! - `model` - Owners, accounts, transactions and account addresses
//! - `store` - Record store seam and the in-memory store
//! - `currency` - Money conversion, serialization and formatting
//! - `hooks` - Typed lifecycle hooks and ready-made policies
//! - `ledger` - Account management, balances and the [`Ledger`] facade
//! - `engine` - Transaction lifecycle and reporting
//! - `digest` - Tamper-evident hash chain

mod context;
pub mod currency;
pub mod digest;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod ledger;
pub mod model;
pub mod store;

pub use currency::{CurrencyService, DecimalMoneyConverter, MoneyConverter};
pub use digest::{DigestChain, RehashFrom};
pub use engine::{TransactionEngine, TransferAmount};
pub use error::{LedgerError, LedgerResult, StoreError};
pub use hooks::{CheckBalance, FailureDecision, HookDecision, LedgerHooks, RevertGuard};
pub use ledger::{AccountLedger, AccountManager, AccountPair, Ledger, LedgerBuilder, OwnerDirectory};
pub use model::{Account, AccountAddress, OwnerRef, Transaction, TransactionStatus};
pub use store::{MemoryStore, RecordStore, StoreTransaction};
