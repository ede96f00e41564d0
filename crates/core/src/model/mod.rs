//! Ledger data model: owners, accounts, transactions and account addresses.

pub mod account;
pub mod address;
pub mod owner;
pub mod transaction;

pub use account::Account;
pub use address::AccountAddress;
pub use owner::OwnerRef;
pub use transaction::{Transaction, TransactionStatus};
