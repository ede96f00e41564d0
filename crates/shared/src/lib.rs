//! Shared types and configuration for Tally.
//!
//! This crate provides common types used across all other crates:
//! - Money and currency types with decimal precision
//! - Typed, time-ordered keys for accounts and transactions
//! - Ledger configuration and its loader

pub mod config;
pub mod types;

pub use config::LedgerConfig;
pub use types::{AccountKey, Currency, Money, TransactionKey};
