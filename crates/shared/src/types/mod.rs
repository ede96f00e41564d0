//! Common types used across the ledger.

pub mod id;
pub mod money;

#[cfg(test)]
mod money_props;

pub use id::*;
pub use money::{Currency, CurrencyError, Money};
