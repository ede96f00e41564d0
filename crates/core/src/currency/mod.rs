//! Money conversion, serialization and display.

pub mod conversion;
pub mod converter;

#[cfg(test)]
mod props;

pub use conversion::{convert_amount, strategy_for};
pub use converter::{CurrencyService, DecimalMoneyConverter, MoneyConverter};
