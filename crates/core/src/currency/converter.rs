//! Money serialization, display and conversion.
//!
//! `MoneyConverter` is the pluggable collaborator; `CurrencyService` is what
//! the engine talks to. It short-circuits same-currency conversion and falls
//! back to plain decimal strings when no converter is configured.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tally_shared::config::RoundingMode;
use tally_shared::types::{Currency, Money};

use super::conversion::convert_amount;
use crate::error::LedgerError;

/// Serialize, parse and convert money values.
pub trait MoneyConverter: Send + Sync {
    /// Storage form of a money value.
    fn serialize(&self, money: &Money) -> String;

    /// Reads a storage form back, using `fallback` when it carries no currency.
    fn deserialize(&self, raw: &str, fallback: Currency) -> Result<Money, LedgerError>;

    /// Display form, may embed the currency.
    fn format(&self, money: &Money) -> String;

    /// Reads a display form, using `fallback` when it carries no currency.
    fn parse(&self, raw: &str, fallback: Currency) -> Result<Money, LedgerError>;

    /// Converts `money` into `target`.
    fn convert(&self, money: &Money, target: Currency, rounding: RoundingMode) -> Result<Money, LedgerError>;
}

/// Decimal-string converter backed by a fixed rate table.
#[derive(Debug, Clone)]
pub struct DecimalMoneyConverter {
    rates: HashMap<(Currency, Currency), Decimal>,
    decimal_places: u32,
}

impl Default for DecimalMoneyConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl DecimalMoneyConverter {
    /// Creates a converter with no rates, rounding conversions to 4 places.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rates: HashMap::new(),
            decimal_places: 4,
        }
    }

    /// Registers `1 from = rate to`.
    #[must_use]
    pub fn with_rate(mut self, from: Currency, to: Currency, rate: Decimal) -> Self {
        self.rates.insert((from, to), rate);
        self
    }

    /// Sets the number of decimal places converted amounts are rounded to.
    #[must_use]
    pub fn with_decimal_places(mut self, decimal_places: u32) -> Self {
        self.decimal_places = decimal_places;
        self
    }

    fn rate(&self, from: Currency, to: Currency) -> Option<Decimal> {
        if let Some(rate) = self.rates.get(&(from, to)) {
            return Some(*rate);
        }
        self.rates
            .get(&(to, from))
            .filter(|rate| !rate.is_zero())
            .and_then(|rate| Decimal::ONE.checked_div(*rate))
    }

    fn read(raw: &str, fallback: Currency) -> Result<Money, LedgerError> {
        let invalid = || LedgerError::InvalidMoney(raw.to_string());
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        let (amount, currency) = match parts.as_slice() {
            [amount] => split_glued_code(amount),
            [left, right] if Currency::from_str(left).is_ok() => (*right, Some(*left)),
            [left, right] => (*left, Some(*right)),
            _ => return Err(invalid()),
        };

        let currency = match currency {
            Some(code) => Currency::from_str(code).map_err(|_| invalid())?,
            None => fallback,
        };
        let amount = Decimal::from_str(amount).map_err(|_| invalid())?;
        Ok(Money::new(amount, currency))
    }
}

/// Splits `USD12.30` or `12.30USD` into amount and code.
fn split_glued_code(raw: &str) -> (&str, Option<&str>) {
    let is_code = |s: &str| s.len() == 3 && s.bytes().all(|b| b.is_ascii_alphabetic());
    if raw.len() > 3 {
        if raw.is_char_boundary(3) && is_code(&raw[..3]) {
            return (&raw[3..], Some(&raw[..3]));
        }
        let cut = raw.len() - 3;
        if raw.is_char_boundary(cut) && is_code(&raw[cut..]) {
            return (&raw[..cut], Some(&raw[cut..]));
        }
    }
    (raw, None)
}

impl MoneyConverter for DecimalMoneyConverter {
    fn serialize(&self, money: &Money) -> String {
        money.amount.to_string()
    }

    fn deserialize(&self, raw: &str, fallback: Currency) -> Result<Money, LedgerError> {
        Self::read(raw, fallback)
    }

    fn format(&self, money: &Money) -> String {
        format!("{} {}", money.amount, money.currency)
    }

    fn parse(&self, raw: &str, fallback: Currency) -> Result<Money, LedgerError> {
        Self::read(raw, fallback)
    }

    fn convert(&self, money: &Money, target: Currency, rounding: RoundingMode) -> Result<Money, LedgerError> {
        if money.currency == target {
            return Ok(*money);
        }
        let rate = self
            .rate(money.currency, target)
            .ok_or(LedgerError::ConversionUnavailable {
                from: money.currency,
                to: target,
            })?;
        let amount = convert_amount(money.amount, rate, self.decimal_places, rounding)
            .ok_or_else(|| LedgerError::InvalidMoney(format!("{money} at rate {rate} overflows {target}")))?;
        Ok(Money::new(amount, target))
    }
}

/// Money operations as the engine sees them.
#[derive(Clone)]
pub struct CurrencyService {
    converter: Option<Arc<dyn MoneyConverter>>,
    rounding: RoundingMode,
    default_currency: Currency,
}

impl std::fmt::Debug for CurrencyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrencyService")
            .field("has_converter", &self.converter.is_some())
            .field("rounding", &self.rounding)
            .field("default_currency", &self.default_currency)
            .finish()
    }
}

impl CurrencyService {
    /// Creates a service; `converter` may be absent for single-currency ledgers.
    #[must_use]
    pub fn new(
        converter: Option<Arc<dyn MoneyConverter>>,
        rounding: RoundingMode,
        default_currency: Currency,
    ) -> Self {
        Self {
            converter,
            rounding,
            default_currency,
        }
    }

    /// Storage form of `money`.
    #[must_use]
    pub fn serialize(&self, money: &Money) -> String {
        match &self.converter {
            Some(converter) => converter.serialize(money),
            None => money.amount.to_string(),
        }
    }

    /// Reads a storage form.
    pub fn deserialize(&self, raw: &str, fallback: Option<Currency>) -> Result<Money, LedgerError> {
        let fallback = fallback.unwrap_or(self.default_currency);
        match &self.converter {
            Some(converter) => converter.deserialize(raw, fallback),
            None => Decimal::from_str(raw.trim())
                .map(|amount| Money::new(amount, fallback))
                .map_err(|_| LedgerError::InvalidMoney(raw.to_string())),
        }
    }

    /// Display form of `money`.
    #[must_use]
    pub fn format(&self, money: &Money) -> String {
        match &self.converter {
            Some(converter) => converter.format(money),
            None => money.amount.to_string(),
        }
    }

    /// Reads a display form.
    pub fn parse(&self, raw: &str, fallback: Option<Currency>) -> Result<Money, LedgerError> {
        let fallback = fallback.unwrap_or(self.default_currency);
        match &self.converter {
            Some(converter) => converter.parse(raw, fallback),
            None => DecimalMoneyConverter::read(raw, fallback),
        }
    }

    /// Converts `money` into `target` with the configured rounding mode.
    pub fn convert(&self, money: &Money, target: Currency) -> Result<Money, LedgerError> {
        if money.currency == target {
            return Ok(*money);
        }
        match &self.converter {
            Some(converter) => converter.convert(money, target, self.rounding),
            None => Err(LedgerError::ConversionUnavailable {
                from: money.currency,
                to: target,
            }),
        }
    }
}
