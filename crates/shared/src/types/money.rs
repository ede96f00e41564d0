//! Money type with decimal precision and currency.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! This type wraps `rust_decimal::Decimal` for arbitrary precision.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by currency parsing and money arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    /// The code is not three ASCII letters.
    #[error("Invalid currency code: {0:?}")]
    InvalidCode(String),

    /// Arithmetic was attempted between two different currencies.
    #[error("Currency mismatch: {left} vs {right}")]
    Mismatch {
        /// Currency of the left operand.
        left: Currency,
        /// Currency of the right operand.
        right: Currency,
    },

    /// The result does not fit in a decimal.
    #[error("Money arithmetic overflowed: {0}")]
    Overflow(String),
}

/// ISO 4217 currency code.
///
/// Stored as three uppercase ASCII letters so the type stays `Copy`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    /// US Dollar.
    pub const USD: Self = Self(*b"USD");
    /// Euro.
    pub const EUR: Self = Self(*b"EUR");
    /// Indonesian Rupiah.
    pub const IDR: Self = Self(*b"IDR");
    /// Japanese Yen.
    pub const JPY: Self = Self(*b"JPY");

    /// Parses a currency code, accepting any letter case.
    pub fn new(code: &str) -> Result<Self, CurrencyError> {
        let bytes = code.trim().as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(CurrencyError::InvalidCode(code.to_string()));
        }
        let mut out = [0u8; 3];
        for (slot, b) in out.iter_mut().zip(bytes) {
            *slot = b.to_ascii_uppercase();
        }
        Ok(Self(out))
    }

    /// Returns the three-letter code.
    #[must_use]
    pub fn code(&self) -> &str {
        // Constructed only from ASCII letters.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::fmt::Debug for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Currency({})", self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.code().to_string()
    }
}

/// Represents a monetary amount with currency.
///
/// Uses `Decimal` internally to avoid floating-point precision errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// The amount, in major units with exact decimal fraction.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

impl Money {
    /// Creates a new Money instance.
    #[must_use]
    pub const fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Creates a zero amount in the specified currency.
    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is strictly negative.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Returns true if the amount is strictly positive.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Returns the absolute value.
    #[must_use]
    pub fn abs(&self) -> Self {
        Self::new(self.amount.abs(), self.currency)
    }

    /// Returns the negated value.
    #[must_use]
    pub fn negate(&self) -> Self {
        Self::new(-self.amount, self.currency)
    }

    /// Adds two amounts of the same currency.
    pub fn checked_add(&self, other: &Self) -> Result<Self, CurrencyError> {
        self.same_currency(other)?;
        self.amount
            .checked_add(other.amount)
            .map(|amount| Self::new(amount, self.currency))
            .ok_or_else(|| CurrencyError::Overflow(format!("{self} + {other}")))
    }

    /// Subtracts two amounts of the same currency.
    pub fn checked_sub(&self, other: &Self) -> Result<Self, CurrencyError> {
        self.same_currency(other)?;
        self.amount
            .checked_sub(other.amount)
            .map(|amount| Self::new(amount, self.currency))
            .ok_or_else(|| CurrencyError::Overflow(format!("{self} - {other}")))
    }

    fn same_currency(&self, other: &Self) -> Result<(), CurrencyError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(CurrencyError::Mismatch {
                left: self.currency,
                right: other.currency,
            })
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_money_new() {
        let money = Money::new(dec!(100.00), Currency::USD);
        assert_eq!(money.amount, dec!(100.00));
        assert_eq!(money.currency, Currency::USD);
    }

    #[test]
    fn test_money_sign_helpers() {
        assert!(Money::zero(Currency::EUR).is_zero());
        assert!(Money::new(dec!(-0.01), Currency::EUR).is_negative());
        assert!(Money::new(dec!(0.01), Currency::EUR).is_positive());
        assert!(!Money::zero(Currency::EUR).is_negative());
        assert_eq!(Money::new(dec!(-5), Currency::USD).abs().amount, dec!(5));
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Money::new(dec!(10.50), Currency::USD);
        let b = Money::new(dec!(0.25), Currency::USD);
        assert_eq!(a.checked_add(&b).unwrap().amount, dec!(10.75));
        assert_eq!(a.checked_sub(&b).unwrap().amount, dec!(10.25));

        let c = Money::new(dec!(1), Currency::EUR);
        assert_eq!(
            a.checked_add(&c),
            Err(CurrencyError::Mismatch {
                left: Currency::USD,
                right: Currency::EUR
            })
        );
    }

    #[rstest]
    #[case("USD", "USD")]
    #[case("usd", "USD")]
    #[case(" eur ", "EUR")]
    #[case("Jpy", "JPY")]
    fn test_currency_from_str(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(Currency::from_str(input).unwrap().code(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("US")]
    #[case("USDT")]
    #[case("U$D")]
    fn test_currency_rejects_invalid(#[case] input: &str) {
        assert!(Currency::from_str(input).is_err());
    }

    #[test]
    fn test_currency_string_conversions() {
        let code = String::from(Currency::IDR);
        assert_eq!(code, "IDR");
        assert_eq!(Currency::try_from(code).unwrap(), Currency::IDR);
    }

    #[test]
    fn test_checked_arithmetic_overflow() {
        let max = Money::new(Decimal::MAX, Currency::USD);
        assert!(matches!(max.checked_add(&max), Err(CurrencyError::Overflow(_))));
        assert!(matches!(max.negate().checked_sub(&max), Err(CurrencyError::Overflow(_))));
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::new(dec!(12.30), Currency::USD).to_string(), "12.30 USD");
    }
}
