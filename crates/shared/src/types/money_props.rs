//! Property-based tests for money arithmetic and currency codes.
//!
//! - Adding then subtracting the same amount restores the original
//! - Mixing currencies is always rejected
//! - Currency codes parse regardless of letter case

use proptest::prelude::*;
use rust_decimal::Decimal;

use super::money::{Currency, CurrencyError, Money};

/// Amounts small enough that a sum of two never overflows.
fn bounded_amount() -> impl Strategy<Value = Decimal> {
    (-1_000_000_000_000i64..1_000_000_000_000i64, 0u32..=8).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

fn any_currency() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::IDR),
        Just(Currency::JPY),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_add_then_sub_restores(a in bounded_amount(), b in bounded_amount(), currency in any_currency()) {
        let left = Money::new(a, currency);
        let right = Money::new(b, currency);
        let restored = left.checked_add(&right).and_then(|sum| sum.checked_sub(&right));
        prop_assert_eq!(restored, Ok(left));
    }

    #[test]
    fn prop_sub_is_add_of_negation(a in bounded_amount(), b in bounded_amount()) {
        let left = Money::new(a, Currency::USD);
        let right = Money::new(b, Currency::USD);
        prop_assert_eq!(left.checked_sub(&right), left.checked_add(&right.negate()));
    }

    #[test]
    fn prop_mixed_currencies_rejected(a in bounded_amount(), b in bounded_amount()) {
        let usd = Money::new(a, Currency::USD);
        let eur = Money::new(b, Currency::EUR);
        let is_mismatch = |r: Result<Money, CurrencyError>| matches!(r, Err(CurrencyError::Mismatch { .. }));
        prop_assert!(is_mismatch(usd.checked_add(&eur)));
        prop_assert!(is_mismatch(usd.checked_sub(&eur)));
    }

    #[test]
    fn prop_currency_parse_ignores_case(code in "[A-Za-z]{3}") {
        let parsed = Currency::new(&code).unwrap();
        prop_assert_eq!(parsed.code(), code.to_uppercase());
        prop_assert_eq!(Currency::new(parsed.code()).unwrap(), parsed);
    }

    #[test]
    fn prop_abs_is_never_negative(a in bounded_amount(), currency in any_currency()) {
        let money = Money::new(a, currency).abs();
        prop_assert!(!money.is_negative());
        prop_assert_eq!(money.currency, currency);
    }
}
