//! Property-based tests for money serialization and conversion.
//!
//! - Storage form round-trips for every representable amount
//! - Conversion rounds to the configured precision
//! - Converting to the same currency is the identity

use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::config::RoundingMode;
use tally_shared::types::{Currency, Money};

use super::converter::{CurrencyService, DecimalMoneyConverter, MoneyConverter};

/// Strategy for amounts across the full decimal scale (0 to 28 places).
fn any_amount() -> impl Strategy<Value = Decimal> {
    (any::<i64>(), 0u32..=28).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

/// Strategy for positive exchange rates (0.0001 to 10000.0000).
fn positive_rate() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|v| Decimal::new(v, 4))
}

fn any_currency() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::IDR),
        Just(Currency::JPY),
    ]
}

fn rounding_mode() -> impl Strategy<Value = RoundingMode> {
    prop_oneof![
        Just(RoundingMode::HalfUp),
        Just(RoundingMode::HalfDown),
        Just(RoundingMode::HalfEven),
        Just(RoundingMode::Up),
        Just(RoundingMode::Down),
        Just(RoundingMode::Ceiling),
        Just(RoundingMode::Floor),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Deserializing a serialized value yields the same money, scale included.
    #[test]
    fn prop_serialize_round_trip(amount in any_amount(), currency in any_currency()) {
        let converter = DecimalMoneyConverter::new();
        let money = Money::new(amount, currency);

        let restored = converter.deserialize(&converter.serialize(&money), currency).unwrap();
        prop_assert_eq!(restored, money);
        prop_assert_eq!(restored.amount.scale(), money.amount.scale());
    }

    /// The display form parses back without a fallback currency.
    #[test]
    fn prop_format_round_trip(amount in any_amount(), currency in any_currency()) {
        let converter = DecimalMoneyConverter::new();
        let money = Money::new(amount, currency);

        let restored = converter.parse(&converter.format(&money), Currency::USD).unwrap();
        prop_assert_eq!(restored, money);
    }

    /// The service without a converter round-trips too.
    #[test]
    fn prop_service_round_trip(amount in any_amount(), currency in any_currency()) {
        let service = CurrencyService::new(None, RoundingMode::HalfUp, Currency::USD);
        let money = Money::new(amount, currency);

        let restored = service.deserialize(&service.serialize(&money), Some(currency)).unwrap();
        prop_assert_eq!(restored, money);
    }

    /// Converted amounts never carry more than the configured places.
    #[test]
    fn prop_convert_respects_precision(
        cents in 0i64..100_000_000i64,
        rate in positive_rate(),
        places in 0u32..=6,
        mode in rounding_mode(),
    ) {
        let converter = DecimalMoneyConverter::new()
            .with_rate(Currency::EUR, Currency::USD, rate)
            .with_decimal_places(places);
        let money = Money::new(Decimal::new(cents, 2), Currency::EUR);

        let converted = converter.convert(&money, Currency::USD, mode).unwrap();
        prop_assert!(converted.amount.scale() <= places);
        prop_assert_eq!(converted.currency, Currency::USD);
    }

    /// Same-currency conversion returns the input untouched.
    #[test]
    fn prop_same_currency_identity(amount in any_amount(), currency in any_currency(), mode in rounding_mode()) {
        let money = Money::new(amount, currency);
        prop_assert_eq!(DecimalMoneyConverter::new().convert(&money, currency, mode).unwrap(), money);
    }
}
