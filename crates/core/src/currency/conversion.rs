//! Rate conversion with a configurable rounding mode.
//!
//! CRITICAL: Rounding strategy for multi-currency:
//! - Always round to a fixed number of decimal places
//! - Round with the configured mode, never implicitly
//! - Frozen snapshots keep both original and converted amounts

use rust_decimal::{Decimal, RoundingStrategy};
use tally_shared::config::RoundingMode;

/// Maps a configured rounding mode onto the decimal library's strategy.
#[must_use]
pub fn strategy_for(mode: RoundingMode) -> RoundingStrategy {
    match mode {
        RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
        RoundingMode::HalfDown => RoundingStrategy::MidpointTowardZero,
        RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
        RoundingMode::Up => RoundingStrategy::AwayFromZero,
        RoundingMode::Down => RoundingStrategy::ToZero,
        RoundingMode::Ceiling => RoundingStrategy::ToPositiveInfinity,
        RoundingMode::Floor => RoundingStrategy::ToNegativeInfinity,
    }
}

/// Converts an amount using the given exchange rate.
///
/// Returns `None` if the product does not fit in a decimal.
#[must_use]
pub fn convert_amount(amount: Decimal, rate: Decimal, decimal_places: u32, mode: RoundingMode) -> Option<Decimal> {
    amount
        .checked_mul(rate)
        .map(|product| product.round_dp_with_strategy(decimal_places, strategy_for(mode)))
}
