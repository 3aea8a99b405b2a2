use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places of the currency minor unit (kopecks/cents).
pub const MINOR_UNIT_DP: u32 = 2;

/// Rounds a monetary value to minor-unit precision, half-up.
pub fn round_minor(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MINOR_UNIT_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Wire representation of an amount: always two decimal places, as the
/// gateway expects in `Sum` and in the signature canonical string.
pub fn format_wire(value: Decimal) -> String {
    format!("{:.2}", round_minor(value))
}
