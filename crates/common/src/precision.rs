use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round a quantity toward zero to the nearest multiple of `step`.
/// Example: amount=10.999, step=1 -> 10; amount=-2.7, step=1 -> -2.
pub fn normalize_quantity(amount: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return amount;
    }
    (amount / step).trunc() * step
}

/// Convert an `f64` quantity into a `Decimal` with at most `scale` fractional
/// digits. Non-finite inputs yield `None`.
pub fn quantity_from_f64(value: f64, scale: u32) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(scale, RoundingStrategy::ToZero))
}
