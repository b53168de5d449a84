//! Currency helpers.
//!
//! All monetary values are [`Decimal`] in pesos with centavo (2 dp) precision.
//! Rounding is midpoint away from zero.

use crate::error::{Error, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Currency minor-unit precision.
pub const DECIMAL_PLACES: u32 = 2;

/// Round a monetary value to centavos, midpoint away from zero.
#[inline]
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert an `f64` coming from a UI boundary into a `Decimal`.
///
/// NaN and infinities are rejected rather than coerced to zero.
pub fn to_decimal(value: f64) -> Result<Decimal> {
    if !value.is_finite() {
        return Err(Error::ValidationError(format!(
            "amount must be a finite number, got {}",
            value
        )));
    }
    Decimal::from_f64(value)
        .ok_or_else(|| Error::ValidationError(format!("amount out of range: {}", value)))
}

/// Reject negative amounts. Zero is allowed.
pub fn ensure_non_negative(amount: Decimal, what: &str) -> Result<Decimal> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(Error::ValidationError(format!(
            "{} must not be negative, got {}",
            what, amount
        )));
    }
    Ok(amount)
}

/// Apply a percentage (`1.5` means 1.5%) to an amount, unrounded.
#[inline]
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    amount * percent / Decimal::ONE_HUNDRED
}
