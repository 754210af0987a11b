//! Miscellaneous helper utilities: logging setup and token unit conversion.

use crate::errors::{AppError, Result};
use bigdecimal::{BigDecimal, RoundingMode};
use ethers::types::U256;
use num_bigint::{BigInt, Sign};
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Parse a decimal string (e.g. `"1.5"`) into the token's smallest unit.
///
/// Fraction digits beyond `decimals` are truncated.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256> {
    let trimmed = amount.trim();
    let value = BigDecimal::from_str(trimmed)
        .map_err(|_| AppError::InvalidAmount(format!("'{trimmed}' is not a decimal number")))?;
    match value.sign() {
        Sign::Minus => return Err(AppError::InvalidAmount(format!("'{trimmed}' is negative"))),
        Sign::NoSign => return Ok(U256::zero()),
        Sign::Plus => {}
    }
    let digits = integer_digits(&value) + i64::from(decimals);
    if digits > U256_MAX_DIGITS {
        return Err(AppError::InvalidAmount(format!("'{trimmed}' does not fit in 256 bits")));
    }
    if digits <= 0 {
        return Ok(U256::zero());
    }
    let scaled = (value * pow10(decimals)).with_scale(0);
    let (units, _) = scaled.as_bigint_and_exponent();
    U256::from_dec_str(&units.to_string())
        .map_err(|_| AppError::InvalidAmount(format!("'{trimmed}' does not fit in 256 bits")))
}

/// Format a smallest-unit amount as a decimal string without trailing zeros
/// (`5_000000` at 6 decimals is `"5"`).
pub fn format_units(value: U256, decimals: u8) -> String {
    let (int_part, frac_part) = split_digits(&value.to_string(), decimals as usize);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// Decimal digits in `U256::MAX`.
pub const U256_MAX_DIGITS: i64 = 78;

/// Number of digits before the decimal point; zero or negative below one
/// (`0.001` has -2). Computed from the representation, so `1e2000000` costs
/// nothing to inspect.
pub fn integer_digits(value: &BigDecimal) -> i64 {
    value.digits() as i64 - value.fractional_digit_count()
}

/// Format `value` with exactly `places` fraction digits, rounding half up.
pub fn format_fixed(value: &BigDecimal, places: u8) -> String {
    let rounded = value.with_scale_round(places as i64, RoundingMode::HalfUp);
    let (digits, _) = rounded.as_bigint_and_exponent();
    let negative = digits.sign() == Sign::Minus;
    let (int_part, frac_part) = split_digits(&digits.magnitude().to_string(), places as usize);
    let sign = if negative { "-" } else { "" };
    if places == 0 {
        format!("{sign}{int_part}")
    } else {
        format!("{sign}{int_part}.{frac_part}")
    }
}

/// Exact decimal value of a smallest-unit amount.
pub fn to_big_decimal(value: U256, decimals: u8) -> BigDecimal {
    let int = BigInt::from_str(&value.to_string()).unwrap_or_default();
    BigDecimal::new(int, decimals as i64)
}

/// Truncate a non-negative decimal to the smallest unit at `decimals`,
/// saturating at `U256::MAX`.
pub fn to_smallest_unit(value: &BigDecimal, decimals: u8) -> U256 {
    if value.sign() != Sign::Plus {
        return U256::zero();
    }
    let digits = integer_digits(value) + i64::from(decimals);
    if digits > U256_MAX_DIGITS {
        return U256::MAX;
    }
    if digits <= 0 {
        return U256::zero();
    }
    let scaled = (value * pow10(decimals)).with_scale(0);
    let (units, _) = scaled.as_bigint_and_exponent();
    U256::from_dec_str(&units.to_string()).unwrap_or_else(|_| U256::MAX)
}

fn pow10(decimals: u8) -> BigDecimal {
    BigDecimal::new(BigInt::from(1), -(decimals as i64))
}

/// Split a plain digit string into integer and fraction digits at `decimals`.
fn split_digits(digits: &str, decimals: usize) -> (String, String) {
    let padded = if digits.len() <= decimals {
        format!("{}{digits}", "0".repeat(decimals + 1 - digits.len()))
    } else {
        digits.to_string()
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    (int_part.to_string(), frac_part.to_string())
}
