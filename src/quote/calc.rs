use crate::models::{QuoteResult, TokenInfo};
use crate::registry::mock_price_usd;
use crate::utils::{U256_MAX_DIGITS, format_fixed, integer_digits, to_smallest_unit};
use bigdecimal::BigDecimal;
use ethers::types::U256;
use num_bigint::Sign;
use std::str::FromStr;

/// Combined haircut applied to mock quotes: 0.30% pool fee + 0.05% flash-loan premium.
pub const FEE_MULTIPLIER: &str = "0.9965";

/// Flash-loan premium in basis points (Aave V3).
pub const FLASH_LOAN_PREMIUM_BPS: u64 = 5;

pub const QUOTE_GAS_ESTIMATE: u64 = 250_000;

const BPS_DENOMINATOR: u64 = 10_000;

/// Input amounts above this many tokens get the higher price-impact bucket.
const LARGE_TRADE_THRESHOLD: u32 = 10;

const QUOTE_ERROR: &str = "Failed to calculate quote";

/// Estimate the output of swapping `amount_in` (decimal string, token units)
/// of `token_in` into `token_out` using the static USD price table.
///
/// Empty or non-positive input yields an empty quote; unparseable input
/// yields an empty quote carrying an error.
pub fn estimate_quote(
    token_in: &TokenInfo,
    token_out: &TokenInfo,
    amount_in: &str,
) -> QuoteResult {
    let trimmed = amount_in.trim();
    if trimmed.is_empty() {
        return QuoteResult::default();
    }
    let input = match BigDecimal::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => {
            return QuoteResult {
                error: Some(QUOTE_ERROR.to_string()),
                ..QuoteResult::default()
            };
        }
    };
    if input.sign() != Sign::Plus {
        return QuoteResult::default();
    }
    // no token amount needs more digits than a U256 holds, on either side
    // of the point
    if integer_digits(&input).abs() > U256_MAX_DIGITS {
        return QuoteResult {
            error: Some(QUOTE_ERROR.to_string()),
            ..QuoteResult::default()
        };
    }

    let price_in = usd_price(token_in.symbol);
    let price_out = usd_price(token_out.symbol);

    let usd_value = &input * &price_in;
    let output = usd_value / &price_out;
    let output_after_fees = output * fee_multiplier();

    let rate = &price_in / &price_out;
    let exchange_rate = format!(
        "1 {} = {} {}",
        token_in.symbol,
        format_fixed(&rate, 6),
        token_out.symbol
    );

    let price_impact = if input > BigDecimal::from(LARGE_TRADE_THRESHOLD) {
        0.3
    } else {
        0.1
    };

    QuoteResult {
        amount_out: to_smallest_unit(&output_after_fees, token_out.decimals),
        amount_out_formatted: format_fixed(&output_after_fees, 6),
        price_impact,
        exchange_rate,
        gas_estimate: U256::from(QUOTE_GAS_ESTIMATE),
        is_loading: false,
        error: None,
    }
}

/// Minimum acceptable output after `slippage_bps` of tolerance, truncating.
/// Tolerances above 100% are clamped to 100%.
pub fn min_amount_out(amount_out: U256, slippage_bps: u32) -> U256 {
    if amount_out.is_zero() {
        return U256::zero();
    }
    let bps = u64::from(slippage_bps).min(BPS_DENOMINATOR);
    let multiplier = U256::from(BPS_DENOMINATOR - bps);
    amount_out.saturating_mul(multiplier) / U256::from(BPS_DENOMINATOR)
}

/// Flash-loan premium owed on borrowing `amount`.
pub fn flash_loan_fee(amount: U256) -> U256 {
    amount.saturating_mul(U256::from(FLASH_LOAN_PREMIUM_BPS)) / U256::from(BPS_DENOMINATOR)
}

fn usd_price(symbol: &str) -> BigDecimal {
    mock_price_usd(symbol)
        .and_then(|p| BigDecimal::from_str(p).ok())
        .unwrap_or_else(|| BigDecimal::from(1))
}

fn fee_multiplier() -> BigDecimal {
    BigDecimal::from_str(FEE_MULTIPLIER).unwrap_or_else(|_| BigDecimal::from(1))
}
