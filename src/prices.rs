//! USD prices from Chainlink-style `latestAnswer` feeds.

use crate::chain::ChainClient;
use crate::registry::price_feed;
use bigdecimal::BigDecimal;
use ethers::types::{Address, I256};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::warn;

/// USD price per whole token, keyed by token address.
pub type PriceMap = HashMap<Address, f64>;

/// Read USD prices for `tokens`. Tokens without a configured feed are
/// skipped, as are feeds that fail or report a non-positive answer.
pub async fn token_prices<C: ChainClient + ?Sized>(client: &C, tokens: &[Address]) -> PriceMap {
    let mut prices = PriceMap::new();
    for token in tokens {
        let Some(cfg) = price_feed(*token) else {
            continue;
        };
        match client.latest_answer(cfg.feed).await {
            Ok(answer) => match answer_to_usd(answer, cfg.decimals) {
                Some(price) => {
                    prices.insert(*token, price);
                }
                None => warn!(?token, %answer, "[PRICES] non-positive feed answer"),
            },
            Err(e) => warn!(?token, error = %e, "[PRICES] feed read failed"),
        }
    }
    prices
}

fn answer_to_usd(answer: I256, decimals: u8) -> Option<f64> {
    if answer <= I256::zero() {
        return None;
    }
    let raw = BigInt::from_str(&answer.to_string()).ok()?;
    BigDecimal::new(raw, decimals as i64).to_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::errors::AppError;
    use crate::registry::{USDC, WBTC, WETH, price_feed};

    #[test]
    fn answers_are_scaled_by_feed_decimals() {
        let price = answer_to_usd(I256::from(320_012_345_678i64), 8).unwrap();
        assert!((price - 3200.12345678).abs() < 1e-9);
        assert_eq!(answer_to_usd(I256::zero(), 8), None);
        assert_eq!(answer_to_usd(I256::from(-5), 8), None);
    }

    #[tokio::test]
    async fn failing_and_missing_feeds_are_skipped() {
        let weth_feed = price_feed(WETH.address).unwrap().feed;
        let mut mock = MockChainClient::new();
        mock.expect_latest_answer().returning(move |feed| {
            if feed == weth_feed {
                Ok(I256::from(300_000_000_000i64))
            } else {
                Err(AppError::Other("stale feed".into()))
            }
        });

        let prices = token_prices(&mock, &[WETH.address, WBTC.address, USDC.address]).await;
        assert_eq!(prices.len(), 1);
        assert_eq!(prices.get(&WETH.address), Some(&3000.0));
    }
}
