//! Configuration loader and application settings.

use crate::errors::{AppError, Result};
use crate::models::TokenInfo;
use crate::registry::token_by_symbol;
use crate::swap::DEFAULT_FEE_TIER;
use ethers::types::Address;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 12;
pub const DEFAULT_SLIPPAGE_BPS: u32 = 100;

/// One swap to quote and execute at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapConfig {
    pub from: TokenInfo,
    pub to: TokenInfo,
    pub amount: String,
}

/// Consolidated application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// HTTP endpoint of the Ethereum node.
    pub rpc_url: Url,
    /// Overrides the chain id reported by the node.
    pub chain_id: Option<u64>,
    /// Hex key of the signing wallet; without it the app is read-only.
    pub private_key: Option<String>,
    /// Account to watch when no key is configured.
    pub account: Option<Address>,
    pub poll_interval: Duration,
    pub slippage_bps: u32,
    pub fee_tier: u32,
    pub swap: Option<SwapConfig>,
}

// keeps the key out of logs
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("rpc_url", &self.rpc_url.as_str())
            .field("chain_id", &self.chain_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("account", &self.account)
            .field("poll_interval", &self.poll_interval)
            .field("slippage_bps", &self.slippage_bps)
            .field("fee_tier", &self.fee_tier)
            .field("swap", &self.swap)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let rpc_url = Url::parse(&get("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.into()))?;
        let chain_id = get("CHAIN_ID").map(|v| parse_num("CHAIN_ID", &v)).transpose()?;
        let private_key = get("PRIVATE_KEY");
        let account = get("ACCOUNT_ADDRESS")
            .map(|v| {
                Address::from_str(&v).map_err(|_| {
                    AppError::Config(format!("ACCOUNT_ADDRESS '{v}' is not an address"))
                })
            })
            .transpose()?;
        let poll_secs: u64 = get("POLL_INTERVAL_SECS")
            .map(|v| parse_num("POLL_INTERVAL_SECS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if poll_secs == 0 {
            return Err(AppError::Config("POLL_INTERVAL_SECS must be at least 1".into()));
        }
        let slippage_bps: u32 = get("SLIPPAGE_BPS")
            .map(|v| parse_num("SLIPPAGE_BPS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_SLIPPAGE_BPS);
        if slippage_bps > 10_000 {
            return Err(AppError::Config("SLIPPAGE_BPS must not exceed 10000".into()));
        }
        let fee_tier: u32 = get("FEE_TIER")
            .map(|v| parse_num("FEE_TIER", &v))
            .transpose()?
            .unwrap_or(DEFAULT_FEE_TIER);

        let swap = match (get("SWAP_FROM"), get("SWAP_TO"), get("SWAP_AMOUNT")) {
            (None, None, None) => None,
            (Some(from), Some(to), Some(amount)) => Some(SwapConfig {
                from: lookup_token(&from)?,
                to: lookup_token(&to)?,
                amount,
            }),
            _ => {
                return Err(AppError::Config(
                    "SWAP_FROM, SWAP_TO and SWAP_AMOUNT must be set together".into(),
                ));
            }
        };

        Ok(Self {
            rpc_url,
            chain_id,
            private_key,
            account,
            poll_interval: Duration::from_secs(poll_secs),
            slippage_bps,
            fee_tier,
            swap,
        })
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| AppError::Config(format!("{key} must be a number, got '{value}'")))
}

fn lookup_token(symbol: &str) -> Result<TokenInfo> {
    token_by_symbol(symbol)
        .copied()
        .ok_or_else(|| AppError::Config(format!("unknown token symbol '{symbol}'")))
}
