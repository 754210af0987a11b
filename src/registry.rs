//! Static deployment tables: contract addresses per chain, token metadata,
//! the Comet collateral set and the demo price table used for quoting.

use crate::models::TokenInfo;
use alloy_primitives::address;
use ethers::types::{Address, H160};

pub const MAINNET_CHAIN_ID: u64 = 1;
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Decimals of the Comet base token (USDC).
pub const BASE_TOKEN_DECIMALS: u8 = 6;

const ZERO: Address = H160([0u8; 20]);

const fn h160(addr: alloy_primitives::Address) -> Address {
    H160(addr.0.0)
}

/// Contract addresses of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub comet_usdc: Address,
    pub comet_weth: Address,
    pub uniswap_router: Address,
    pub uniswap_quoter: Address,
    pub aave_pool: Address,
    /// Zero when the swap contract is not deployed on the chain.
    pub collateral_swap: Address,
}

impl ContractAddresses {
    pub fn is_swap_deployed(&self) -> bool {
        !self.collateral_swap.is_zero()
    }
}

pub const MAINNET: ContractAddresses = ContractAddresses {
    comet_usdc: h160(address!("c3d688B66703497DAA19211EEdff47f25384cdc3")),
    comet_weth: h160(address!("A17581A9E3356d9A858b789D68B4d866e593aE94")),
    uniswap_router: h160(address!("68b3465833fb72A70ecDF485E0e4C7bD8665Fc45")),
    uniswap_quoter: h160(address!("61fFE014bA17989E743c5F6cB21bF9697530B21e")),
    aave_pool: h160(address!("87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2")),
    collateral_swap: h160(address!("8b941d833A740bcFd9Cee5B873FFbB8EbAdA6EF0")),
};

/// Nothing of the swap stack is deployed on Sepolia yet.
pub const SEPOLIA: ContractAddresses = ContractAddresses {
    comet_usdc: ZERO,
    comet_weth: ZERO,
    uniswap_router: ZERO,
    uniswap_quoter: ZERO,
    aave_pool: ZERO,
    collateral_swap: ZERO,
};

/// Addresses for `chain_id`; unknown chains resolve to the mainnet table
/// since local forks report the mainnet id.
pub fn addresses(chain_id: u64) -> &'static ContractAddresses {
    match chain_id {
        SEPOLIA_CHAIN_ID => &SEPOLIA,
        _ => &MAINNET,
    }
}

// ============ Tokens ============

pub const USDC: TokenInfo = TokenInfo {
    address: h160(address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48")),
    symbol: "USDC",
    name: "USD Coin",
    decimals: 6,
    logo_url: Some("https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/ethereum/assets/0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48/logo.png"),
};

pub const WETH: TokenInfo = TokenInfo {
    address: h160(address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2")),
    symbol: "WETH",
    name: "Wrapped Ether",
    decimals: 18,
    logo_url: Some("https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/ethereum/assets/0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2/logo.png"),
};

pub const WBTC: TokenInfo = TokenInfo {
    address: h160(address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599")),
    symbol: "WBTC",
    name: "Wrapped Bitcoin",
    decimals: 8,
    logo_url: Some("https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/ethereum/assets/0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599/logo.png"),
};

pub const COMP: TokenInfo = TokenInfo {
    address: h160(address!("c00e94Cb662C3520282E6f5717214004A7f26888")),
    symbol: "COMP",
    name: "Compound",
    decimals: 18,
    logo_url: Some("https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/ethereum/assets/0xc00e94Cb662C3520282E6f5717214004A7f26888/logo.png"),
};

pub const UNI: TokenInfo = TokenInfo {
    address: h160(address!("1f9840a85d5aF5bf1D1762F925BDADdC4201F984")),
    symbol: "UNI",
    name: "Uniswap",
    decimals: 18,
    logo_url: Some("https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/ethereum/assets/0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984/logo.png"),
};

pub const LINK: TokenInfo = TokenInfo {
    address: h160(address!("514910771AF9Ca656af840dff83E8264EcF986CA")),
    symbol: "LINK",
    name: "Chainlink",
    decimals: 18,
    logo_url: Some("https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/ethereum/assets/0x514910771AF9Ca656af840dff83E8264EcF986CA/logo.png"),
};

pub const TOKENS: [TokenInfo; 6] = [USDC, WETH, WBTC, COMP, UNI, LINK];

/// Assets accepted as Comet collateral and eligible for swapping.
pub const COMET_COLLATERALS: [TokenInfo; 5] = [WETH, WBTC, COMP, UNI, LINK];

pub fn token_by_symbol(symbol: &str) -> Option<&'static TokenInfo> {
    TOKENS
        .iter()
        .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
}

pub fn token_by_address(address: Address) -> Option<&'static TokenInfo> {
    TOKENS.iter().find(|t| t.address == address)
}

// ============ Prices ============

/// Demo USD prices used by the quote estimator in place of an on-chain quoter.
pub const MOCK_PRICES_USD: [(&str, &str); 6] = [
    ("WETH", "3200"),
    ("WBTC", "97000"),
    ("COMP", "85"),
    ("UNI", "12"),
    ("LINK", "18"),
    ("USDC", "1"),
];

pub fn mock_price_usd(symbol: &str) -> Option<&'static str> {
    MOCK_PRICES_USD
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, p)| *p)
}

/// Chainlink USD feed for a token.
#[derive(Debug, Clone, Copy)]
pub struct PriceFeedConfig {
    pub token: Address,
    pub feed: Address,
    pub decimals: u8,
}

pub const PRICE_FEEDS: [PriceFeedConfig; 5] = [
    // WETH priced off ETH / USD
    PriceFeedConfig {
        token: WETH.address,
        feed: h160(address!("5f4eC3Df9cbd43714FE2740f5E3616155c5b8419")),
        decimals: 8,
    },
    // WBTC priced off BTC / USD
    PriceFeedConfig {
        token: WBTC.address,
        feed: h160(address!("F4030086522a5bEEa4988F8cA5B36dbC97BeE88c")),
        decimals: 8,
    },
    PriceFeedConfig {
        token: COMP.address,
        feed: h160(address!("dbd020CAeF83eFd542f4De03e3cF0C28A4428bd5")),
        decimals: 8,
    },
    PriceFeedConfig {
        token: UNI.address,
        feed: h160(address!("553303d460EE0afB37EdFf9bE42922D8FF63220e")),
        decimals: 8,
    },
    PriceFeedConfig {
        token: LINK.address,
        feed: h160(address!("2c1d072e956AFFC0D435Cb7AC38EF18d24d9127c")),
        decimals: 8,
    },
];

pub fn price_feed(token: Address) -> Option<&'static PriceFeedConfig> {
    PRICE_FEEDS.iter().find(|f| f.token == token)
}
