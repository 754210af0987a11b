//! Shared data structures used throughout the application.

use ethers::types::{Address, H256, U256};
use serde::Serialize;
use std::collections::BTreeMap;

/// Static token metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
    pub logo_url: Option<&'static str>,
}

/// One collateral asset held in the user's Comet position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollateralPosition {
    pub token: TokenInfo,
    /// Raw balance in the token's smallest unit.
    pub balance: U256,
    pub balance_formatted: String,
    pub value_usd: f64,
    pub borrow_collateral_factor: f64,
    pub liquidate_collateral_factor: f64,
}

/// Snapshot of a user's Comet position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CometPosition {
    /// Collaterals with a non-zero balance only.
    pub collaterals: Vec<CollateralPosition>,
    pub borrow_balance: U256,
    pub borrow_balance_formatted: String,
    pub supply_balance: U256,
    pub supply_balance_formatted: String,
    pub is_liquidatable: bool,
    pub is_borrow_collateralized: bool,
    pub total_collateral_value_usd: f64,
    pub borrowing_power_usd: f64,
    pub health_factor: f64,
}

impl Default for CometPosition {
    fn default() -> Self {
        Self {
            collaterals: Vec::new(),
            borrow_balance: U256::zero(),
            borrow_balance_formatted: "0".into(),
            supply_balance: U256::zero(),
            supply_balance_formatted: "0".into(),
            is_liquidatable: false,
            is_borrow_collateralized: true,
            total_collateral_value_usd: 0.0,
            borrowing_power_usd: 0.0,
            health_factor: 0.0,
        }
    }
}

impl CometPosition {
    pub fn collateral(&self, token: Address) -> Option<&CollateralPosition> {
        self.collaterals.iter().find(|c| c.token.address == token)
    }
}

/// Position plus the flags a caller needs to render it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionSnapshot {
    pub position: CometPosition,
    pub is_loading: bool,
    pub is_connected: bool,
}

/// Market-wide Comet figures, all in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolStats {
    pub utilization: f64,
    pub supply_apr: f64,
    pub borrow_apr: f64,
    pub base_token: &'static str,
}

impl Default for ProtocolStats {
    fn default() -> Self {
        Self {
            utilization: 0.0,
            supply_apr: 0.0,
            borrow_apr: 0.0,
            base_token: "USDC",
        }
    }
}

/// A decoded `CollateralSwapped` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapRecord {
    pub tx_hash: H256,
    pub log_index: u64,
    pub chain_id: u64,
    /// Block timestamp in seconds, `None` if it could not be resolved.
    pub timestamp: Option<u64>,
    pub user: Address,
    pub source_asset: Address,
    pub target_asset: Address,
    pub source_amount: U256,
    pub target_amount: U256,
    pub flash_loan_fee: U256,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub total_swaps: usize,
    pub unique_users: usize,
    pub chains_used: usize,
    /// Sum of source amounts, each normalised by its asset's decimals.
    pub total_source_volume: String,
    /// Per-symbol source volume; unknown assets are keyed by address.
    pub volume_by_asset: BTreeMap<String, String>,
}

impl Default for AnalyticsSummary {
    fn default() -> Self {
        Self {
            total_swaps: 0,
            unique_users: 0,
            chains_used: 0,
            total_source_volume: "0".into(),
            volume_by_asset: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub swaps: Vec<SwapRecord>,
    pub summary: AnalyticsSummary,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Lifecycle of a single collateral swap attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    #[default]
    Idle,
    Approving,
    Swapping,
    Success,
    Error,
}

impl SwapStatus {
    /// A flow is running; callers must not start another one.
    pub fn is_busy(self) -> bool {
        matches!(self, SwapStatus::Approving | SwapStatus::Swapping)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwapState {
    pub status: SwapStatus,
    pub error: Option<String>,
    pub tx_hash: Option<H256>,
    pub approval_tx_hash: Option<H256>,
}

/// Indicative swap quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteResult {
    /// Output in the output token's smallest unit.
    pub amount_out: U256,
    pub amount_out_formatted: String,
    /// Price impact in percent.
    pub price_impact: f64,
    pub exchange_rate: String,
    pub gas_estimate: U256,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl Default for QuoteResult {
    fn default() -> Self {
        Self {
            amount_out: U256::zero(),
            amount_out_formatted: "0".into(),
            price_impact: 0.0,
            exchange_rate: "-".into(),
            gas_estimate: U256::zero(),
            is_loading: false,
            error: None,
        }
    }
}
