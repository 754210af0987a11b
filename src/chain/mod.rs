//! Chain access for the Comet collateral-swap stack.
//!
//! Everything the readers and the swap orchestrator need from a node goes
//! through [`ChainClient`], so the same logic runs against a live provider
//! ([`EthersClient`]) or a mock in tests.

use crate::errors::Result;
use async_trait::async_trait;
use ethers::types::{Address, I256, TxHash, U256};

pub mod client;
pub mod session;

pub use client::EthersClient;
pub use session::Session;

/// Arguments of `CollateralSwap.swapCollateral`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapParams {
    pub source_asset: Address,
    pub target_asset: Address,
    pub source_amount: U256,
    pub min_target_amount: U256,
    /// Uniswap pool fee tier in hundredths of a bip (3000 = 0.3%).
    pub fee_tier: u32,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Raw `CollateralSwapped` event with its log position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapLog {
    pub tx_hash: TxHash,
    pub log_index: u64,
    pub block_number: u64,
    pub user: Address,
    pub source_asset: Address,
    pub target_asset: Address,
    pub source_amount: U256,
    pub target_amount: U256,
    pub flash_loan_fee: U256,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    // ---- Comet reads ----
    async fn collateral_balance_of(
        &self,
        comet: Address,
        account: Address,
        asset: Address,
    ) -> Result<U256>;
    async fn borrow_balance_of(&self, comet: Address, account: Address) -> Result<U256>;
    /// Base-token supply balance (`balanceOf`).
    async fn supply_balance_of(&self, comet: Address, account: Address) -> Result<U256>;
    async fn is_liquidatable(&self, comet: Address, account: Address) -> Result<bool>;
    async fn is_borrow_collateralized(&self, comet: Address, account: Address) -> Result<bool>;
    async fn utilization(&self, comet: Address) -> Result<U256>;
    async fn supply_rate(&self, comet: Address, utilization: U256) -> Result<u64>;
    async fn borrow_rate(&self, comet: Address, utilization: U256) -> Result<u64>;
    async fn is_allowed(&self, comet: Address, owner: Address, manager: Address) -> Result<bool>;

    // ---- other reads ----
    async fn latest_answer(&self, feed: Address) -> Result<I256>;
    async fn flash_loan_premium(&self, swap_contract: Address) -> Result<u128>;

    // ---- writes ----
    /// Submit `Comet.allow(manager, allowed)` and return the tx hash.
    async fn allow(&self, comet: Address, manager: Address, allowed: bool) -> Result<TxHash>;
    /// Submit `CollateralSwap.swapCollateral(..)` and return the tx hash.
    async fn swap_collateral(&self, swap_contract: Address, params: SwapParams) -> Result<TxHash>;
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<ReceiptStatus>;

    // ---- blocks and logs ----
    async fn block_number(&self) -> Result<u64>;
    async fn block_timestamp(&self, block_number: u64) -> Result<u64>;
    async fn collateral_swapped_logs(
        &self,
        swap_contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SwapLog>>;
}
