use super::{ChainClient, ReceiptStatus, SwapLog, SwapParams};
use crate::errors::{AppError, Result, contract_error, middleware_error};
use async_trait::async_trait;
use ethers::{
    contract::abigen,
    providers::{Http, Middleware, PendingTransaction, Provider},
    types::{Address, I256, TxHash, U64, U256},
};
use std::sync::Arc;
use tracing::debug;

abigen!(
    Comet,
    r"[
        function collateralBalanceOf(address account, address asset) view returns (uint128)
        function borrowBalanceOf(address account) view returns (uint256)
        function balanceOf(address account) view returns (uint256)
        function isLiquidatable(address account) view returns (bool)
        function isBorrowCollateralized(address account) view returns (bool)
        function getUtilization() view returns (uint256)
        function getSupplyRate(uint256 utilization) view returns (uint64)
        function getBorrowRate(uint256 utilization) view returns (uint64)
        function allow(address manager, bool isAllowed)
        function isAllowed(address owner, address manager) view returns (bool)
    ]",
);

abigen!(
    CollateralSwap,
    r"[
        function swapCollateral(address sourceAsset, address targetAsset, uint256 sourceAmount, uint256 minTargetAmount, uint24 swapFee)
        function getFlashLoanPremium() view returns (uint128)
        event CollateralSwapped(address indexed user, address indexed sourceAsset, address indexed targetAsset, uint256 sourceAmount, uint256 targetAmount, uint256 flashLoanFee)
    ]",
);

abigen!(
    PriceFeed,
    r"[
        function latestAnswer() view returns (int256)
    ]",
);

/// [`ChainClient`] backed by an `ethers` middleware stack.
///
/// Use a plain `Provider<Http>` for read-only access or a `SignerMiddleware`
/// when transactions must be sent.
pub struct EthersClient<M> {
    client: Arc<M>,
}

impl<M> Clone for EthersClient<M> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl EthersClient<Provider<Http>> {
    pub fn connect(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        Ok(Self::new(Arc::new(provider)))
    }
}

impl<M: Middleware + 'static> EthersClient<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> Arc<M> {
        self.client.clone()
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let id = self.client.get_chainid().await.map_err(middleware_error)?;
        Ok(id.as_u64())
    }

    fn comet(&self, address: Address) -> Comet<M> {
        Comet::new(address, self.client.clone())
    }

    fn collateral_swap(&self, address: Address) -> CollateralSwap<M> {
        CollateralSwap::new(address, self.client.clone())
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainClient for EthersClient<M> {
    async fn collateral_balance_of(
        &self,
        comet: Address,
        account: Address,
        asset: Address,
    ) -> Result<U256> {
        let raw: u128 = self
            .comet(comet)
            .collateral_balance_of(account, asset)
            .call()
            .await
            .map_err(contract_error)?;
        Ok(U256::from(raw))
    }

    async fn borrow_balance_of(&self, comet: Address, account: Address) -> Result<U256> {
        self.comet(comet)
            .borrow_balance_of(account)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn supply_balance_of(&self, comet: Address, account: Address) -> Result<U256> {
        self.comet(comet)
            .balance_of(account)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn is_liquidatable(&self, comet: Address, account: Address) -> Result<bool> {
        self.comet(comet)
            .is_liquidatable(account)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn is_borrow_collateralized(&self, comet: Address, account: Address) -> Result<bool> {
        self.comet(comet)
            .is_borrow_collateralized(account)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn utilization(&self, comet: Address) -> Result<U256> {
        self.comet(comet)
            .get_utilization()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn supply_rate(&self, comet: Address, utilization: U256) -> Result<u64> {
        self.comet(comet)
            .get_supply_rate(utilization)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn borrow_rate(&self, comet: Address, utilization: U256) -> Result<u64> {
        self.comet(comet)
            .get_borrow_rate(utilization)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn is_allowed(&self, comet: Address, owner: Address, manager: Address) -> Result<bool> {
        self.comet(comet)
            .is_allowed(owner, manager)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn latest_answer(&self, feed: Address) -> Result<I256> {
        PriceFeed::new(feed, self.client.clone())
            .latest_answer()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn flash_loan_premium(&self, swap_contract: Address) -> Result<u128> {
        self.collateral_swap(swap_contract)
            .get_flash_loan_premium()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn allow(&self, comet: Address, manager: Address, allowed: bool) -> Result<TxHash> {
        let contract = self.comet(comet);
        let call = contract.allow(manager, allowed);
        let pending = call.send().await.map_err(contract_error)?;
        let tx_hash = *pending;
        debug!(?tx_hash, ?manager, allowed, "[CHAIN] allow submitted");
        Ok(tx_hash)
    }

    async fn swap_collateral(&self, swap_contract: Address, params: SwapParams) -> Result<TxHash> {
        let contract = self.collateral_swap(swap_contract);
        let call = contract.swap_collateral(
            params.source_asset,
            params.target_asset,
            params.source_amount,
            params.min_target_amount,
            params.fee_tier,
        );
        let pending = call.send().await.map_err(contract_error)?;
        let tx_hash = *pending;
        debug!(?tx_hash, "[CHAIN] swapCollateral submitted");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<ReceiptStatus> {
        let receipt = PendingTransaction::new(tx_hash, self.client.provider())
            .await?
            .ok_or_else(|| AppError::Other(format!("transaction {tx_hash:?} dropped")))?;
        if receipt.status == Some(U64::one()) {
            Ok(ReceiptStatus::Success)
        } else {
            Ok(ReceiptStatus::Reverted)
        }
    }

    async fn block_number(&self) -> Result<u64> {
        let n = self
            .client
            .get_block_number()
            .await
            .map_err(middleware_error)?;
        Ok(n.as_u64())
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64> {
        let block = self
            .client
            .get_block(block_number)
            .await
            .map_err(middleware_error)?
            .ok_or_else(|| AppError::Other(format!("block {block_number} not found")))?;
        Ok(block.timestamp.as_u64())
    }

    async fn collateral_swapped_logs(
        &self,
        swap_contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<SwapLog>> {
        let contract = self.collateral_swap(swap_contract);
        let events = contract
            .collateral_swapped_filter()
            .from_block(from_block)
            .to_block(to_block)
            .query_with_meta()
            .await
            .map_err(contract_error)?;

        Ok(events
            .into_iter()
            .map(|(ev, meta)| SwapLog {
                tx_hash: meta.transaction_hash,
                log_index: meta.log_index.as_u64(),
                block_number: meta.block_number.as_u64(),
                user: ev.user,
                source_asset: ev.source_asset,
                target_asset: ev.target_asset,
                source_amount: ev.source_amount,
                target_amount: ev.target_amount,
                flash_loan_fee: ev.flash_loan_fee,
            })
            .collect())
    }
}
