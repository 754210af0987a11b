//! Collateral swap execution.
//!
//! A swap is two transactions against external contracts: an optional
//! `Comet.allow(collateralSwap, true)` so the swap contract may manage the
//! user's position, then `CollateralSwap.swapCollateral(..)`, which flash
//! borrows the target asset, swaps and settles atomically on-chain.

use crate::chain::{ChainClient, ReceiptStatus, Session, SwapParams};
use crate::errors::{AppError, Result};
use crate::models::{CometPosition, SwapState, SwapStatus, TokenInfo};
use crate::quote::calc::FLASH_LOAN_PREMIUM_BPS;
use crate::registry::{self, ContractAddresses};
use crate::utils::parse_units;
use bigdecimal::BigDecimal;
use ethers::types::{Address, TxHash, U256};
use num_bigint::Sign;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

/// Uniswap 0.3% pool.
pub const DEFAULT_FEE_TIER: u32 = 3000;

/// A swap as entered by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapRequest {
    pub source: TokenInfo,
    pub target: TokenInfo,
    /// Decimal amount of `source`, in token units.
    pub amount: String,
    pub min_target_amount: U256,
    pub fee_tier: u32,
}

impl SwapRequest {
    /// Check the request against the user's current position: distinct
    /// assets, source held as collateral, and an amount within the balance.
    pub fn validate(&self, position: &CometPosition) -> Result<()> {
        if self.source.address == self.target.address {
            return Err(AppError::InvalidSwap(
                "source and target asset must differ".into(),
            ));
        }
        let held = position.collateral(self.source.address).ok_or_else(|| {
            AppError::InvalidSwap(format!("no {} collateral to swap", self.source.symbol))
        })?;
        let amount = BigDecimal::from_str(self.amount.trim())
            .map_err(|_| AppError::InvalidAmount(format!("'{}' is not a number", self.amount)))?;
        if amount.sign() != Sign::Plus {
            return Err(AppError::InvalidAmount("amount must be positive".into()));
        }
        let units = parse_units(&self.amount, self.source.decimals)?;
        if units > held.balance {
            return Err(AppError::InvalidAmount(format!(
                "amount exceeds collateral balance of {} {}",
                held.balance_formatted, self.source.symbol
            )));
        }
        Ok(())
    }
}

/// Clears the in-flight flag when the flow ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives approve + swap and exposes the resulting [`SwapState`].
pub struct SwapOrchestrator<C> {
    client: Arc<C>,
    session: Session,
    state: watch::Sender<SwapState>,
    in_flight: AtomicBool,
    on_success: Vec<Arc<Notify>>,
}

impl<C: ChainClient> SwapOrchestrator<C> {
    pub fn new(client: Arc<C>, session: Session) -> Self {
        let (state, _) = watch::channel(SwapState::default());
        Self {
            client,
            session,
            state,
            in_flight: AtomicBool::new(false),
            on_success: Vec::new(),
        }
    }

    /// Notify `listener` after every successful swap, e.g. to refetch the
    /// position and the allowance.
    pub fn with_refetch(mut self, listener: Arc<Notify>) -> Self {
        self.on_success.push(listener);
        self
    }

    pub fn state(&self) -> SwapState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SwapState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn is_contract_deployed(&self) -> bool {
        self.addresses().is_swap_deployed()
    }

    fn addresses(&self) -> &'static ContractAddresses {
        registry::addresses(self.session.chain_id())
    }

    /// Whether the swap contract may manage the connected account's
    /// position. Read failures count as not allowed.
    pub async fn check_allowance(&self) -> bool {
        let Some(account) = self.session.account() else {
            return false;
        };
        let addrs = self.addresses();
        if !addrs.is_swap_deployed() {
            return false;
        }
        self.is_allowed(account, addrs).await
    }

    /// Flash-loan premium charged by the pool behind the swap contract, in
    /// basis points. Falls back to [`FLASH_LOAN_PREMIUM_BPS`] when unreadable.
    pub async fn flash_loan_premium_bps(&self) -> u64 {
        let addrs = self.addresses();
        if !addrs.is_swap_deployed() {
            return FLASH_LOAN_PREMIUM_BPS;
        }
        match self.client.flash_loan_premium(addrs.collateral_swap).await {
            Ok(premium) => u64::try_from(premium).unwrap_or(FLASH_LOAN_PREMIUM_BPS),
            Err(e) => {
                debug!(error = %e, "[SWAP] premium read failed, using default");
                FLASH_LOAN_PREMIUM_BPS
            }
        }
    }

    /// Authorize the swap contract as manager of the user's position.
    ///
    /// A confirmed approval leaves the state idle with `approval_tx_hash`
    /// set, ready for the swap.
    pub async fn approve_manager(&self) -> Result<TxHash> {
        let _guard = self.begin()?;
        self.state.send_replace(SwapState::default());
        if !self.session.is_connected() {
            return Err(self.fail(AppError::NotConnected, "Approval failed"));
        }
        let addrs = self.addresses();
        if !addrs.is_swap_deployed() {
            return Err(self.fail(AppError::NotDeployed, "Approval failed"));
        }
        let tx_hash = self.approve(addrs).await?;
        self.state.send_modify(|s| s.status = SwapStatus::Idle);
        Ok(tx_hash)
    }

    /// Swap `amount` of `source` collateral into `target` collateral.
    ///
    /// Returns the swap transaction hash. Every failure also leaves the
    /// state in [`SwapStatus::Error`] with a user-facing message, except
    /// [`AppError::SwapInProgress`], which leaves the running flow alone.
    pub async fn execute_swap(
        &self,
        source: &TokenInfo,
        target: &TokenInfo,
        amount: &str,
        min_target_amount: U256,
        fee_tier: u32,
    ) -> Result<TxHash> {
        let _guard = self.begin()?;
        self.state.send_replace(SwapState::default());

        let Some(account) = self.session.account() else {
            return Err(self.fail(AppError::NotConnected, "Swap failed"));
        };
        let addrs = self.addresses();
        if !addrs.is_swap_deployed() {
            return Err(self.fail(AppError::NotDeployed, "Swap failed"));
        }

        if !self.is_allowed(account, addrs).await {
            self.approve(addrs).await?;
        }

        self.state.send_modify(|s| {
            s.status = SwapStatus::Swapping;
            s.error = None;
        });

        match self
            .swap(addrs, source, target, amount, min_target_amount, fee_tier)
            .await
        {
            Ok(tx_hash) => {
                self.state.send_modify(|s| s.status = SwapStatus::Success);
                info!(
                    ?tx_hash,
                    source = source.symbol,
                    target = target.symbol,
                    amount,
                    "[SWAP] collateral swapped"
                );
                for listener in &self.on_success {
                    listener.notify_one();
                }
                Ok(tx_hash)
            }
            Err(e) => Err(self.fail(e, "Swap failed")),
        }
    }

    /// [`execute_swap`](Self::execute_swap) for a prepared request.
    pub async fn execute(&self, request: &SwapRequest) -> Result<TxHash> {
        self.execute_swap(
            &request.source,
            &request.target,
            &request.amount,
            request.min_target_amount,
            request.fee_tier,
        )
        .await
    }

    /// Back to idle after success or error. Ignored while a flow runs.
    pub fn reset(&self) {
        if self.in_flight.load(Ordering::Acquire) {
            debug!("[SWAP] reset ignored, swap in flight");
            return;
        }
        self.state.send_replace(SwapState::default());
    }

    fn begin(&self) -> Result<FlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                warn!("[SWAP] rejected, another swap is in flight");
                AppError::SwapInProgress
            })?;
        Ok(FlightGuard(&self.in_flight))
    }

    async fn is_allowed(&self, account: Address, addrs: &ContractAddresses) -> bool {
        match self
            .client
            .is_allowed(addrs.comet_usdc, account, addrs.collateral_swap)
            .await
        {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(error = %e, "[SWAP] allowance check failed, treating as not allowed");
                false
            }
        }
    }

    async fn approve(&self, addrs: &ContractAddresses) -> Result<TxHash> {
        self.state.send_modify(|s| {
            s.status = SwapStatus::Approving;
            s.error = None;
        });
        let result = async {
            let tx_hash = self
                .client
                .allow(addrs.comet_usdc, addrs.collateral_swap, true)
                .await?;
            self.state.send_modify(|s| s.approval_tx_hash = Some(tx_hash));
            info!(?tx_hash, "[SWAP] approval submitted");
            match self.client.wait_for_receipt(tx_hash).await? {
                ReceiptStatus::Success => Ok(tx_hash),
                ReceiptStatus::Reverted => Err(AppError::Reverted(
                    "Approval transaction reverted".into(),
                )),
            }
        }
        .await;
        result.map_err(|e| self.fail(e, "Approval failed"))
    }

    async fn swap(
        &self,
        addrs: &ContractAddresses,
        source: &TokenInfo,
        target: &TokenInfo,
        amount: &str,
        min_target_amount: U256,
        fee_tier: u32,
    ) -> Result<TxHash> {
        let params = SwapParams {
            source_asset: source.address,
            target_asset: target.address,
            source_amount: parse_units(amount, source.decimals)?,
            min_target_amount,
            fee_tier,
        };
        let tx_hash = self
            .client
            .swap_collateral(addrs.collateral_swap, params)
            .await?;
        self.state.send_modify(|s| s.tx_hash = Some(tx_hash));
        info!(?tx_hash, "[SWAP] swap submitted");
        match self.client.wait_for_receipt(tx_hash).await? {
            ReceiptStatus::Success => Ok(tx_hash),
            ReceiptStatus::Reverted => Err(AppError::Reverted("Swap transaction reverted".into())),
        }
    }

    /// Move to the error state and hand the error back.
    fn fail(&self, err: AppError, fallback: &str) -> AppError {
        let message = err.display_message(fallback);
        warn!(error = %err, message, "[SWAP] failed");
        self.state.send_modify(|s| {
            s.status = SwapStatus::Error;
            s.error = Some(message);
        });
        err
    }
}
