//! Comet position and market reads.

use crate::chain::{ChainClient, Session};
use crate::errors::Result;
use crate::models::{CollateralPosition, CometPosition, PositionSnapshot, ProtocolStats};
use crate::prices::{PriceMap, token_prices};
use crate::registry::{self, BASE_TOKEN_DECIMALS, COMET_COLLATERALS};
use crate::utils::{format_units, to_big_decimal};
use ethers::types::{Address, U256};
use futures::future::join_all;
use num_traits::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

/// Collateral factors assumed until they are read from `getAssetInfo`.
pub const DEFAULT_BORROW_COLLATERAL_FACTOR: f64 = 0.80;
pub const DEFAULT_LIQUIDATE_COLLATERAL_FACTOR: f64 = 0.85;

/// Reported when collateral is held but no debt (or no price) makes the
/// ratio meaningful.
pub const PLACEHOLDER_HEALTH_FACTOR: f64 = 999.0;

const SECONDS_PER_YEAR: u128 = 365 * 24 * 60 * 60;

/// Reads a user's position from one Comet market.
pub struct PositionReader<C> {
    client: Arc<C>,
    comet: Address,
    use_price_feeds: bool,
}

impl<C: ChainClient> PositionReader<C> {
    pub fn new(client: Arc<C>, comet: Address) -> Self {
        Self {
            client,
            comet,
            use_price_feeds: false,
        }
    }

    /// Reader for the USDC market of `chain_id`.
    pub fn for_chain(client: Arc<C>, chain_id: u64) -> Self {
        Self::new(client, registry::addresses(chain_id).comet_usdc)
    }

    /// Value collateral with on-chain price feeds when reading positions.
    pub fn with_price_feeds(mut self, enabled: bool) -> Self {
        self.use_price_feeds = enabled;
        self
    }

    /// Same client and pricing, pointed at the USDC market of `chain_id`.
    pub fn on_chain(&self, chain_id: u64) -> Self {
        Self::for_chain(self.client.clone(), chain_id).with_price_feeds(self.use_price_feeds)
    }

    pub fn comet(&self) -> Address {
        self.comet
    }

    /// Read the full position of `account`. Never fails: each read that
    /// errors falls back to its safe default.
    pub async fn read_position(&self, account: Option<Address>) -> CometPosition {
        let Some(account) = account else {
            return CometPosition::default();
        };
        let prices = if self.use_price_feeds {
            let tokens: Vec<Address> = COMET_COLLATERALS.iter().map(|t| t.address).collect();
            token_prices(self.client.as_ref(), &tokens).await
        } else {
            PriceMap::new()
        };
        self.read_position_with_prices(account, &prices).await
    }

    pub async fn read_position_with_prices(
        &self,
        account: Address,
        prices: &PriceMap,
    ) -> CometPosition {
        let comet = self.comet;
        let client = self.client.as_ref();
        let balance_reads = COMET_COLLATERALS
            .iter()
            .map(|token| client.collateral_balance_of(comet, account, token.address));

        let (balances, borrow, supply, liquidatable, collateralized) = futures::join!(
            join_all(balance_reads),
            client.borrow_balance_of(comet, account),
            client.supply_balance_of(comet, account),
            client.is_liquidatable(comet, account),
            client.is_borrow_collateralized(comet, account),
        );

        let collaterals: Vec<CollateralPosition> = COMET_COLLATERALS
            .iter()
            .zip(balances)
            .filter_map(|(token, res)| {
                let balance = or_default(res, U256::zero(), token.symbol);
                if balance.is_zero() {
                    return None;
                }
                let amount = to_big_decimal(balance, token.decimals)
                    .to_f64()
                    .unwrap_or(0.0);
                let value_usd = prices.get(&token.address).map_or(0.0, |p| amount * p);
                Some(CollateralPosition {
                    token: *token,
                    balance,
                    balance_formatted: format_units(balance, token.decimals),
                    value_usd,
                    borrow_collateral_factor: DEFAULT_BORROW_COLLATERAL_FACTOR,
                    liquidate_collateral_factor: DEFAULT_LIQUIDATE_COLLATERAL_FACTOR,
                })
            })
            .collect();

        let borrow_balance = or_default(borrow, U256::zero(), "borrowBalanceOf");
        let supply_balance = or_default(supply, U256::zero(), "balanceOf");
        let is_liquidatable = or_default(liquidatable, false, "isLiquidatable");
        let is_borrow_collateralized = or_default(collateralized, true, "isBorrowCollateralized");

        let total_collateral_value_usd: f64 = collaterals.iter().map(|c| c.value_usd).sum();
        let borrowing_power_usd: f64 = collaterals
            .iter()
            .map(|c| c.value_usd * c.borrow_collateral_factor)
            .sum();
        let liquidation_capacity_usd: f64 = collaterals
            .iter()
            .map(|c| c.value_usd * c.liquidate_collateral_factor)
            .sum();
        // base token is USDC, valued at $1
        let borrow_usd = to_big_decimal(borrow_balance, BASE_TOKEN_DECIMALS)
            .to_f64()
            .unwrap_or(0.0);
        let health_factor = health_factor(&collaterals, liquidation_capacity_usd, borrow_usd);

        debug!(
            ?account,
            collaterals = collaterals.len(),
            %borrow_balance,
            is_liquidatable,
            "[POSITION] read"
        );

        CometPosition {
            collaterals,
            borrow_balance,
            borrow_balance_formatted: format_units(borrow_balance, BASE_TOKEN_DECIMALS),
            supply_balance,
            supply_balance_formatted: format_units(supply_balance, BASE_TOKEN_DECIMALS),
            is_liquidatable,
            is_borrow_collateralized,
            total_collateral_value_usd,
            borrowing_power_usd,
            health_factor,
        }
    }

    /// Market utilization and APRs. Rates are only read at a non-zero
    /// utilization; any failure reports zeros.
    pub async fn protocol_stats(&self) -> ProtocolStats {
        let utilization = match self.client.utilization(self.comet).await {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "[POSITION] getUtilization failed");
                return ProtocolStats::default();
            }
        };
        if utilization.is_zero() {
            return ProtocolStats::default();
        }
        let (supply, borrow) = futures::join!(
            self.client.supply_rate(self.comet, utilization),
            self.client.borrow_rate(self.comet, utilization),
        );
        ProtocolStats {
            utilization: percent_of_wad(utilization),
            supply_apr: rate_to_apr(or_default(supply, 0, "getSupplyRate")),
            borrow_apr: rate_to_apr(or_default(borrow, 0, "getBorrowRate")),
            ..ProtocolStats::default()
        }
    }

    /// Whether `manager` may act on `owner`'s position; `false` on failure.
    pub async fn is_allowed(&self, owner: Address, manager: Address) -> bool {
        or_default(
            self.client.is_allowed(self.comet, owner, manager).await,
            false,
            "isAllowed",
        )
    }
}

fn or_default<T>(res: Result<T>, default: T, what: &str) -> T {
    match res {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, read = what, "[POSITION] read failed, using default");
            default
        }
    }
}

fn health_factor(collaterals: &[CollateralPosition], capacity_usd: f64, borrow_usd: f64) -> f64 {
    if collaterals.is_empty() {
        return 0.0;
    }
    if borrow_usd > 0.0 && capacity_usd > 0.0 {
        capacity_usd / borrow_usd
    } else {
        PLACEHOLDER_HEALTH_FACTOR
    }
}

/// 1e18-scaled fraction as a percentage.
fn percent_of_wad(value: U256) -> f64 {
    to_big_decimal(value, 18).to_f64().unwrap_or(0.0) * 100.0
}

/// Per-second 1e18-scaled rate as a yearly percentage.
fn rate_to_apr(rate_per_second: u64) -> f64 {
    let yearly = u128::from(rate_per_second) * SECONDS_PER_YEAR;
    yearly as f64 / 1e18 * 100.0
}

/// Keep `tx` updated with the position of the session's account.
///
/// Re-reads on every `interval` tick, whenever `refetch` is notified and
/// whenever the connected account changes. A chain switch moves the reader
/// to that chain's market before reading.
pub fn spawn_position_watcher<C: ChainClient>(
    reader: Arc<PositionReader<C>>,
    session: Session,
    interval: Duration,
    refetch: Arc<Notify>,
    tx: watch::Sender<PositionSnapshot>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = reader;
        // both senders live in `session`, so these receivers never close
        let mut account_rx = session.subscribe_account();
        let mut chain_rx = session.subscribe_chain_id();
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = refetch.notified() => {
                    debug!("[POSITION] refetch requested");
                }
                _ = account_rx.changed() => {
                    account_rx.borrow_and_update();
                }
                _ = chain_rx.changed() => {
                    let chain_id = *chain_rx.borrow_and_update();
                    reader = Arc::new(reader.on_chain(chain_id));
                    info!(chain_id, comet = ?reader.comet(), "[POSITION] chain switched");
                }
            }

            let account = session.account();
            tx.send_modify(|s| {
                s.is_loading = true;
                s.is_connected = account.is_some();
            });
            let position = reader.read_position(account).await;
            tx.send_replace(PositionSnapshot {
                position,
                is_loading: false,
                is_connected: account.is_some(),
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::errors::AppError;
    use crate::registry::{LINK, MAINNET, MAINNET_CHAIN_ID, SEPOLIA_CHAIN_ID, WBTC, WETH};

    fn user() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn weth_only_client() -> MockChainClient {
        let mut mock = MockChainClient::new();
        mock.expect_collateral_balance_of()
            .returning(|_, _, asset| {
                if asset == WETH.address {
                    Ok(U256::exp10(18) * 5)
                } else if asset == WBTC.address {
                    Err(AppError::Other("rpc timeout".into()))
                } else {
                    Ok(U256::zero())
                }
            });
        mock.expect_borrow_balance_of()
            .returning(|_, _| Ok(U256::from(4_000_000_000u64)));
        mock.expect_supply_balance_of()
            .returning(|_, _| Err(AppError::Other("boom".into())));
        mock.expect_is_liquidatable()
            .returning(|_, _| Err(AppError::Other("boom".into())));
        mock.expect_is_borrow_collateralized()
            .returning(|_, _| Ok(true));
        mock
    }

    #[tokio::test]
    async fn disconnected_reads_nothing() {
        // no expectations: any call would panic
        let reader = PositionReader::new(Arc::new(MockChainClient::new()), MAINNET.comet_usdc);
        let position = reader.read_position(None).await;
        assert_eq!(position, CometPosition::default());
        assert_eq!(position.borrow_balance_formatted, "0");
    }

    #[tokio::test]
    async fn failed_reads_degrade_per_field() {
        let reader = PositionReader::new(Arc::new(weth_only_client()), MAINNET.comet_usdc);
        let position = reader.read_position(Some(user())).await;

        assert_eq!(position.collaterals.len(), 1);
        let weth = &position.collaterals[0];
        assert_eq!(weth.token.symbol, "WETH");
        assert_eq!(weth.balance_formatted, "5");
        assert_eq!(weth.value_usd, 0.0);
        assert_eq!(position.borrow_balance_formatted, "4000");
        assert_eq!(position.supply_balance, U256::zero());
        assert!(!position.is_liquidatable);
        assert!(position.is_borrow_collateralized);
        assert_eq!(position.health_factor, PLACEHOLDER_HEALTH_FACTOR);
        assert!(position.collateral(LINK.address).is_none());
    }

    #[tokio::test]
    async fn prices_value_collateral_and_health() {
        let reader = PositionReader::new(Arc::new(weth_only_client()), MAINNET.comet_usdc);
        let prices = PriceMap::from([(WETH.address, 3200.0)]);
        let position = reader.read_position_with_prices(user(), &prices).await;

        assert_eq!(position.total_collateral_value_usd, 16_000.0);
        assert!((position.borrowing_power_usd - 12_800.0).abs() < 1e-9);
        // 16000 * 0.85 / 4000
        assert!((position.health_factor - 3.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn protocol_stats_convert_rates() {
        let mut mock = MockChainClient::new();
        mock.expect_utilization()
            .returning(|_| Ok(U256::exp10(17) * 8));
        mock.expect_supply_rate()
            .returning(|_, _| Ok(1_000_000_000));
        mock.expect_borrow_rate()
            .returning(|_, _| Err(AppError::Other("revert".into())));
        let reader = PositionReader::new(Arc::new(mock), MAINNET.comet_usdc);

        let stats = reader.protocol_stats().await;
        assert!((stats.utilization - 80.0).abs() < 1e-9);
        assert!((stats.supply_apr - 3.1536).abs() < 1e-9);
        assert_eq!(stats.borrow_apr, 0.0);
        assert_eq!(stats.base_token, "USDC");
    }

    #[tokio::test]
    async fn zero_utilization_skips_rate_reads() {
        let mut mock = MockChainClient::new();
        mock.expect_utilization().returning(|_| Ok(U256::zero()));
        let reader = PositionReader::new(Arc::new(mock), MAINNET.comet_usdc);
        assert_eq!(reader.protocol_stats().await, ProtocolStats::default());
    }

    #[tokio::test]
    async fn allowance_failure_reads_as_not_allowed() {
        let mut mock = MockChainClient::new();
        mock.expect_is_allowed()
            .returning(|_, _, _| Err(AppError::Other("boom".into())));
        let reader = PositionReader::new(Arc::new(mock), MAINNET.comet_usdc);
        assert!(!reader.is_allowed(user(), MAINNET.collateral_swap).await);
    }

    #[tokio::test]
    async fn watcher_follows_account_and_refetch() {
        let reader = Arc::new(PositionReader::new(
            Arc::new(weth_only_client()),
            MAINNET.comet_usdc,
        ));
        let session = Session::new(None, 1);
        let refetch = Arc::new(Notify::new());
        let (tx, mut rx) = watch::channel(PositionSnapshot::default());
        let handle = spawn_position_watcher(
            reader,
            session.clone(),
            Duration::from_secs(3600),
            refetch.clone(),
            tx,
        );

        // first tick fires immediately with no account
        let snap = wait_for(&mut rx, |s| !s.is_loading).await;
        assert!(!snap.is_connected);

        session.set_account(Some(user()));
        let snap = wait_for(&mut rx, |s| s.is_connected && !s.is_loading).await;
        assert_eq!(snap.position.collaterals.len(), 1);

        session.set_account(None);
        let snap = wait_for(&mut rx, |s| !s.is_connected && !s.is_loading).await;
        assert!(snap.position.collaterals.is_empty());

        session.set_account(Some(user()));
        wait_for(&mut rx, |s| s.is_connected && !s.is_loading).await;
        rx.borrow_and_update();
        refetch.notify_one();
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("refetch triggers a read")
            .unwrap();
        let snap = wait_for(&mut rx, |s| !s.is_loading).await;
        assert!(snap.is_connected);

        handle.abort();
    }

    #[tokio::test]
    async fn watcher_moves_to_new_market_on_chain_switch() {
        let mut mock = MockChainClient::new();
        mock.expect_collateral_balance_of()
            .returning(|comet, _, asset| {
                if comet == MAINNET.comet_usdc && asset == WETH.address {
                    Ok(U256::exp10(18))
                } else {
                    Ok(U256::zero())
                }
            });
        mock.expect_borrow_balance_of()
            .returning(|_, _| Ok(U256::zero()));
        mock.expect_supply_balance_of()
            .returning(|_, _| Ok(U256::zero()));
        mock.expect_is_liquidatable().returning(|_, _| Ok(false));
        mock.expect_is_borrow_collateralized()
            .returning(|_, _| Ok(true));

        let reader = Arc::new(PositionReader::for_chain(Arc::new(mock), MAINNET_CHAIN_ID));
        let session = Session::new(Some(user()), MAINNET_CHAIN_ID);
        let (tx, mut rx) = watch::channel(PositionSnapshot::default());
        let handle = spawn_position_watcher(
            reader,
            session.clone(),
            Duration::from_secs(3600),
            Arc::new(Notify::new()),
            tx,
        );

        let snap = wait_for(&mut rx, |s| s.is_connected && !s.is_loading).await;
        assert_eq!(snap.position.collaterals.len(), 1);

        session.set_chain_id(SEPOLIA_CHAIN_ID);
        let snap = wait_for(&mut rx, |s| {
            !s.is_loading && s.is_connected && s.position.collaterals.is_empty()
        })
        .await;
        assert_eq!(snap.position.health_factor, 0.0);

        handle.abort();
    }

    async fn wait_for(
        rx: &mut watch::Receiver<PositionSnapshot>,
        pred: impl Fn(&PositionSnapshot) -> bool,
    ) -> PositionSnapshot {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                {
                    let snap = rx.borrow_and_update();
                    if pred(&snap) {
                        return snap.clone();
                    }
                }
                rx.changed().await.expect("watcher alive");
            }
        })
        .await
        .expect("snapshot within timeout")
    }
}
