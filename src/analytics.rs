//! Swap history from `CollateralSwapped` events.

use crate::chain::{ChainClient, Session, SwapLog};
use crate::errors::Result;
use crate::models::{AnalyticsSnapshot, AnalyticsSummary, SwapRecord};
use crate::registry::{self, token_by_address};
use crate::utils::{format_units, to_big_decimal, to_smallest_unit};
use bigdecimal::BigDecimal;
use ethers::types::Address;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of most recent blocks scanned for events, latest included.
pub const BLOCK_WINDOW: u64 = 10;

/// Decimals assumed for assets missing from the registry.
const FALLBACK_DECIMALS: u8 = 18;

/// Decimals used to render summed volume.
const VOLUME_DECIMALS: u8 = 18;

pub struct AnalyticsReader<C> {
    client: Arc<C>,
    session: Session,
}

impl<C: ChainClient> AnalyticsReader<C> {
    pub fn new(client: Arc<C>, session: Session) -> Self {
        Self { client, session }
    }

    /// Swaps by `account` within the last [`BLOCK_WINDOW`] blocks, newest
    /// first. Timestamps that cannot be resolved are left as `None`.
    pub async fn load(&self, account: Option<Address>) -> Result<Vec<SwapRecord>> {
        let Some(account) = account else {
            return Ok(Vec::new());
        };
        let chain_id = self.session.chain_id();
        let swap_contract = registry::addresses(chain_id).collateral_swap;

        let latest = self.client.block_number().await?;
        let from = latest.saturating_sub(BLOCK_WINDOW - 1);
        let logs: Vec<SwapLog> = self
            .client
            .collateral_swapped_logs(swap_contract, from, latest)
            .await?
            .into_iter()
            .filter(|log| log.user == account)
            .collect();
        debug!(from, latest, matched = logs.len(), "[ANALYTICS] scanned swap logs");

        let timestamps = self.block_timestamps(&logs).await;
        let mut records: Vec<SwapRecord> = logs
            .into_iter()
            .map(|log| SwapRecord {
                tx_hash: log.tx_hash,
                log_index: log.log_index,
                chain_id,
                timestamp: timestamps.get(&log.block_number).copied().flatten(),
                user: log.user,
                source_asset: log.source_asset,
                target_asset: log.target_asset,
                source_amount: log.source_amount,
                target_amount: log.target_amount,
                flash_loan_fee: log.flash_loan_fee,
            })
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// [`load`](Self::load) plus its summary; a failed load is reported in
    /// `error` instead of being returned.
    pub async fn snapshot(&self, account: Option<Address>) -> AnalyticsSnapshot {
        match self.load(account).await {
            Ok(swaps) => {
                let summary = summarize(&swaps);
                info!(
                    total_swaps = summary.total_swaps,
                    volume = %summary.total_source_volume,
                    "[ANALYTICS] history loaded"
                );
                AnalyticsSnapshot {
                    swaps,
                    summary,
                    is_loading: false,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "[ANALYTICS] failed to load history");
                AnalyticsSnapshot {
                    error: Some(e.display_message("Failed to load swap history")),
                    ..AnalyticsSnapshot::default()
                }
            }
        }
    }

    /// One lookup per distinct block, issued concurrently.
    async fn block_timestamps(&self, logs: &[SwapLog]) -> HashMap<u64, Option<u64>> {
        let blocks: HashSet<u64> = logs.iter().map(|l| l.block_number).collect();
        let lookups = blocks.into_iter().map(|block| async move {
            match self.client.block_timestamp(block).await {
                Ok(ts) => (block, Some(ts)),
                Err(e) => {
                    warn!(block, error = %e, "[ANALYTICS] block timestamp unavailable");
                    (block, None)
                }
            }
        });
        join_all(lookups).await.into_iter().collect()
    }
}

/// Descending by timestamp (missing counts as 0), then by log index.
pub fn sort_newest_first(records: &mut [SwapRecord]) {
    records.sort_by(|a, b| {
        (b.timestamp.unwrap_or(0), b.log_index)
            .cmp(&(a.timestamp.unwrap_or(0), a.log_index))
    });
}

pub fn summarize(records: &[SwapRecord]) -> AnalyticsSummary {
    let users: HashSet<Address> = records.iter().map(|r| r.user).collect();
    let chains: HashSet<u64> = records.iter().map(|r| r.chain_id).collect();

    let mut total = BigDecimal::from(0);
    let mut by_asset: BTreeMap<String, BigDecimal> = BTreeMap::new();
    for record in records {
        let token = token_by_address(record.source_asset);
        let decimals = token.map_or(FALLBACK_DECIMALS, |t| t.decimals);
        let amount = to_big_decimal(record.source_amount, decimals);
        let key = match token {
            Some(t) => t.symbol.to_string(),
            None => format!("{:?}", record.source_asset),
        };
        total += &amount;
        *by_asset.entry(key).or_default() += amount;
    }

    AnalyticsSummary {
        total_swaps: records.len(),
        unique_users: users.len(),
        chains_used: chains.len(),
        total_source_volume: render_volume(&total),
        volume_by_asset: by_asset
            .into_iter()
            .map(|(k, v)| (k, render_volume(&v)))
            .collect(),
    }
}

fn render_volume(value: &BigDecimal) -> String {
    format_units(to_smallest_unit(value, VOLUME_DECIMALS), VOLUME_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::errors::AppError;
    use crate::registry::{MAINNET, USDC, WBTC, WETH};
    use ethers::types::{H256, U256};

    fn user() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn other() -> Address {
        Address::repeat_byte(0xbb)
    }

    fn log(tx: u8, log_index: u64, block: u64, user: Address) -> SwapLog {
        SwapLog {
            tx_hash: H256::repeat_byte(tx),
            log_index,
            block_number: block,
            user,
            source_asset: WETH.address,
            target_asset: USDC.address,
            source_amount: U256::exp10(18),
            target_amount: U256::from(3_188_800_000u64),
            flash_loan_fee: U256::from(1_594_400u64),
        }
    }

    fn record(timestamp: Option<u64>, log_index: u64) -> SwapRecord {
        SwapRecord {
            tx_hash: H256::repeat_byte(log_index as u8),
            log_index,
            chain_id: 1,
            timestamp,
            user: user(),
            source_asset: WETH.address,
            target_asset: USDC.address,
            source_amount: U256::exp10(18),
            target_amount: U256::zero(),
            flash_loan_fee: U256::zero(),
        }
    }

    #[tokio::test]
    async fn disconnected_account_loads_nothing() {
        let reader = AnalyticsReader::new(Arc::new(MockChainClient::new()), Session::new(None, 1));
        assert!(reader.load(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_scans_window_filters_user_and_sorts() {
        let mut mock = MockChainClient::new();
        mock.expect_block_number().returning(|| Ok(1_000));
        mock.expect_collateral_swapped_logs()
            .withf(|contract, from, to| {
                *contract == MAINNET.collateral_swap && *from == 991 && *to == 1_000
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![
                    log(1, 3, 995, user()),
                    log(2, 7, 995, user()),
                    log(3, 1, 992, other()),
                    log(4, 0, 998, user()),
                ])
            });
        mock.expect_block_timestamp().returning(|block| match block {
            995 => Ok(1_700_000_000),
            998 => Ok(1_700_000_036),
            _ => Err(AppError::Other("unexpected block".into())),
        });

        let reader = AnalyticsReader::new(Arc::new(mock), Session::new(Some(user()), 1));
        let records = reader.load(Some(user())).await.unwrap();

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.user == user() && r.chain_id == 1));
        let order: Vec<u64> = records.iter().map(|r| r.log_index).collect();
        assert_eq!(order, vec![0, 7, 3]);
        assert_eq!(records[0].timestamp, Some(1_700_000_036));
    }

    #[tokio::test]
    async fn window_saturates_near_genesis_and_timestamps_are_best_effort() {
        let mut mock = MockChainClient::new();
        mock.expect_block_number().returning(|| Ok(4));
        mock.expect_collateral_swapped_logs()
            .withf(|_, from, to| *from == 0 && *to == 4)
            .returning(|_, _, _| Ok(vec![log(1, 0, 2, user()), log(2, 1, 3, user())]));
        mock.expect_block_timestamp().returning(|block| {
            if block == 3 {
                Ok(1_700_000_000)
            } else {
                Err(AppError::Other("pruned".into()))
            }
        });

        let reader = AnalyticsReader::new(Arc::new(mock), Session::new(Some(user()), 1));
        let records = reader.load(Some(user())).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, Some(1_700_000_000));
        assert_eq!(records[1].timestamp, None);
    }

    #[tokio::test]
    async fn failed_log_query_surfaces_in_snapshot() {
        let mut mock = MockChainClient::new();
        mock.expect_block_number().returning(|| Ok(100));
        mock.expect_collateral_swapped_logs().returning(|_, _, _| {
            Err(AppError::Other(
                "query returned more than 10000 results".into(),
            ))
        });

        let reader = AnalyticsReader::new(Arc::new(mock), Session::new(Some(user()), 1));
        let snap = reader.snapshot(Some(user())).await;
        assert!(snap.swaps.is_empty());
        assert!(!snap.is_loading);
        assert_eq!(
            snap.error.as_deref(),
            Some("Other: query returned more than 10000 results")
        );
        assert_eq!(snap.summary, AnalyticsSummary::default());
    }

    #[test]
    fn equal_timestamps_order_by_log_index_descending() {
        let mut records = vec![record(Some(100), 3), record(Some(100), 7)];
        sort_newest_first(&mut records);
        assert_eq!(records[0].log_index, 7);
        assert_eq!(records[1].log_index, 3);
    }

    #[test]
    fn missing_timestamp_sorts_as_zero() {
        let mut records = vec![record(None, 9), record(Some(1), 0), record(Some(50), 2)];
        sort_newest_first(&mut records);
        let order: Vec<u64> = records.iter().map(|r| r.log_index).collect();
        assert_eq!(order, vec![2, 0, 9]);
    }

    #[test]
    fn summary_counts_and_normalises_volume() {
        let mut wbtc = record(Some(1), 1);
        wbtc.source_asset = WBTC.address;
        wbtc.source_amount = U256::from(50_000_000u64);
        wbtc.user = other();
        wbtc.chain_id = 11_155_111;

        let mut unknown = record(Some(2), 2);
        unknown.source_asset = Address::repeat_byte(0x42);
        unknown.source_amount = U256::exp10(17);

        let records = vec![record(Some(3), 3), record(Some(4), 4), wbtc, unknown];
        let summary = summarize(&records);

        assert_eq!(summary.total_swaps, 4);
        assert_eq!(summary.unique_users, 2);
        assert_eq!(summary.chains_used, 2);
        // 2 WETH + 0.5 WBTC + 0.1 of an 18-decimal unknown asset
        assert_eq!(summary.total_source_volume, "2.6");
        assert_eq!(summary.volume_by_asset.get("WETH").map(String::as_str), Some("2"));
        assert_eq!(summary.volume_by_asset.get("WBTC").map(String::as_str), Some("0.5"));
        assert_eq!(summary.volume_by_asset.len(), 3);
    }

    #[test]
    fn empty_summary_is_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary, AnalyticsSummary::default());
    }
}
