use anyhow::Result;
use cometswap::{
    analytics::AnalyticsReader,
    chain::{ChainClient, EthersClient, Session},
    config::{AppConfig, SwapConfig},
    models::PositionSnapshot,
    position::{PositionReader, spawn_position_watcher},
    quote::{QuoteEstimator, QuoteInput, min_amount_out},
    registry::{self, MAINNET_CHAIN_ID},
    swap::{SwapOrchestrator, SwapRequest},
    utils::format_units,
};
use ethers::{
    middleware::SignerMiddleware,
    signers::{LocalWallet, Signer},
};
use std::sync::Arc;
use tokio::sync::{Notify, watch};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    cometswap::utils::init_logging();

    let config = AppConfig::load()?;
    tracing::info!(?config, "[INIT] cometswap starting");

    let reader = EthersClient::connect(config.rpc_url.as_str())?;
    let chain_id = match config.chain_id {
        Some(id) => id,
        None => reader.chain_id().await?,
    };

    match config.private_key.clone() {
        Some(key) => {
            let wallet = key.parse::<LocalWallet>()?.with_chain_id(chain_id);
            let session = Session::new(Some(wallet.address()), chain_id);
            let provider = (*reader.inner()).clone();
            let client = EthersClient::new(Arc::new(SignerMiddleware::new(provider, wallet)));
            run(Arc::new(client), config, session).await
        }
        None => {
            if config.account.is_none() {
                tracing::warn!("[INIT] no PRIVATE_KEY or ACCOUNT_ADDRESS, running disconnected");
            }
            let session = Session::new(config.account, chain_id);
            run(Arc::new(reader), config, session).await
        }
    }
}

async fn run<C: ChainClient>(client: Arc<C>, config: AppConfig, session: Session) -> Result<()> {
    let chain_id = session.chain_id();
    let addrs = registry::addresses(chain_id);
    tracing::info!(
        chain_id,
        account = ?session.account(),
        swap_deployed = addrs.is_swap_deployed(),
        "[INIT] session ready"
    );

    let positions = Arc::new(
        PositionReader::for_chain(client.clone(), chain_id)
            .with_price_feeds(chain_id == MAINNET_CHAIN_ID),
    );
    let stats = positions.protocol_stats().await;
    tracing::info!(
        utilization = stats.utilization,
        supply_apr = stats.supply_apr,
        borrow_apr = stats.borrow_apr,
        base = stats.base_token,
        "[INIT] market stats"
    );

    // Background position watcher
    let refetch = Arc::new(Notify::new());
    let (position_tx, mut position_rx) = watch::channel(PositionSnapshot::default());
    let watcher = spawn_position_watcher(
        positions.clone(),
        session.clone(),
        config.poll_interval,
        refetch.clone(),
        position_tx,
    );
    tracing::info!(interval = ?config.poll_interval, "[INIT] position watcher started");

    let analytics = AnalyticsReader::new(client.clone(), session.clone());
    let history = analytics.snapshot(session.account()).await;
    match &history.error {
        Some(error) => tracing::warn!(error, "[ANALYTICS] history unavailable"),
        None => {
            let summary = serde_json::to_string(&history.summary)?;
            tracing::info!(%summary, swaps = history.swaps.len(), "[ANALYTICS] recent swaps");
        }
    }

    let orchestrator =
        SwapOrchestrator::new(client.clone(), session.clone()).with_refetch(refetch);
    if let Some(swap) = &config.swap {
        run_swap(&orchestrator, positions.as_ref(), &session, &config, swap).await?;
    }

    loop {
        tokio::select! {
            changed = position_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = position_rx.borrow_and_update().clone();
                if snapshot.is_loading {
                    continue;
                }
                let p = &snapshot.position;
                tracing::info!(
                    connected = snapshot.is_connected,
                    collaterals = p.collaterals.len(),
                    collateral_usd = p.total_collateral_value_usd,
                    borrow = %p.borrow_balance_formatted,
                    health_factor = p.health_factor,
                    liquidatable = p.is_liquidatable,
                    "[POSITION] updated"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("[INIT] shutting down");
                break;
            }
        }
    }

    watcher.abort();
    Ok(())
}

/// Quote, validate and execute the swap configured at startup.
async fn run_swap<C: ChainClient>(
    orchestrator: &SwapOrchestrator<C>,
    positions: &PositionReader<C>,
    session: &Session,
    config: &AppConfig,
    swap: &SwapConfig,
) -> Result<()> {
    let mut estimator = QuoteEstimator::default();
    let mut quotes = estimator.subscribe();
    estimator.request(QuoteInput::new(swap.from, swap.to, swap.amount.clone()));
    let quote = loop {
        let current = quotes.borrow_and_update().clone();
        if !current.is_loading {
            break current;
        }
        quotes.changed().await?;
    };
    if let Some(error) = &quote.error {
        tracing::warn!(error, "[QUOTE] cannot quote configured swap");
        return Ok(());
    }

    let premium_bps = orchestrator.flash_loan_premium_bps().await;
    let min_out = min_amount_out(quote.amount_out, config.slippage_bps);
    tracing::info!(
        amount_in = %swap.amount,
        amount_out = %quote.amount_out_formatted,
        min_out = %format_units(min_out, swap.to.decimals),
        rate = %quote.exchange_rate,
        price_impact = quote.price_impact,
        premium_bps,
        "[QUOTE] configured swap"
    );

    let request = SwapRequest {
        source: swap.from,
        target: swap.to,
        amount: swap.amount.clone(),
        min_target_amount: min_out,
        fee_tier: config.fee_tier,
    };
    let position = positions.read_position(session.account()).await;
    if let Err(e) = request.validate(&position) {
        tracing::warn!(error = %e, "[SWAP] configured swap rejected");
        return Ok(());
    }

    tracing::info!(allowed = orchestrator.check_allowance().await, "[SWAP] manager allowance");
    if let Err(e) = orchestrator.execute(&request).await {
        tracing::warn!(error = %e, "[SWAP] configured swap failed");
    }
    tracing::info!(state = ?orchestrator.state(), "[SWAP] final state");
    Ok(())
}
