use super::calc::estimate_quote;
use crate::models::{QuoteResult, TokenInfo};
use bigdecimal::BigDecimal;
use num_bigint::Sign;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Delay between the last input change and the quote computation.
pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// What the user currently has in the swap form.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteInput {
    pub token_in: Option<TokenInfo>,
    pub token_out: Option<TokenInfo>,
    pub amount_in: String,
}

impl QuoteInput {
    pub fn new(token_in: TokenInfo, token_out: TokenInfo, amount_in: impl Into<String>) -> Self {
        Self {
            token_in: Some(token_in),
            token_out: Some(token_out),
            amount_in: amount_in.into(),
        }
    }

    /// Inputs that resolve to an empty quote without waiting.
    fn is_blank(&self) -> bool {
        if self.token_in.is_none() || self.token_out.is_none() {
            return true;
        }
        let amount = self.amount_in.trim();
        if amount.is_empty() {
            return true;
        }
        matches!(BigDecimal::from_str(amount), Ok(v) if v.sign() != Sign::Plus)
    }
}

/// Debounced quote computation.
///
/// Every [`request`](Self::request) supersedes the previous one: the pending
/// task is aborted and each task only publishes while its generation is
/// still the latest, so an older input can never overwrite a newer result.
pub struct QuoteEstimator {
    delay: Duration,
    generation: Arc<AtomicU64>,
    tx: Arc<watch::Sender<QuoteResult>>,
    pending: Option<JoinHandle<()>>,
}

impl QuoteEstimator {
    pub fn new(delay: Duration) -> Self {
        let (tx, _) = watch::channel(QuoteResult::default());
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
            tx: Arc::new(tx),
            pending: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<QuoteResult> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> QuoteResult {
        self.tx.borrow().clone()
    }

    pub fn request(&mut self, input: QuoteInput) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(handle) = self.pending.take() {
            if !handle.is_finished() {
                debug!(generation, "[QUOTE] superseding pending quote");
            }
            handle.abort();
        }

        if input.is_blank() {
            self.tx.send_replace(QuoteResult::default());
            return;
        }
        let (Some(token_in), Some(token_out)) = (input.token_in, input.token_out) else {
            return;
        };

        self.tx.send_modify(|q| q.is_loading = true);

        let delay = self.delay;
        let current = self.generation.clone();
        let tx = self.tx.clone();
        let amount_in = input.amount_in;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let quote = estimate_quote(&token_in, &token_out, &amount_in);
            // the generation check runs under the channel lock, so a newer
            // request either sees this value and overwrites it or is seen here
            let published = tx.send_if_modified(|slot| {
                if current.load(Ordering::SeqCst) != generation {
                    return false;
                }
                *slot = quote;
                true
            });
            if published {
                debug!(
                    generation,
                    symbol_in = token_in.symbol,
                    symbol_out = token_out.symbol,
                    "[QUOTE] published"
                );
            }
        }));
    }
}

impl Default for QuoteEstimator {
    fn default() -> Self {
        Self::new(DEBOUNCE)
    }
}

impl Drop for QuoteEstimator {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{USDC, WETH};
    use ethers::types::U256;

    #[tokio::test(start_paused = true)]
    async fn publishes_after_debounce_delay() {
        let mut est = QuoteEstimator::default();
        est.request(QuoteInput::new(WETH, USDC, "2.0"));
        assert!(est.current().is_loading);

        tokio::time::sleep(Duration::from_millis(299)).await;
        assert!(est.current().is_loading);
        assert_eq!(est.current().amount_out, U256::zero());

        tokio::time::sleep(Duration::from_millis(10)).await;
        let q = est.current();
        assert!(!q.is_loading);
        assert_eq!(q.amount_out, U256::from(6_377_600_000u64));
    }

    #[tokio::test(start_paused = true)]
    async fn newer_input_supersedes_older() {
        let mut est = QuoteEstimator::default();
        est.request(QuoteInput::new(WETH, USDC, "1"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        est.request(QuoteInput::new(WETH, USDC, "2.0"));

        // the first request would have fired at 300ms
        tokio::time::sleep(Duration::from_millis(250)).await;
        let q = est.current();
        assert!(q.is_loading);
        assert_eq!(q.amount_out, U256::zero());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(est.current().amount_out, U256::from(6_377_600_000u64));
    }

    #[tokio::test(start_paused = true)]
    async fn blank_input_clears_immediately_and_cancels_pending() {
        let mut est = QuoteEstimator::default();
        est.request(QuoteInput::new(WETH, USDC, "3"));
        est.request(QuoteInput::new(WETH, USDC, ""));
        assert_eq!(est.current(), QuoteResult::default());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(est.current(), QuoteResult::default());
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_exponent_publishes_error_after_debounce() {
        let mut est = QuoteEstimator::default();
        est.request(QuoteInput::new(WETH, USDC, "1e2000000"));
        tokio::time::sleep(Duration::from_millis(310)).await;
        let q = est.current();
        assert!(!q.is_loading);
        assert_eq!(q.amount_out, U256::zero());
        assert_eq!(q.error.as_deref(), Some("Failed to calculate quote"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_token_is_blank() {
        let mut est = QuoteEstimator::default();
        est.request(QuoteInput {
            token_in: Some(WETH),
            token_out: None,
            amount_in: "1".into(),
        });
        assert_eq!(est.current(), QuoteResult::default());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_final_quote() {
        let mut est = QuoteEstimator::new(Duration::from_millis(50));
        let mut rx = est.subscribe();
        est.request(QuoteInput::new(WETH, USDC, "0.5"));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.has_changed().unwrap());
        let q = rx.borrow_and_update().clone();
        assert_eq!(q.amount_out_formatted, "1594.400000");
    }
}
