//! Indicative collateral swap quotes.

pub mod calc;
pub mod estimator;

pub use calc::{estimate_quote, flash_loan_fee, min_amount_out};
pub use estimator::{DEBOUNCE, QuoteEstimator, QuoteInput};
