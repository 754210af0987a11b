//! Client-side core for swapping collateral inside a Compound V3 (Comet)
//! position.
//!
//! Readers for the position and swap history, an indicative quote
//! estimator, and the approve + swap orchestrator, all talking to the chain
//! through [`chain::ChainClient`].

pub mod analytics;
pub mod chain;
pub mod config;
pub mod errors;
pub mod models;
pub mod position;
pub mod prices;
pub mod quote;
pub mod registry;
pub mod swap;
pub mod utils;
