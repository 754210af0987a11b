use ethers::contract::ContractError;
use ethers::providers::Middleware;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),

    #[error("Middleware error: {0}")]
    Middleware(String),

    #[error("Wallet error: {0}")]
    Wallet(#[from] ethers::signers::WalletError),

    /// Contract call or transaction rejected by the node or reverted on-chain.
    #[error("Contract error: {message}")]
    Contract {
        short_message: Option<String>,
        message: String,
    },

    #[error("{0}")]
    Reverted(String),

    #[error("Wallet not connected")]
    NotConnected,

    #[error("CollateralSwap contract not deployed yet")]
    NotDeployed,

    #[error("A swap is already in progress")]
    SwapInProgress,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid swap: {0}")]
    InvalidSwap(String),

    #[error("Serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Other: {0}")]
    Other(String),
}

impl AppError {
    /// Short, display-oriented description if one is available.
    pub fn short_message(&self) -> Option<&str> {
        match self {
            AppError::Contract { short_message, .. } => short_message.as_deref(),
            AppError::Reverted(msg) => Some(msg),
            _ => None,
        }
    }

    /// Message suitable for an end user: the short message, else the full
    /// error text, else `fallback`.
    pub fn display_message(&self, fallback: &str) -> String {
        if let Some(short) = self.short_message().filter(|s| !s.trim().is_empty()) {
            return short.to_string();
        }
        let raw = self.to_string();
        if raw.trim().is_empty() {
            fallback.to_string()
        } else {
            raw
        }
    }
}

/// Convert an `ethers` contract error, keeping the decoded revert reason as
/// the short message.
pub fn contract_error<M: Middleware>(err: ContractError<M>) -> AppError {
    let short_message = err.decode_revert::<String>();
    AppError::Contract {
        short_message,
        message: err.to_string(),
    }
}

pub fn middleware_error<E: std::fmt::Display>(err: E) -> AppError {
    AppError::Middleware(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_message_prefers_short_message() {
        let err = AppError::Contract {
            short_message: Some("Insufficient collateral".into()),
            message: "execution reverted: Insufficient collateral (0x08c379a0...)".into(),
        };
        assert_eq!(err.display_message("Swap failed"), "Insufficient collateral");
    }

    #[test]
    fn display_message_falls_back_to_raw_message() {
        let err = AppError::Contract {
            short_message: None,
            message: "user rejected transaction".into(),
        };
        assert_eq!(
            err.display_message("Swap failed"),
            "Contract error: user rejected transaction"
        );
    }

    #[test]
    fn display_message_skips_blank_short_message() {
        let err = AppError::Contract {
            short_message: Some("  ".into()),
            message: "nonce too low".into(),
        };
        assert_eq!(err.display_message("Swap failed"), "Contract error: nonce too low");
    }

    #[test]
    fn display_message_uses_fallback_when_empty() {
        let err = AppError::Other(String::new());
        // "Other: " is never empty, so the raw text wins here
        assert_eq!(err.display_message("Swap failed"), "Other: ");
        let err = AppError::Reverted(String::new());
        assert_eq!(err.display_message("Swap failed"), "Swap failed");
    }
}
