use alloy::primitives::B256;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The two kinds of ledger writes the orchestrator issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteKind {
    Approve,
    Swap,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => f.write_str("approve"),
            Self::Swap => f.write_str("swap"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwapError {
    #[error("no amount entered")]
    NoAmount,

    #[error("no quote available for the current amount")]
    NoQuote,

    #[error("insufficient {0} balance")]
    InsufficientBalance(String),

    #[error("slippage tolerance {0} is outside [0, 50] percent")]
    ToleranceOutOfRange(String),

    #[error("wallet rejected the {0} request: {1}")]
    WalletRejected(WriteKind, String),

    #[error("{0} transaction {1:#x} reverted")]
    Reverted(WriteKind, B256),

    #[error("{0} transaction {1:#x} was not confirmed: {2}")]
    ConfirmationFailed(WriteKind, B256, String),
}

impl SwapError {
    /// Stable machine-readable code for CLI output.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoAmount => "no_amount",
            Self::NoQuote => "no_quote",
            Self::InsufficientBalance(_) => "insufficient_balance",
            Self::ToleranceOutOfRange(_) => "tolerance_out_of_range",
            Self::WalletRejected(..) => "wallet_rejected",
            Self::Reverted(..) => "reverted",
            Self::ConfirmationFailed(..) => "confirmation_failed",
        }
    }

    /// Input rejections never reached the ledger.
    pub const fn is_input_rejection(&self) -> bool {
        matches!(
            self,
            Self::NoAmount
                | Self::NoQuote
                | Self::InsufficientBalance(_)
                | Self::ToleranceOutOfRange(_)
        )
    }
}
