use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The requested transfer is under the bridge-enforced lower bound.
    /// Planners treat this as "try the next preference".
    #[error("amount {amount} is below the bridge minimum {minimum}")]
    BelowMinimum { amount: U256, minimum: U256 },
    #[error("route {origin} -> {destination} is not supported for `{symbol}`")]
    UnsupportedRoute { origin: u64, destination: u64, symbol: String },
    #[error("bridge API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    /// The bridge returned a structurally invalid response or violated one of
    /// its own invariants; never recorded as an operation.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl BridgeError {
    pub fn is_below_minimum(&self) -> bool {
        matches!(self, Self::BelowMinimum { .. } | Self::UnsupportedRoute { .. })
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status >= 500,
            Self::Transport(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}
