use alloy_primitives::B256;
use mark_rs::{cache::CacheError, chain::ChainError, hub::HubError, store::StoreError};
use mark_bridge_rs::BridgeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Hub(#[from] HubError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Config(#[from] mark_rs::config::ConfigError),
    /// A confirmed on-chain send could not be persisted. Operators must
    /// reconcile against the referenced hash.
    #[error("failed to persist operation after confirmed send {tx_hash}: {source}")]
    WriteAfterSend { tx_hash: B256, source: StoreError },
}
