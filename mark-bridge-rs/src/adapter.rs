use crate::BridgeError;
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use mark_rs::{
    config::AssetConfig,
    types::{BridgeTag, TransactionMemo, TransactionReceipt, TransactionRequest},
};

/// A configured route lane resolved against the chain configuration: chain
/// ids plus the asset's deployment on each side. All amounts crossing this
/// boundary are in the origin asset's native precision.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub origin_chain_id: u64,
    pub destination_chain_id: u64,
    pub origin_asset: AssetConfig,
    pub destination_asset: AssetConfig,
    /// The origin asset is the origin chain's wrapped-native token.
    pub origin_wrapped_native: bool,
    /// The destination asset is the destination chain's wrapped-native token.
    pub destination_wrapped_native: bool,
}

/// One prepared transaction in a `send` list. The single `Rebalance` leg
/// establishes the bridge intent on-chain; any others are preparatory.
#[derive(Debug, Clone)]
pub struct SendLeg {
    pub memo: TransactionMemo,
    pub transaction: TransactionRequest,
    /// Set when the adapter capped the input; the caller must treat this as
    /// the true amount dispatched.
    pub effective_amount: Option<U256>,
}

impl SendLeg {
    pub fn new(memo: TransactionMemo, transaction: TransactionRequest) -> Self {
        Self { memo, transaction, effective_amount: None }
    }
}

/// Behavioral contract over heterogeneous bridges. The wire protocol behind
/// each implementation (REST, RPC, on-chain calls) is private to it.
#[async_trait]
pub trait BridgeAdapter: Send + Sync {
    fn bridge(&self) -> BridgeTag;

    /// Expected destination output for `amount_native` sent over `route`.
    /// Deterministic for identical inputs within the quote validity window.
    async fn quote(&self, amount_native: U256, route: &ResolvedRoute)
        -> Result<U256, BridgeError>;

    /// Bridge-enforced lower bound for the route, when one exists.
    async fn min_amount(&self, route: &ResolvedRoute) -> Result<Option<U256>, BridgeError> {
        let _ = route;
        Ok(None)
    }

    /// Prepare the ordered transaction list that dispatches the transfer.
    async fn send(
        &self,
        refund_address: Address,
        recipient: Address,
        amount_native: U256,
        route: &ResolvedRoute,
    ) -> Result<Vec<SendLeg>, BridgeError>;

    /// Whether the destination side of this specific transfer is finalized.
    /// Pure read; safe to call repeatedly.
    async fn destination_ready(
        &self,
        amount_native: U256,
        route: &ResolvedRoute,
        origin_receipt: &TransactionReceipt,
    ) -> Result<bool, BridgeError>;

    /// Transaction to submit on the destination chain to complete the
    /// transfer, or `None` when no callback is needed. Invoked at most once
    /// after `destination_ready` returns true.
    async fn destination_callback(
        &self,
        route: &ResolvedRoute,
        origin_receipt: &TransactionReceipt,
    ) -> Result<Option<TransactionRequest>, BridgeError>;
}
