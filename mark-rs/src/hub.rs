//! Hub collaborators: the clearing API (HTTP) and the hub contract's
//! custodied-assets view, reached through the chain collaborator.

use crate::{
    chain::{ChainError, ChainService},
    config::HubConfig,
    types::{Invoice, MinAmounts},
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("chain read: {0}")]
    Chain(#[from] ChainError),
    #[error("unexpected hub response: {0}")]
    UnexpectedResponse(String),
}

/// Read side of the hub clearing API. Both operations are idempotent reads.
#[async_trait]
pub trait HubApi: Send + Sync {
    async fn get_outstanding_invoices(&self) -> Result<Vec<Invoice>, HubError>;

    async fn get_min_amounts(&self, intent_id: &str) -> Result<MinAmounts, HubError>;
}

/// Asset hash used by the hub to key custodied balances:
/// `keccak256(abi.encode(tokenAddress, chainId))`, bit-exact with the hub.
pub fn asset_hash(token: Address, chain_id: u64) -> B256 {
    let mut encoded = [0u8; 64];
    encoded[12..32].copy_from_slice(token.as_slice());
    encoded[32..64].copy_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    keccak256(encoded)
}

/// Calldata for the hub contract's `custodiedAssets(bytes32)` view.
pub fn custodied_assets_calldata(asset_hash: B256) -> Bytes {
    let selector = &keccak256(b"custodiedAssets(bytes32)")[..4];
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(selector);
    data.extend_from_slice(asset_hash.as_slice());
    data.into()
}

/// The hub contract collaborator, evaluated through the chain-service.
#[derive(Clone)]
pub struct HubContract {
    chain: std::sync::Arc<dyn ChainService>,
    chain_id: u64,
    address: Address,
}

impl HubContract {
    pub fn new(chain: std::sync::Arc<dyn ChainService>, config: &HubConfig) -> Self {
        Self { chain, chain_id: config.chain_id, address: config.address }
    }

    /// Amount of `(token, chain)` currently custodied by the hub, in the
    /// token's native precision.
    pub async fn custodied_assets(
        &self,
        token: Address,
        chain_id: u64,
    ) -> Result<U256, HubError> {
        let hash = asset_hash(token, chain_id);
        let data = custodied_assets_calldata(hash);
        let output = self.chain.read_tx(self.chain_id, self.address, data).await?;
        if output.len() < 32 {
            return Err(HubError::UnexpectedResponse(format!(
                "custodiedAssets returned {} bytes",
                output.len()
            )));
        }
        Ok(U256::from_be_slice(&output[..32]))
    }
}

/// HTTP client for the hub clearing API.
#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct InvoicesResponse {
    invoices: Vec<Invoice>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MinAmountsResponse {
    #[serde(with = "crate::serde::amount_map")]
    min_amounts: MinAmounts,
}

impl Client {
    pub fn new(endpoint: &str) -> Self {
        let client = reqwest::Client::new();
        Self { client, endpoint: endpoint.trim_end_matches('/').to_string() }
    }

    async fn check<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, HubError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(HubError::Status { status: status.as_u16(), message });
        }
        response.json().await.map_err(From::from)
    }
}

#[async_trait]
impl HubApi for Client {
    async fn get_outstanding_invoices(&self) -> Result<Vec<Invoice>, HubError> {
        let endpoint = &self.endpoint;
        let response = self.client.get(format!("{endpoint}/invoices")).send().await?;
        let response: InvoicesResponse = self.check(response).await?;
        Ok(response.invoices)
    }

    async fn get_min_amounts(&self, intent_id: &str) -> Result<MinAmounts, HubError> {
        let endpoint = &self.endpoint;
        let url = format!("{endpoint}/invoices/{intent_id}/min-amounts");
        let response = self.client.get(url).send().await?;
        let response: MinAmountsResponse = self.check(response).await?;
        Ok(response.min_amounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_hash_is_abi_encoded_keccak() {
        let token = Address::repeat_byte(0x11);
        let hash = asset_hash(token, 8453);

        // keccak over the 64-byte abi encoding of (address, uint256)
        let mut encoded = [0u8; 64];
        encoded[12..32].copy_from_slice(token.as_slice());
        encoded[63] = 0x05;
        encoded[62] = 0x21;
        assert_eq!(hash, keccak256(encoded));
    }

    #[test]
    fn custodied_assets_calldata_layout() {
        let hash = B256::repeat_byte(0x22);
        let data = custodied_assets_calldata(hash);
        assert_eq!(data.len(), 36);
        assert_eq!(&data[..4], &keccak256(b"custodiedAssets(bytes32)")[..4]);
        assert_eq!(&data[4..], hash.as_slice());
    }
}
