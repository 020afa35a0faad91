//! Contract of the external chain-service that fronts raw RPC and signing,
//! plus the HTTP client implementation speaking to it.

use crate::types::{GasResource, SubmittedTransaction, TransactionRequest};
use alloy_primitives::{address, Address, Bytes, U256};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Sentinel token address denoting a chain's native asset in balance reads.
pub const NATIVE_TOKEN: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain-service request timed out")]
    Timeout,
    #[error("chain-service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transaction reverted on chain {chain_id}: {hash}")]
    Reverted { chain_id: u64, hash: String },
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected chain-service response: {0}")]
    UnexpectedResponse(String),
}

impl ChainError {
    /// Transient faults are swallowed at the balance-aggregation seam and
    /// propagated at the submission seam.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Transport(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

/// The chain collaborator: balance reads, monitored submission, and read-only
/// contract calls. Implementations front the actual transports.
#[async_trait]
pub trait ChainService: Send + Sync {
    /// Token balance of `owner` on `chain_id`, in the token's native
    /// precision. Pass [`NATIVE_TOKEN`] for the native asset.
    async fn get_balance(
        &self,
        chain_id: u64,
        owner: Address,
        token: Address,
    ) -> Result<U256, ChainError>;

    /// Balance of one gas resource for `owner`, in native units.
    async fn get_gas_balance(
        &self,
        chain_id: u64,
        owner: Address,
        resource: GasResource,
    ) -> Result<U256, ChainError>;

    /// Submit a prepared transaction and wait for its confirmed receipt.
    async fn submit_and_monitor(
        &self,
        chain_id: u64,
        request: TransactionRequest,
    ) -> Result<SubmittedTransaction, ChainError>;

    /// Read-only contract call; returns the raw return data.
    async fn read_tx(
        &self,
        chain_id: u64,
        to: Address,
        data: Bytes,
    ) -> Result<Bytes, ChainError>;
}

/// HTTP client for the chain-service sidecar.
#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct BalanceResponse {
    #[serde(with = "crate::serde::amount_str")]
    balance: U256,
}

#[derive(Deserialize)]
struct ReadResponse {
    data: Bytes,
}

impl Client {
    pub fn new(endpoint: &str) -> Self {
        let client = reqwest::Client::new();
        Self { client, endpoint: endpoint.trim_end_matches('/').to_string() }
    }

    async fn check<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ChainError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChainError::Status { status: status.as_u16(), message });
        }
        response.json().await.map_err(From::from)
    }
}

#[async_trait]
impl ChainService for Client {
    async fn get_balance(
        &self,
        chain_id: u64,
        owner: Address,
        token: Address,
    ) -> Result<U256, ChainError> {
        let endpoint = &self.endpoint;
        let url = format!("{endpoint}/chains/{chain_id}/balances/{owner}/{token}");
        let response = self.client.get(url).send().await?;
        let response: BalanceResponse = self.check(response).await?;
        Ok(response.balance)
    }

    async fn get_gas_balance(
        &self,
        chain_id: u64,
        owner: Address,
        resource: GasResource,
    ) -> Result<U256, ChainError> {
        let endpoint = &self.endpoint;
        let url = format!("{endpoint}/chains/{chain_id}/gas/{owner}?resource={resource}");
        let response = self.client.get(url).send().await?;
        let response: BalanceResponse = self.check(response).await?;
        Ok(response.balance)
    }

    async fn submit_and_monitor(
        &self,
        chain_id: u64,
        request: TransactionRequest,
    ) -> Result<SubmittedTransaction, ChainError> {
        let endpoint = &self.endpoint;
        let url = format!("{endpoint}/chains/{chain_id}/transactions");
        let response = self.client.post(url).json(&request).send().await?;
        let submitted: SubmittedTransaction = self.check(response).await?;
        if !submitted.receipt.success {
            return Err(ChainError::Reverted { chain_id, hash: submitted.hash.to_string() });
        }
        Ok(submitted)
    }

    async fn read_tx(
        &self,
        chain_id: u64,
        to: Address,
        data: Bytes,
    ) -> Result<Bytes, ChainError> {
        let endpoint = &self.endpoint;
        let url = format!("{endpoint}/chains/{chain_id}/read");
        let body = serde_json::json!({ "to": to, "data": data });
        let response = self.client.post(url).json(&body).send().await?;
        let response: ReadResponse = self.check(response).await?;
        Ok(response.data)
    }
}
