//! Burn-and-mint bridge adapter in the CCTP style: the origin leg burns the
//! asset through a per-chain token messenger, an off-chain attestation
//! service signs the message, and the transfer completes with an explicit
//! `receiveMessage` callback on the destination transmitter.

use crate::{
    adapter::{BridgeAdapter, ResolvedRoute, SendLeg},
    evm, BridgeError,
};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use mark_rs::{
    types::{BridgeTag, TransactionMemo, TransactionReceipt, TransactionRequest},
    units,
};
use serde::Deserialize;
use std::collections::HashMap;

const DEPOSIT_FOR_BURN_SIGNATURE: &str = "depositForBurn(uint256,uint32,bytes32,address)";
const RECEIVE_MESSAGE_SIGNATURE: &str = "receiveMessage(bytes,bytes)";

/// The only asset the burn-and-mint path carries.
const SUPPORTED_SYMBOL: &str = "USDC";

#[derive(Debug, Clone, Deserialize)]
pub struct CctpConfig {
    /// Attestation service endpoint.
    pub endpoint: String,
    #[serde(with = "mark_rs::serde::u64_key_map")]
    pub token_messengers: HashMap<u64, Address>,
    #[serde(with = "mark_rs::serde::u64_key_map")]
    pub message_transmitters: HashMap<u64, Address>,
    /// Protocol domain id per chain id.
    #[serde(with = "mark_rs::serde::u64_key_map")]
    pub domains: HashMap<u64, u32>,
}

pub struct Cctp {
    client: reqwest::Client,
    config: CctpConfig,
}

#[derive(Deserialize)]
struct MessagesResponse {
    messages: Vec<AttestedMessage>,
}

#[derive(Deserialize)]
struct AttestedMessage {
    message: String,
    attestation: String,
}

impl AttestedMessage {
    fn is_attested(&self) -> bool {
        self.attestation.starts_with("0x")
    }
}

struct Lane {
    messenger: Address,
    transmitter: Address,
    origin_domain: u32,
    destination_domain: u32,
}

impl Cctp {
    pub fn new(config: CctpConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    fn lane(&self, route: &ResolvedRoute) -> Result<Lane, BridgeError> {
        let unsupported = || BridgeError::UnsupportedRoute {
            origin: route.origin_chain_id,
            destination: route.destination_chain_id,
            symbol: route.origin_asset.symbol.clone(),
        };
        if route.origin_asset.symbol != SUPPORTED_SYMBOL
            || route.destination_asset.symbol != SUPPORTED_SYMBOL
        {
            return Err(unsupported());
        }
        Ok(Lane {
            messenger: *self
                .config
                .token_messengers
                .get(&route.origin_chain_id)
                .ok_or_else(unsupported)?,
            transmitter: *self
                .config
                .message_transmitters
                .get(&route.destination_chain_id)
                .ok_or_else(unsupported)?,
            origin_domain: *self
                .config
                .domains
                .get(&route.origin_chain_id)
                .ok_or_else(unsupported)?,
            destination_domain: *self
                .config
                .domains
                .get(&route.destination_chain_id)
                .ok_or_else(unsupported)?,
        })
    }

    async fn fetch_messages(
        &self,
        origin_domain: u32,
        origin_receipt: &TransactionReceipt,
    ) -> Result<Vec<AttestedMessage>, BridgeError> {
        let endpoint = &self.config.endpoint;
        let tx_hash = origin_receipt.transaction_hash;
        let url = format!("{endpoint}/v1/messages/{origin_domain}/{tx_hash}");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            // the attestation service has not yet observed the burn
            return Ok(vec![]);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::Api { status: status.as_u16(), message });
        }
        let response: MessagesResponse = response.json().await?;
        Ok(response.messages)
    }
}

#[async_trait]
impl BridgeAdapter for Cctp {
    fn bridge(&self) -> BridgeTag {
        BridgeTag::Cctp
    }

    async fn quote(
        &self,
        amount_native: U256,
        route: &ResolvedRoute,
    ) -> Result<U256, BridgeError> {
        self.lane(route)?;
        if amount_native.is_zero() {
            return Err(BridgeError::BelowMinimum {
                amount: amount_native,
                minimum: U256::from(1),
            });
        }
        // burn-and-mint is 1:1; only the precision can differ between sides
        let canonical = units::to_canonical(amount_native, route.origin_asset.decimals);
        Ok(units::from_canonical(canonical, route.destination_asset.decimals))
    }

    async fn send(
        &self,
        _refund_address: Address,
        recipient: Address,
        amount_native: U256,
        route: &ResolvedRoute,
    ) -> Result<Vec<SendLeg>, BridgeError> {
        let lane = self.lane(route)?;
        if amount_native.is_zero() {
            return Err(BridgeError::BelowMinimum {
                amount: amount_native,
                minimum: U256::from(1),
            });
        }
        let burn = evm::encode_call(
            DEPOSIT_FOR_BURN_SIGNATURE,
            &[
                evm::amount_word(amount_native),
                evm::u64_word(u64::from(lane.destination_domain)),
                evm::address_word(recipient),
                evm::address_word(route.origin_asset.address),
            ],
        );
        Ok(vec![
            SendLeg::new(
                TransactionMemo::Approval,
                TransactionRequest {
                    to: route.origin_asset.address,
                    data: evm::erc20_approve(lane.messenger, amount_native),
                    value: U256::ZERO,
                    from: None,
                    func_sig: Some("approve(address,uint256)".to_string()),
                },
            ),
            SendLeg::new(
                TransactionMemo::Rebalance,
                TransactionRequest {
                    to: lane.messenger,
                    data: burn,
                    value: U256::ZERO,
                    from: None,
                    func_sig: Some(DEPOSIT_FOR_BURN_SIGNATURE.to_string()),
                },
            ),
        ])
    }

    async fn destination_ready(
        &self,
        _amount_native: U256,
        route: &ResolvedRoute,
        origin_receipt: &TransactionReceipt,
    ) -> Result<bool, BridgeError> {
        let lane = self.lane(route)?;
        let messages = self.fetch_messages(lane.origin_domain, origin_receipt).await?;
        Ok(!messages.is_empty() && messages.iter().all(AttestedMessage::is_attested))
    }

    async fn destination_callback(
        &self,
        route: &ResolvedRoute,
        origin_receipt: &TransactionReceipt,
    ) -> Result<Option<TransactionRequest>, BridgeError> {
        let lane = self.lane(route)?;
        let messages = self.fetch_messages(lane.origin_domain, origin_receipt).await?;
        let attested = messages.iter().find(|message| message.is_attested()).ok_or_else(|| {
            BridgeError::Protocol("destination marked ready without an attestation".to_string())
        })?;
        let decode = |field: &str, value: &str| {
            hex::decode(value.trim_start_matches("0x"))
                .map_err(|err| BridgeError::Protocol(format!("invalid {field} hex: {err}")))
        };
        let message = decode("message", &attested.message)?;
        let attestation = decode("attestation", &attested.attestation)?;
        Ok(Some(TransactionRequest {
            to: lane.transmitter,
            data: evm::encode_two_bytes_call(RECEIVE_MESSAGE_SIGNATURE, &message, &attestation),
            value: U256::ZERO,
            from: None,
            func_sig: Some(RECEIVE_MESSAGE_SIGNATURE.to_string()),
        }))
    }
}
