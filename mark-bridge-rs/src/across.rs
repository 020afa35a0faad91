//! Intent-pool bridge adapter in the Across style: quotes come from the
//! bridge's fee API, the origin leg deposits into a per-chain spoke pool, and
//! relayers fill the destination side. No callback of our own is needed,
//! except wrapping the output when the configured destination asset is
//! wrapped-native.

use crate::{
    adapter::{BridgeAdapter, ResolvedRoute, SendLeg},
    evm, BridgeError,
};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use mark_rs::types::{BridgeTag, TransactionMemo, TransactionReceipt, TransactionRequest};
use serde::Deserialize;
use std::collections::HashMap;

const DEPOSIT_SIGNATURE: &str = "deposit(address,address,uint256,uint256,address)";

#[derive(Debug, Clone, Deserialize)]
pub struct AcrossConfig {
    pub endpoint: String,
    /// Spoke pool deployment per chain.
    #[serde(with = "mark_rs::serde::u64_key_map")]
    pub spoke_pools: HashMap<u64, Address>,
}

pub struct Across {
    client: reqwest::Client,
    config: AcrossConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestedFees {
    total_relay_fee: RelayFee,
    #[serde(default)]
    is_amount_too_low: bool,
    #[serde(default, with = "mark_rs::serde::optional_amount_str")]
    min_deposit: Option<U256>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayFee {
    #[serde(with = "mark_rs::serde::amount_str")]
    total: U256,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Limits {
    #[serde(with = "mark_rs::serde::amount_str")]
    min_deposit: U256,
    #[serde(with = "mark_rs::serde::amount_str")]
    max_deposit: U256,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositStatus {
    status: String,
    #[serde(default, with = "mark_rs::serde::optional_amount_str")]
    output_amount: Option<U256>,
}

impl Across {
    pub fn new(config: AcrossConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    fn spoke_pool(&self, route: &ResolvedRoute) -> Result<Address, BridgeError> {
        self.config.spoke_pools.get(&route.origin_chain_id).copied().ok_or_else(|| {
            BridgeError::UnsupportedRoute {
                origin: route.origin_chain_id,
                destination: route.destination_chain_id,
                symbol: route.origin_asset.symbol.clone(),
            }
        })
    }

    async fn check<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, BridgeError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::Api { status: status.as_u16(), message });
        }
        response.json().await.map_err(From::from)
    }

    async fn suggested_fees(
        &self,
        amount: U256,
        route: &ResolvedRoute,
    ) -> Result<SuggestedFees, BridgeError> {
        let endpoint = &self.config.endpoint;
        let response = self
            .client
            .get(format!("{endpoint}/suggested-fees"))
            .query(&[
                ("originChainId", route.origin_chain_id.to_string()),
                ("destinationChainId", route.destination_chain_id.to_string()),
                ("token", route.origin_asset.address.to_string()),
                ("amount", amount.to_string()),
            ])
            .send()
            .await?;
        self.check(response).await
    }

    async fn limits(&self, route: &ResolvedRoute) -> Result<Limits, BridgeError> {
        let endpoint = &self.config.endpoint;
        let response = self
            .client
            .get(format!("{endpoint}/limits"))
            .query(&[
                ("originChainId", route.origin_chain_id.to_string()),
                ("destinationChainId", route.destination_chain_id.to_string()),
                ("token", route.origin_asset.address.to_string()),
            ])
            .send()
            .await?;
        self.check(response).await
    }

    async fn deposit_status(
        &self,
        route: &ResolvedRoute,
        origin_receipt: &TransactionReceipt,
    ) -> Result<DepositStatus, BridgeError> {
        let endpoint = &self.config.endpoint;
        let response = self
            .client
            .get(format!("{endpoint}/deposits/status"))
            .query(&[
                ("originChainId", route.origin_chain_id.to_string()),
                ("transactionHash", origin_receipt.transaction_hash.to_string()),
            ])
            .send()
            .await?;
        self.check(response).await
    }

    fn deposit_leg(
        &self,
        spoke_pool: Address,
        refund_address: Address,
        recipient: Address,
        amount: U256,
        route: &ResolvedRoute,
        native: bool,
    ) -> TransactionRequest {
        let data = evm::encode_call(
            DEPOSIT_SIGNATURE,
            &[
                evm::address_word(recipient),
                evm::address_word(route.origin_asset.address),
                evm::amount_word(amount),
                evm::u64_word(route.destination_chain_id),
                evm::address_word(refund_address),
            ],
        );
        TransactionRequest {
            to: spoke_pool,
            data,
            value: if native { amount } else { U256::ZERO },
            from: None,
            func_sig: Some(DEPOSIT_SIGNATURE.to_string()),
        }
    }
}

#[async_trait]
impl BridgeAdapter for Across {
    fn bridge(&self) -> BridgeTag {
        BridgeTag::Across
    }

    async fn quote(
        &self,
        amount_native: U256,
        route: &ResolvedRoute,
    ) -> Result<U256, BridgeError> {
        self.spoke_pool(route)?;
        let fees = self.suggested_fees(amount_native, route).await?;
        if fees.is_amount_too_low {
            return Err(BridgeError::BelowMinimum {
                amount: amount_native,
                minimum: fees.min_deposit.unwrap_or_default(),
            });
        }
        let fee = fees.total_relay_fee.total;
        if fee >= amount_native {
            return Err(BridgeError::BelowMinimum { amount: amount_native, minimum: fee });
        }
        Ok(amount_native - fee)
    }

    async fn min_amount(&self, route: &ResolvedRoute) -> Result<Option<U256>, BridgeError> {
        let limits = self.limits(route).await?;
        Ok(Some(limits.min_deposit))
    }

    async fn send(
        &self,
        refund_address: Address,
        recipient: Address,
        amount_native: U256,
        route: &ResolvedRoute,
    ) -> Result<Vec<SendLeg>, BridgeError> {
        let spoke_pool = self.spoke_pool(route)?;
        let limits = self.limits(route).await?;
        if amount_native < limits.min_deposit {
            return Err(BridgeError::BelowMinimum {
                amount: amount_native,
                minimum: limits.min_deposit,
            });
        }
        // per-asset ceiling: cap silently and report the effective amount
        let effective = amount_native.min(limits.max_deposit);
        let capped = effective < amount_native;

        let mut legs = Vec::with_capacity(2);
        if route.origin_wrapped_native {
            // the pool takes native; unwrap first and send the value along
            legs.push(SendLeg::new(
                TransactionMemo::Unwrap,
                TransactionRequest {
                    to: route.origin_asset.address,
                    data: evm::wrapped_native_withdraw(effective),
                    value: U256::ZERO,
                    from: None,
                    func_sig: Some("withdraw(uint256)".to_string()),
                },
            ));
            legs.push(SendLeg {
                memo: TransactionMemo::Rebalance,
                transaction: self
                    .deposit_leg(spoke_pool, refund_address, recipient, effective, route, true),
                effective_amount: capped.then_some(effective),
            });
        } else {
            legs.push(SendLeg::new(
                TransactionMemo::Approval,
                TransactionRequest {
                    to: route.origin_asset.address,
                    data: evm::erc20_approve(spoke_pool, effective),
                    value: U256::ZERO,
                    from: None,
                    func_sig: Some("approve(address,uint256)".to_string()),
                },
            ));
            legs.push(SendLeg {
                memo: TransactionMemo::Rebalance,
                transaction: self
                    .deposit_leg(spoke_pool, refund_address, recipient, effective, route, false),
                effective_amount: capped.then_some(effective),
            });
        }
        Ok(legs)
    }

    async fn destination_ready(
        &self,
        _amount_native: U256,
        route: &ResolvedRoute,
        origin_receipt: &TransactionReceipt,
    ) -> Result<bool, BridgeError> {
        let status = self.deposit_status(route, origin_receipt).await?;
        Ok(status.status == "filled")
    }

    async fn destination_callback(
        &self,
        route: &ResolvedRoute,
        origin_receipt: &TransactionReceipt,
    ) -> Result<Option<TransactionRequest>, BridgeError> {
        if !route.destination_wrapped_native {
            return Ok(None);
        }
        // relayers fill in native; wrap what arrived back into the
        // configured asset
        let status = self.deposit_status(route, origin_receipt).await?;
        let output_amount = status.output_amount.ok_or_else(|| {
            BridgeError::Protocol("filled deposit is missing its output amount".to_string())
        })?;
        Ok(Some(TransactionRequest {
            to: route.destination_asset.address,
            data: evm::wrapped_native_deposit(),
            value: output_amount,
            from: None,
            func_sig: Some("deposit()".to_string()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mark_rs::config::AssetConfig;

    fn route(origin_wrapped: bool) -> ResolvedRoute {
        let asset = |chain: u8| AssetConfig {
            symbol: "WETH".to_string(),
            address: Address::repeat_byte(chain),
            decimals: 18,
            ticker_hash: alloy_primitives::B256::repeat_byte(1),
            is_native: false,
        };
        ResolvedRoute {
            origin_chain_id: 1,
            destination_chain_id: 8453,
            origin_asset: asset(0x0a),
            destination_asset: asset(0x0b),
            origin_wrapped_native: origin_wrapped,
            destination_wrapped_native: false,
        }
    }

    fn adapter() -> Across {
        Across::new(AcrossConfig {
            endpoint: "http://across.test".to_string(),
            spoke_pools: HashMap::from([(1, Address::repeat_byte(0x55))]),
        })
    }

    #[test]
    fn deposit_leg_carries_value_only_for_native() {
        let adapter = adapter();
        let route = route(true);
        let spoke = Address::repeat_byte(0x55);
        let amount = U256::from(1000);

        let native =
            adapter.deposit_leg(spoke, Address::ZERO, Address::repeat_byte(2), amount, &route, true);
        assert_eq!(native.value, amount);
        assert_eq!(native.to, spoke);

        let erc20 = adapter.deposit_leg(
            spoke,
            Address::ZERO,
            Address::repeat_byte(2),
            amount,
            &route,
            false,
        );
        assert_eq!(erc20.value, U256::ZERO);
    }

    #[tokio::test]
    async fn unknown_origin_is_unsupported() {
        let adapter = adapter();
        let mut route = route(false);
        route.origin_chain_id = 10;
        let err = adapter.quote(U256::from(1000), &route).await.unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedRoute { .. }));
    }
}
