//! Multi-source balance aggregation into the canonical 18-decimal unit.
//!
//! Every read fans out concurrently and every per-call failure maps to a
//! zero balance rather than a surfaced error: one broken RPC must not poison
//! the whole map, the planner simply avoids that chain.

use alloy_primitives::U256;
use futures::future::join_all;
use mark_rs::{
    chain::{ChainService, NATIVE_TOKEN},
    config::Config,
    hub::HubContract,
    types::{BalanceMap, GasBalanceMap},
    units,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct BalanceAggregator {
    config: Arc<Config>,
    chain: Arc<dyn ChainService>,
    hub_contract: HubContract,
}

impl BalanceAggregator {
    pub fn new(config: Arc<Config>, chain: Arc<dyn ChainService>, hub_contract: HubContract) -> Self {
        Self { config, chain, hub_contract }
    }

    /// Wallet balances per `(ticker, chain)`, scoped-wallet aware.
    pub async fn owned_balances(&self) -> BalanceMap {
        let reads = self.configured_assets().map(|(chain_id, asset)| {
            let chain = self.chain.clone();
            let owner = self.config.balance_owner(chain_id);
            let token = if asset.is_native { NATIVE_TOKEN } else { asset.address };
            let (ticker, decimals, symbol) = (asset.ticker_hash, asset.decimals, asset.symbol.clone());
            async move {
                let balance = match chain.get_balance(chain_id, owner, token).await {
                    Ok(balance) => balance,
                    Err(err) => {
                        tracing::warn!(%err, chain_id, %symbol, "balance read failed, reporting zero");
                        U256::ZERO
                    }
                };
                (ticker, chain_id, units::to_canonical(balance, decimals))
            }
        });
        collect_balances(join_all(reads).await)
    }

    /// Balances custodied by the hub contract per `(ticker, chain)`.
    pub async fn custodied_balances(&self) -> BalanceMap {
        let reads = self.configured_assets().map(|(chain_id, asset)| {
            let hub = self.hub_contract.clone();
            let (ticker, decimals, symbol) = (asset.ticker_hash, asset.decimals, asset.symbol.clone());
            let token = asset.address;
            async move {
                let balance = match hub.custodied_assets(token, chain_id).await {
                    Ok(balance) => balance,
                    Err(err) => {
                        tracing::warn!(%err, chain_id, %symbol, "custodied read failed, reporting zero");
                        U256::ZERO
                    }
                };
                (ticker, chain_id, units::to_canonical(balance, decimals))
            }
        });
        collect_balances(join_all(reads).await)
    }

    /// Native gas balances per `(chain, resource)`. Chains with a
    /// dual-resource model report one entry per resource; failed chains
    /// contribute no entries.
    pub async fn gas_balances(&self) -> GasBalanceMap {
        let reads = self.config.chains.iter().flat_map(|(&chain_id, chain_config)| {
            chain_config.gas_model.resources().iter().map(move |&resource| {
                let chain = self.chain.clone();
                let owner = self.config.balance_owner(chain_id);
                async move {
                    match chain.get_gas_balance(chain_id, owner, resource).await {
                        Ok(balance) => Some(((chain_id, resource), balance)),
                        Err(err) => {
                            tracing::warn!(%err, chain_id, %resource, "gas read failed");
                            None
                        }
                    }
                }
            })
        });
        join_all(reads).await.into_iter().flatten().collect()
    }

    fn configured_assets(
        &self,
    ) -> impl Iterator<Item = (u64, mark_rs::config::AssetConfig)> + '_ {
        self.config.chains.iter().flat_map(|(&chain_id, chain_config)| {
            chain_config
                .assets
                .iter()
                .filter(|asset| self.config.supported_tickers.contains(&asset.ticker_hash))
                .map(move |asset| (chain_id, asset.clone()))
        })
    }
}

fn collect_balances(reads: Vec<(alloy_primitives::B256, u64, U256)>) -> BalanceMap {
    let mut map = BalanceMap::new();
    for (ticker, chain_id, amount) in reads {
        let entry = map.entry(ticker).or_default().entry(chain_id).or_default();
        *entry += amount;
    }
    map
}
