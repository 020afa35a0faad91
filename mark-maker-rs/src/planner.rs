//! On-demand rebalance planning: pick the destination chain and the minimal
//! set of bridge operations that assemble enough liquidity to settle one
//! invoice.
//!
//! The planner mutates nothing; it is a function of the invoice, the hub's
//! minimum amounts, the balance snapshot, the active earmarks, the
//! configured routes, and the adapters' `quote`.

use crate::routes::resolve_route;
use alloy_primitives::{B256, U256};
use mark_bridge_rs::Registry;
use mark_rs::{
    config::{Config, Route},
    types::{BalanceMap, BridgeTag, Earmark, GasBalanceMap, GasResource, Invoice, MinAmounts},
    units::{self, DBPS_DENOMINATOR},
};
use std::{collections::HashMap, sync::Arc};

/// Residual needs within one smallest-unit of a 6-decimal token count as
/// fulfilled.
pub const ROUNDING_TOLERANCE_WEI: u64 = 1_000_000_000_000;

#[derive(Debug, Clone)]
pub struct PlannedOperation {
    pub route: Route,
    pub origin_chain_id: u64,
    pub ticker_hash: B256,
    /// Send amount in the origin asset's native precision.
    pub amount_native: U256,
    /// Quoted destination output in the canonical unit.
    pub expected_out: U256,
    pub bridge: BridgeTag,
    pub slippage_dbps: u32,
}

#[derive(Debug, Clone)]
pub struct RebalancePlan {
    pub destination_chain: u64,
    pub operations: Vec<PlannedOperation>,
    /// Sum of native send amounts, coarsely comparable across origins.
    pub total_amount_native: U256,
    /// Canonical amount required on the destination.
    pub min_amount: U256,
}

#[derive(Clone)]
pub struct Planner {
    config: Arc<Config>,
    registry: Registry,
}

/// `(designated chain, ticker) → Σ min_amount` over the active earmarks.
pub fn earmarked_funds(earmarks: &[Earmark]) -> HashMap<(u64, B256), U256> {
    let mut earmarked: HashMap<(u64, B256), U256> = HashMap::new();
    for earmark in earmarks.iter().filter(|earmark| earmark.is_active()) {
        let entry = earmarked
            .entry((earmark.designated_purchase_chain, earmark.ticker_hash))
            .or_default();
        *entry += earmark.min_amount;
    }
    earmarked
}

/// Owned balance net of what other earmarks already reserve there.
pub fn available_balance(
    balances: &BalanceMap,
    earmarked: &HashMap<(u64, B256), U256>,
    chain_id: u64,
    ticker: B256,
) -> U256 {
    let owned = balances
        .get(&ticker)
        .and_then(|per_chain| per_chain.get(&chain_id))
        .copied()
        .unwrap_or_default();
    let reserved = earmarked.get(&(chain_id, ticker)).copied().unwrap_or_default();
    owned.saturating_sub(reserved)
}

struct Candidate {
    destination: u64,
    operations: Vec<PlannedOperation>,
    total_amount_native: U256,
    min_amount: U256,
}

impl Planner {
    pub fn new(config: Arc<Config>, registry: Registry) -> Self {
        Self { config, registry }
    }

    pub async fn plan(
        &self,
        invoice: &Invoice,
        min_amounts: &MinAmounts,
        balances: &BalanceMap,
        earmarks: &[Earmark],
        gas: &GasBalanceMap,
    ) -> Option<RebalancePlan> {
        let earmarked = earmarked_funds(earmarks);
        let ticker = invoice.ticker_hash;

        let mut candidates = Vec::new();
        for &destination in &invoice.destinations {
            let Some(&required) = min_amounts.get(&destination) else { continue };
            let available = available_balance(balances, &earmarked, destination, ticker);
            if available >= required {
                // directly purchasable, not a rebalance candidate
                continue;
            }
            let needed = required - available;
            if let Some(candidate) = self
                .plan_destination(invoice, destination, required, needed, balances, &earmarked, gas)
                .await
            {
                candidates.push(candidate);
            }
        }

        // fewest operations first, then smallest total input
        candidates.sort_by(|a, b| {
            a.operations
                .len()
                .cmp(&b.operations.len())
                .then(a.total_amount_native.cmp(&b.total_amount_native))
        });
        let chosen = candidates.into_iter().next()?;
        tracing::info!(
            invoice_id = %invoice.intent_id,
            destination = chosen.destination,
            operations = chosen.operations.len(),
            "on-demand plan selected"
        );
        Some(RebalancePlan {
            destination_chain: chosen.destination,
            operations: chosen.operations,
            total_amount_native: chosen.total_amount_native,
            min_amount: chosen.min_amount,
        })
    }

    async fn plan_destination(
        &self,
        invoice: &Invoice,
        destination: u64,
        required: U256,
        needed: U256,
        balances: &BalanceMap,
        earmarked: &HashMap<(u64, B256), U256>,
        gas: &GasBalanceMap,
    ) -> Option<Candidate> {
        let ticker = invoice.ticker_hash;
        let tolerance = U256::from(ROUNDING_TOLERANCE_WEI);

        // candidate routes into this destination carrying this ticker,
        // greediest origin first to minimize the operation count
        let mut routes: Vec<&Route> = self
            .config
            .on_demand_routes
            .iter()
            .filter(|route| {
                route.destination == destination
                    && self
                        .config
                        .asset_by_symbol(route.origin, &route.asset)
                        .map(|asset| asset.ticker_hash == ticker)
                        .unwrap_or(false)
                    && self.origin_has_gas(route.origin, gas)
            })
            .collect();
        routes.sort_by_key(|route| {
            std::cmp::Reverse(available_balance(balances, earmarked, route.origin, ticker))
        });

        let mut remaining = needed;
        let mut operations = Vec::new();
        let mut total_amount_native = U256::ZERO;

        for route in routes {
            if remaining <= tolerance {
                break;
            }
            let Some(operation) =
                self.try_route(route, ticker, remaining, balances, earmarked).await
            else {
                continue;
            };
            remaining = remaining.saturating_sub(operation.expected_out);
            total_amount_native += operation.amount_native;
            operations.push(operation);
        }

        if remaining > tolerance {
            tracing::debug!(
                invoice_id = %invoice.intent_id,
                destination,
                %remaining,
                "destination not viable"
            );
            return None;
        }
        Some(Candidate { destination, operations, total_amount_native, min_amount: required })
    }

    /// Walk a route's bridge preferences in order and return the first
    /// acceptable operation.
    async fn try_route(
        &self,
        route: &Route,
        ticker: B256,
        remaining: U256,
        balances: &BalanceMap,
        earmarked: &HashMap<(u64, B256), U256>,
    ) -> Option<PlannedOperation> {
        let origin_asset = self.config.asset_by_ticker(route.origin, ticker)?;
        let resolved = resolve_route(&self.config, route)?;
        let reserve = route.reserve.unwrap_or_default();
        let usable = available_balance(balances, earmarked, route.origin, ticker)
            .saturating_sub(reserve);
        if usable.is_zero() {
            return None;
        }

        let denominator = U256::from(DBPS_DENOMINATOR);
        for (index, &bridge) in route.preferences.iter().enumerate() {
            if !self.registry.contains(bridge) {
                tracing::warn!(%bridge, "route prefers an unregistered bridge, skipping");
                continue;
            }
            let slippage_dbps = route.slippages_dbps[index];

            // gross up the send so the post-slippage output still covers the
            // residual need, then cap at what the origin can spare
            let gross =
                remaining * denominator / (denominator - U256::from(slippage_dbps));
            let send = gross.min(usable);
            let mut amount_native = units::from_canonical(send, origin_asset.decimals);
            if let Some(maximum) = route.maximum {
                amount_native = amount_native.min(maximum);
            }
            if amount_native.is_zero() {
                continue;
            }

            let adapter = self.registry.adapter(bridge);
            let quoted_native = match adapter.quote(amount_native, &resolved).await {
                Ok(quoted) => quoted,
                Err(err) if err.is_below_minimum() => {
                    tracing::debug!(%err, %bridge, origin = route.origin, "bridge quote below minimum");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(%err, %bridge, origin = route.origin, "bridge quote failed");
                    continue;
                }
            };

            let sent = units::to_canonical(amount_native, origin_asset.decimals);
            let received = units::to_canonical(quoted_native, resolved.destination_asset.decimals);
            let realized_dbps = if received >= sent {
                U256::ZERO
            } else {
                (sent - received) * denominator / sent
            };
            if realized_dbps > U256::from(slippage_dbps) {
                tracing::debug!(
                    %bridge,
                    origin = route.origin,
                    realized = %realized_dbps,
                    cap = slippage_dbps,
                    "quote exceeds slippage cap"
                );
                continue;
            }

            return Some(PlannedOperation {
                route: route.clone(),
                origin_chain_id: route.origin,
                ticker_hash: ticker,
                amount_native,
                expected_out: received,
                bridge,
                slippage_dbps,
            });
        }
        None
    }

    fn origin_has_gas(&self, chain_id: u64, gas: &GasBalanceMap) -> bool {
        let Some(chain) = self.config.chain(chain_id) else { return false };
        if chain.gas_threshold.is_zero() {
            return true;
        }
        let resources: &[GasResource] = chain.gas_model.resources();
        let funded = resources.iter().all(|&resource| {
            gas.get(&(chain_id, resource)).copied().unwrap_or_default() >= chain.gas_threshold
        });
        if !funded {
            tracing::warn!(chain_id, "origin gas below threshold, excluded from planning");
        }
        funded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use async_trait::async_trait;
    use mark_bridge_rs::{BridgeAdapter, BridgeError, ResolvedRoute, SendLeg};
    use mark_rs::{
        config::{
            AdminConfig, AssetConfig, ChainConfig, ChainServiceConfig, DatabaseConfig, HubConfig,
            MakerConfig, RedisConfig,
        },
        types::{InvoiceStatus, TransactionReceipt, TransactionRequest},
    };
    use std::net::Ipv4Addr;

    const TICKER: B256 = B256::repeat_byte(0x77);
    const WEI: u64 = 1_000_000_000_000_000_000;

    /// Quotes `amount - amount * fee_dbps / M`; errors when configured to.
    struct StaticBridge {
        tag: BridgeTag,
        fee_dbps: u64,
        failing: bool,
    }

    #[async_trait]
    impl BridgeAdapter for StaticBridge {
        fn bridge(&self) -> BridgeTag {
            self.tag
        }

        async fn quote(
            &self,
            amount_native: U256,
            _route: &ResolvedRoute,
        ) -> Result<U256, BridgeError> {
            if self.failing {
                return Err(BridgeError::Api { status: 503, message: "unavailable".to_string() });
            }
            let fee = amount_native * U256::from(self.fee_dbps) / U256::from(DBPS_DENOMINATOR);
            Ok(amount_native - fee)
        }

        async fn send(
            &self,
            _refund_address: Address,
            _recipient: Address,
            _amount_native: U256,
            _route: &ResolvedRoute,
        ) -> Result<Vec<SendLeg>, BridgeError> {
            unreachable!("planner never sends")
        }

        async fn destination_ready(
            &self,
            _amount_native: U256,
            _route: &ResolvedRoute,
            _origin_receipt: &TransactionReceipt,
        ) -> Result<bool, BridgeError> {
            Ok(true)
        }

        async fn destination_callback(
            &self,
            _route: &ResolvedRoute,
            _origin_receipt: &TransactionReceipt,
        ) -> Result<Option<TransactionRequest>, BridgeError> {
            Ok(None)
        }
    }

    fn asset() -> AssetConfig {
        AssetConfig {
            symbol: "TKN".to_string(),
            address: Address::repeat_byte(0x70),
            decimals: 18,
            ticker_hash: TICKER,
            is_native: false,
        }
    }

    fn chain() -> ChainConfig {
        ChainConfig {
            providers: vec![],
            assets: vec![asset()],
            deployments: Default::default(),
            invoice_age: 0,
            gas_threshold: U256::ZERO,
            gas_model: Default::default(),
            wrapped_native: None,
            scoped_execution: None,
        }
    }

    fn route(origin: u64, destination: u64, slippage_dbps: u32) -> Route {
        Route {
            origin,
            destination,
            asset: "TKN".to_string(),
            maximum: None,
            reserve: None,
            slippages_dbps: vec![slippage_dbps],
            preferences: vec![BridgeTag::Across],
        }
    }

    fn config(chain_ids: &[u64], routes: Vec<Route>) -> Arc<Config> {
        Arc::new(Config {
            own_address: Address::repeat_byte(0xaa),
            supported_tickers: vec![TICKER],
            chains: chain_ids.iter().map(|&id| (id, chain())).collect(),
            routes: vec![],
            on_demand_routes: routes,
            hub: HubConfig {
                endpoint: "http://hub.test".to_string(),
                chain_id: 25327,
                address: Address::repeat_byte(0xbb),
            },
            chain_service: ChainServiceConfig { endpoint: "http://chains.test".to_string() },
            database: DatabaseConfig {
                url: "postgres://localhost/mark".to_string(),
                max_connections: 10,
            },
            redis: RedisConfig { url: "redis://localhost".to_string() },
            admin: AdminConfig {
                host: Ipv4Addr::LOCALHOST,
                port: 8380,
                token: "secret".to_string(),
            },
            maker: MakerConfig::default(),
        })
    }

    fn registry(fee_dbps: u64, failing: bool) -> Registry {
        let mut registry = Registry::new();
        registry.register(Arc::new(StaticBridge { tag: BridgeTag::Across, fee_dbps, failing }));
        registry
    }

    fn invoice(destinations: Vec<u64>) -> Invoice {
        Invoice {
            intent_id: "A".to_string(),
            ticker_hash: TICKER,
            amount: U256::from(WEI),
            destinations,
            hub_enqueued_timestamp: 0,
            status: InvoiceStatus::Invoiced,
        }
    }

    fn balances(entries: &[(u64, u64)]) -> BalanceMap {
        let per_chain = entries.iter().map(|&(chain, wei)| (chain, U256::from(wei))).collect();
        BalanceMap::from([(TICKER, per_chain)])
    }

    fn min_amounts(entries: &[(u64, u64)]) -> MinAmounts {
        entries.iter().map(|&(chain, wei)| (chain, U256::from(wei))).collect()
    }

    #[tokio::test]
    async fn sufficient_balance_is_not_a_rebalance_candidate() {
        let config = config(&[1, 8453], vec![route(1, 8453, 100)]);
        let planner = Planner::new(config, registry(0, false));
        let plan = planner
            .plan(
                &invoice(vec![8453]),
                &min_amounts(&[(8453, WEI)]),
                &balances(&[(8453, 2 * WEI), (1, 2 * WEI)]),
                &[],
                &GasBalanceMap::new(),
            )
            .await;
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn exact_balance_is_direct_purchase() {
        let config = config(&[1, 8453], vec![route(1, 8453, 1000)]);
        let planner = Planner::new(config, registry(500, false));
        let plan = planner
            .plan(
                &invoice(vec![8453]),
                &min_amounts(&[(8453, WEI)]),
                &balances(&[(8453, WEI), (1, 2 * WEI)]),
                &[],
                &GasBalanceMap::new(),
            )
            .await;
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn realized_slippage_above_cap_rejects_the_bridge() {
        // bridge realizes 500 dbps but the route only tolerates 100
        let config = config(&[1, 8453], vec![route(1, 8453, 100)]);
        let planner = Planner::new(config, registry(500, false));
        let plan = planner
            .plan(
                &invoice(vec![8453]),
                &min_amounts(&[(8453, WEI)]),
                &balances(&[(1, 2 * WEI)]),
                &[],
                &GasBalanceMap::new(),
            )
            .await;
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn single_hop_within_slippage_cap() {
        let config = config(&[1, 8453], vec![route(1, 8453, 1000)]);
        let planner = Planner::new(config, registry(500, false));
        let plan = planner
            .plan(
                &invoice(vec![8453]),
                &min_amounts(&[(8453, WEI)]),
                &balances(&[(1, 2 * WEI)]),
                &[],
                &GasBalanceMap::new(),
            )
            .await
            .expect("plan");
        assert_eq!(plan.destination_chain, 8453);
        assert_eq!(plan.operations.len(), 1);
        let operation = &plan.operations[0];
        assert_eq!(operation.origin_chain_id, 1);
        assert_eq!(operation.bridge, BridgeTag::Across);
        // grossed up to cover the need after slippage, within origin funds
        let gross = U256::from(WEI) * U256::from(DBPS_DENOMINATOR)
            / U256::from(DBPS_DENOMINATOR - 1000);
        assert_eq!(operation.amount_native, gross);
        assert!(operation.expected_out >= U256::from(WEI) - U256::from(ROUNDING_TOLERANCE_WEI));
        assert_eq!(plan.min_amount, U256::from(WEI));
    }

    #[tokio::test]
    async fn earmarked_funds_reduce_available_balance() {
        // 8453 owns enough on paper, but an earmark reserves it all
        let config = config(&[1, 8453], vec![route(1, 8453, 1000)]);
        let planner = Planner::new(config, registry(500, false));
        let earmark = Earmark {
            id: uuid::Uuid::new_v4(),
            invoice_id: "B".to_string(),
            designated_purchase_chain: 8453,
            ticker_hash: TICKER,
            min_amount: U256::from(2 * WEI),
            status: mark_rs::types::EarmarkStatus::Pending,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let plan = planner
            .plan(
                &invoice(vec![8453]),
                &min_amounts(&[(8453, WEI)]),
                &balances(&[(8453, 2 * WEI), (1, 3 * WEI)]),
                &[earmark],
                &GasBalanceMap::new(),
            )
            .await
            .expect("plan");
        assert_eq!(plan.operations.len(), 1);
    }

    #[tokio::test]
    async fn failing_quote_never_appears_in_the_plan() {
        let config = config(&[1, 8453], vec![route(1, 8453, 1000)]);
        let planner = Planner::new(config, registry(500, true));
        let plan = planner
            .plan(
                &invoice(vec![8453]),
                &min_amounts(&[(8453, WEI)]),
                &balances(&[(1, 2 * WEI)]),
                &[],
                &GasBalanceMap::new(),
            )
            .await;
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn greedy_origin_ordering_minimizes_operations() {
        let config = config(&[1, 10, 8453], vec![route(1, 8453, 1000), route(10, 8453, 1000)]);
        let planner = Planner::new(config, registry(0, false));
        // chain 10 alone covers the need; chain 1 would require two hops
        let plan = planner
            .plan(
                &invoice(vec![8453]),
                &min_amounts(&[(8453, WEI)]),
                &balances(&[(1, WEI / 2), (10, 3 * WEI)]),
                &[],
                &GasBalanceMap::new(),
            )
            .await
            .expect("plan");
        assert_eq!(plan.operations.len(), 1);
        assert_eq!(plan.operations[0].origin_chain_id, 10);
    }

    #[tokio::test]
    async fn accumulates_across_origins_until_covered() {
        let config = config(&[1, 10, 8453], vec![route(1, 8453, 1000), route(10, 8453, 1000)]);
        let planner = Planner::new(config, registry(0, false));
        let plan = planner
            .plan(
                &invoice(vec![8453]),
                &min_amounts(&[(8453, 2 * WEI)]),
                &balances(&[(1, WEI + WEI / 2), (10, WEI)]),
                &[],
                &GasBalanceMap::new(),
            )
            .await
            .expect("plan");
        assert_eq!(plan.operations.len(), 2);
        // greediest origin leads
        assert_eq!(plan.operations[0].origin_chain_id, 1);
        assert_eq!(plan.operations[1].origin_chain_id, 10);
    }

    #[tokio::test]
    async fn smaller_total_input_breaks_operation_count_ties() {
        // both destinations viable with one operation each; 42161 needs less
        let config = config(
            &[1, 10, 8453, 42161],
            vec![route(1, 8453, 1000), route(10, 42161, 1000)],
        );
        let planner = Planner::new(config, registry(0, false));
        let plan = planner
            .plan(
                &invoice(vec![8453, 42161]),
                &min_amounts(&[(8453, 2 * WEI), (42161, WEI)]),
                &balances(&[(1, 4 * WEI), (10, 4 * WEI)]),
                &[],
                &GasBalanceMap::new(),
            )
            .await
            .expect("plan");
        assert_eq!(plan.destination_chain, 42161);
    }

    #[tokio::test]
    async fn reserve_is_never_touched() {
        let mut reserved = route(1, 8453, 1000);
        reserved.reserve = Some(U256::from(WEI));
        let config = config(&[1, 8453], vec![reserved]);
        let planner = Planner::new(config, registry(0, false));
        // origin holds 1.5, reserve keeps 1.0, the need of 1.0 cannot be met
        let plan = planner
            .plan(
                &invoice(vec![8453]),
                &min_amounts(&[(8453, WEI)]),
                &balances(&[(1, WEI + WEI / 2)]),
                &[],
                &GasBalanceMap::new(),
            )
            .await;
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn route_maximum_caps_the_send() {
        let mut capped = route(1, 8453, 1000);
        capped.maximum = Some(U256::from(WEI / 2));
        let config = config(&[1, 8453], vec![capped]);
        let planner = Planner::new(config, registry(0, false));
        let plan = planner
            .plan(
                &invoice(vec![8453]),
                &min_amounts(&[(8453, WEI)]),
                &balances(&[(1, 3 * WEI)]),
                &[],
                &GasBalanceMap::new(),
            )
            .await;
        // one capped hop cannot cover the need and there is no second route
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn residual_within_tolerance_counts_as_fulfilled() {
        let config = config(&[1, 8453], vec![route(1, 8453, 1000)]);
        let planner = Planner::new(config, registry(0, false));
        // origin can spare a hair less than the need, inside the tolerance
        let short = WEI - (ROUNDING_TOLERANCE_WEI / 2);
        let plan = planner
            .plan(
                &invoice(vec![8453]),
                &min_amounts(&[(8453, WEI)]),
                &balances(&[(1, short)]),
                &[],
                &GasBalanceMap::new(),
            )
            .await;
        assert!(plan.is_some());
    }

    #[tokio::test]
    async fn gas_starved_origin_is_excluded() {
        let mut config = config(&[1, 8453], vec![route(1, 8453, 1000)]);
        Arc::get_mut(&mut config).unwrap().chains.get_mut(&1).unwrap().gas_threshold =
            U256::from(WEI);
        let planner = Planner::new(config, registry(0, false));
        let plan = planner
            .plan(
                &invoice(vec![8453]),
                &min_amounts(&[(8453, WEI)]),
                &balances(&[(1, 2 * WEI)]),
                &[],
                &GasBalanceMap::from([((1, GasResource::Gas), U256::from(1000))]),
            )
            .await;
        assert!(plan.is_none());
    }
}
