//! Resolution of configured routes against chain/asset configuration.

use mark_bridge_rs::ResolvedRoute;
use mark_rs::{
    config::{Config, Route},
    types::RebalanceOperation,
};

/// Resolve a configured route into the chain/asset lane adapters work with.
/// Returns `None` when the asset is not configured on both sides (validated
/// at startup, so this is defensive only for drifted config).
pub fn resolve_route(config: &Config, route: &Route) -> Option<ResolvedRoute> {
    let origin_asset = config.asset_by_symbol(route.origin, &route.asset)?.clone();
    let destination_asset = config.asset_by_symbol(route.destination, &route.asset)?.clone();
    let wrapped = |chain_id: u64, address| {
        config.chain(chain_id).and_then(|chain| chain.wrapped_native).map(|wrapped| wrapped == address).unwrap_or(false)
    };
    Some(ResolvedRoute {
        origin_chain_id: route.origin,
        destination_chain_id: route.destination,
        origin_wrapped_native: wrapped(route.origin, origin_asset.address),
        destination_wrapped_native: wrapped(route.destination, destination_asset.address),
        origin_asset,
        destination_asset,
    })
}

/// Find the configured route an in-flight operation was dispatched on.
pub fn route_for_operation<'a>(
    config: &'a Config,
    operation: &RebalanceOperation,
) -> Option<&'a Route> {
    config
        .on_demand_routes
        .iter()
        .chain(config.routes.iter())
        .find(|route| {
            route.origin == operation.origin_chain_id
                && route.destination == operation.destination_chain_id
                && config
                    .asset_by_symbol(route.origin, &route.asset)
                    .map(|asset| asset.ticker_hash == operation.ticker_hash)
                    .unwrap_or(false)
        })
}
