use crate::{
    types::{BridgeTag, GasModel},
    units::DBPS_DENOMINATOR,
};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, net::Ipv4Addr, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config from `{path}`: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("could not parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("no chains configured")]
    NoChains,
    #[error("no supported tickers configured")]
    NoTickers,
    #[error("admin token must not be empty")]
    EmptyAdminToken,
    #[error("route {origin} -> {destination} references unconfigured chain {chain}")]
    UnknownRouteChain { origin: u64, destination: u64, chain: u64 },
    #[error("route {origin} -> {destination}: asset `{asset}` is not configured on chain {chain}")]
    UnknownRouteAsset { origin: u64, destination: u64, asset: String, chain: u64 },
    #[error("route {origin} -> {destination}: no bridge preferences")]
    EmptyPreferences { origin: u64, destination: u64 },
    #[error(
        "route {origin} -> {destination}: {preferences} preferences but {slippages} slippage caps"
    )]
    SlippageArity { origin: u64, destination: u64, preferences: usize, slippages: usize },
    #[error("route {origin} -> {destination}: slippage {slippage} dbps is not below {}", DBPS_DENOMINATOR)]
    SlippageOutOfRange { origin: u64, destination: u64, slippage: u32 },
}

/// Load any `Deserialize`-able value from a TOML file.
pub fn from_toml_file<P: AsRef<Path> + fmt::Display, T: serde::de::DeserializeOwned>(
    path: P,
) -> Result<T, ConfigError> {
    let data = std::fs::read_to_string(path.as_ref())
        .map_err(|source| ConfigError::Io { path: path.to_string(), source })?;
    toml::from_str(&data).map_err(From::from)
}

/// The fully-resolved configuration the core consumes. Producing it (secret
/// reconstruction, hosted overrides) is the loader's problem, not ours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The agent's signing address.
    pub own_address: Address,
    /// Ticker hashes the agent is willing to fill invoices for.
    pub supported_tickers: Vec<B256>,
    #[serde(with = "crate::serde::u64_key_map")]
    pub chains: HashMap<u64, ChainConfig>,
    /// Routes for operator-initiated (standalone) rebalancing.
    #[serde(default)]
    pub routes: Vec<Route>,
    /// Routes the on-demand planner may draw on.
    #[serde(default)]
    pub on_demand_routes: Vec<Route>,
    pub hub: HubConfig,
    pub chain_service: ChainServiceConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub maker: MakerConfig,
}

impl Config {
    pub fn from_toml_file<P: AsRef<Path> + fmt::Display>(path: P) -> Result<Self, ConfigError> {
        tracing::info!("loading config from `{path}`...");
        let config: Self = from_toml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Startup validation. Configuration faults are fatal here and never
    /// surface in the hot loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chains.is_empty() {
            return Err(ConfigError::NoChains);
        }
        if self.supported_tickers.is_empty() {
            return Err(ConfigError::NoTickers);
        }
        if self.admin.token.is_empty() {
            return Err(ConfigError::EmptyAdminToken);
        }
        for route in self.routes.iter().chain(self.on_demand_routes.iter()) {
            route.validate(self)?;
        }
        Ok(())
    }

    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.get(&chain_id)
    }

    pub fn asset_by_ticker(&self, chain_id: u64, ticker_hash: B256) -> Option<&AssetConfig> {
        self.chain(chain_id)?.assets.iter().find(|asset| asset.ticker_hash == ticker_hash)
    }

    pub fn asset_by_symbol(&self, chain_id: u64, symbol: &str) -> Option<&AssetConfig> {
        self.chain(chain_id)?.assets.iter().find(|asset| asset.symbol == symbol)
    }

    /// The address whose balances count as "owned" on a chain: the scoped
    /// execution safe when one is configured, the agent key otherwise.
    pub fn balance_owner(&self, chain_id: u64) -> Address {
        self.chain(chain_id)
            .and_then(|chain| chain.scoped_execution.as_ref())
            .map(|scoped| scoped.safe)
            .unwrap_or(self.own_address)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// RPC endpoints, consumed by the external chain-service; carried here so
    /// one resolved object configures the whole deployment.
    #[serde(default)]
    pub providers: Vec<String>,
    pub assets: Vec<AssetConfig>,
    /// Known contract deployments on this chain, by name.
    #[serde(default)]
    pub deployments: HashMap<String, Address>,
    /// Minimum invoice age (seconds) before this chain's invoices are acted on.
    #[serde(default = "default_invoice_age")]
    pub invoice_age: u64,
    /// Below this native gas balance the chain is not used as a rebalance origin.
    #[serde(default, with = "crate::serde::amount_str")]
    pub gas_threshold: U256,
    #[serde(default)]
    pub gas_model: GasModel,
    /// Wrapped-native token on this chain, when one is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_native: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoped_execution: Option<ScopedExecutionConfig>,
}

fn default_invoice_age() -> u64 {
    600
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    pub ticker_hash: B256,
    pub is_native: bool,
}

/// A module + role + safe through which transactions must be routed instead
/// of the agent's direct address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedExecutionConfig {
    pub module: Address,
    pub role: B256,
    pub safe: Address,
}

/// A configured `(origin, destination, asset)` triple with ordered bridge
/// preferences and per-bridge slippage caps in deci-basis-points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub origin: u64,
    pub destination: u64,
    /// Asset symbol, resolved against each chain's asset list.
    pub asset: String,
    /// Per-transfer ceiling in origin-native units.
    #[serde(default, with = "crate::serde::optional_amount_str")]
    pub maximum: Option<U256>,
    /// Do-not-touch amount left on the origin, in the canonical unit.
    #[serde(default, with = "crate::serde::optional_amount_str")]
    pub reserve: Option<U256>,
    /// `slippages_dbps[i]` caps the tolerated slippage for `preferences[i]`.
    pub slippages_dbps: Vec<u32>,
    pub preferences: Vec<BridgeTag>,
}

impl Route {
    fn validate(&self, config: &Config) -> Result<(), ConfigError> {
        let (origin, destination) = (self.origin, self.destination);
        for chain in [origin, destination] {
            if config.chain(chain).is_none() {
                return Err(ConfigError::UnknownRouteChain { origin, destination, chain });
            }
            if config.asset_by_symbol(chain, &self.asset).is_none() {
                return Err(ConfigError::UnknownRouteAsset {
                    origin,
                    destination,
                    asset: self.asset.clone(),
                    chain,
                });
            }
        }
        if self.preferences.is_empty() {
            return Err(ConfigError::EmptyPreferences { origin, destination });
        }
        if self.preferences.len() != self.slippages_dbps.len() {
            return Err(ConfigError::SlippageArity {
                origin,
                destination,
                preferences: self.preferences.len(),
                slippages: self.slippages_dbps.len(),
            });
        }
        if let Some(&slippage) =
            self.slippages_dbps.iter().find(|&&slippage| u64::from(slippage) >= DBPS_DENOMINATOR)
        {
            return Err(ConfigError::SlippageOutOfRange { origin, destination, slippage });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    pub endpoint: String,
    /// Chain the hub contract is deployed on.
    pub chain_id: u64,
    /// Hub contract address, read for custodied balances.
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainServiceConfig {
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_host")]
    pub host: Ipv4Addr,
    #[serde(default = "default_admin_port")]
    pub port: u16,
    /// Shared secret expected in the `x-admin-token` header.
    pub token: String,
}

fn default_admin_host() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_admin_port() -> u16 {
    8380
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MakerConfig {
    pub invoice_poll_interval_secs: u64,
    pub callback_poll_interval_secs: u64,
    /// Whether sends persisted by a race-losing instance (standalone rows)
    /// are additionally flagged as orphaned.
    pub orphan_standalone_operations: bool,
    pub pause: PauseDefaults,
}

impl Default for MakerConfig {
    fn default() -> Self {
        Self {
            invoice_poll_interval_secs: 30,
            callback_poll_interval_secs: 15,
            orphan_standalone_operations: false,
            pause: PauseDefaults::default(),
        }
    }
}

/// Flags applied to the cache at startup; absence in the cache means
/// "not paused".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PauseDefaults {
    pub purchase: bool,
    pub rebalance: bool,
    pub ondemand: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(symbol: &str, ticker: u8) -> AssetConfig {
        AssetConfig {
            symbol: symbol.to_string(),
            address: Address::repeat_byte(ticker),
            decimals: 18,
            ticker_hash: B256::repeat_byte(ticker),
            is_native: false,
        }
    }

    fn chain(symbols: &[(&str, u8)]) -> ChainConfig {
        ChainConfig {
            providers: vec![],
            assets: symbols.iter().map(|(symbol, ticker)| asset(symbol, *ticker)).collect(),
            deployments: HashMap::new(),
            invoice_age: 0,
            gas_threshold: U256::ZERO,
            gas_model: GasModel::Single,
            wrapped_native: None,
            scoped_execution: None,
        }
    }

    fn config_with_route(route: Route) -> Config {
        Config {
            own_address: Address::repeat_byte(0xaa),
            supported_tickers: vec![B256::repeat_byte(1)],
            chains: HashMap::from([(1, chain(&[("WETH", 1)])), (8453, chain(&[("WETH", 1)]))]),
            routes: vec![],
            on_demand_routes: vec![route],
            hub: HubConfig {
                endpoint: "http://hub.test".to_string(),
                chain_id: 25327,
                address: Address::repeat_byte(0xbb),
            },
            chain_service: ChainServiceConfig { endpoint: "http://chains.test".to_string() },
            database: DatabaseConfig { url: "postgres://localhost/mark".to_string(), max_connections: 10 },
            redis: RedisConfig { url: "redis://localhost".to_string() },
            admin: AdminConfig { host: Ipv4Addr::LOCALHOST, port: 8380, token: "secret".to_string() },
            maker: MakerConfig::default(),
        }
    }

    fn route() -> Route {
        Route {
            origin: 1,
            destination: 8453,
            asset: "WETH".to_string(),
            maximum: None,
            reserve: None,
            slippages_dbps: vec![100],
            preferences: vec![BridgeTag::Across],
        }
    }

    #[test]
    fn accepts_well_formed_route() {
        config_with_route(route()).validate().unwrap();
    }

    #[test]
    fn rejects_slippage_arity_mismatch() {
        let mut route = route();
        route.slippages_dbps = vec![100, 200];
        let err = config_with_route(route).validate().unwrap_err();
        assert!(matches!(err, ConfigError::SlippageArity { .. }));
    }

    #[test]
    fn rejects_unconfigured_asset() {
        let mut route = route();
        route.asset = "USDC".to_string();
        let err = config_with_route(route).validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRouteAsset { .. }));
    }

    #[test]
    fn rejects_slippage_at_denominator() {
        let mut route = route();
        route.slippages_dbps = vec![DBPS_DENOMINATOR as u32];
        let err = config_with_route(route).validate().unwrap_err();
        assert!(matches!(err, ConfigError::SlippageOutOfRange { .. }));
    }

    #[test]
    fn balance_owner_prefers_scoped_safe() {
        let mut config = config_with_route(route());
        let safe = Address::repeat_byte(0xcc);
        config.chains.get_mut(&1).unwrap().scoped_execution = Some(ScopedExecutionConfig {
            module: Address::repeat_byte(0xdd),
            role: B256::repeat_byte(0xee),
            safe,
        });
        assert_eq!(config.balance_owner(1), safe);
        assert_eq!(config.balance_owner(8453), config.own_address);
    }
}
