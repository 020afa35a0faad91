use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregated balances in the canonical 18-decimal unit:
/// `ticker hash → chain id → amount`.
pub type BalanceMap = HashMap<B256, HashMap<u64, U256>>;

/// Native-unit gas balances keyed by `(chain id, resource)`.
pub type GasBalanceMap = HashMap<(u64, GasResource), U256>;

/// Gas resource dimension. Most chains meter a single resource; chains with a
/// dual-resource model report bandwidth and energy separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasResource {
    Gas,
    Bandwidth,
    Energy,
}

impl std::fmt::Display for GasResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let repr = match self {
            Self::Gas => "gas",
            Self::Bandwidth => "bandwidth",
            Self::Energy => "energy",
        };
        f.write_str(repr)
    }
}

/// Metering model of one chain, from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasModel {
    #[default]
    Single,
    DualResource,
}

impl GasModel {
    pub fn resources(&self) -> &'static [GasResource] {
        match self {
            Self::Single => &[GasResource::Gas],
            Self::DualResource => &[GasResource::Bandwidth, GasResource::Energy],
        }
    }
}
