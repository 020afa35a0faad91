use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifies one bridge implementation in the adapter registry.
///
/// Tags are persisted on rebalance-operation rows, so renaming a variant is a
/// data migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeTag {
    Across,
    Cctp,
}

impl BridgeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Across => "across",
            Self::Cctp => "cctp",
        }
    }
}

impl std::fmt::Display for BridgeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BridgeTag {
    type Err = UnknownBridgeTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "across" => Ok(Self::Across),
            "cctp" => Ok(Self::Cctp),
            other => Err(UnknownBridgeTag(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown bridge tag `{0}`")]
pub struct UnknownBridgeTag(pub String);
