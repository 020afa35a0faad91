use super::{BridgeTag, InvalidStatus, TransactionEntry};
use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, str::FromStr};
use uuid::Uuid;

/// One in-flight bridge transfer contributing liquidity to an earmark, or a
/// standalone transfer with no owning earmark.
///
/// A row exists only once the origin-chain send has a confirmed receipt; the
/// receipt is stored under `transactions[origin_chain_id]` at insert time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceOperation {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earmark_id: Option<Uuid>,
    pub origin_chain_id: u64,
    pub destination_chain_id: u64,
    pub ticker_hash: B256,
    /// Amount actually dispatched, in the origin asset's native precision.
    /// When the adapter capped the input this is the effective amount.
    #[serde(with = "crate::serde::amount_str")]
    pub amount_native: U256,
    pub slippage_dbps: u32,
    pub bridge: BridgeTag,
    pub status: RebalanceStatus,
    /// Set when the owning earmark was cancelled while this operation was
    /// still in flight; the status itself is untouched.
    pub is_orphaned: bool,
    pub recipient: Address,
    /// Per-chain transaction evidence, keyed by chain id.
    pub transactions: HashMap<u64, TransactionEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RebalanceOperation {
    pub fn origin_entry(&self) -> Option<&TransactionEntry> {
        self.transactions.get(&self.origin_chain_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebalanceStatus {
    Pending,
    AwaitingCallback,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl RebalanceStatus {
    /// Statuses the callback executor drives forward.
    pub const IN_FLIGHT: [RebalanceStatus; 2] =
        [RebalanceStatus::Pending, RebalanceStatus::AwaitingCallback];

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::AwaitingCallback)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_flight()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::AwaitingCallback => "AWAITING_CALLBACK",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for RebalanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RebalanceStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "AWAITING_CALLBACK" => Ok(Self::AwaitingCallback),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "EXPIRED" => Ok(Self::Expired),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}
