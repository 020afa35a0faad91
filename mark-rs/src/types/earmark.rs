use alloy_primitives::{B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// A reservation of destination liquidity tied to one invoice.
///
/// At most one earmark per invoice may be in an active status
/// (`PENDING` or `READY`); the store enforces this with a partial unique
/// index and surfaces collisions as a distinct conflict error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Earmark {
    pub id: Uuid,
    pub invoice_id: String,
    pub designated_purchase_chain: u64,
    pub ticker_hash: B256,
    /// Canonical 18-decimal amount required on the designated chain.
    #[serde(with = "crate::serde::amount_str")]
    pub min_amount: U256,
    pub status: EarmarkStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Earmark {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EarmarkStatus {
    Initiating,
    Pending,
    Ready,
    Completed,
    Cancelled,
    Failed,
    Expired,
}

impl EarmarkStatus {
    /// Statuses covered by the unique-active-per-invoice constraint.
    pub const ACTIVE: [EarmarkStatus; 2] = [EarmarkStatus::Pending, EarmarkStatus::Ready];

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Ready)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiating => "INITIATING",
            Self::Pending => "PENDING",
            Self::Ready => "READY",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for EarmarkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EarmarkStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIATING" => Ok(Self::Initiating),
            "PENDING" => Ok(Self::Pending),
            "READY" => Ok(Self::Ready),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            "FAILED" => Ok(Self::Failed),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid status `{0}`")]
pub struct InvalidStatus(pub String);
