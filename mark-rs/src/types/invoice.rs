use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An unpaid cross-chain intent held by the hub, eligible for third-party
/// fulfilment. Read-only to the core: each tick works on an immutable
/// snapshot fetched from the hub API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub intent_id: String,
    pub ticker_hash: B256,
    /// Canonical 18-decimal amount.
    #[serde(with = "crate::serde::amount_str")]
    pub amount: U256,
    /// Candidate settlement chains, in the order preferred by the intent owner.
    pub destinations: Vec<u64>,
    pub hub_enqueued_timestamp: u64,
    pub status: InvoiceStatus,
}

impl Invoice {
    /// Seconds elapsed since the hub enqueued the invoice.
    pub fn age(&self, now_unix: u64) -> u64 {
        now_unix.saturating_sub(self.hub_enqueued_timestamp)
    }
}

impl std::fmt::Display for Invoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let intent_id = &self.intent_id;
        let amount = &self.amount;
        let destinations = &self.destinations;
        write!(f, "invoice {intent_id} for {amount} to any of {destinations:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Invoiced,
    Settled,
    Dispatched,
}

/// Per-destination minimum owned balance the agent must present to settle an
/// invoice there, as reported by the hub.
pub type MinAmounts = HashMap<u64, U256>;
