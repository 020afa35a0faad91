use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Role of one prepared transaction inside an adapter's `send` list.
///
/// Adapters return an ordered list; the single `Rebalance` entry is the one
/// that establishes the bridge intent on-chain, the rest are preparatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionMemo {
    Unwrap,
    Approval,
    Stake,
    Rebalance,
    Wrap,
    Callback,
}

impl std::fmt::Display for TransactionMemo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let memo = match self {
            Self::Unwrap => "unwrap",
            Self::Approval => "approval",
            Self::Stake => "stake",
            Self::Rebalance => "rebalance",
            Self::Wrap => "wrap",
            Self::Callback => "callback",
        };
        f.write_str(memo)
    }
}

/// A transaction prepared by an adapter or the hub, ready for submission
/// through the chain-service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub to: Address,
    pub data: Bytes,
    #[serde(with = "crate::serde::amount_str")]
    pub value: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Human-readable function signature, carried for tracing only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func_sig: Option<String>,
}

/// Receipt returned by the chain-service once a submission is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    /// `true` iff the transaction executed without reverting.
    pub success: bool,
}

/// Hash/receipt pair returned by `submit_and_monitor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTransaction {
    pub hash: B256,
    pub receipt: TransactionReceipt,
}

/// One per-chain entry in a rebalance operation's `transactions` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEntry {
    pub hash: B256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<TransactionReceipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl From<&SubmittedTransaction> for TransactionEntry {
    fn from(submitted: &SubmittedTransaction) -> Self {
        Self { hash: submitted.hash, receipt: Some(submitted.receipt.clone()), metadata: None }
    }
}
