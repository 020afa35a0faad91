//! Durable state: earmarks and rebalance operations.
//!
//! The traits here are the contract the engine works against; `PgStore` is
//! the production implementation and `MemoryStore` backs tests and local
//! runs. Cross-row references are by id only.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::types::{
    BridgeTag, Earmark, EarmarkStatus, RebalanceOperation, RebalanceStatus, TransactionEntry,
};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Wall-clock TTL after which an in-flight operation may be expired. The
/// sweep is an administrative action, never part of the hot loop.
pub const OPERATION_TTL_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another instance holds the active earmark for this invoice. Callers
    /// must re-read instead of treating this as fatal.
    #[error("an active earmark already exists for invoice {invoice_id}")]
    UniqueEarmarkConflict { invoice_id: String },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("cannot move {entity} {id} from {from} to {to}")]
    InvalidTransition { entity: &'static str, id: Uuid, from: String, to: String },
    #[error("operation insert requires a confirmed origin-chain receipt")]
    MissingOriginReceipt,
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct NewEarmark {
    pub invoice_id: String,
    pub designated_purchase_chain: u64,
    pub ticker_hash: B256,
    pub min_amount: U256,
    pub status: EarmarkStatus,
}

#[derive(Debug, Clone, Default)]
pub struct EarmarkFilter {
    pub statuses: Option<Vec<EarmarkStatus>>,
    pub designated_purchase_chain: Option<u64>,
    pub ticker_hash: Option<B256>,
    pub invoice_id: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Earmark-presence dimension of an operation query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EarmarkScope {
    #[default]
    Any,
    /// `earmark_id IS NULL`.
    Standalone,
    /// `earmark_id IS NOT NULL`.
    Owned,
}

#[derive(Debug, Clone, Default)]
pub struct OperationFilter {
    pub statuses: Option<Vec<RebalanceStatus>>,
    /// Matches either side of the transfer.
    pub chain_id: Option<u64>,
    pub earmark: EarmarkScope,
    /// Resolved through the owning earmark.
    pub invoice_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct NewRebalanceOperation {
    pub earmark_id: Option<Uuid>,
    pub origin_chain_id: u64,
    pub destination_chain_id: u64,
    pub ticker_hash: B256,
    /// Native-precision amount as dispatched (the effective amount when the
    /// adapter capped the input).
    pub amount_native: U256,
    pub slippage_dbps: u32,
    pub bridge: BridgeTag,
    pub recipient: Address,
    pub is_orphaned: bool,
    /// Must contain a confirmed receipt under `origin_chain_id`.
    pub transactions: HashMap<u64, TransactionEntry>,
}

impl NewRebalanceOperation {
    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        let confirmed = self
            .transactions
            .get(&self.origin_chain_id)
            .map(|entry| entry.receipt.is_some())
            .unwrap_or(false);
        if !confirmed {
            return Err(StoreError::MissingOriginReceipt);
        }
        Ok(())
    }
}

/// Partial update of an operation; `transactions` entries are merged per
/// chain, never clobbering other chains.
#[derive(Debug, Clone, Default)]
pub struct RebalanceOperationUpdate {
    pub status: Option<RebalanceStatus>,
    pub transactions: Option<HashMap<u64, TransactionEntry>>,
}

#[async_trait]
pub trait EarmarkStore: Send + Sync {
    /// Insert a new earmark. Fails with [`StoreError::UniqueEarmarkConflict`]
    /// when the invoice already has an earmark in an active status.
    async fn create_earmark(&self, new: NewEarmark) -> Result<Earmark, StoreError>;

    /// The `PENDING`/`READY` earmark for an invoice, if any.
    async fn active_earmark_for_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<Option<Earmark>, StoreError>;

    async fn get_earmark(&self, id: Uuid) -> Result<Option<Earmark>, StoreError>;

    /// Filtered listing, always ordered by `created_at` descending.
    async fn get_earmarks(&self, filter: &EarmarkFilter) -> Result<Vec<Earmark>, StoreError>;

    async fn update_earmark_status(
        &self,
        id: Uuid,
        status: EarmarkStatus,
    ) -> Result<Earmark, StoreError>;

    /// Atomically orphan every still-in-flight operation of the earmark and
    /// set the earmark to `CANCELLED`. Terminal earmarks cannot be cancelled.
    async fn cancel_earmark_and_orphan(&self, id: Uuid) -> Result<Earmark, StoreError>;
}

#[async_trait]
pub trait RebalanceOperationStore: Send + Sync {
    async fn create_rebalance_operation(
        &self,
        new: NewRebalanceOperation,
    ) -> Result<RebalanceOperation, StoreError>;

    async fn get_rebalance_operation(
        &self,
        id: Uuid,
    ) -> Result<Option<RebalanceOperation>, StoreError>;

    /// Filtered, paginated listing ordered by `created_at` descending.
    async fn get_rebalance_operations(
        &self,
        filter: &OperationFilter,
    ) -> Result<Vec<RebalanceOperation>, StoreError>;

    async fn operations_for_earmark(
        &self,
        earmark_id: Uuid,
    ) -> Result<Vec<RebalanceOperation>, StoreError>;

    async fn update_rebalance_operation(
        &self,
        id: Uuid,
        update: RebalanceOperationUpdate,
    ) -> Result<RebalanceOperation, StoreError>;

    /// Cancel one in-flight operation. `orphan` additionally flags the row;
    /// the flag only ever moves from `false` to `true`.
    async fn cancel_rebalance_operation(
        &self,
        id: Uuid,
        orphan: bool,
    ) -> Result<RebalanceOperation, StoreError>;

    /// Administrative sweep: expire in-flight operations created before the
    /// cutoff. Never called from the hot loop.
    async fn expire_operations_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// Convenience bound for components that need both stores behind one handle.
pub trait Store: EarmarkStore + RebalanceOperationStore {}

impl<T: EarmarkStore + RebalanceOperationStore> Store for T {}
