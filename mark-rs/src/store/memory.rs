use super::{
    EarmarkFilter, EarmarkScope, EarmarkStore, NewEarmark, NewRebalanceOperation, OperationFilter,
    RebalanceOperationStore, RebalanceOperationUpdate, StoreError,
};
use crate::types::{Earmark, EarmarkStatus, RebalanceOperation, RebalanceStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

/// In-memory implementation of both stores, mirroring the Postgres contract
/// including the unique-active-earmark constraint. Backs tests and
/// database-less local runs; nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    earmarks: HashMap<Uuid, Earmark>,
    operations: HashMap<Uuid, RebalanceOperation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T>(mut rows: Vec<T>, limit: Option<u32>, offset: Option<u32>) -> Vec<T> {
    let offset = offset.unwrap_or(0) as usize;
    if offset > 0 {
        rows = rows.into_iter().skip(offset).collect();
    }
    if let Some(limit) = limit {
        rows.truncate(limit as usize);
    }
    rows
}

#[async_trait]
impl EarmarkStore for MemoryStore {
    async fn create_earmark(&self, new: NewEarmark) -> Result<Earmark, StoreError> {
        let mut inner = self.inner.lock();
        let conflict = inner
            .earmarks
            .values()
            .any(|earmark| earmark.invoice_id == new.invoice_id && earmark.is_active());
        if conflict && new.status.is_active() {
            return Err(StoreError::UniqueEarmarkConflict { invoice_id: new.invoice_id });
        }
        let now = Utc::now();
        let earmark = Earmark {
            id: Uuid::new_v4(),
            invoice_id: new.invoice_id,
            designated_purchase_chain: new.designated_purchase_chain,
            ticker_hash: new.ticker_hash,
            min_amount: new.min_amount,
            status: new.status,
            created_at: now,
            updated_at: now,
        };
        inner.earmarks.insert(earmark.id, earmark.clone());
        Ok(earmark)
    }

    async fn active_earmark_for_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<Option<Earmark>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .earmarks
            .values()
            .filter(|earmark| earmark.invoice_id == invoice_id && earmark.is_active())
            .max_by_key(|earmark| earmark.created_at)
            .cloned())
    }

    async fn get_earmark(&self, id: Uuid) -> Result<Option<Earmark>, StoreError> {
        Ok(self.inner.lock().earmarks.get(&id).cloned())
    }

    async fn get_earmarks(&self, filter: &EarmarkFilter) -> Result<Vec<Earmark>, StoreError> {
        let inner = self.inner.lock();
        let mut rows: Vec<Earmark> = inner
            .earmarks
            .values()
            .filter(|earmark| {
                filter
                    .statuses
                    .as_ref()
                    .map(|statuses| statuses.contains(&earmark.status))
                    .unwrap_or(true)
                    && filter
                        .designated_purchase_chain
                        .map(|chain| earmark.designated_purchase_chain == chain)
                        .unwrap_or(true)
                    && filter.ticker_hash.map(|ticker| earmark.ticker_hash == ticker).unwrap_or(true)
                    && filter
                        .invoice_id
                        .as_ref()
                        .map(|invoice| &earmark.invoice_id == invoice)
                        .unwrap_or(true)
                    && filter.created_after.map(|after| earmark.created_at >= after).unwrap_or(true)
                    && filter
                        .created_before
                        .map(|before| earmark.created_at < before)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, filter.limit, filter.offset))
    }

    async fn update_earmark_status(
        &self,
        id: Uuid,
        status: EarmarkStatus,
    ) -> Result<Earmark, StoreError> {
        let mut inner = self.inner.lock();
        let earmark =
            inner.earmarks.get_mut(&id).ok_or(StoreError::NotFound { entity: "earmark", id })?;
        earmark.status = status;
        earmark.updated_at = Utc::now();
        Ok(earmark.clone())
    }

    async fn cancel_earmark_and_orphan(&self, id: Uuid) -> Result<Earmark, StoreError> {
        let mut inner = self.inner.lock();
        let status = inner
            .earmarks
            .get(&id)
            .map(|earmark| earmark.status)
            .ok_or(StoreError::NotFound { entity: "earmark", id })?;
        if status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                entity: "earmark",
                id,
                from: status.to_string(),
                to: EarmarkStatus::Cancelled.to_string(),
            });
        }
        let now = Utc::now();
        for operation in inner.operations.values_mut() {
            if operation.earmark_id == Some(id) && operation.status.is_in_flight() {
                operation.is_orphaned = true;
                operation.updated_at = now;
            }
        }
        let earmark = inner.earmarks.get_mut(&id).expect("checked above");
        earmark.status = EarmarkStatus::Cancelled;
        earmark.updated_at = now;
        Ok(earmark.clone())
    }
}

#[async_trait]
impl RebalanceOperationStore for MemoryStore {
    async fn create_rebalance_operation(
        &self,
        new: NewRebalanceOperation,
    ) -> Result<RebalanceOperation, StoreError> {
        new.validate()?;
        let mut inner = self.inner.lock();
        let now = Utc::now();
        let operation = RebalanceOperation {
            id: Uuid::new_v4(),
            earmark_id: new.earmark_id,
            origin_chain_id: new.origin_chain_id,
            destination_chain_id: new.destination_chain_id,
            ticker_hash: new.ticker_hash,
            amount_native: new.amount_native,
            slippage_dbps: new.slippage_dbps,
            bridge: new.bridge,
            status: RebalanceStatus::Pending,
            is_orphaned: new.is_orphaned,
            recipient: new.recipient,
            transactions: new.transactions,
            created_at: now,
            updated_at: now,
        };
        inner.operations.insert(operation.id, operation.clone());
        Ok(operation)
    }

    async fn get_rebalance_operation(
        &self,
        id: Uuid,
    ) -> Result<Option<RebalanceOperation>, StoreError> {
        Ok(self.inner.lock().operations.get(&id).cloned())
    }

    async fn get_rebalance_operations(
        &self,
        filter: &OperationFilter,
    ) -> Result<Vec<RebalanceOperation>, StoreError> {
        let inner = self.inner.lock();
        let mut rows: Vec<RebalanceOperation> = inner
            .operations
            .values()
            .filter(|operation| {
                filter
                    .statuses
                    .as_ref()
                    .map(|statuses| statuses.contains(&operation.status))
                    .unwrap_or(true)
                    && filter
                        .chain_id
                        .map(|chain| {
                            operation.origin_chain_id == chain
                                || operation.destination_chain_id == chain
                        })
                        .unwrap_or(true)
                    && match filter.earmark {
                        EarmarkScope::Any => true,
                        EarmarkScope::Standalone => operation.earmark_id.is_none(),
                        EarmarkScope::Owned => operation.earmark_id.is_some(),
                    }
                    && filter
                        .invoice_id
                        .as_ref()
                        .map(|invoice| {
                            operation
                                .earmark_id
                                .and_then(|earmark_id| inner.earmarks.get(&earmark_id))
                                .map(|earmark| &earmark.invoice_id == invoice)
                                .unwrap_or(false)
                        })
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, filter.limit, filter.offset))
    }

    async fn operations_for_earmark(
        &self,
        earmark_id: Uuid,
    ) -> Result<Vec<RebalanceOperation>, StoreError> {
        let inner = self.inner.lock();
        let mut rows: Vec<RebalanceOperation> = inner
            .operations
            .values()
            .filter(|operation| operation.earmark_id == Some(earmark_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn update_rebalance_operation(
        &self,
        id: Uuid,
        update: RebalanceOperationUpdate,
    ) -> Result<RebalanceOperation, StoreError> {
        let mut inner = self.inner.lock();
        let operation = inner
            .operations
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "rebalance operation", id })?;
        if let Some(status) = update.status {
            operation.status = status;
        }
        if let Some(transactions) = update.transactions {
            // merge per chain, leaving other chains' entries intact
            operation.transactions.extend(transactions);
        }
        operation.updated_at = Utc::now();
        Ok(operation.clone())
    }

    async fn cancel_rebalance_operation(
        &self,
        id: Uuid,
        orphan: bool,
    ) -> Result<RebalanceOperation, StoreError> {
        let mut inner = self.inner.lock();
        let operation = inner
            .operations
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "rebalance operation", id })?;
        if !operation.status.is_in_flight() {
            return Err(StoreError::InvalidTransition {
                entity: "rebalance operation",
                id,
                from: operation.status.to_string(),
                to: RebalanceStatus::Cancelled.to_string(),
            });
        }
        operation.status = RebalanceStatus::Cancelled;
        operation.is_orphaned = operation.is_orphaned || orphan;
        operation.updated_at = Utc::now();
        Ok(operation.clone())
    }

    async fn expire_operations_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let mut expired = 0;
        for operation in inner.operations.values_mut() {
            if operation.status.is_in_flight() && operation.created_at < cutoff {
                operation.status = RebalanceStatus::Expired;
                operation.updated_at = Utc::now();
                expired += 1;
            }
        }
        Ok(expired)
    }
}
