//! Implementation of the admin API over the stores and the pause gate.

use async_trait::async_trait;
use mark_rs::{
    admin::{
        AdminApi, AdminError, EarmarkListQuery, EarmarkWithOperations, OperationListQuery,
    },
    cache::{CacheError, PauseFlag, PauseStore},
    store::{EarmarkFilter, OperationFilter, Store, StoreError},
    types::{Earmark, RebalanceOperation},
};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 200;

#[derive(Clone)]
pub struct AdminHandle {
    store: Arc<dyn Store>,
    gate: Arc<dyn PauseStore>,
}

impl AdminHandle {
    pub fn new(store: Arc<dyn Store>, gate: Arc<dyn PauseStore>) -> Self {
        Self { store, gate }
    }
}

fn page_size(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
}

fn map_store_error(err: StoreError) -> AdminError {
    match err {
        StoreError::NotFound { id, .. } => AdminError::NotFound(id),
        StoreError::InvalidTransition { .. } => AdminError::BadRequest(err.to_string()),
        err => AdminError::Internal(err.to_string()),
    }
}

fn map_cache_error(err: CacheError) -> AdminError {
    match err {
        CacheError::AlreadySet { .. } => AdminError::Policy(err.to_string()),
        err => AdminError::Internal(err.to_string()),
    }
}

#[async_trait]
impl AdminApi for AdminHandle {
    async fn set_pause(&self, flag: PauseFlag, paused: bool) -> Result<(), AdminError> {
        self.gate.set_pause(flag, paused).await.map_err(map_cache_error)
    }

    async fn cancel_earmark(&self, earmark_id: Uuid) -> Result<Earmark, AdminError> {
        self.store.cancel_earmark_and_orphan(earmark_id).await.map_err(map_store_error)
    }

    async fn cancel_operation(
        &self,
        operation_id: Uuid,
    ) -> Result<RebalanceOperation, AdminError> {
        let operation = self
            .store
            .get_rebalance_operation(operation_id)
            .await
            .map_err(map_store_error)?
            .ok_or(AdminError::NotFound(operation_id))?;
        // earmark-bound operations become orphaned; standalone ones stay
        // non-orphaned
        let orphan = operation.earmark_id.is_some();
        self.store
            .cancel_rebalance_operation(operation_id, orphan)
            .await
            .map_err(map_store_error)
    }

    async fn list_operations(
        &self,
        query: OperationListQuery,
    ) -> Result<Vec<RebalanceOperation>, AdminError> {
        let filter = OperationFilter {
            statuses: query.status.map(|status| vec![status]),
            chain_id: query.chain_id,
            invoice_id: query.invoice_id,
            limit: Some(page_size(query.limit)),
            offset: query.offset,
            ..Default::default()
        };
        self.store.get_rebalance_operations(&filter).await.map_err(map_store_error)
    }

    async fn get_operation(&self, id: Uuid) -> Result<RebalanceOperation, AdminError> {
        self.store
            .get_rebalance_operation(id)
            .await
            .map_err(map_store_error)?
            .ok_or(AdminError::NotFound(id))
    }

    async fn list_earmarks(
        &self,
        query: EarmarkListQuery,
    ) -> Result<Vec<EarmarkWithOperations>, AdminError> {
        let filter = EarmarkFilter {
            statuses: query.status.map(|status| vec![status]),
            designated_purchase_chain: query.chain_id,
            invoice_id: query.invoice_id,
            limit: Some(page_size(query.limit)),
            offset: query.offset,
            ..Default::default()
        };
        let earmarks = self.store.get_earmarks(&filter).await.map_err(map_store_error)?;
        let mut joined = Vec::with_capacity(earmarks.len());
        for earmark in earmarks {
            let operations = self
                .store
                .operations_for_earmark(earmark.id)
                .await
                .map_err(map_store_error)?;
            joined.push(EarmarkWithOperations { earmark, operations });
        }
        Ok(joined)
    }
}
