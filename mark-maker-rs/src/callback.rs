//! The callback tick: drive in-flight rebalance operations from
//! `PENDING` through destination readiness and callback execution to
//! `COMPLETED`. Earmark promotion happens in the invoice tick's maintenance,
//! not here.

use crate::{routes, submitter::TransactionSubmitter, Error};
use mark_bridge_rs::Registry;
use mark_rs::{
    config::Config,
    store::{OperationFilter, RebalanceOperationUpdate, Store},
    types::{RebalanceOperation, RebalanceStatus, TransactionEntry},
};
use std::{collections::HashMap, sync::Arc};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct CallbackSummary {
    pub in_flight: usize,
    pub ready: usize,
    pub completed: usize,
}

#[derive(Clone)]
pub struct CallbackExecutor {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    registry: Registry,
    submitter: TransactionSubmitter,
}

impl CallbackExecutor {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        registry: Registry,
        submitter: TransactionSubmitter,
    ) -> Self {
        Self { config, store, registry, submitter }
    }

    pub async fn tick(&self) -> Result<CallbackSummary, Error> {
        let span = tracing::info_span!("callback_tick", request_id = %Uuid::new_v4());
        self.tick_inner().instrument(span).await
    }

    async fn tick_inner(&self) -> Result<CallbackSummary, Error> {
        let mut operations = self
            .store
            .get_rebalance_operations(&OperationFilter {
                statuses: Some(RebalanceStatus::IN_FLIGHT.to_vec()),
                ..Default::default()
            })
            .await?;
        // oldest first
        operations.reverse();

        let mut summary = CallbackSummary { in_flight: operations.len(), ..Default::default() };
        for operation in operations {
            match self.advance(operation).await {
                Ok(Advanced::Ready) => summary.ready += 1,
                Ok(Advanced::Completed) => summary.completed += 1,
                Ok(Advanced::None) => {}
                Err(err) => {
                    tracing::warn!(%err, "operation advance failed, will retry next tick");
                }
            }
        }
        if summary.in_flight > 0 {
            tracing::info!(
                in_flight = summary.in_flight,
                ready = summary.ready,
                completed = summary.completed,
                "callback tick finished"
            );
        }
        Ok(summary)
    }

    async fn advance(&self, operation: RebalanceOperation) -> Result<Advanced, Error> {
        let Some(origin_receipt) =
            operation.origin_entry().and_then(|entry| entry.receipt.clone())
        else {
            // rows are only inserted with a confirmed origin receipt
            tracing::warn!(operation_id = %operation.id, "operation has no origin receipt, skipping");
            return Ok(Advanced::None);
        };
        let Some(route) = routes::route_for_operation(&self.config, &operation) else {
            tracing::warn!(operation_id = %operation.id, "no configured route matches operation, skipping");
            return Ok(Advanced::None);
        };
        let Some(resolved) = routes::resolve_route(&self.config, route) else {
            return Ok(Advanced::None);
        };
        if !self.registry.contains(operation.bridge) {
            tracing::warn!(operation_id = %operation.id, bridge = %operation.bridge, "bridge no longer registered, skipping");
            return Ok(Advanced::None);
        }
        let adapter = self.registry.adapter(operation.bridge);

        let mut advanced = Advanced::None;
        let mut status = operation.status;
        if status == RebalanceStatus::Pending {
            let ready = adapter
                .destination_ready(operation.amount_native, &resolved, &origin_receipt)
                .await?;
            if !ready {
                return Ok(Advanced::None);
            }
            self.store
                .update_rebalance_operation(
                    operation.id,
                    RebalanceOperationUpdate {
                        status: Some(RebalanceStatus::AwaitingCallback),
                        transactions: None,
                    },
                )
                .await?;
            tracing::info!(operation_id = %operation.id, "destination ready");
            status = RebalanceStatus::AwaitingCallback;
            advanced = Advanced::Ready;
        }

        if status == RebalanceStatus::AwaitingCallback {
            let update = match adapter.destination_callback(&resolved, &origin_receipt).await? {
                None => RebalanceOperationUpdate {
                    status: Some(RebalanceStatus::Completed),
                    transactions: None,
                },
                Some(callback) => {
                    let submitted = self
                        .submitter
                        .submit(operation.destination_chain_id, callback)
                        .await?;
                    RebalanceOperationUpdate {
                        status: Some(RebalanceStatus::Completed),
                        transactions: Some(HashMap::from([(
                            operation.destination_chain_id,
                            TransactionEntry::from(&submitted),
                        )])),
                    }
                }
            };
            self.store.update_rebalance_operation(operation.id, update).await?;
            tracing::info!(operation_id = %operation.id, "operation completed");
            advanced = Advanced::Completed;
        }
        Ok(advanced)
    }
}

enum Advanced {
    None,
    Ready,
    Completed,
}
