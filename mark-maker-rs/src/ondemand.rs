//! Execution of an accepted rebalance plan: dispatch each operation's
//! prepared transactions, then record the earmark and its operation rows.
//!
//! The origin transaction is authoritative. Once a send has a confirmed
//! receipt it is either persisted or logged at critical level with its hash;
//! it is never silently dropped.

use crate::{
    planner::{PlannedOperation, RebalancePlan},
    routes::resolve_route,
    submitter::TransactionSubmitter,
    Error,
};
use alloy_primitives::{Address, U256};
use mark_bridge_rs::Registry;
use mark_rs::{
    config::Config,
    store::{NewEarmark, NewRebalanceOperation, Store, StoreError},
    types::{
        EarmarkStatus, Invoice, TransactionEntry, TransactionMemo,
    },
};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

#[derive(Clone)]
pub struct OnDemandExecutor {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    registry: Registry,
    submitter: TransactionSubmitter,
}

/// One successfully-dispatched operation: the plan entry plus the confirmed
/// origin evidence.
struct SentOperation {
    planned: PlannedOperation,
    /// Amount actually dispatched; differs from the plan when the adapter
    /// capped the input.
    amount_native: U256,
    recipient: Address,
    origin_entry: TransactionEntry,
}

impl OnDemandExecutor {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        registry: Registry,
        submitter: TransactionSubmitter,
    ) -> Self {
        Self { config, store, registry, submitter }
    }

    /// Execute a plan for an invoice with no active earmark yet. Returns the
    /// new earmark id iff its status is `PENDING`.
    pub async fn execute(
        &self,
        invoice: &Invoice,
        plan: &RebalancePlan,
    ) -> Result<Option<Uuid>, Error> {
        // the precondition is re-checked inside the critical section
        if let Some(existing) = self.store.active_earmark_for_invoice(&invoice.intent_id).await? {
            tracing::debug!(invoice_id = %invoice.intent_id, earmark_id = %existing.id, "earmark already active");
            return Ok((existing.status == EarmarkStatus::Pending).then_some(existing.id));
        }

        let sent = self.dispatch_operations(plan).await;
        if sent.is_empty() {
            tracing::warn!(invoice_id = %invoice.intent_id, "no operation succeeded, not earmarking");
            return Ok(None);
        }

        let status = if sent.len() == plan.operations.len() {
            EarmarkStatus::Pending
        } else {
            EarmarkStatus::Failed
        };
        let new = NewEarmark {
            invoice_id: invoice.intent_id.clone(),
            designated_purchase_chain: plan.destination_chain,
            ticker_hash: invoice.ticker_hash,
            min_amount: plan.min_amount,
            status,
        };
        match self.store.create_earmark(new).await {
            Ok(earmark) => {
                tracing::info!(
                    invoice_id = %invoice.intent_id,
                    earmark_id = %earmark.id,
                    destination = plan.destination_chain,
                    operations = sent.len(),
                    %status,
                    "earmark created"
                );
                self.insert_operations(Some(earmark.id), false, &sent).await;
                Ok((earmark.status == EarmarkStatus::Pending).then_some(earmark.id))
            }
            Err(StoreError::UniqueEarmarkConflict { .. }) => {
                // another instance won the race; our sends become standalone
                tracing::warn!(
                    invoice_id = %invoice.intent_id,
                    operations = sent.len(),
                    "lost earmark race, recording sends as standalone operations"
                );
                let orphan = self.config.maker.orphan_standalone_operations;
                self.insert_operations(None, orphan, &sent).await;
                let existing =
                    self.store.active_earmark_for_invoice(&invoice.intent_id).await?;
                Ok(existing
                    .filter(|earmark| earmark.status == EarmarkStatus::Pending)
                    .map(|earmark| earmark.id))
            }
            Err(err) => {
                // confirmed sends with no earmark to hang them off: persist
                // them standalone before surfacing the failure
                self.insert_operations(None, false, &sent).await;
                Err(err.into())
            }
        }
    }

    /// Append additional operations to an existing earmark (residual
    /// re-planning after a capped send).
    pub async fn execute_top_up(
        &self,
        earmark_id: Uuid,
        plan: &RebalancePlan,
    ) -> Result<usize, Error> {
        let sent = self.dispatch_operations(plan).await;
        let inserted = self.insert_operations(Some(earmark_id), false, &sent).await;
        Ok(inserted)
    }

    /// Dispatch every planned operation sequentially; a mid-list failure is
    /// logged and does not abort the remaining operations.
    async fn dispatch_operations(&self, plan: &RebalancePlan) -> Vec<SentOperation> {
        let mut sent = Vec::with_capacity(plan.operations.len());
        for planned in &plan.operations {
            match self.dispatch_one(planned).await {
                Ok(Some(operation)) => sent.push(operation),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        %err,
                        origin = planned.origin_chain_id,
                        bridge = %planned.bridge,
                        "operation dispatch failed, continuing with the rest"
                    );
                }
            }
        }
        sent
    }

    async fn dispatch_one(
        &self,
        planned: &PlannedOperation,
    ) -> Result<Option<SentOperation>, Error> {
        let Some(resolved) = resolve_route(&self.config, &planned.route) else {
            tracing::warn!(origin = planned.origin_chain_id, "planned route no longer resolves");
            return Ok(None);
        };
        let recipient = self.config.balance_owner(resolved.destination_chain_id);
        let refund_address = self.config.balance_owner(resolved.origin_chain_id);

        let adapter = self.registry.adapter(planned.bridge);
        let legs =
            adapter.send(refund_address, recipient, planned.amount_native, &resolved).await?;

        let effective = legs
            .iter()
            .find_map(|leg| leg.effective_amount)
            .unwrap_or(planned.amount_native);
        if effective < planned.amount_native {
            tracing::warn!(
                requested = %planned.amount_native,
                %effective,
                bridge = %planned.bridge,
                "adapter capped the send amount"
            );
        }

        let mut origin_entry = None;
        for leg in legs {
            let memo = leg.memo;
            match self.submitter.submit(resolved.origin_chain_id, leg.transaction).await {
                Ok(submitted) => {
                    tracing::debug!(%memo, hash = %submitted.hash, "leg confirmed");
                    if memo == TransactionMemo::Rebalance {
                        origin_entry = Some(TransactionEntry::from(&submitted));
                    }
                }
                Err(err) => {
                    if origin_entry.is_some() {
                        // the bridge intent is already on-chain; the trailing
                        // leg will be retried by the callback path if needed
                        tracing::warn!(%err, %memo, "post-rebalance leg failed");
                    } else {
                        tracing::warn!(%err, %memo, "leg failed before the bridge intent, aborting operation");
                        return Ok(None);
                    }
                }
            }
        }
        Ok(origin_entry.map(|origin_entry| SentOperation {
            planned: planned.clone(),
            amount_native: effective,
            recipient,
            origin_entry,
        }))
    }

    /// Insert one row per confirmed send. Insert failures after a confirmed
    /// on-chain send are critical but not fatal; the receipt hash is logged
    /// for reconciliation.
    async fn insert_operations(
        &self,
        earmark_id: Option<Uuid>,
        orphan: bool,
        sent: &[SentOperation],
    ) -> usize {
        let mut inserted = 0;
        for operation in sent {
            let new = NewRebalanceOperation {
                earmark_id,
                origin_chain_id: operation.planned.origin_chain_id,
                destination_chain_id: operation.planned.route.destination,
                ticker_hash: operation.planned.ticker_hash,
                amount_native: operation.amount_native,
                slippage_dbps: operation.planned.slippage_dbps,
                bridge: operation.planned.bridge,
                recipient: operation.recipient,
                is_orphaned: orphan,
                transactions: HashMap::from([(
                    operation.planned.origin_chain_id,
                    operation.origin_entry.clone(),
                )]),
            };
            match self.store.create_rebalance_operation(new).await {
                Ok(row) => {
                    inserted += 1;
                    tracing::debug!(operation_id = %row.id, "operation recorded");
                }
                Err(source) => {
                    let err = Error::WriteAfterSend {
                        tx_hash: operation.origin_entry.hash,
                        source,
                    };
                    tracing::error!(%err, hash = %operation.origin_entry.hash, "CRITICAL: confirmed send not persisted");
                }
            }
        }
        inserted
    }
}
