//! The per-tick invoice loop: refresh earmarks against current reality,
//! dispatch purchases or planning for each outstanding invoice, then sweep
//! completed and stale earmarks.

use crate::{
    balance::BalanceAggregator,
    ondemand::OnDemandExecutor,
    planner::{available_balance, earmarked_funds, Planner, ROUNDING_TOLERANCE_WEI},
    purchase::{PurchaseOutcome, Purchaser},
    Error,
};
use alloy_primitives::U256;
use chrono::Utc;
use mark_rs::{
    cache::{PauseFlag, PauseStore},
    config::Config,
    hub::HubApi,
    store::{EarmarkFilter, Store},
    types::{BalanceMap, Earmark, EarmarkStatus, GasBalanceMap, Invoice, RebalanceStatus},
};
use std::{collections::HashSet, sync::Arc};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct TickSummary {
    pub invoices: usize,
    pub purchased: Vec<String>,
    pub earmarks_created: usize,
    pub earmarks_promoted: usize,
    pub earmarks_completed: usize,
    pub earmarks_cancelled: usize,
}

#[derive(Clone)]
pub struct InvoiceProcessor {
    config: Arc<Config>,
    hub: Arc<dyn HubApi>,
    store: Arc<dyn Store>,
    gate: Arc<dyn PauseStore>,
    balances: BalanceAggregator,
    planner: Planner,
    executor: OnDemandExecutor,
    purchaser: Arc<dyn Purchaser>,
}

impl InvoiceProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        hub: Arc<dyn HubApi>,
        store: Arc<dyn Store>,
        gate: Arc<dyn PauseStore>,
        balances: BalanceAggregator,
        planner: Planner,
        executor: OnDemandExecutor,
        purchaser: Arc<dyn Purchaser>,
    ) -> Self {
        Self { config, hub, store, gate, balances, planner, executor, purchaser }
    }

    pub async fn tick(&self) -> Result<TickSummary, Error> {
        let span = tracing::info_span!("invoice_tick", request_id = %Uuid::new_v4());
        self.tick_inner().instrument(span).await
    }

    async fn tick_inner(&self) -> Result<TickSummary, Error> {
        let purchase_paused = self.gate.is_paused(PauseFlag::Purchase).await?;
        let rebalance_paused = self.gate.is_paused(PauseFlag::Rebalance).await?;
        let ondemand_paused = self.gate.is_paused(PauseFlag::Ondemand).await?;

        let invoices = self.hub.get_outstanding_invoices().await?;
        let owned = self.balances.owned_balances().await;
        let gas = self.balances.gas_balances().await;

        let mut summary = TickSummary { invoices: invoices.len(), ..Default::default() };
        summary.earmarks_promoted = self
            .process_pending_earmarks(
                &invoices,
                &owned,
                &gas,
                rebalance_paused || ondemand_paused,
            )
            .await?;

        let now = Utc::now().timestamp() as u64;
        for invoice in &invoices {
            if !self.config.supported_tickers.contains(&invoice.ticker_hash) {
                continue;
            }
            let destinations = self.acceptable_destinations(invoice, now);
            if destinations.is_empty() {
                continue;
            }
            match self
                .process_invoice(
                    invoice,
                    &destinations,
                    &owned,
                    &gas,
                    purchase_paused,
                    rebalance_paused || ondemand_paused,
                )
                .await
            {
                Ok(outcome) => match outcome {
                    InvoiceOutcome::Purchased => {
                        summary.purchased.push(invoice.intent_id.clone())
                    }
                    InvoiceOutcome::Earmarked => summary.earmarks_created += 1,
                    InvoiceOutcome::Skipped => {}
                },
                Err(err) => {
                    tracing::error!(%err, invoice_id = %invoice.intent_id, "invoice processing failed");
                }
            }
        }

        summary.earmarks_completed =
            self.cleanup_completed_earmarks(&summary.purchased).await?;
        summary.earmarks_cancelled = self.cleanup_stale_earmarks(&invoices).await?;

        tracing::info!(
            invoices = summary.invoices,
            purchased = summary.purchased.len(),
            earmarked = summary.earmarks_created,
            promoted = summary.earmarks_promoted,
            completed = summary.earmarks_completed,
            cancelled = summary.earmarks_cancelled,
            "invoice tick finished"
        );
        Ok(summary)
    }

    async fn process_invoice(
        &self,
        invoice: &Invoice,
        destinations: &[u64],
        owned: &BalanceMap,
        gas: &GasBalanceMap,
        purchase_paused: bool,
        planning_paused: bool,
    ) -> Result<InvoiceOutcome, Error> {
        // a ready earmark means the liquidity is assembled on the designated
        // chain; a pending one is still assembling, which does not rule out a
        // direct settlement on some other destination
        let active = self.store.active_earmark_for_invoice(&invoice.intent_id).await?;
        if let Some(earmark) = &active {
            if earmark.status == EarmarkStatus::Ready {
                if !purchase_paused {
                    let outcome = self
                        .purchaser
                        .purchase(invoice, earmark.designated_purchase_chain, earmark.min_amount)
                        .await?;
                    if outcome == PurchaseOutcome::Purchased {
                        return Ok(InvoiceOutcome::Purchased);
                    }
                }
                return Ok(InvoiceOutcome::Skipped);
            }
        }

        let min_amounts = self.hub.get_min_amounts(&invoice.intent_id).await?;
        let earmarks = self.active_earmarks().await?;
        let earmarked = earmarked_funds(&earmarks);

        if !purchase_paused {
            let direct = destinations.iter().find_map(|&chain| {
                let required = *min_amounts.get(&chain)?;
                let available =
                    available_balance(owned, &earmarked, chain, invoice.ticker_hash);
                (available >= required).then_some((chain, required))
            });
            if let Some((chain, required)) = direct {
                let outcome = self.purchaser.purchase(invoice, chain, required).await?;
                return Ok(match outcome {
                    PurchaseOutcome::Purchased => InvoiceOutcome::Purchased,
                    PurchaseOutcome::Skipped => InvoiceOutcome::Skipped,
                });
            }
        }

        // an in-flight earmark is already assembling liquidity for this
        // invoice; wait for it instead of planning again
        if active.is_some() || planning_paused {
            return Ok(InvoiceOutcome::Skipped);
        }
        let Some(plan) =
            self.planner.plan(invoice, &min_amounts, owned, &earmarks, gas).await
        else {
            return Ok(InvoiceOutcome::Skipped);
        };
        match self.executor.execute(invoice, &plan).await? {
            Some(earmark_id) => {
                tracing::info!(invoice_id = %invoice.intent_id, %earmark_id, "rebalancing dispatched");
                Ok(InvoiceOutcome::Earmarked)
            }
            None => Ok(InvoiceOutcome::Skipped),
        }
    }

    /// Refresh `PENDING` earmarks: promote the ones whose operations have all
    /// landed and whose designated chain now holds the required liquidity,
    /// re-plan the residual for capped under-deliveries (unless planning is
    /// paused), and fail the ones whose operations terminally failed.
    async fn process_pending_earmarks(
        &self,
        invoices: &[Invoice],
        owned: &BalanceMap,
        gas: &GasBalanceMap,
        planning_paused: bool,
    ) -> Result<usize, Error> {
        let pending = self
            .store
            .get_earmarks(&EarmarkFilter {
                statuses: Some(vec![EarmarkStatus::Pending]),
                ..Default::default()
            })
            .await?;
        let mut promoted = 0;
        for earmark in pending {
            let operations = self.store.operations_for_earmark(earmark.id).await?;
            if operations.is_empty()
                || operations.iter().any(|operation| operation.status.is_in_flight())
            {
                continue;
            }
            if operations.iter().any(|operation| operation.status != RebalanceStatus::Completed) {
                tracing::warn!(earmark_id = %earmark.id, "earmark has terminally failed operations");
                self.store.update_earmark_status(earmark.id, EarmarkStatus::Failed).await?;
                continue;
            }

            let others: Vec<Earmark> = self
                .active_earmarks()
                .await?
                .into_iter()
                .filter(|other| other.id != earmark.id)
                .collect();
            let earmarked = earmarked_funds(&others);
            let available = available_balance(
                owned,
                &earmarked,
                earmark.designated_purchase_chain,
                earmark.ticker_hash,
            );
            if available + U256::from(ROUNDING_TOLERANCE_WEI) >= earmark.min_amount {
                self.store.update_earmark_status(earmark.id, EarmarkStatus::Ready).await?;
                tracing::info!(earmark_id = %earmark.id, invoice_id = %earmark.invoice_id, "earmark ready");
                promoted += 1;
                continue;
            }

            // every operation completed yet the chain is still short: a
            // capped send under-delivered, re-plan the residual
            if planning_paused {
                tracing::debug!(earmark_id = %earmark.id, "planning paused, deferring top-up");
                continue;
            }
            let Some(invoice) =
                invoices.iter().find(|invoice| invoice.intent_id == earmark.invoice_id)
            else {
                continue;
            };
            let min_amounts = match self.hub.get_min_amounts(&invoice.intent_id).await {
                Ok(min_amounts) => min_amounts,
                Err(err) => {
                    tracing::warn!(%err, invoice_id = %invoice.intent_id, "min amounts unavailable for top-up");
                    continue;
                }
            };
            if let Some(plan) =
                self.planner.plan(invoice, &min_amounts, owned, &others, gas).await
            {
                if plan.destination_chain == earmark.designated_purchase_chain {
                    match self.executor.execute_top_up(earmark.id, &plan).await {
                        Ok(appended) => {
                            tracing::info!(earmark_id = %earmark.id, appended, "topped up under-delivered earmark")
                        }
                        Err(err) => {
                            tracing::error!(%err, earmark_id = %earmark.id, "top-up dispatch failed")
                        }
                    }
                }
            }
        }
        Ok(promoted)
    }

    /// Flip `READY` earmarks whose invoices were just purchased to
    /// `COMPLETED`.
    async fn cleanup_completed_earmarks(
        &self,
        purchased: &[String],
    ) -> Result<usize, Error> {
        let mut completed = 0;
        for invoice_id in purchased {
            if let Some(earmark) = self.store.active_earmark_for_invoice(invoice_id).await? {
                if earmark.status == EarmarkStatus::Ready {
                    self.store
                        .update_earmark_status(earmark.id, EarmarkStatus::Completed)
                        .await?;
                    completed += 1;
                }
            }
        }
        Ok(completed)
    }

    /// Cancel active earmarks whose invoices are no longer outstanding,
    /// orphaning their in-flight operations.
    async fn cleanup_stale_earmarks(&self, invoices: &[Invoice]) -> Result<usize, Error> {
        let outstanding: HashSet<&str> =
            invoices.iter().map(|invoice| invoice.intent_id.as_str()).collect();
        let mut cancelled = 0;
        for earmark in self.active_earmarks().await? {
            if !outstanding.contains(earmark.invoice_id.as_str()) {
                tracing::info!(
                    earmark_id = %earmark.id,
                    invoice_id = %earmark.invoice_id,
                    "invoice left the outstanding set, cancelling earmark"
                );
                self.store.cancel_earmark_and_orphan(earmark.id).await?;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn active_earmarks(&self) -> Result<Vec<Earmark>, Error> {
        Ok(self
            .store
            .get_earmarks(&EarmarkFilter {
                statuses: Some(EarmarkStatus::ACTIVE.to_vec()),
                ..Default::default()
            })
            .await?)
    }

    /// Destinations the invoice may settle on: configured chains carrying the
    /// ticker whose minimum invoice age has elapsed.
    fn acceptable_destinations(&self, invoice: &Invoice, now_unix: u64) -> Vec<u64> {
        invoice
            .destinations
            .iter()
            .copied()
            .filter(|&destination| {
                let Some(chain) = self.config.chain(destination) else { return false };
                self.config.asset_by_ticker(destination, invoice.ticker_hash).is_some()
                    && invoice.age(now_unix) >= chain.invoice_age
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvoiceOutcome {
    Purchased,
    Earmarked,
    Skipped,
}
