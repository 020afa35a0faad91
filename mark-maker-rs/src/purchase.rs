//! Seam to the settlement side of the agent. Filling an invoice once the
//! liquidity is in place is a separate engine; the processor only needs to
//! know whether a purchase went through so it can complete the earmark.

use crate::Error;
use alloy_primitives::U256;
use async_trait::async_trait;
use mark_rs::types::Invoice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased,
    Skipped,
}

#[async_trait]
pub trait Purchaser: Send + Sync {
    /// Attempt to settle `invoice` on `chain_id`, presenting at least
    /// `min_amount` (canonical units) of owned balance.
    async fn purchase(
        &self,
        invoice: &Invoice,
        chain_id: u64,
        min_amount: U256,
    ) -> Result<PurchaseOutcome, Error>;
}

/// A `NullPurchaser` never settles anything. It backs rebalance-only
/// deployments and tests, leaving invoices for the settlement engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPurchaser;

#[async_trait]
impl Purchaser for NullPurchaser {
    async fn purchase(
        &self,
        invoice: &Invoice,
        chain_id: u64,
        min_amount: U256,
    ) -> Result<PurchaseOutcome, Error> {
        tracing::debug!(
            invoice_id = %invoice.intent_id,
            chain_id,
            %min_amount,
            "purchase delegated to the settlement engine"
        );
        Ok(PurchaseOutcome::Skipped)
    }
}
