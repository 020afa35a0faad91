//! Mock collaborators for driving the engine end-to-end without any real
//! chain, hub, bridge, or database.
#![allow(dead_code)]

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use mark_bridge_rs::{BridgeAdapter, BridgeError, Registry, ResolvedRoute, SendLeg};
use mark_maker_rs::purchase::{PurchaseOutcome, Purchaser};
use mark_rs::{
    chain::{ChainError, ChainService},
    config::{
        AdminConfig, AssetConfig, ChainConfig, ChainServiceConfig, Config, DatabaseConfig,
        HubConfig, MakerConfig, RedisConfig, Route,
    },
    hub::{HubApi, HubError},
    store::{
        EarmarkFilter, EarmarkStore, MemoryStore, NewEarmark, NewRebalanceOperation,
        OperationFilter, RebalanceOperationStore, RebalanceOperationUpdate, StoreError,
    },
    types::{
        BridgeTag, Earmark, EarmarkStatus, GasResource, Invoice, InvoiceStatus, MinAmounts,
        RebalanceOperation, SubmittedTransaction, TransactionMemo, TransactionReceipt,
        TransactionRequest,
    },
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    net::Ipv4Addr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use uuid::Uuid;

pub const TICKER: B256 = B256::repeat_byte(0x77);
pub const TOKEN: Address = Address::repeat_byte(0x70);
pub const WEI: u64 = 1_000_000_000_000_000_000;

pub fn setup_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "error".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

pub fn asset() -> AssetConfig {
    AssetConfig {
        symbol: "TKN".to_string(),
        address: TOKEN,
        decimals: 18,
        ticker_hash: TICKER,
        is_native: false,
    }
}

pub fn chain_config() -> ChainConfig {
    ChainConfig {
        providers: vec![],
        assets: vec![asset()],
        deployments: Default::default(),
        invoice_age: 0,
        gas_threshold: U256::ZERO,
        gas_model: Default::default(),
        wrapped_native: None,
        scoped_execution: None,
    }
}

pub fn route(origin: u64, destination: u64, slippage_dbps: u32) -> Route {
    Route {
        origin,
        destination,
        asset: "TKN".to_string(),
        maximum: None,
        reserve: None,
        slippages_dbps: vec![slippage_dbps],
        preferences: vec![BridgeTag::Across],
    }
}

pub fn test_config(chain_ids: &[u64], routes: Vec<Route>) -> Arc<Config> {
    Arc::new(Config {
        own_address: Address::repeat_byte(0xaa),
        supported_tickers: vec![TICKER],
        chains: chain_ids.iter().map(|&id| (id, chain_config())).collect(),
        routes: vec![],
        on_demand_routes: routes,
        hub: HubConfig {
            endpoint: "http://hub.test".to_string(),
            chain_id: 25327,
            address: Address::repeat_byte(0xbb),
        },
        chain_service: ChainServiceConfig { endpoint: "http://chains.test".to_string() },
        database: DatabaseConfig {
            url: "postgres://localhost/mark".to_string(),
            max_connections: 10,
        },
        redis: RedisConfig { url: "redis://localhost".to_string() },
        admin: AdminConfig { host: Ipv4Addr::LOCALHOST, port: 8380, token: "secret".to_string() },
        maker: MakerConfig::default(),
    })
}

pub fn invoice(intent_id: &str, destinations: Vec<u64>) -> Invoice {
    Invoice {
        intent_id: intent_id.to_string(),
        ticker_hash: TICKER,
        amount: U256::from(WEI),
        destinations,
        hub_enqueued_timestamp: 0,
        status: InvoiceStatus::Invoiced,
    }
}

/// Chain-service stub with settable balances and recorded submissions.
#[derive(Default)]
pub struct MockChain {
    balances: Mutex<HashMap<(u64, Address), U256>>,
    pub submitted: Mutex<Vec<(u64, TransactionRequest)>>,
    pub fail_submissions: AtomicBool,
    nonce: AtomicU64,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_balance(&self, chain_id: u64, token: Address, amount: U256) {
        self.balances.lock().insert((chain_id, token), amount);
    }

    pub fn submissions_on(&self, chain_id: u64) -> usize {
        self.submitted.lock().iter().filter(|(chain, _)| *chain == chain_id).count()
    }
}

#[async_trait]
impl ChainService for MockChain {
    async fn get_balance(
        &self,
        chain_id: u64,
        _owner: Address,
        token: Address,
    ) -> Result<U256, ChainError> {
        Ok(self.balances.lock().get(&(chain_id, token)).copied().unwrap_or_default())
    }

    async fn get_gas_balance(
        &self,
        _chain_id: u64,
        _owner: Address,
        _resource: GasResource,
    ) -> Result<U256, ChainError> {
        Ok(U256::from(WEI))
    }

    async fn submit_and_monitor(
        &self,
        chain_id: u64,
        request: TransactionRequest,
    ) -> Result<SubmittedTransaction, ChainError> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(ChainError::Timeout);
        }
        self.submitted.lock().push((chain_id, request));
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst) + 1;
        let hash = B256::from(U256::from(nonce));
        Ok(SubmittedTransaction {
            hash,
            receipt: TransactionReceipt { transaction_hash: hash, block_number: nonce, success: true },
        })
    }

    async fn read_tx(
        &self,
        _chain_id: u64,
        _to: Address,
        _data: Bytes,
    ) -> Result<Bytes, ChainError> {
        Ok(vec![0u8; 32].into())
    }
}

/// Hub stub with a settable outstanding set.
#[derive(Default)]
pub struct MockHub {
    invoices: Mutex<Vec<Invoice>>,
    min_amounts: Mutex<HashMap<String, MinAmounts>>,
}

impl MockHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_invoices(&self, invoices: Vec<Invoice>) {
        *self.invoices.lock() = invoices;
    }

    pub fn set_min_amounts(&self, intent_id: &str, min_amounts: &[(u64, U256)]) {
        self.min_amounts
            .lock()
            .insert(intent_id.to_string(), min_amounts.iter().copied().collect());
    }
}

#[async_trait]
impl HubApi for MockHub {
    async fn get_outstanding_invoices(&self) -> Result<Vec<Invoice>, HubError> {
        Ok(self.invoices.lock().clone())
    }

    async fn get_min_amounts(&self, intent_id: &str) -> Result<MinAmounts, HubError> {
        Ok(self.min_amounts.lock().get(intent_id).cloned().unwrap_or_default())
    }
}

/// Bridge stub: fixed proportional fee, optional per-transfer cap, optional
/// destination callback, and a toggle for destination readiness.
pub struct MockBridge {
    pub tag: BridgeTag,
    pub fee_dbps: u64,
    pub cap: Option<U256>,
    pub with_callback: bool,
    pub ready: AtomicBool,
}

impl MockBridge {
    pub fn new(fee_dbps: u64) -> Arc<Self> {
        Arc::new(Self {
            tag: BridgeTag::Across,
            fee_dbps,
            cap: None,
            with_callback: false,
            ready: AtomicBool::new(false),
        })
    }

    pub fn with_cap(fee_dbps: u64, cap: U256) -> Arc<Self> {
        Arc::new(Self {
            tag: BridgeTag::Across,
            fee_dbps,
            cap: Some(cap),
            with_callback: false,
            ready: AtomicBool::new(false),
        })
    }

    pub fn with_callback(fee_dbps: u64) -> Arc<Self> {
        Arc::new(Self {
            tag: BridgeTag::Across,
            fee_dbps,
            cap: None,
            with_callback: true,
            ready: AtomicBool::new(false),
        })
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    fn fee(&self, amount: U256) -> U256 {
        amount * U256::from(self.fee_dbps) / U256::from(100_000u64)
    }
}

#[async_trait]
impl BridgeAdapter for MockBridge {
    fn bridge(&self) -> BridgeTag {
        self.tag
    }

    async fn quote(
        &self,
        amount_native: U256,
        _route: &ResolvedRoute,
    ) -> Result<U256, BridgeError> {
        Ok(amount_native - self.fee(amount_native))
    }

    async fn send(
        &self,
        _refund_address: Address,
        _recipient: Address,
        amount_native: U256,
        route: &ResolvedRoute,
    ) -> Result<Vec<SendLeg>, BridgeError> {
        let effective = self.cap.map(|cap| cap.min(amount_native)).unwrap_or(amount_native);
        let capped = effective < amount_native;
        Ok(vec![
            SendLeg::new(
                TransactionMemo::Approval,
                TransactionRequest {
                    to: route.origin_asset.address,
                    data: vec![0x09, 0x5e, 0xa7, 0xb3].into(),
                    value: U256::ZERO,
                    from: None,
                    func_sig: Some("approve(address,uint256)".to_string()),
                },
            ),
            SendLeg {
                memo: TransactionMemo::Rebalance,
                transaction: TransactionRequest {
                    to: Address::repeat_byte(0x55),
                    data: vec![0xde, 0xad].into(),
                    value: U256::ZERO,
                    from: None,
                    func_sig: Some("deposit(...)".to_string()),
                },
                effective_amount: capped.then_some(effective),
            },
        ])
    }

    async fn destination_ready(
        &self,
        _amount_native: U256,
        _route: &ResolvedRoute,
        _origin_receipt: &TransactionReceipt,
    ) -> Result<bool, BridgeError> {
        Ok(self.ready.load(Ordering::SeqCst))
    }

    async fn destination_callback(
        &self,
        route: &ResolvedRoute,
        _origin_receipt: &TransactionReceipt,
    ) -> Result<Option<TransactionRequest>, BridgeError> {
        if !self.with_callback {
            return Ok(None);
        }
        Ok(Some(TransactionRequest {
            to: route.destination_asset.address,
            data: vec![0xd0, 0xe3].into(),
            value: U256::ZERO,
            from: None,
            func_sig: Some("deposit()".to_string()),
        }))
    }
}

pub fn registry_with(adapter: Arc<dyn BridgeAdapter>) -> Registry {
    let mut registry = Registry::new();
    registry.register(adapter);
    registry
}

/// Purchaser that settles everything it is offered and records it.
#[derive(Default)]
pub struct MockPurchaser {
    pub purchased: Mutex<Vec<(String, u64)>>,
    pub enabled: bool,
}

impl MockPurchaser {
    pub fn enabled() -> Arc<Self> {
        Arc::new(Self { purchased: Mutex::new(vec![]), enabled: true })
    }

    pub fn disabled() -> Arc<Self> {
        Arc::new(Self { purchased: Mutex::new(vec![]), enabled: false })
    }
}

#[async_trait]
impl Purchaser for MockPurchaser {
    async fn purchase(
        &self,
        invoice: &Invoice,
        chain_id: u64,
        _min_amount: U256,
    ) -> Result<PurchaseOutcome, mark_maker_rs::Error> {
        if !self.enabled {
            return Ok(PurchaseOutcome::Skipped);
        }
        self.purchased.lock().push((invoice.intent_id.clone(), chain_id));
        Ok(PurchaseOutcome::Purchased)
    }
}

/// Store wrapper that lets a "competitor" instance slip its earmark in just
/// before ours lands, forcing the unique-active conflict.
#[derive(Clone, Default)]
pub struct RacingStore {
    pub inner: MemoryStore,
    competitor: Arc<Mutex<Option<NewEarmark>>>,
}

impl RacingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self, competitor: NewEarmark) {
        *self.competitor.lock() = Some(competitor);
    }
}

#[async_trait]
impl EarmarkStore for RacingStore {
    async fn create_earmark(&self, new: NewEarmark) -> Result<Earmark, StoreError> {
        let competitor = self.competitor.lock().take();
        if let Some(competitor) = competitor {
            self.inner.create_earmark(competitor).await?;
        }
        self.inner.create_earmark(new).await
    }

    async fn active_earmark_for_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<Option<Earmark>, StoreError> {
        self.inner.active_earmark_for_invoice(invoice_id).await
    }

    async fn get_earmark(&self, id: Uuid) -> Result<Option<Earmark>, StoreError> {
        self.inner.get_earmark(id).await
    }

    async fn get_earmarks(&self, filter: &EarmarkFilter) -> Result<Vec<Earmark>, StoreError> {
        self.inner.get_earmarks(filter).await
    }

    async fn update_earmark_status(
        &self,
        id: Uuid,
        status: EarmarkStatus,
    ) -> Result<Earmark, StoreError> {
        self.inner.update_earmark_status(id, status).await
    }

    async fn cancel_earmark_and_orphan(&self, id: Uuid) -> Result<Earmark, StoreError> {
        self.inner.cancel_earmark_and_orphan(id).await
    }
}

#[async_trait]
impl RebalanceOperationStore for RacingStore {
    async fn create_rebalance_operation(
        &self,
        new: NewRebalanceOperation,
    ) -> Result<RebalanceOperation, StoreError> {
        self.inner.create_rebalance_operation(new).await
    }

    async fn get_rebalance_operation(
        &self,
        id: Uuid,
    ) -> Result<Option<RebalanceOperation>, StoreError> {
        self.inner.get_rebalance_operation(id).await
    }

    async fn get_rebalance_operations(
        &self,
        filter: &OperationFilter,
    ) -> Result<Vec<RebalanceOperation>, StoreError> {
        self.inner.get_rebalance_operations(filter).await
    }

    async fn operations_for_earmark(
        &self,
        earmark_id: Uuid,
    ) -> Result<Vec<RebalanceOperation>, StoreError> {
        self.inner.operations_for_earmark(earmark_id).await
    }

    async fn update_rebalance_operation(
        &self,
        id: Uuid,
        update: RebalanceOperationUpdate,
    ) -> Result<RebalanceOperation, StoreError> {
        self.inner.update_rebalance_operation(id, update).await
    }

    async fn cancel_rebalance_operation(
        &self,
        id: Uuid,
        orphan: bool,
    ) -> Result<RebalanceOperation, StoreError> {
        self.inner.cancel_rebalance_operation(id, orphan).await
    }

    async fn expire_operations_older_than(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64, StoreError> {
        self.inner.expire_operations_older_than(cutoff).await
    }
}
