use crate::{
    admin::AdminHandle,
    balance::BalanceAggregator,
    callback::CallbackExecutor,
    ondemand::OnDemandExecutor,
    planner::Planner,
    processor::InvoiceProcessor,
    purchase::{NullPurchaser, Purchaser},
    submitter::TransactionSubmitter,
    Error,
};
use futures::future::join_all;
use mark_bridge_rs::{
    across::{Across, AcrossConfig},
    cctp::{Cctp, CctpConfig},
    Registry,
};
use mark_rs::{
    admin::Server as AdminServer,
    cache::{PauseGate, PauseStore},
    chain::{self, ChainService},
    config::ConfigError,
    hub::{self, HubApi, HubContract},
    store::{PgStore, Store},
};
use serde::Deserialize;
use std::{fmt, path::Path, sync::Arc, time::Duration};
use tokio::time;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub core: mark_rs::Config,
    #[serde(default)]
    pub bridges: BridgesConfig,
}

impl Config {
    pub fn from_toml_file<P: AsRef<Path> + fmt::Display>(path: P) -> Result<Self, ConfigError> {
        tracing::info!("loading config from `{path}`...");
        let config: Self = mark_rs::config::from_toml_file(path)?;
        config.core.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgesConfig {
    pub across: Option<AcrossConfig>,
    pub cctp: Option<CctpConfig>,
}

impl BridgesConfig {
    pub fn registry(&self) -> Registry {
        let mut registry = Registry::new();
        if let Some(across) = &self.across {
            registry.register(Arc::new(Across::new(across.clone())));
        }
        if let Some(cctp) = &self.cctp {
            registry.register(Arc::new(Cctp::new(cctp.clone())));
        }
        registry
    }
}

pub struct Service {
    config: Config,
    purchaser: Arc<dyn Purchaser>,
}

impl Service {
    pub fn from(config: Config) -> Self {
        Self { config, purchaser: Arc::new(NullPurchaser) }
    }

    /// Swap in a settlement engine; the default never settles.
    pub fn with_purchaser(mut self, purchaser: Arc<dyn Purchaser>) -> Self {
        self.purchaser = purchaser;
        self
    }

    pub async fn run(self) -> Result<(), Error> {
        let core = Arc::new(self.config.core.clone());

        let store = PgStore::connect(&core.database).await?;
        store.initialize().await?;
        let store: Arc<dyn Store> = Arc::new(store);

        let gate: Arc<dyn PauseStore> = Arc::new(PauseGate::connect(&core.redis.url).await?);
        gate.apply_defaults(&core.maker.pause).await?;

        let chain: Arc<dyn ChainService> =
            Arc::new(chain::Client::new(&core.chain_service.endpoint));
        let hub: Arc<dyn HubApi> = Arc::new(hub::Client::new(&core.hub.endpoint));
        let hub_contract = HubContract::new(chain.clone(), &core.hub);

        let registry = self.config.bridges.registry();
        for route in core.routes.iter().chain(core.on_demand_routes.iter()) {
            for &bridge in &route.preferences {
                if !registry.contains(bridge) {
                    tracing::warn!(
                        %bridge,
                        origin = route.origin,
                        destination = route.destination,
                        "route prefers a bridge with no configured adapter"
                    );
                }
            }
        }

        let submitter = TransactionSubmitter::new(core.clone(), chain.clone());
        let balances = BalanceAggregator::new(core.clone(), chain.clone(), hub_contract);
        let planner = Planner::new(core.clone(), registry.clone());
        let executor = OnDemandExecutor::new(
            core.clone(),
            store.clone(),
            registry.clone(),
            submitter.clone(),
        );
        let processor = InvoiceProcessor::new(
            core.clone(),
            hub,
            store.clone(),
            gate.clone(),
            balances,
            planner,
            executor,
            self.purchaser,
        );
        let callbacks =
            CallbackExecutor::new(core.clone(), store.clone(), registry, submitter);
        let admin = AdminHandle::new(store, gate);
        let admin_server =
            AdminServer::new(core.admin.host, core.admin.port, admin, &core.admin.token);

        let mut tasks = vec![];

        let invoice_period = Duration::from_secs(core.maker.invoice_poll_interval_secs);
        tasks.push(tokio::spawn(async move {
            let mut interval = time::interval(invoice_period);
            loop {
                interval.tick().await;
                if let Err(err) = processor.tick().await {
                    tracing::error!(%err, "invoice tick failed");
                }
            }
        }));

        let callback_period = Duration::from_secs(core.maker.callback_poll_interval_secs);
        tasks.push(tokio::spawn(async move {
            let mut interval = time::interval(callback_period);
            loop {
                interval.tick().await;
                if let Err(err) = callbacks.tick().await {
                    tracing::error!(%err, "callback tick failed");
                }
            }
        }));

        let admin_task = admin_server.spawn();
        tasks.push(tokio::spawn(async move {
            let _ = admin_task.await;
        }));

        join_all(tasks).await;
        Ok(())
    }
}
