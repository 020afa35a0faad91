use clap::Args;
use eyre::Result;
use mark_maker_rs::{Config, Service};
use tracing::info;

#[derive(Debug, Args)]
#[clap(about = "🏦 watch the hub for unpaid invoices and assemble liquidity to fill them")]
pub struct Command {
    #[clap(env, default_value = "config.toml")]
    config_file: String,
}

impl Command {
    pub async fn execute(self) -> Result<()> {
        let config_file = &self.config_file;

        let config = Config::from_toml_file(config_file)?;

        let own_address = config.core.own_address;
        let chains = config.core.chains.len();
        info!(%own_address, chains, "configured");

        Service::from(config).run().await?;
        Ok(())
    }
}
