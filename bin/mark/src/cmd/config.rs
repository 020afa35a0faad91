use clap::Args;
use eyre::Result;
use mark_maker_rs::Config;
use tracing::info;

#[derive(Debug, Args)]
#[clap(about = "🔬 (debug) utility to verify configuration")]
pub struct Command {
    #[clap(env)]
    config_file: String,
}

impl Command {
    pub async fn execute(self) -> Result<()> {
        let config_file = self.config_file;

        let config = Config::from_toml_file(config_file)?;
        info!("{config:#?}");

        Ok(())
    }
}
