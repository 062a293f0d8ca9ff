use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::config::Config;
use crate::env::Env;
use crate::error::{Context, Result};
use crate::signers::SignerSet;

#[derive(Clone, Debug, Parser, PartialEq, Eq)]
pub struct Run {
    /// The configuration file
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: PathBuf,
}

impl Run {
    pub fn execute(self, env: impl Env) -> Result<()> {
        let config = Config::load(&env.in_cwd(&self.config))?;
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.run(config, &env))
    }

    async fn run(self, config: Config, env: &impl Env) -> Result<()> {
        let mut signers = SignerSet::from_config(&config, env)?;
        signers.on_startup()?;
        signers.start_refresh();
        info!("keeping {} zones signed", signers.len());

        tokio::signal::ctrl_c()
            .await
            .context("waiting for interrupt")?;

        info!("interrupted, waiting for running passes");
        signers.shutdown().await;
        Ok(())
    }
}
