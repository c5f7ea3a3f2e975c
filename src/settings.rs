use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::{
    remote::DEFAULT_API_BASE, sync::ledger::DEFAULT_LEDGER_CAPACITY,
    utils::dir::create_application_default_path,
};

/// Arguments shared by the host and the cli.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Directory with the local state and the logs.
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Base url of the activity service.
    #[arg(long, env = "SITEWATCH_API", default_value = DEFAULT_API_BASE)]
    pub api: String,
    /// How many finished sessions are kept locally.
    #[arg(long = "ledger-capacity", default_value_t = DEFAULT_LEDGER_CAPACITY)]
    pub ledger_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_dir: PathBuf,
    pub api_base: String,
    pub ledger_capacity: usize,
}

impl Settings {
    pub fn from_args(args: CommonArgs) -> Result<Self> {
        let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
        Ok(Self {
            app_dir,
            api_base: args.api,
            ledger_capacity: args.ledger_capacity.max(1),
        })
    }

    pub fn state_dir(&self) -> PathBuf {
        self.app_dir.join("state")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.app_dir.join("logs")
    }
}
