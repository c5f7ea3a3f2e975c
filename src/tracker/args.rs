use clap::Parser;
use tracing::level_filters::LevelFilter;

use crate::settings::CommonArgs;

/// Native host of the activation source. Reads events from stdin and answers on stdout.
#[derive(Parser)]
#[command(version)]
pub struct HostArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Mirror logs to stderr. This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
