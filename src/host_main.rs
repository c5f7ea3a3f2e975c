use anyhow::Result;
use clap::Parser;
use sitewatch::{
    settings::Settings,
    tracker::{args::HostArgs, start_tracker},
    utils::{
        logging::{enable_logging, HOST_PREFIX},
        runtime::single_thread_runtime,
    },
};
use tracing::error;

fn main() -> Result<()> {
    let args = HostArgs::parse();
    let settings = Settings::from_args(args.common)?;

    enable_logging(HOST_PREFIX, &settings.logs_dir(), args.log, args.log_console)?;
    single_thread_runtime()?
        .block_on(start_tracker(settings))
        .inspect_err(|e| error!("Host stopped with an error {e:?}"))?;
    Ok(())
}
