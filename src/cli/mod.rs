pub mod block;
pub mod output;
pub mod report;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use block::{process_block_command, BlockCommand};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use report::{process_report_command, ReportCommand};
use tokio_util::task::TaskTracker;
use tracing::{level_filters::LevelFilter, warn};

use crate::{
    remote::{ApiClient, RemoteApi},
    settings::{CommonArgs, Settings},
    storage::state_store::{auth_credential, FileStateStore, StateKey, StateStore},
    sync::SyncQueue,
    tracker::{session::OpenSession, start_tracker},
    utils::{
        logging::{enable_logging, CLI_PREFIX},
        time::{date_to_key, local_day},
    },
};

#[derive(Parser, Debug)]
#[command(name = "sitewatch", version, long_about = None)]
#[command(about = "Tracks time spent on websites and how productive it was", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Show tracking state, the current session and today's totals")]
    Status {
        #[arg(
            long = "rebuild-stats",
            help = "Recompute daily totals from the locally kept sessions first"
        )]
        rebuild_stats: bool,
    },
    #[command(about = "Per-category report over a range of days")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
    #[command(about = "List recorded sessions")]
    History {
        #[arg(long, help = "Only sessions of this day, as YYYY-MM-DD")]
        date: Option<NaiveDate>,
        #[arg(long, help = "Only use sessions recorded on this machine")]
        local: bool,
    },
    #[command(about = "Manage blocked sites")]
    Block {
        #[command(subcommand)]
        command: BlockCommand,
    },
    #[command(about = "Store the token used for the activity service")]
    Login { token: String },
    #[command(about = "Forget the stored token. Tracking continues offline")]
    Logout,
    #[command(about = "Send sessions that never reached the activity service")]
    Resync,
    #[command(
        about = "Run the tracker host directly in current console. Events are read from stdin"
    )]
    Serve,
}

/// Everything a command may need. Built once per invocation.
pub struct CliContext {
    pub settings: Settings,
    pub store: Arc<FileStateStore>,
    pub client: Arc<ApiClient>,
    pub sync: SyncQueue<FileStateStore>,
}

impl CliContext {
    fn new(settings: Settings) -> Result<Self> {
        let store = Arc::new(FileStateStore::new(settings.state_dir())?);
        let client = Arc::new(ApiClient::new(&settings.api_base)?);
        let remote: Arc<dyn RemoteApi> = client.clone();
        let sync = SyncQueue::new(
            store.clone(),
            remote,
            TaskTracker::new(),
            settings.ledger_capacity,
        );

        Ok(Self {
            settings,
            store,
            client,
            sync,
        })
    }

    async fn require_token(&self) -> Result<String> {
        auth_credential(self.store.as_ref())
            .await?
            .ok_or_else(|| anyhow!("Not logged in. Use `sitewatch login <token>` first"))
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::from_args(args.common)?;
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &settings.logs_dir(), logging_level, args.log)?;

    let context = CliContext::new(settings)?;
    match args.commands {
        Commands::Status { rebuild_stats } => process_status_command(&context, rebuild_stats).await,
        Commands::Report { command } => process_report_command(&context, command).await,
        Commands::History { date, local } => process_history_command(&context, date, local).await,
        Commands::Block { command } => process_block_command(&context, command).await,
        Commands::Login { token } => {
            let token = token.trim().to_string();
            anyhow::ensure!(!token.is_empty(), "Token can't be empty");
            context.store.set(StateKey::AuthCredential, &token).await?;
            println!("Logged in. Run `sitewatch resync` to send sessions recorded offline.");
            Ok(())
        }
        Commands::Logout => {
            context.store.remove(StateKey::AuthCredential).await?;
            println!("Logged out");
            Ok(())
        }
        Commands::Resync => {
            let summary = context.sync.resync().await?;
            if auth_credential(context.store.as_ref()).await?.is_none() {
                println!("Not logged in, nothing was sent");
            } else {
                println!(
                    "Sent {} of {} pending sessions",
                    summary.delivered, summary.pending
                );
            }
            Ok(())
        }
        Commands::Serve => start_tracker(context.settings.clone()).await,
    }
}

async fn process_status_command(context: &CliContext, rebuild_stats: bool) -> Result<()> {
    if rebuild_stats {
        context.sync.rebuild_daily_stats().await?;
        println!("Daily totals rebuilt from the local ledger\n");
    }

    let tracking_enabled = context
        .store
        .get::<bool>(StateKey::TrackingEnabled)
        .await?
        .unwrap_or(true);
    let current: Option<OpenSession> = context.store.get(StateKey::CurrentSession).await?;
    output::print_current(current.as_ref(), tracking_enabled);

    let records = context.sync.records().await?;
    let pending = records.iter().filter(|record| !record.delivered).count();
    let logged_in = auth_credential(context.store.as_ref()).await?.is_some();
    println!(
        "Ledger\t\t{} sessions, {} not synced ({})\n",
        records.len(),
        pending,
        if logged_in { "logged in" } else { "offline" }
    );

    let today = Local::now().date_naive();
    let totals = context.sync.day_totals(today).await?;
    output::print_totals(&date_to_key(today), &totals);
    Ok(())
}

async fn process_history_command(
    context: &CliContext,
    date: Option<NaiveDate>,
    local: bool,
) -> Result<()> {
    let token = if local {
        None
    } else {
        auth_credential(context.store.as_ref()).await?
    };

    if let Some(token) = token {
        match context.client.sessions(&token, date).await {
            Ok(sessions) => {
                output::print_remote_sessions(&sessions);
                return Ok(());
            }
            Err(e) => {
                warn!("Failed to fetch sessions: {e:?}");
                println!("Activity service unavailable, using sessions recorded locally.\n");
            }
        }
    }

    let records = context.sync.records().await?;
    let records = records
        .iter()
        .filter(|record| {
            date.map_or(true, |date| local_day(record.session.start_time) == date)
        })
        .collect::<Vec<_>>();
    output::print_ledger(&records);
    Ok(())
}
