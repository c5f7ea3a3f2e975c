use anyhow::Result;
use clap::Subcommand;
use tracing::info;

use crate::{
    remote::{
        types::{BlockCategory, NewBlockEntry, DEFAULT_BLOCK_DURATION},
        RemoteApi,
    },
    storage::state_store::{StateKey, StateStore},
};

use super::{output::print_block_list, CliContext};

#[derive(Subcommand, Debug)]
pub enum BlockCommand {
    #[command(about = "Show the blocked sites of the account")]
    List,
    #[command(about = "Block a site. Every hostname containing the domain is blocked")]
    Add {
        domain: String,
        #[arg(long, short, value_enum, default_value_t = BlockCategory::Other)]
        category: BlockCategory,
        #[arg(long = "duration", default_value = DEFAULT_BLOCK_DURATION)]
        block_duration: String,
    },
    #[command(about = "Unblock a site by the id shown in `block list`")]
    Remove { id: String },
}

/// Block-list management always goes through the service. The local cache is refreshed with the
/// result so the host sees changes without waiting for a miss.
pub async fn process_block_command(context: &CliContext, command: BlockCommand) -> Result<()> {
    let token = context.require_token().await?;

    match command {
        BlockCommand::List => {}
        BlockCommand::Add {
            domain,
            category,
            block_duration,
        } => {
            let domain = domain.trim().to_lowercase();
            anyhow::ensure!(!domain.is_empty(), "Domain can't be empty");

            let entry = context
                .client
                .add_blocked_site(
                    &token,
                    &NewBlockEntry {
                        domain,
                        category,
                        block_duration,
                    },
                )
                .await?;
            info!("Blocked {}", entry.domain);
            println!("Blocked {}", entry.domain);
        }
        BlockCommand::Remove { id } => {
            context.client.remove_blocked_site(&token, &id).await?;
            info!("Unblocked {id}");
            println!("Removed {id}");
        }
    }

    let entries = context.client.fetch_blocked_sites(&token).await?;
    context
        .store
        .set(StateKey::BlockedSitesCache, &entries)
        .await?;
    print_block_list(&entries);
    Ok(())
}
