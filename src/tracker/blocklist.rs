use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::{
    remote::{types::BlockEntry, RemoteApi},
    storage::state_store::{auth_credential, StateKey, StateStore},
};

/// Answers "is this domain blocked" from the local copy of the block-list first. The remote list
/// is only fetched when the local copy has no match, and replaces it wholesale.
pub struct BlockListCache<S> {
    store: Arc<S>,
    remote: Arc<dyn RemoteApi>,
}

impl<S> Clone for BlockListCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            remote: self.remote.clone(),
        }
    }
}

impl<S: StateStore> BlockListCache<S> {
    pub fn new(store: Arc<S>, remote: Arc<dyn RemoteApi>) -> Self {
        Self { store, remote }
    }

    /// Never fails. Anything going wrong on the way to the remote list means "not blocked".
    pub async fn is_blocked(&self, domain: &str) -> bool {
        match self.check(domain).await {
            Ok(blocked) => blocked,
            Err(e) => {
                warn!("Block check for {domain} failed, allowing it: {e:?}");
                false
            }
        }
    }

    async fn check(&self, domain: &str) -> Result<bool> {
        let cached: Vec<BlockEntry> = self
            .store
            .get(StateKey::BlockedSitesCache)
            .await
            .inspect_err(|e| warn!("Failed to read the block-list cache: {e:?}"))
            .ok()
            .flatten()
            .unwrap_or_default();
        if cached.iter().any(|entry| entry.matches(domain)) {
            return Ok(true);
        }

        let Some(token) = auth_credential(self.store.as_ref()).await? else {
            debug!("Offline, {domain} is not in the local block-list");
            return Ok(false);
        };

        let entries = self.remote.fetch_blocked_sites(&token).await?;
        let blocked = entries.iter().any(|entry| entry.matches(domain));
        debug!("Refreshed block-list with {} entries", entries.len());

        if let Err(e) = self.store.set(StateKey::BlockedSitesCache, &entries).await {
            warn!("Failed to update the block-list cache: {e:?}");
        }
        Ok(blocked)
    }
}
