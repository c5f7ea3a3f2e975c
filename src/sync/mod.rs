//! Everything that happens to a session after it was closed: the local ledger, daily totals and
//! delivery to the aggregator.

pub mod daily_stats;
pub mod ledger;

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    remote::RemoteApi,
    storage::state_store::{auth_credential, StateKey, StateStore},
    tracker::session::{Category, CompletedSession},
};

use daily_stats::{CategoryTotals, DailyStats};
use ledger::{mark_delivered, push_bounded, Ledger, LedgerRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No credential, the record stays local.
    Offline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncSummary {
    pub pending: usize,
    pub delivered: usize,
}

/// Bridges finished sessions to the ledger and the aggregator. Writes to the ledger are awaited,
/// deliveries run detached on `tasks` and only ever touch the ledger.
pub struct SyncQueue<S> {
    store: Arc<S>,
    remote: Arc<dyn RemoteApi>,
    tasks: TaskTracker,
    capacity: usize,
}

impl<S> Clone for SyncQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            remote: self.remote.clone(),
            tasks: self.tasks.clone(),
            capacity: self.capacity,
        }
    }
}

impl<S: StateStore> SyncQueue<S> {
    pub fn new(
        store: Arc<S>,
        remote: Arc<dyn RemoteApi>,
        tasks: TaskTracker,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            remote,
            tasks,
            capacity,
        }
    }

    /// Writes the session to the ledger, then starts its delivery. Returns the id of the record,
    /// or `None` when the ledger couldn't be written and the session is lost.
    pub async fn append(&self, session: CompletedSession) -> Option<Uuid> {
        let record = LedgerRecord::new(session);
        let capacity = self.capacity;
        let stored = record.clone();

        match self
            .store
            .modify(StateKey::Sessions, move |ledger: &mut Ledger| {
                push_bounded(ledger, stored, capacity)
            })
            .await
        {
            Ok(evicted) if !evicted.is_empty() => {
                debug!("Evicted {} records from the ledger", evicted.len())
            }
            Ok(_) => {}
            Err(e) => {
                error!(
                    "Failed to write session on {} to the ledger, it is lost: {e:?}",
                    record.session.domain
                );
                return None;
            }
        }

        let id = record.id;
        self.spawn_delivery(record);
        Some(id)
    }

    fn spawn_delivery(&self, record: LedgerRecord) {
        let store = self.store.clone();
        let remote = self.remote.clone();
        let span = info_span!("deliver", id = %record.id, domain = %record.session.domain);

        self.tasks.spawn(
            async move {
                match deliver(store.as_ref(), remote.as_ref(), &record).await {
                    Ok(Delivery::Delivered) => info!("Delivered session"),
                    Ok(Delivery::Offline) => debug!("Offline, session stays in the ledger"),
                    Err(e) => warn!("Failed to deliver session, it stays in the ledger: {e:?}"),
                }
            }
            .instrument(span),
        );
    }

    /// Sends every undelivered record again, oldest first. Stops at the first failure since the
    /// rest would most likely fail the same way.
    ///
    /// Records are taken as they are when the resync starts. A delivery still in flight, for
    /// example one spawned by the host while the cli resyncs, can send the same record twice.
    pub async fn resync(&self) -> Result<ResyncSummary> {
        let Some(token) = auth_credential(self.store.as_ref()).await? else {
            info!("No credential, nothing to resync against");
            return Ok(ResyncSummary::default());
        };

        let ledger: Ledger = self.store.get(StateKey::Sessions).await?.unwrap_or_default();
        let pending = ledger
            .into_iter()
            .filter(|record| !record.delivered)
            .collect::<Vec<_>>();

        let mut delivered = Vec::new();
        for record in &pending {
            match self.remote.post_session(&token, &record.session).await {
                Ok(()) => delivered.push(record.id),
                Err(e) => {
                    warn!("Resync stopped at {}: {e:?}", record.id);
                    break;
                }
            }
        }

        let summary = ResyncSummary {
            pending: pending.len(),
            delivered: delivered.len(),
        };
        if !delivered.is_empty() {
            self.store
                .modify(StateKey::Sessions, move |ledger: &mut Ledger| {
                    mark_delivered(ledger, &delivered)
                })
                .await?;
        }
        info!("Resynced {} of {} sessions", summary.delivered, summary.pending);
        Ok(summary)
    }

    pub fn spawn_resync(&self) {
        let queue = self.clone();
        self.tasks.spawn(
            async move {
                if let Err(e) = queue.resync().await {
                    warn!("Resync failed: {e:?}");
                }
            }
            .instrument(info_span!("resync")),
        );
    }

    pub async fn update_daily_stats(
        &self,
        day: NaiveDate,
        category: Category,
        duration: u64,
    ) -> Result<()> {
        self.store
            .modify(StateKey::DailyStats, move |stats: &mut DailyStats| {
                stats.add(day, category, duration)
            })
            .await
    }

    pub async fn day_totals(&self, day: NaiveDate) -> Result<CategoryTotals> {
        let stats: DailyStats = self
            .store
            .get(StateKey::DailyStats)
            .await?
            .unwrap_or_default();
        Ok(stats.day(day))
    }

    /// Throws away the running totals and recomputes them from the ledger. Days whose sessions
    /// were already evicted from the ledger lose their totals.
    pub async fn rebuild_daily_stats(&self) -> Result<DailyStats> {
        let ledger: Ledger = self.store.get(StateKey::Sessions).await?.unwrap_or_default();
        let stats = DailyStats::rebuild(&ledger);
        self.store.set(StateKey::DailyStats, &stats).await?;
        Ok(stats)
    }

    pub async fn records(&self) -> Result<Ledger> {
        Ok(self.store.get(StateKey::Sessions).await?.unwrap_or_default())
    }
}

async fn deliver<S: StateStore>(
    store: &S,
    remote: &dyn RemoteApi,
    record: &LedgerRecord,
) -> Result<Delivery> {
    let Some(token) = auth_credential(store).await? else {
        return Ok(Delivery::Offline);
    };

    remote.post_session(&token, &record.session).await?;

    let id = record.id;
    store
        .modify(StateKey::Sessions, move |ledger: &mut Ledger| {
            mark_delivered(ledger, &[id])
        })
        .await?;
    Ok(Delivery::Delivered)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::{tempdir, TempDir};
    use tokio_util::task::TaskTracker;

    use crate::{
        remote::{MockRemoteApi, RemoteApi},
        storage::state_store::{FileStateStore, StateKey, StateStore},
        tracker::session::{Category, CompletedSession},
        utils::{clock::test_clock::TEST_START_DATE, logging::TEST_LOGGING},
    };

    use super::{ledger::DEFAULT_LEDGER_CAPACITY, SyncQueue};

    fn session(domain: &str, offset_seconds: i64) -> CompletedSession {
        let start = Utc.from_utc_datetime(&TEST_START_DATE) + Duration::seconds(offset_seconds);
        CompletedSession {
            domain: domain.into(),
            url: format!("https://{domain}/"),
            tab_id: Some(1),
            start_time: start,
            end_time: start + Duration::seconds(10),
            duration: 10,
            category: Category::Neutral,
        }
    }

    async fn create_queue(
        remote: MockRemoteApi,
        token: Option<&str>,
    ) -> Result<(TempDir, Arc<FileStateStore>, TaskTracker, SyncQueue<FileStateStore>)> {
        let dir = tempdir()?;
        let store = Arc::new(FileStateStore::new(dir.path().to_path_buf())?);
        if let Some(token) = token {
            store
                .set(StateKey::AuthCredential, &token.to_string())
                .await?;
        }
        let tasks = TaskTracker::new();
        let remote: Arc<dyn RemoteApi> = Arc::new(remote);
        let queue = SyncQueue::new(store.clone(), remote, tasks.clone(), DEFAULT_LEDGER_CAPACITY);
        Ok((dir, store, tasks, queue))
    }

    #[tokio::test]
    async fn test_append_delivers_and_marks() -> Result<()> {
        *TEST_LOGGING;
        let mut remote = MockRemoteApi::new();
        remote
            .expect_post_session()
            .withf(|token, session| token.to_string() == "secret" && session.domain == "github.com")
            .times(1)
            .returning(|_, _| Ok(()));

        let (_dir, _store, tasks, queue) = create_queue(remote, Some("secret")).await?;

        let id = queue.append(session("github.com", 0)).await;
        assert!(id.is_some());

        tasks.close();
        tasks.wait().await;

        let records = queue.records().await?;
        assert_eq!(records.len(), 1);
        assert_eq!(Some(records[0].id), id);
        assert!(records[0].delivered);
        Ok(())
    }

    #[tokio::test]
    async fn test_append_without_credential_stays_local() -> Result<()> {
        let mut remote = MockRemoteApi::new();
        remote.expect_post_session().never();

        let (_dir, _store, tasks, queue) = create_queue(remote, None).await?;
        queue.append(session("github.com", 0)).await;

        tasks.close();
        tasks.wait().await;

        let records = queue.records().await?;
        assert_eq!(records.len(), 1);
        assert!(!records[0].delivered);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_retried() -> Result<()> {
        let mut remote = MockRemoteApi::new();
        remote
            .expect_post_session()
            .times(1)
            .returning(|_, _| Err(anyhow!("Activity service error (500 Internal Server Error)")));

        let (_dir, _store, tasks, queue) = create_queue(remote, Some("secret")).await?;
        queue.append(session("github.com", 0)).await;

        tasks.close();
        tasks.wait().await;

        let records = queue.records().await?;
        assert_eq!(records.len(), 1);
        assert!(!records[0].delivered);
        Ok(())
    }

    #[tokio::test]
    async fn test_ledger_at_capacity_keeps_size() -> Result<()> {
        let mut remote = MockRemoteApi::new();
        remote.expect_post_session().never();

        let (_dir, _store, tasks, queue) = create_queue(remote, None).await?;
        for i in 0..DEFAULT_LEDGER_CAPACITY as i64 {
            queue.append(session("example.org", i * 10)).await;
        }
        let first = queue.records().await?[0].clone();

        queue.append(session("example.org", 5000)).await;
        tasks.close();
        tasks.wait().await;

        let records = queue.records().await?;
        assert_eq!(records.len(), DEFAULT_LEDGER_CAPACITY);
        assert!(records.iter().all(|record| record.id != first.id));
        assert_eq!(
            records.back().map(|record| record.session.start_time),
            Some(session("example.org", 5000).start_time)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_resync_marks_until_first_failure() -> Result<()> {
        let mut remote = MockRemoteApi::new();
        let mut calls = 0;
        remote.expect_post_session().times(3).returning(move |_, _| {
            calls += 1;
            if calls == 3 {
                Err(anyhow!("connection refused"))
            } else {
                Ok(())
            }
        });

        let (_dir, store, tasks, queue) = create_queue(remote, None).await?;
        for i in 0..4 {
            queue.append(session("example.org", i * 10)).await;
        }
        tasks.close();
        tasks.wait().await;

        store
            .set(StateKey::AuthCredential, &"secret".to_string())
            .await?;
        let summary = queue.resync().await?;
        assert_eq!(summary.pending, 4);
        assert_eq!(summary.delivered, 2);

        let delivered = queue
            .records()
            .await?
            .iter()
            .map(|record| record.delivered)
            .collect::<Vec<_>>();
        assert_eq!(delivered, vec![true, true, false, false]);
        Ok(())
    }

    #[tokio::test]
    async fn test_resync_offline_does_nothing() -> Result<()> {
        let mut remote = MockRemoteApi::new();
        remote.expect_post_session().never();

        let (_dir, _store, _tasks, queue) = create_queue(remote, None).await?;
        let summary = queue.resync().await?;
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.delivered, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_daily_stats_rebuild() -> Result<()> {
        let mut remote = MockRemoteApi::new();
        remote.expect_post_session().never();

        let (_dir, store, tasks, queue) = create_queue(remote, None).await?;
        let day = TEST_START_DATE.date();
        queue.update_daily_stats(day, Category::Productive, 125).await?;
        queue.update_daily_stats(day, Category::Productive, 5).await?;
        assert_eq!(queue.day_totals(day).await?.productive, 130);

        queue.append(session("example.org", 0)).await;
        tasks.close();
        tasks.wait().await;

        let rebuilt = queue.rebuild_daily_stats().await?;
        assert_eq!(rebuilt.day(day).productive, 0);
        assert_eq!(rebuilt.day(day).neutral, 10);

        let stored: Option<super::DailyStats> = store.get(StateKey::DailyStats).await?;
        assert_eq!(stored, Some(rebuilt));
        Ok(())
    }
}
