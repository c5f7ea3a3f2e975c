use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    storage::state_store::{StateKey, StateStore},
    sync::SyncQueue,
    utils::{
        clock::Clock,
        time::{date_to_key, local_day},
    },
};

use super::{
    blocklist::BlockListCache,
    classifier::classify,
    events::{TrackerEvent, TrackerResponse},
    session::{ActiveSite, CompletedSession, OpenSession},
};

/// How long detached deliveries and block checks may keep running after the input ended.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// The outcome of a state change. A closed session always comes before an opened one.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Transition {
    pub closed: Option<CompletedSession>,
    pub opened: Option<OpenSession>,
}

/// In-memory state of the tracker. Transitions are pure, everything with side effects happens in
/// [SessionTracker].
#[derive(Debug)]
pub struct TrackerState {
    current: Option<OpenSession>,
    tracking_enabled: bool,
    last_active: Option<ActiveSite>,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            current: None,
            tracking_enabled: true,
            last_active: None,
        }
    }
}

impl TrackerState {
    pub fn current(&self) -> Option<&OpenSession> {
        self.current.as_ref()
    }

    pub fn tracking_enabled(&self) -> bool {
        self.tracking_enabled
    }

    pub fn activate(&mut self, site: ActiveSite, now: DateTime<Utc>) -> Transition {
        self.last_active = Some(site.clone());

        if !self.tracking_enabled {
            return Transition::default();
        }
        if self
            .current
            .as_ref()
            .is_some_and(|current| current.is_same_site(&site))
        {
            return Transition::default();
        }

        let closed = self.close(now);
        let category = classify(&site.domain);
        let opened = OpenSession::open(site, category, now);
        self.current = Some(opened.clone());

        Transition {
            closed,
            opened: Some(opened),
        }
    }

    /// A page that can't be tracked became active. The open session continues, but while
    /// disabled nothing is remembered for re-enabling.
    pub fn activate_untracked(&mut self) {
        if !self.tracking_enabled {
            self.last_active = None;
        }
    }

    /// Enabling opens a session for `active`, or for the last site seen while disabled.
    pub fn set_tracking(
        &mut self,
        enabled: bool,
        active: Option<ActiveSite>,
        now: DateTime<Utc>,
    ) -> Transition {
        self.tracking_enabled = enabled;

        if !enabled {
            return Transition {
                closed: self.close(now),
                opened: None,
            };
        }

        match active.or_else(|| self.last_active.clone()) {
            Some(site) => self.activate(site, now),
            None => Transition::default(),
        }
    }

    pub fn close(&mut self, now: DateTime<Utc>) -> Option<CompletedSession> {
        self.current.take().map(|session| session.close(now))
    }
}

/// Owns the current session. Events are handled one at a time, so a close and the following
/// open are finished, ledger write included, before the next event is looked at.
pub struct SessionTracker<S> {
    receiver: mpsc::Receiver<TrackerEvent>,
    responses: mpsc::Sender<TrackerResponse>,
    state: TrackerState,
    sync: SyncQueue<S>,
    blocklist: BlockListCache<S>,
    store: Arc<S>,
    clock: Box<dyn Clock>,
    tasks: TaskTracker,
}

impl<S: StateStore> SessionTracker<S> {
    pub fn new(
        receiver: mpsc::Receiver<TrackerEvent>,
        responses: mpsc::Sender<TrackerResponse>,
        sync: SyncQueue<S>,
        blocklist: BlockListCache<S>,
        store: Arc<S>,
        clock: Box<dyn Clock>,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            receiver,
            responses,
            state: TrackerState::default(),
            sync,
            blocklist,
            store,
            clock,
            tasks,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        self.restore().await;

        while let Some(event) = self.receiver.recv().await {
            debug!("Handling {event:?}");
            if let Err(e) = self.handle(event).await {
                error!("Failed to handle event: {e:?}");
            }
        }

        self.receiver.close();
        self.finalize().await
    }

    async fn restore(&mut self) {
        self.state.tracking_enabled = self
            .store
            .get::<bool>(StateKey::TrackingEnabled)
            .await
            .inspect_err(|e| warn!("Failed to read tracking flag: {e:?}"))
            .ok()
            .flatten()
            .unwrap_or(true);

        // Its end time is unknown, so it can't be recorded.
        match self.store.get::<OpenSession>(StateKey::CurrentSession).await {
            Ok(Some(stale)) => {
                warn!(
                    "Discarding session on {} left open since {}",
                    stale.domain, stale.start_time
                );
                if let Err(e) = self.store.remove(StateKey::CurrentSession).await {
                    error!("Failed to remove stale session: {e:?}");
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to read current session: {e:?}"),
        }

        info!("Tracker started, tracking enabled: {}", self.state.tracking_enabled);
    }

    async fn handle(&mut self, event: TrackerEvent) -> Result<()> {
        match event {
            TrackerEvent::Activation(target) => {
                let Some(site) = ActiveSite::from_target(&target) else {
                    debug!("Ignoring non-trackable {}", target.url);
                    self.state.activate_untracked();
                    return Ok(());
                };
                let transition = self.state.activate(site, self.clock.time());
                self.apply(transition).await;
            }
            TrackerEvent::TrackingToggled { enabled, active } => {
                if let Err(e) = self.store.set(StateKey::TrackingEnabled, &enabled).await {
                    error!("Failed to persist tracking flag: {e:?}");
                }
                let site = active.as_ref().and_then(ActiveSite::from_target);
                if active.is_some() && site.is_none() {
                    self.state.activate_untracked();
                }
                let transition = self.state.set_tracking(enabled, site, self.clock.time());
                info!("Tracking enabled: {enabled}");
                self.apply(transition).await;
            }
            TrackerEvent::QueryCurrent => {
                self.respond(TrackerResponse::Current {
                    session: self.state.current.clone(),
                    tracking_enabled: self.state.tracking_enabled,
                })
                .await;
            }
            TrackerEvent::TodayStats => {
                let today = local_day(self.clock.time());
                let totals = self.sync.day_totals(today).await?;
                self.respond(TrackerResponse::TodayStats {
                    date: date_to_key(today),
                    productive: totals.productive,
                    neutral: totals.neutral,
                    distracting: totals.distracting,
                })
                .await;
            }
            TrackerEvent::Resync => self.sync.spawn_resync(),
        }
        Ok(())
    }

    async fn apply(&mut self, transition: Transition) {
        let closed = transition.closed.is_some();
        if let Some(session) = transition.closed {
            self.record(session).await;
        }

        match transition.opened {
            Some(session) => {
                info!("Opened {} session on {}", session.category, session.domain);
                if let Err(e) = self.store.set(StateKey::CurrentSession, &session).await {
                    error!("Failed to persist current session: {e:?}");
                }
                self.spawn_block_check(&session);
            }
            None if closed => {
                if let Err(e) = self.store.remove(StateKey::CurrentSession).await {
                    error!("Failed to remove current session: {e:?}");
                }
            }
            None => {}
        }
    }

    async fn record(&self, session: CompletedSession) {
        info!(
            "Closed {} session on {} after {}s",
            session.category, session.domain, session.duration
        );
        let day = local_day(session.end_time);
        let (category, duration) = (session.category, session.duration);

        self.sync.append(session).await;
        if let Err(e) = self.sync.update_daily_stats(day, category, duration).await {
            error!("Failed to update daily stats: {e:?}");
        }
    }

    fn spawn_block_check(&self, session: &OpenSession) {
        let blocklist = self.blocklist.clone();
        let responses = self.responses.clone();
        let domain = session.domain.clone();
        let tab_id = session.tab_id;
        let span = info_span!("block_check", domain = %domain);

        self.tasks.spawn(
            async move {
                if !blocklist.is_blocked(&domain).await {
                    return;
                }
                info!("Site is blocked, redirecting tab {tab_id:?}");
                if responses
                    .send(TrackerResponse::Redirect { tab_id, domain })
                    .await
                    .is_err()
                {
                    debug!("Nobody listens for the redirect anymore");
                }
            }
            .instrument(span),
        );
    }

    async fn respond(&self, response: TrackerResponse) {
        if let Err(e) = self.responses.send(response).await {
            warn!("Failed to send response: {e:?}");
        }
    }

    /// Records the open session and gives detached work a bounded time to finish.
    async fn finalize(&mut self) -> Result<()> {
        if let Some(session) = self.state.close(self.clock.time()) {
            self.record(session).await;
            self.store.remove(StateKey::CurrentSession).await?;
        }

        self.tasks.close();
        if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, self.tasks.wait())
            .await
            .is_err()
        {
            warn!(
                "{} background tasks didn't finish in time",
                self.tasks.len()
            );
        }
        info!("Tracker stopped");
        Ok(())
    }
}
