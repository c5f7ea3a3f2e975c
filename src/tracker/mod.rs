use std::sync::Arc;

use anyhow::Result;
use session_tracker::SessionTracker;
use source::{EventSource, ResponseSink};
use tokio::{
    io::{AsyncBufRead, AsyncWrite, BufReader},
    sync::mpsc,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::error;

use crate::{
    remote::{ApiClient, RemoteApi},
    settings::Settings,
    storage::state_store::{FileStateStore, StateStore},
    sync::SyncQueue,
    utils::clock::{Clock, DefaultClock},
};

use blocklist::BlockListCache;
use events::{TrackerEvent, TrackerResponse};

pub mod args;
pub mod blocklist;
pub mod classifier;
pub mod events;
pub mod session;
pub mod session_tracker;
pub mod shutdown;
pub mod source;

const EVENT_QUEUE_SIZE: usize = 32;

/// Represents the starting point for the host. Speaks the protocol over stdin and stdout.
pub async fn start_tracker(settings: Settings) -> Result<()> {
    let store = Arc::new(FileStateStore::new(settings.state_dir())?);
    let remote: Arc<dyn RemoteApi> = Arc::new(ApiClient::new(&settings.api_base)?);

    run_tracker(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        store,
        remote,
        DefaultClock,
        settings.ledger_capacity,
    )
    .await
}

/// Runs until `input` ends or Ctrl-C, whichever comes first.
pub async fn run_tracker<S: StateStore>(
    input: impl AsyncBufRead + Unpin,
    output: impl AsyncWrite + Unpin,
    store: Arc<S>,
    remote: Arc<dyn RemoteApi>,
    clock: impl Clock,
    ledger_capacity: usize,
) -> Result<()> {
    let (event_sender, event_receiver) = mpsc::channel::<TrackerEvent>(EVENT_QUEUE_SIZE);
    let (response_sender, response_receiver) = mpsc::channel::<TrackerResponse>(EVENT_QUEUE_SIZE);

    let shutdown_token = CancellationToken::new();
    let tracker_done = CancellationToken::new();
    let tasks = TaskTracker::new();

    let source = EventSource::new(input, event_sender, shutdown_token.clone());
    let sink = ResponseSink::new(output, response_receiver, tracker_done.clone());
    let tracker = SessionTracker::new(
        event_receiver,
        response_sender,
        SyncQueue::new(store.clone(), remote.clone(), tasks.clone(), ledger_capacity),
        BlockListCache::new(store.clone(), remote),
        store,
        Box::new(clock),
        tasks,
    );

    let (_, source_result, tracker_result, sink_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        async {
            let result = source.run().await;
            shutdown_token.cancel();
            result
        },
        async {
            let result = tracker.run().await;
            tracker_done.cancel();
            result
        },
        sink.run(),
    );

    if let Err(source_result) = source_result {
        error!("Event source got an error {:?}", source_result);
    }

    if let Err(sink_result) = sink_result {
        error!("Response sink got an error {:?}", sink_result);
    }

    tracker_result
}

#[cfg(test)]
mod tracker_tests {
    use std::sync::Arc;

    use anyhow::Result;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

    use crate::{
        remote::{MockRemoteApi, RemoteApi},
        storage::state_store::{FileStateStore, StateKey, StateStore},
        sync::ledger::Ledger,
        utils::{clock::test_clock::ManualClock, logging::TEST_LOGGING},
    };

    use super::run_tracker;

    /// Very simple smoke test: a few events in, the host stops at the end of input and the last
    /// session ends up in the ledger.
    #[tokio::test]
    async fn smoke_test_host() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let store = Arc::new(FileStateStore::new(dir.path().to_path_buf())?);

        let mut remote = MockRemoteApi::new();
        remote.expect_post_session().never();
        remote.expect_fetch_blocked_sites().never();
        let remote: Arc<dyn RemoteApi> = Arc::new(remote);

        let (mut input, input_reader) = tokio::io::duplex(1024);
        let (output_writer, mut output) = tokio::io::duplex(1024);

        input
            .write_all(
                concat!(
                    "{\"type\": \"activation\", \"url\": \"https://github.com/\", \"tabId\": 1}\n",
                    "garbage\n",
                    "{\"type\": \"activation\", \"url\": \"https://news.example.org/\", \"tabId\": 2}\n",
                    "{\"type\": \"queryCurrent\"}\n",
                )
                .as_bytes(),
            )
            .await?;
        drop(input);

        run_tracker(
            BufReader::new(input_reader),
            output_writer,
            store.clone(),
            remote,
            ManualClock::new(),
            10,
        )
        .await?;

        let mut written = String::new();
        output.read_to_string(&mut written).await?;
        let lines = written.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 1);
        let response: serde_json::Value = serde_json::from_str(lines[0])?;
        assert_eq!(response["type"], "current");
        assert_eq!(response["session"]["domain"], "news.example.org");
        assert_eq!(response["trackingEnabled"], true);

        let ledger: Option<Ledger> = store.get(StateKey::Sessions).await?;
        let domains = ledger
            .unwrap_or_default()
            .into_iter()
            .map(|record| record.session.domain)
            .collect::<Vec<_>>();
        assert_eq!(domains, vec!["github.com", "news.example.org"]);
        Ok(())
    }
}
