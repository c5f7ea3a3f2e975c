use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{TrackerEvent, TrackerResponse};

/// Reads newline-delimited JSON events and queues them for the tracker. Lines that don't decode
/// are logged and skipped.
pub struct EventSource<R> {
    reader: R,
    next: mpsc::Sender<TrackerEvent>,
    shutdown: CancellationToken,
}

impl<R: AsyncBufRead + Unpin> EventSource<R> {
    pub fn new(reader: R, next: mpsc::Sender<TrackerEvent>, shutdown: CancellationToken) -> Self {
        Self {
            reader,
            next,
            shutdown,
        }
    }

    /// Runs until the input ends or shutdown is requested. Returning drops the sender, which
    /// lets the tracker finish.
    pub async fn run(mut self) -> Result<()> {
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                read = self.reader.read_until(b'\n', &mut line) => {
                    read.context("Failed to read from the activation source")?
                }
            };
            if read == 0 {
                info!("Activation source closed");
                return Ok(());
            }

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }

            // Undecodable bytes are dropped like any other malformed event.
            match serde_json::from_slice::<TrackerEvent>(trimmed) {
                Ok(event) => {
                    debug!("Received {event:?}");
                    self.next
                        .send(event)
                        .await
                        .inspect_err(|e| error!("Tracker is gone, can't send {e:?}"))?;
                }
                Err(e) => warn!(
                    "Dropping malformed event {:?}: {e}",
                    String::from_utf8_lossy(trimmed)
                ),
            }
        }
    }
}

/// Writes tracker responses as newline-delimited JSON.
pub struct ResponseSink<W> {
    writer: W,
    receiver: mpsc::Receiver<TrackerResponse>,
    done: CancellationToken,
}

impl<W: AsyncWrite + Unpin> ResponseSink<W> {
    pub fn new(
        writer: W,
        receiver: mpsc::Receiver<TrackerResponse>,
        done: CancellationToken,
    ) -> Self {
        Self {
            writer,
            receiver,
            done,
        }
    }

    /// Runs until every sender of responses is dropped, or until `done` is cancelled and the
    /// queued responses are written. Background tasks that outlive the tracker may still hold a
    /// sender.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let response = tokio::select! {
                biased;
                response = self.receiver.recv() => response,
                _ = self.done.cancelled() => {
                    while let Ok(response) = self.receiver.try_recv() {
                        self.write(&response).await?;
                    }
                    return Ok(());
                }
            };
            match response {
                Some(response) => self.write(&response).await?,
                None => return Ok(()),
            }
        }
    }

    async fn write(&mut self, response: &TrackerResponse) -> Result<()> {
        let mut buffer = serde_json::to_vec(response)?;
        buffer.push(b'\n');
        self.writer
            .write_all(&buffer)
            .await
            .context("Failed to write response")?;
        self.writer.flush().await?;
        Ok(())
    }
}
