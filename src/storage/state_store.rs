use std::{future::Future, io::ErrorKind, path::PathBuf};

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::Mutex,
};
use tracing::{debug, warn};

/// Keys of the persisted local state. Every key holds one JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKey {
    TrackingEnabled,
    CurrentSession,
    Sessions,
    DailyStats,
    BlockedSitesCache,
    AuthCredential,
}

impl StateKey {
    pub fn name(self) -> &'static str {
        match self {
            StateKey::TrackingEnabled => "trackingEnabled",
            StateKey::CurrentSession => "currentSession",
            StateKey::Sessions => "sessions",
            StateKey::DailyStats => "dailyStats",
            StateKey::BlockedSitesCache => "blockedSitesCache",
            StateKey::AuthCredential => "authCredential",
        }
    }
}

/// Interface for abstracting the local key-value state.
pub trait StateStore: Send + Sync + 'static {
    /// Reads the value under `key`. Missing values are `None`.
    fn get<T>(&self, key: StateKey) -> impl Future<Output = Result<Option<T>>> + Send
    where
        T: DeserializeOwned + Send;

    fn set<T>(&self, key: StateKey, value: &T) -> impl Future<Output = Result<()>> + Send
    where
        T: Serialize + Sync;

    fn remove(&self, key: StateKey) -> impl Future<Output = Result<()>> + Send;

    /// Read-modify-write of a single key. Nobody else can touch the key until `f` has run and the
    /// result is written back. Missing values start from `T::default()`.
    fn modify<T, R, F>(&self, key: StateKey, f: F) -> impl Future<Output = Result<R>> + Send
    where
        T: Serialize + DeserializeOwned + Default + Send + Sync,
        R: Send,
        F: FnOnce(&mut T) -> R + Send;
}

/// The credential used for remote calls. A missing or empty credential means "offline".
pub async fn auth_credential<S: StateStore>(store: &S) -> Result<Option<String>> {
    Ok(store
        .get::<String>(StateKey::AuthCredential)
        .await?
        .filter(|token| !token.is_empty()))
}

/// The main realization of [StateStore]. Each key is a file `<key>.json` inside `state_dir`.
///
/// Files are guarded with advisory locks so the host and the cli can share the directory. Inside
/// one process operations are serialized by `guard` first: a blocking file lock taken while
/// another task of the same runtime holds it would never be released.
pub struct FileStateStore {
    state_dir: PathBuf,
    guard: Mutex<()>,
}

impl FileStateStore {
    pub fn new(state_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&state_dir)?;

        Ok(Self {
            state_dir,
            guard: Mutex::new(()),
        })
    }

    fn path(&self, key: StateKey) -> PathBuf {
        self.state_dir.join(format!("{}.json", key.name()))
    }

    async fn open_writable(&self, key: StateKey) -> Result<File> {
        File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.path(key))
            .await
            .with_context(|| format!("Failed to open state {}", key.name()))
    }
}

impl StateStore for FileStateStore {
    async fn get<T>(&self, key: StateKey) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let _guard = self.guard.lock().await;
        let mut file = match File::open(self.path(key)).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open state {}", key.name()))
            }
        };

        file.lock_shared()?;
        let result = read_document(&mut file, key).await;
        file.unlock_async().await?;
        result
    }

    async fn set<T>(&self, key: StateKey, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let _guard = self.guard.lock().await;
        let mut file = self.open_writable(key).await?;

        file.lock_exclusive()?;
        let result = write_document(&mut file, value).await;
        file.unlock_async().await?;
        result
    }

    async fn remove(&self, key: StateKey) -> Result<()> {
        let _guard = self.guard.lock().await;
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove state {}", key.name())),
        }
    }

    async fn modify<T, R, F>(&self, key: StateKey, f: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Default + Send + Sync,
        R: Send,
        F: FnOnce(&mut T) -> R + Send,
    {
        let _guard = self.guard.lock().await;
        let mut file = self.open_writable(key).await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result: Result<R> = async {
            let mut value = read_document::<T>(&mut file, key)
                .await?
                .unwrap_or_default();
            let output = f(&mut value);
            write_document(&mut file, &value).await?;
            Ok(output)
        }
        .await;
        file.unlock_async().await?;
        result
    }
}

/// Empty and corrupted documents read as absent. A write cut off by a shutdown must not stop
/// tracking.
async fn read_document<T: DeserializeOwned>(file: &mut File, key: StateKey) -> Result<Option<T>> {
    file.rewind().await?;
    let mut content = String::new();
    file.read_to_string(&mut content).await?;

    if content.trim().is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<T>(&content) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            warn!("State {} is corrupted, treating it as absent: {e}", key.name());
            Ok(None)
        }
    }
}

async fn write_document<T: Serialize>(file: &mut File, value: &T) -> Result<()> {
    let buffer = serde_json::to_vec(value)?;
    file.set_len(0).await?;
    file.rewind().await?;
    file.write_all(&buffer).await?;
    file.flush().await?;
    file.sync_data().await?;
    debug!("Wrote {} bytes of state", buffer.len());
    Ok(())
}
