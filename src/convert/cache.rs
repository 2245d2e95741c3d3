//! Conversion result cache with single-flight per key.
//!
//! Each `(source, format)` pair owns one artifact file named after a UUIDv5
//! of the source path, so two sources never share a slot. The first caller
//! for a key starts the conversion in a detached task; later callers wait on
//! the same outcome. When the last waiter goes away the conversion is asked
//! to stop; converters that cannot stop run to completion and their result
//! is cached. Finished artifacts are kept in an LRU together with the
//! source's size and mtime, and their files deleted on eviction or when the
//! source changes.

use super::Converter;
use crate::error::{AppError, Result};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Name of the artifact directory created under the configured temp dir.
const ARTIFACT_DIR: &str = "shelf-rs-artifacts";

/// How many times `ensure` retries when an artifact is evicted between the
/// conversion finishing and the waiter opening it, or when it joined a
/// conversion that was being cancelled.
const MAX_ATTEMPTS: usize = 3;

/// Identifies one conversion job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversionKey {
    /// Absolute source path.
    pub source: PathBuf,
    /// Lowercase target format, e.g. `"epub"`.
    pub format: String,
}

impl ConversionKey {
    /// Build a key.
    pub fn new(source: impl Into<PathBuf>, format: &str) -> Self {
        Self {
            source: source.into(),
            format: format.to_lowercase(),
        }
    }

    /// Artifact file name: stable for the key, distinct across keys.
    pub fn artifact_name(&self) -> String {
        let id = Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            self.source.as_os_str().as_encoded_bytes(),
        );
        format!("{}.{}", id, self.format)
    }
}

/// A converted file, opened while the cache still owned it.
#[derive(Debug)]
pub struct Artifact {
    /// Path of the artifact in the cache directory.
    pub path: PathBuf,
    /// Open handle; stays readable even if the entry is evicted later.
    pub file: std::fs::File,
}

/// Size and mtime of a source when its conversion started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl SourceStamp {
    fn read(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        Some(Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }
}

/// Lifecycle of a conversion as seen by waiters.
#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Ready,
    Cancelled,
    Failed(String),
}

enum Lookup {
    Hit(Artifact),
    Wait(watch::Receiver<Slot>, Waiter),
}

struct Ready {
    path: PathBuf,
    stamp: SourceStamp,
}

/// A conversion in progress and the callers waiting on it.
struct Flight {
    id: u64,
    rx: watch::Receiver<Slot>,
    waiters: usize,
    cancel: CancellationToken,
}

struct Inner {
    ready: LruCache<ConversionKey, Ready>,
    pending: HashMap<ConversionKey, Flight>,
    next_id: u64,
}

struct Shared {
    converter: Arc<dyn Converter>,
    dir: PathBuf,
    inner: Mutex<Inner>,
}

/// Keyed cache of converted artifacts in front of a [`Converter`].
#[derive(Clone)]
pub struct ConversionCache {
    shared: Arc<Shared>,
}

/// Registration of one caller on a flight. Dropping the last one cancels it.
struct Waiter {
    cache: ConversionCache,
    key: ConversionKey,
    id: u64,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let mut inner = self.cache.shared.inner.lock();
        if let Some(flight) = inner.pending.get_mut(&self.key)
            && flight.id == self.id
        {
            flight.waiters = flight.waiters.saturating_sub(1);
            if flight.waiters == 0 && !flight.cancel.is_cancelled() {
                tracing::debug!(
                    source = %self.key.source.display(),
                    format = %self.key.format,
                    "No waiters left; cancelling conversion"
                );
                flight.cancel.cancel();
            }
        }
    }
}

impl ConversionCache {
    /// Create a cache storing artifacts under `parent/shelf-rs-artifacts`.
    ///
    /// The artifact directory is emptied first: files left by a previous
    /// process have no entry and would never be cleaned up.
    pub fn new(converter: Arc<dyn Converter>, parent: &Path, max_entries: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(max_entries).ok_or_else(|| {
            AppError::Config("cache.max_entries must be at least 1".to_string())
        })?;

        let dir = parent.join(ARTIFACT_DIR);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Cannot clear {}: {}", dir.display(), e))
            })?;
        }
        std::fs::create_dir_all(&dir)
            .map_err(|e| AppError::Config(format!("Cannot create {}: {}", dir.display(), e)))?;

        tracing::info!(dir = %dir.display(), max_entries, "Conversion cache ready");

        Ok(Self {
            shared: Arc::new(Shared {
                converter,
                dir,
                inner: Mutex::new(Inner {
                    ready: LruCache::new(capacity),
                    pending: HashMap::new(),
                    next_id: 0,
                }),
            }),
        })
    }

    /// Directory holding artifacts.
    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    /// Number of finished artifacts held.
    pub fn len(&self) -> usize {
        self.shared.inner.lock().ready.len()
    }

    /// Whether no finished artifacts are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of conversions still running.
    pub fn in_flight(&self) -> usize {
        self.shared.inner.lock().pending.len()
    }

    /// Return an artifact converting `source` into `format`, converting at
    /// most once per key while the entry stays cached and the source is
    /// unchanged.
    pub async fn ensure(&self, source: &Path, format: &str) -> Result<Artifact> {
        let key = ConversionKey::new(source, format);

        for _ in 0..MAX_ATTEMPTS {
            let (mut rx, _waiter) = match self.lookup(&key) {
                Lookup::Hit(artifact) => return Ok(artifact),
                Lookup::Wait(rx, waiter) => (rx, waiter),
            };

            let slot = rx
                .wait_for(|s| !matches!(s, Slot::Pending))
                .await
                .map_err(|_| {
                    AppError::Conversion("Conversion task ended without a result".to_string())
                })?
                .clone();

            if let Slot::Failed(message) = slot {
                return Err(AppError::Conversion(message));
            }
        }

        Err(AppError::Internal(format!(
            "No usable artifact for {} after {} attempts",
            key.source.display(),
            MAX_ATTEMPTS
        )))
    }

    /// Open a cached artifact, join an in-flight conversion, or start one.
    fn lookup(&self, key: &ConversionKey) -> Lookup {
        let current = SourceStamp::read(&key.source);
        let mut inner = self.shared.inner.lock();

        if let Some(entry) = inner.ready.get(key) {
            if current.as_ref() == Some(&entry.stamp) {
                match std::fs::File::open(&entry.path) {
                    Ok(file) => {
                        tracing::debug!(artifact = %entry.path.display(), "Conversion cache hit");
                        return Lookup::Hit(Artifact {
                            path: entry.path.clone(),
                            file,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(
                            artifact = %entry.path.display(),
                            error = %e,
                            "Cached artifact unreadable"
                        );
                    }
                }
            } else {
                tracing::info!(
                    source = %key.source.display(),
                    format = %key.format,
                    "Source changed since conversion"
                );
            }

            if let Some(stale) = inner.ready.pop(key) {
                remove_artifact(&stale.path);
            }
        }

        if let Some(flight) = inner.pending.get_mut(key) {
            tracing::debug!(
                source = %key.source.display(),
                format = %key.format,
                "Joining in-flight conversion"
            );
            flight.waiters += 1;
            let waiter = self.waiter(key, flight.id);
            return Lookup::Wait(flight.rx.clone(), waiter);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let (tx, rx) = watch::channel(Slot::Pending);
        let cancel = CancellationToken::new();
        inner.pending.insert(
            key.clone(),
            Flight {
                id,
                rx: rx.clone(),
                waiters: 1,
                cancel: cancel.clone(),
            },
        );
        drop(inner);

        // Detached: the task owns the outcome even if every waiter leaves.
        tokio::spawn(self.clone().run(key.clone(), tx, cancel));
        Lookup::Wait(rx, self.waiter(key, id))
    }

    fn waiter(&self, key: &ConversionKey, id: u64) -> Waiter {
        Waiter {
            cache: self.clone(),
            key: key.clone(),
            id,
        }
    }

    /// Run one conversion and publish its outcome.
    async fn run(self, key: ConversionKey, tx: watch::Sender<Slot>, cancel: CancellationToken) {
        let destination = self.shared.dir.join(key.artifact_name());
        let start = std::time::Instant::now();
        tracing::info!(
            source = %key.source.display(),
            format = %key.format,
            "Converting"
        );

        let converter = Arc::clone(&self.shared.converter);
        let (source, output) = (key.source.clone(), destination.clone());
        let token = cancel.clone();
        let result = tokio::task::spawn_blocking(move || {
            remove_artifact(&output);
            // Stamped before converting: a change mid-conversion forces a redo.
            let stamp = SourceStamp::read(&source)
                .ok_or_else(|| AppError::NotFound(source.display().to_string()))?;
            converter.convert_cancellable(&source, &output, &token)?;
            if !output.is_file() {
                return Err(AppError::Conversion(
                    "Converter reported success but wrote no output".to_string(),
                ));
            }
            Ok(stamp)
        })
        .await
        .unwrap_or_else(|e| Err(AppError::Internal(format!("Converter task failed: {}", e))));

        let slot = {
            let mut inner = self.shared.inner.lock();
            inner.pending.remove(&key);

            match result {
                Ok(stamp) => {
                    tracing::info!(
                        source = %key.source.display(),
                        format = %key.format,
                        elapsed = ?start.elapsed(),
                        "Conversion complete"
                    );
                    let ready = Ready {
                        path: destination,
                        stamp,
                    };
                    if let Some((evicted, old)) = inner.ready.push(key.clone(), ready)
                        && evicted != key
                    {
                        tracing::debug!(artifact = %old.path.display(), "Evicting artifact");
                        remove_artifact(&old.path);
                    }
                    Slot::Ready
                }
                Err(_) if cancel.is_cancelled() => {
                    tracing::info!(
                        source = %key.source.display(),
                        format = %key.format,
                        elapsed = ?start.elapsed(),
                        "Conversion cancelled"
                    );
                    remove_artifact(&destination);
                    Slot::Cancelled
                }
                Err(e) => {
                    tracing::warn!(
                        source = %key.source.display(),
                        format = %key.format,
                        error = %e,
                        "Conversion failed"
                    );
                    remove_artifact(&destination);
                    Slot::Failed(e.to_string())
                }
            }
        };

        tx.send_replace(slot);
    }

    #[cfg(test)]
    fn waiters(&self, key: &ConversionKey) -> usize {
        self.shared
            .inner
            .lock()
            .pending
            .get(key)
            .map_or(0, |f| f.waiters)
    }
}

fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(artifact = %path.display(), error = %e, "Failed to remove artifact")
        }
    }
}
