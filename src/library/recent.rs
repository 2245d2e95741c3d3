//! Bounded "most recently modified" index over a directory tree.

use crate::error::{AppError, Result};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default number of entries when the caller gives none or an invalid one.
pub const DEFAULT_RECENT_COUNT: usize = 50;

/// Output order of a recency listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Oldest first.
    Ascending,
    /// Most recent first.
    Descending,
}

/// A file and its modification time in whole seconds.
///
/// Ordered by time, then by the raw path bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecencyEntry {
    /// Modification time, seconds since the Unix epoch.
    pub modified: i64,
    /// Absolute path of the file.
    pub path: PathBuf,
}

impl Ord for RecencyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.modified
            .cmp(&other.modified)
            .then_with(|| self.path.as_os_str().cmp(other.path.as_os_str()))
    }
}

impl PartialOrd for RecencyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sorted window holding the K largest entries offered so far.
#[derive(Debug)]
pub struct RecencyWindow {
    capacity: usize,
    entries: Vec<RecencyEntry>,
}

impl RecencyWindow {
    /// Create a window. A zero capacity falls back to [`DEFAULT_RECENT_COUNT`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_RECENT_COUNT
        } else {
            capacity
        };

        Self {
            capacity,
            entries: Vec::with_capacity(capacity.min(1024)),
        }
    }

    /// Maximum number of entries kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offer a candidate. Returns whether it was kept.
    pub fn offer(&mut self, entry: RecencyEntry) -> bool {
        if self.entries.len() >= self.capacity {
            match self.entries.first() {
                Some(smallest) if entry > *smallest => {}
                _ => return false,
            }
        }

        let position = self.entries.partition_point(|e| *e <= entry);
        self.entries.insert(position, entry);

        if self.entries.len() > self.capacity {
            self.entries.remove(0);
        }
        true
    }

    /// Consume the window, yielding entries in `order`.
    pub fn into_recent(mut self, order: Order) -> RecentFiles {
        if order == Order::Descending {
            self.entries.reverse();
        }
        RecentFiles {
            inner: self.entries.into_iter(),
        }
    }
}

/// One-shot sequence produced by a recency walk.
#[derive(Debug)]
pub struct RecentFiles {
    inner: std::vec::IntoIter<RecencyEntry>,
}

impl Iterator for RecentFiles {
    type Item = RecencyEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for RecentFiles {}

/// Parse a client-supplied count. Missing, non-numeric or non-positive
/// values give `default`.
pub fn parse_count(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .unwrap_or(default)
}

/// Seconds since the epoch, negative for times before it.
pub(crate) fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Walk `root` and return the `count` most recently modified regular files.
///
/// Memory stays proportional to `count` regardless of tree size. Entries
/// that cannot be read are skipped.
pub fn find_recent_files(root: &Path, count: usize, order: Order) -> Result<RecentFiles> {
    if !root.is_dir() {
        return Err(AppError::Config(format!(
            "Not a directory: {}",
            root.display()
        )));
    }

    let start = std::time::Instant::now();
    let mut window = RecencyWindow::new(count);
    let mut seen = 0usize;

    for entry in walkdir::WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let modified = match entry
            .metadata()
            .map_err(std::io::Error::from)
            .and_then(|m| m.modified())
        {
            Ok(t) => unix_seconds(t),
            Err(e) => {
                tracing::debug!(
                    path = %entry.path().display(),
                    error = %e,
                    "Skipping file without mtime"
                );
                continue;
            }
        };

        seen += 1;
        window.offer(RecencyEntry {
            modified,
            path: entry.into_path(),
        });
    }

    tracing::debug!(
        root = %root.display(),
        files = seen,
        kept = window.len(),
        elapsed = ?start.elapsed(),
        "Recency walk complete"
    );

    Ok(window.into_recent(order))
}
