//! The served directory tree: path resolution, listing, search and recency.

pub mod meta;
pub mod recent;

pub use recent::{
    DEFAULT_RECENT_COUNT, Order, RecencyEntry, RecencyWindow, RecentFiles, find_recent_files,
    parse_count,
};

use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};

/// A request path resolved against the catalog root.
///
/// `relative` is normalized (no `.`/`..`, `/`-separated, no leading slash)
/// and `absolute` always lies under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPath {
    /// Normalized path relative to the root; empty for the root itself.
    pub relative: String,
    /// Absolute on-disk path.
    pub absolute: PathBuf,
}

impl CatalogPath {
    /// Final path segment, or an empty string for the root.
    pub fn file_name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or_default()
    }
}

/// Kind of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory (navigable).
    Directory,
    /// Regular file (deliverable).
    File,
}

/// One directory or file as handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// File or directory name.
    pub name: String,
    /// Normalized path relative to the root.
    pub relative: String,
    /// Directory or file.
    pub kind: EntryKind,
    /// Display title (see [`meta::guess_title`]); the name for directories.
    pub title: String,
    /// Author guess, currently always empty.
    pub author: String,
    /// MIME type guessed from the name.
    pub mime_type: &'static str,
    /// Size in bytes (files only).
    pub size: Option<u64>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

impl CatalogEntry {
    fn from_metadata(relative: String, metadata: &std::fs::Metadata) -> Self {
        let name = relative.rsplit('/').next().unwrap_or_default().to_string();
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| DateTime::from_timestamp(recent::unix_seconds(t), 0))
            .unwrap_or_else(Utc::now);

        if metadata.is_dir() {
            Self {
                title: name.clone(),
                name,
                relative,
                kind: EntryKind::Directory,
                author: String::new(),
                mime_type: meta::OCTET_STREAM,
                size: None,
                modified,
            }
        } else {
            Self {
                title: meta::guess_title(&name),
                author: meta::guess_author(&name),
                mime_type: meta::guess_mime_type(&name),
                name,
                relative,
                kind: EntryKind::File,
                size: Some(metadata.len()),
                modified,
            }
        }
    }

    /// Whether this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Read-only handle on the catalog root.
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    /// Open a catalog root. Fails with a configuration error when the path
    /// does not exist or is not a directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|e| {
            AppError::Config(format!("Catalog root {}: {}", root.display(), e))
        })?;

        if !canonical.is_dir() {
            return Err(AppError::Config(format!(
                "Catalog root is not a directory: {}",
                root.display()
            )));
        }

        Ok(Self { root: canonical })
    }

    /// Absolute catalog root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a decoded request path. Anything that normalizes outside the
    /// root is reported as not found.
    pub fn resolve(&self, requested: &str) -> Result<CatalogPath> {
        let mut parts: Vec<&str> = Vec::new();

        for part in requested.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    if parts.pop().is_none() {
                        return Err(AppError::NotFound(requested.to_string()));
                    }
                }
                other => {
                    // Each segment must be a single plain component.
                    let mut components = Path::new(other).components();
                    let plain = matches!(components.next(), Some(Component::Normal(_)))
                        && components.next().is_none()
                        && !other.contains('\0');
                    if !plain {
                        return Err(AppError::NotFound(requested.to_string()));
                    }
                    parts.push(other);
                }
            }
        }

        let absolute = parts.iter().fold(self.root.clone(), |acc, p| acc.join(p));
        Ok(CatalogPath {
            relative: parts.join("/"),
            absolute,
        })
    }

    /// Relative `/`-separated form of an absolute path under the root.
    pub fn relative_of(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.root).ok()?;
        Some(
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/"),
        )
    }

    /// Describe one path under the root, or `None` if it vanished.
    pub fn entry(&self, absolute: &Path) -> Option<CatalogEntry> {
        let relative = self.relative_of(absolute)?;
        match std::fs::metadata(absolute) {
            Ok(metadata) => Some(CatalogEntry::from_metadata(relative, &metadata)),
            Err(e) => {
                tracing::debug!(path = %absolute.display(), error = %e, "Entry vanished");
                None
            }
        }
    }

    /// Direct children of a directory: directories first, then files, each by name.
    pub fn list(&self, dir: &CatalogPath) -> Result<Vec<CatalogEntry>> {
        let read_dir = match std::fs::read_dir(&dir.absolute) {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(dir.relative.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut entries: Vec<CatalogEntry> = read_dir
            .filter_map(|child| match child {
                Ok(child) => self.entry(&child.path()),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable directory entry");
                    None
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            b.is_dir()
                .cmp(&a.is_dir())
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(entries)
    }

    /// Case-insensitive substring search over every path below the root.
    ///
    /// Directories and files both match. Unreadable entries are skipped.
    pub fn search(&self, term: &str) -> Vec<CatalogEntry> {
        let needle = term.to_lowercase();
        let start = std::time::Instant::now();

        let hits: Vec<CatalogEntry> = walkdir::WalkDir::new(&self.root)
            .follow_links(true)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| match e {
                Ok(e) => Some(e),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .filter_map(|e| {
                let relative = self.relative_of(e.path())?;
                if !relative.to_lowercase().contains(&needle) {
                    return None;
                }
                let metadata = e.metadata().ok()?;
                Some(CatalogEntry::from_metadata(relative, &metadata))
            })
            .collect();

        tracing::info!(
            term = %term,
            hits = hits.len(),
            elapsed = ?start.elapsed(),
            "Search complete"
        );
        hits
    }

    /// The `count` most recently modified files, as catalog entries.
    pub fn recent(&self, count: usize, order: Order) -> Result<Vec<CatalogEntry>> {
        Ok(find_recent_files(&self.root, count, order)?
            .filter_map(|e| self.entry(&e.path))
            .collect())
    }
}
