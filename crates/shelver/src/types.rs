//! Core types for Shelver
//!
//! Watched roots, the event batches delivered for them, and the role a root
//! plays in the rule table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Watched Roots
// ============================================================================

/// What a watched directory is used for. Rules select roots by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootRole {
    /// Landing area for new recordings
    Inbox,
    /// Files being worked on; names are copied into comments
    Processing,
    /// Finished files carrying a `[code] ` routing prefix
    Outbox,
    /// The tagged sample library
    Samples,
    /// Flat directory of symlinks into the library
    Mirror,
    /// Export directory of a hardware sampler
    DeviceExport,
}

impl RootRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RootRole::Inbox => "inbox",
            RootRole::Processing => "processing",
            RootRole::Outbox => "outbox",
            RootRole::Samples => "samples",
            RootRole::Mirror => "mirror",
            RootRole::DeviceExport => "device_export",
        }
    }

    /// Whether the watch adapter should deliver events for this role.
    /// The mirror is written by us and never observed.
    pub fn is_watched(&self) -> bool {
        !matches!(self, RootRole::Mirror)
    }
}

impl fmt::Display for RootRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directory under continuous observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedRoot {
    /// Absolute path of the directory
    pub path: PathBuf,
    /// Role of the directory in the rule table
    pub role: RootRole,
    /// Whether nested directories are observed as well
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

fn default_recursive() -> bool {
    true
}

impl WatchedRoot {
    pub fn new(path: impl Into<PathBuf>, role: RootRole) -> Self {
        Self {
            path: path.into(),
            role,
            recursive: true,
        }
    }

    /// Whether `path` lies under this root (respecting `recursive`).
    pub fn covers(&self, path: &Path) -> bool {
        match path.strip_prefix(&self.path) {
            Ok(rel) => {
                let depth = rel.components().count();
                depth > 0 && (self.recursive || depth == 1)
            }
            Err(_) => false,
        }
    }

    /// `path` relative to this root, if it lies under it.
    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.path).ok()
    }
}

// ============================================================================
// Events
// ============================================================================

/// Kind of change reported for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
        }
    }
}

/// A single change to a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: EventKind,
    pub path: PathBuf,
}

/// Set of event kinds a rule consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMask {
    pub added: bool,
    pub modified: bool,
    pub deleted: bool,
}

impl EventMask {
    pub const ADDED: EventMask = EventMask {
        added: true,
        modified: false,
        deleted: false,
    };
    pub const CHANGED: EventMask = EventMask {
        added: true,
        modified: true,
        deleted: false,
    };
    pub const ALL: EventMask = EventMask {
        added: true,
        modified: true,
        deleted: true,
    };
    pub const DELETED: EventMask = EventMask {
        added: false,
        modified: false,
        deleted: true,
    };

    pub fn contains(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Added => self.added,
            EventKind::Modified => self.modified,
            EventKind::Deleted => self.deleted,
        }
    }
}

/// All changes observed under one root during one change window.
///
/// Paths are kept in ordered sets so that dispatch order is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBatch {
    pub root: WatchedRoot,
    pub modified: BTreeSet<PathBuf>,
    pub added: BTreeSet<PathBuf>,
    pub deleted: BTreeSet<PathBuf>,
}

impl EventBatch {
    pub fn new(root: WatchedRoot) -> Self {
        Self {
            root,
            modified: BTreeSet::new(),
            added: BTreeSet::new(),
            deleted: BTreeSet::new(),
        }
    }

    pub fn push(&mut self, event: FileEvent) {
        let FileEvent { kind, path } = event;
        match kind {
            EventKind::Added => {
                self.deleted.remove(&path);
                self.modified.remove(&path);
                self.added.insert(path);
            }
            EventKind::Modified => {
                if !self.added.contains(&path) {
                    self.deleted.remove(&path);
                    self.modified.insert(path);
                }
            }
            EventKind::Deleted => {
                self.added.remove(&path);
                self.modified.remove(&path);
                self.deleted.insert(path);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.added.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modified.len() + self.added.len() + self.deleted.len()
    }

    /// Events in dispatch order: modified, then added, then deleted,
    /// each sorted by path.
    pub fn events(&self) -> impl Iterator<Item = FileEvent> + '_ {
        let modified = self.modified.iter().map(|p| FileEvent {
            kind: EventKind::Modified,
            path: p.clone(),
        });
        let added = self.added.iter().map(|p| FileEvent {
            kind: EventKind::Added,
            path: p.clone(),
        });
        let deleted = self.deleted.iter().map(|p| FileEvent {
            kind: EventKind::Deleted,
            path: p.clone(),
        });
        modified.chain(added).chain(deleted)
    }
}
