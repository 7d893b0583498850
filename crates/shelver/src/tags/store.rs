//! Tag storage keyed by file path.

use super::Tag;
use crate::error::{Result, ShelverError};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock};
use tracing::debug;

/// Maps a file path to a set of tags.
///
/// Every mutation is idempotent: adding a tag that is present, or removing
/// one that is absent, changes nothing and reports `false`.
pub trait TagStore: Send + Sync {
    fn tags(&self, path: &Path) -> Result<BTreeSet<Tag>>;

    /// Returns `true` if the tag was not present before.
    fn add_tag(&self, path: &Path, tag: &Tag) -> Result<bool>;

    /// Returns `true` if the tag was present before.
    fn remove_tag(&self, path: &Path, tag: &Tag) -> Result<bool>;

    fn contains_tag(&self, path: &Path, tag: &Tag) -> Result<bool> {
        Ok(self.tags(path)?.contains(tag))
    }

    /// Returns the number of tags that were newly added.
    fn add_tags(&self, path: &Path, tags: &[Tag]) -> Result<usize> {
        let mut added = 0;
        for tag in tags {
            if self.add_tag(path, tag)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Returns the number of tags that were removed.
    fn remove_tags(&self, path: &Path, tags: &[Tag]) -> Result<usize> {
        let mut removed = 0;
        for tag in tags {
            if self.remove_tag(path, tag)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// In-process tag store.
#[derive(Debug, Default)]
pub struct MemoryTagStore {
    entries: RwLock<HashMap<PathBuf, BTreeSet<Tag>>>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of paths holding at least one tag.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> ShelverError {
    ShelverError::InvalidState("tag store lock poisoned".to_string())
}

impl TagStore for MemoryTagStore {
    fn tags(&self, path: &Path) -> Result<BTreeSet<Tag>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(path).cloned().unwrap_or_default())
    }

    fn add_tag(&self, path: &Path, tag: &Tag) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries
            .entry(path.to_path_buf())
            .or_default()
            .insert(tag.clone()))
    }

    fn remove_tag(&self, path: &Path, tag: &Tag) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let Some(set) = entries.get_mut(path) else {
            return Ok(false);
        };
        let removed = set.remove(tag);
        if set.is_empty() {
            entries.remove(path);
        }
        Ok(removed)
    }

    fn contains_tag(&self, path: &Path, tag: &Tag) -> Result<bool> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(path).is_some_and(|set| set.contains(tag)))
    }
}

/// Tag store persisted as a JSON document (`{ "<path>": ["tag", ...] }`).
///
/// The whole document is rewritten through a temp file + rename once per
/// `add_tags`/`remove_tags` call, so a crash never leaves a half-written
/// store behind. A failed write leaves the store unchanged.
#[derive(Debug)]
pub struct JsonTagStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, BTreeSet<Tag>>>,
}

impl JsonTagStore {
    /// Open the store at `path`, creating an empty one if the file is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), paths = entries.len(), "Opened tag store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, BTreeSet<Tag>>>> {
        self.entries.lock().map_err(|_| poisoned())
    }

    fn persist(&self, entries: &BTreeMap<String, BTreeSet<Tag>>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, entries)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl TagStore for JsonTagStore {
    fn tags(&self, path: &Path) -> Result<BTreeSet<Tag>> {
        let entries = self.lock()?;
        Ok(entries.get(&key(path)).cloned().unwrap_or_default())
    }

    fn add_tag(&self, path: &Path, tag: &Tag) -> Result<bool> {
        Ok(self.add_tags(path, std::slice::from_ref(tag))? > 0)
    }

    fn remove_tag(&self, path: &Path, tag: &Tag) -> Result<bool> {
        Ok(self.remove_tags(path, std::slice::from_ref(tag))? > 0)
    }

    fn contains_tag(&self, path: &Path, tag: &Tag) -> Result<bool> {
        let entries = self.lock()?;
        Ok(entries.get(&key(path)).is_some_and(|set| set.contains(tag)))
    }

    // The in-memory map is only replaced once the new document is on disk.
    fn add_tags(&self, path: &Path, tags: &[Tag]) -> Result<usize> {
        let mut entries = self.lock()?;
        let k = key(path);
        let mut set = entries.get(&k).cloned().unwrap_or_default();
        let added = tags.iter().filter(|tag| set.insert((*tag).clone())).count();
        if added == 0 {
            return Ok(0);
        }
        let mut next = entries.clone();
        next.insert(k, set);
        self.persist(&next)?;
        *entries = next;
        Ok(added)
    }

    fn remove_tags(&self, path: &Path, tags: &[Tag]) -> Result<usize> {
        let mut entries = self.lock()?;
        let k = key(path);
        let Some(mut set) = entries.get(&k).cloned() else {
            return Ok(0);
        };
        let removed = tags.iter().filter(|tag| set.remove(*tag)).count();
        if removed == 0 {
            return Ok(0);
        }
        let mut next = entries.clone();
        if set.is_empty() {
            next.remove(&k);
        } else {
            next.insert(k, set);
        }
        self.persist(&next)?;
        *entries = next;
        Ok(removed)
    }
}
