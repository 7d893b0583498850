//! Flat mirror of the sample library.
//!
//! The mirror holds one symlink per tracked file, named after the file's
//! basename. Planning functions inspect the current mirror entry (without
//! following it) and say what, if anything, has to change.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// What to do with a mirror entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorPlan {
    /// Entry already in the desired state.
    Noop { entry: PathBuf, reason: &'static str },
    /// Create or replace the symlink at `entry`.
    Link { entry: PathBuf, replaces: Option<PathBuf> },
    /// Remove the symlink at `entry`.
    Unlink { entry: PathBuf },
    /// A regular file or directory occupies the entry; leave it alone.
    Conflict { entry: PathBuf },
}

/// Path of the mirror entry for `file`.
pub fn entry_for(mirror_dir: &Path, file: &Path) -> Option<PathBuf> {
    file.file_name().map(|name| mirror_dir.join(name))
}

enum EntryState {
    Missing,
    Link(PathBuf),
    Other,
}

fn inspect(entry: &Path) -> Result<EntryState> {
    match fs::symlink_metadata(entry) {
        Ok(meta) if meta.file_type().is_symlink() => Ok(EntryState::Link(fs::read_link(entry)?)),
        Ok(_) => Ok(EntryState::Other),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(EntryState::Missing),
        Err(err) => Err(err.into()),
    }
}

/// Plan for a file that was added or modified.
pub fn plan_link(mirror_dir: &Path, file: &Path) -> Result<Option<MirrorPlan>> {
    let Some(entry) = entry_for(mirror_dir, file) else {
        return Ok(None);
    };
    let plan = match inspect(&entry)? {
        EntryState::Missing => MirrorPlan::Link {
            entry,
            replaces: None,
        },
        EntryState::Link(target) if target == file => MirrorPlan::Noop {
            entry,
            reason: "already linked",
        },
        EntryState::Link(target) => MirrorPlan::Link {
            entry,
            replaces: Some(target),
        },
        EntryState::Other => MirrorPlan::Conflict { entry },
    };
    Ok(Some(plan))
}

/// Plan for a file that was deleted.
///
/// Only a symlink that points at `file` is removed; an entry that now
/// belongs to another file with the same basename is kept.
pub fn plan_unlink(mirror_dir: &Path, file: &Path) -> Result<Option<MirrorPlan>> {
    let Some(entry) = entry_for(mirror_dir, file) else {
        return Ok(None);
    };
    let plan = match inspect(&entry)? {
        EntryState::Missing => MirrorPlan::Noop {
            entry,
            reason: "no mirror entry",
        },
        EntryState::Link(target) if target == file => MirrorPlan::Unlink { entry },
        EntryState::Link(_) => MirrorPlan::Noop {
            entry,
            reason: "entry belongs to another file",
        },
        EntryState::Other => MirrorPlan::Conflict { entry },
    };
    Ok(Some(plan))
}

/// Symlinks in `mirror_dir` whose target no longer exists, sorted.
pub fn dangling_entries(mirror_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dangling = Vec::new();
    for entry in fs::read_dir(mirror_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_symlink() {
            continue;
        }
        if fs::metadata(&path).is_err() {
            dangling.push(path);
        }
    }
    dangling.sort();
    Ok(dangling)
}
