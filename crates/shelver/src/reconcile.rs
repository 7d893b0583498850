//! Reconciler
//!
//! Periodic full rescan of the sample library. Paths come straight from a
//! fresh directory walk on every pass, never from a cache, and each one is
//! run through the tagging and mirror rules as if it had just been
//! modified. Because every action is idempotent the pass converges on the
//! same state no matter how it interleaves with live dispatch.

use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::{Result, ShelverError};
use crate::rules::{Rule, RuleKind};
use crate::tags::Tag;
use crate::types::EventKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// Rules re-applied on every pass.
const RECONCILED: &[RuleKind] = &[
    RuleKind::DirectoryTags,
    RuleKind::FilenameCodeTags,
    RuleKind::NamespacePromotion,
    RuleKind::MirrorLink,
];

/// Statistics from one reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileStats {
    pub started_at: DateTime<Utc>,
    pub files_scanned: u64,
    /// Ignored or vanished during the walk
    pub files_skipped: u64,
    pub tags_added: u64,
    pub links_created: u64,
    pub links_pruned: u64,
    pub dry_run_actions: u64,
    pub errors: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeStats {
    pub files_scanned: u64,
    pub files_purged: u64,
    pub tags_removed: u64,
    pub errors: u64,
}

pub struct Reconciler {
    dispatcher: Arc<Dispatcher>,
}

impl Reconciler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// One full pass over the samples root.
    pub fn run_once(&self) -> Result<ReconcileStats> {
        let started_at = Utc::now();
        let start = Instant::now();
        let samples = self
            .dispatcher
            .config()
            .samples_root()
            .ok_or_else(|| ShelverError::Config("no samples root configured".to_string()))?
            .clone();

        let mut walk_errors = 0u64;
        let mut prune_report = DispatchReport::default();
        let links_pruned = match self.dispatcher.prune_mirror(&mut prune_report) {
            Ok(pruned) => pruned as u64,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to scan mirror directory");
                walk_errors += 1;
                0
            }
        };

        let mut report = DispatchReport::default();
        let mut files_scanned = 0u64;
        let mut files_skipped = 0u64;
        let select = |rule: &Rule| RECONCILED.contains(&rule.kind);

        for path in self.walk(&samples.path, samples.recursive, &mut files_skipped, &mut walk_errors) {
            files_scanned += 1;
            self.dispatcher
                .apply_rules(&samples, &path, EventKind::Modified, select, &mut report);
        }

        let tags_added = [
            RuleKind::DirectoryTags,
            RuleKind::FilenameCodeTags,
            RuleKind::NamespacePromotion,
        ]
        .iter()
        .map(|kind| report.applied_for(*kind) as u64)
        .sum();

        let stats = ReconcileStats {
            started_at,
            files_scanned,
            files_skipped,
            tags_added,
            links_created: report.applied_for(RuleKind::MirrorLink) as u64,
            links_pruned,
            dry_run_actions: (report.dry_run + prune_report.dry_run) as u64,
            errors: walk_errors + (report.failed + prune_report.failed) as u64,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        tracing::info!(
            root = %samples.path.display(),
            files = stats.files_scanned,
            tags_added = stats.tags_added,
            links_created = stats.links_created,
            links_pruned = stats.links_pruned,
            errors = stats.errors,
            duration_ms = stats.duration_ms,
            "Reconciliation pass complete"
        );
        Ok(stats)
    }

    /// Remove every tag from every file under the samples root.
    pub fn purge_tags(&self) -> Result<PurgeStats> {
        let samples = self
            .dispatcher
            .config()
            .samples_root()
            .ok_or_else(|| ShelverError::Config("no samples root configured".to_string()))?
            .clone();
        let store = self.dispatcher.store();
        let dry_run = self.dispatcher.dry_run();

        let mut stats = PurgeStats::default();
        let mut skipped = 0u64;
        let mut walk_errors = 0u64;
        for path in self.walk(&samples.path, samples.recursive, &mut skipped, &mut walk_errors) {
            stats.files_scanned += 1;
            let tags: Vec<Tag> = match store.tags(&path) {
                Ok(tags) => tags.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read tags");
                    stats.errors += 1;
                    continue;
                }
            };
            if tags.is_empty() {
                continue;
            }
            if dry_run {
                tracing::info!(path = %path.display(), count = tags.len(), "Dry run: would purge tags");
                continue;
            }
            match store.remove_tags(&path, &tags) {
                Ok(removed) => {
                    tracing::info!(path = %path.display(), count = removed, "Tags purged");
                    stats.files_purged += 1;
                    stats.tags_removed += removed as u64;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to purge tags");
                    stats.errors += 1;
                }
            }
        }
        stats.errors += walk_errors;
        Ok(stats)
    }

    /// Regular files under `root`, in sorted order, skipping ignored paths.
    fn walk(
        &self,
        root: &Path,
        recursive: bool,
        skipped: &mut u64,
        errors: &mut u64,
    ) -> Vec<PathBuf> {
        let table = self.dispatcher.table();
        let mut walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut files = Vec::new();
        let mut entries = walker.into_iter();
        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Walk error");
                    *errors += 1;
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let ignored = entry
                .path()
                .strip_prefix(root)
                .map(|rel| table.is_ignored(rel))
                .unwrap_or(false);
            if ignored {
                if entry.file_type().is_dir() {
                    entries.skip_current_dir();
                } else {
                    *skipped += 1;
                }
                continue;
            }
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files
    }
}
