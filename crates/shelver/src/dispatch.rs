//! Dispatcher
//!
//! Applies the rule table to one event batch. Events are handled file by
//! file, and for each file the rules run in table order. Every action goes
//! through the [`TagStore`] or [`FileOps`] collaborators; an error from
//! either is recorded against the (file, rule) pair and processing moves on.

use crate::classify;
use crate::companion::{self, CompanionPlan};
use crate::config::ShelverConfig;
use crate::error::{Result, ShelverError};
use crate::mirror::{self, MirrorPlan};
use crate::ops::FileOps;
use crate::rules::{Rule, RuleKind, RuleTable};
use crate::tags::{Tag, TagStore};
use crate::types::{EventBatch, EventKind, WatchedRoot};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How a single rule action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    DryRun,
    Skipped,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::DryRun => "dry_run",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
        }
    }
}

/// A skipped or failed action, kept for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub rule: &'static str,
    pub path: PathBuf,
    pub outcome: Outcome,
    pub message: String,
}

/// Summary of one dispatch call.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Events examined (ignored and vanished paths included)
    pub events: usize,
    pub applied: usize,
    pub dry_run: usize,
    pub skipped: usize,
    pub failed: usize,
    pub diagnostics: Vec<Diagnostic>,
    applied_by_kind: HashMap<RuleKind, usize>,
}

impl DispatchReport {
    fn record(&mut self, rule: &Rule, path: &Path, outcome: Outcome, message: impl Into<String>) {
        match outcome {
            Outcome::Applied => {
                self.applied += 1;
                *self.applied_by_kind.entry(rule.kind).or_default() += 1;
                return;
            }
            Outcome::DryRun => {
                self.dry_run += 1;
                return;
            }
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
        self.diagnostics.push(Diagnostic {
            rule: rule.name,
            path: path.to_path_buf(),
            outcome,
            message: message.into(),
        });
    }

    /// Actions applied by rules of `kind`.
    pub fn applied_for(&self, kind: RuleKind) -> usize {
        self.applied_by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: DispatchReport) {
        self.events += other.events;
        self.applied += other.applied;
        self.dry_run += other.dry_run;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.diagnostics.extend(other.diagnostics);
        for (kind, count) in other.applied_by_kind {
            *self.applied_by_kind.entry(kind).or_default() += count;
        }
    }
}

/// What the remaining rules should do with a file after one rule ran.
enum Flow {
    Continue,
    /// The file left its path; its new location produces its own events.
    Relocated,
}

/// Rule engine entry point, shared by every root task and the reconciler.
pub struct Dispatcher {
    config: Arc<ShelverConfig>,
    table: RuleTable,
    store: Arc<dyn TagStore>,
    ops: Arc<dyn FileOps>,
    dry_run: bool,
}

impl Dispatcher {
    pub fn new(
        config: Arc<ShelverConfig>,
        store: Arc<dyn TagStore>,
        ops: Arc<dyn FileOps>,
    ) -> Result<Self> {
        let table = RuleTable::from_config(&config)?;
        let dry_run = config.dry_run;
        Ok(Self {
            config,
            table,
            store,
            ops,
            dry_run,
        })
    }

    pub fn config(&self) -> &ShelverConfig {
        &self.config
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub fn store(&self) -> &dyn TagStore {
        self.store.as_ref()
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Apply every matching rule to every event of `batch`.
    ///
    /// Never fails: per-action errors end up in the returned report.
    pub fn dispatch(&self, batch: &EventBatch) -> DispatchReport {
        let mut report = DispatchReport::default();
        for event in batch.events() {
            report.events += 1;
            self.apply_rules(&batch.root, &event.path, event.kind, |_| true, &mut report);
        }
        tracing::debug!(
            root = %batch.root.path.display(),
            role = %batch.root.role,
            events = report.events,
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed,
            "Batch dispatched"
        );
        report
    }

    /// Remove mirror symlinks whose target is gone. Returns how many were
    /// unlinked.
    pub(crate) fn prune_mirror(&self, report: &mut DispatchReport) -> Result<usize> {
        let Some(mirror_dir) = self.config.mirror_dir() else {
            return Ok(0);
        };
        let Some(rule) = self
            .table
            .rules()
            .iter()
            .find(|r| r.kind == RuleKind::MirrorLink)
        else {
            return Ok(0);
        };
        let mut pruned = 0;
        for entry in mirror::dangling_entries(mirror_dir)? {
            let unlinked = self.perform(report, rule, &entry, "unlink dangling mirror entry", || {
                self.ops.unlink(&entry)
            });
            if unlinked.is_some() {
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// Run the rules accepted by `select` against one file.
    pub(crate) fn apply_rules(
        &self,
        root: &WatchedRoot,
        path: &Path,
        kind: EventKind,
        select: impl Fn(&Rule) -> bool,
        report: &mut DispatchReport,
    ) {
        let Some(rel) = root.relative(path) else {
            tracing::warn!(
                root = %root.path.display(),
                path = %path.display(),
                "Event outside its root, ignoring"
            );
            return;
        };
        if self.table.is_ignored(rel) {
            tracing::debug!(path = %path.display(), "Path matches an ignore pattern");
            return;
        }
        if kind != EventKind::Deleted {
            match fs::symlink_metadata(path) {
                Ok(meta) if meta.is_dir() => return,
                Ok(_) => {}
                Err(_) => {
                    tracing::debug!(
                        path = %path.display(),
                        event = kind.as_str(),
                        "Path vanished before dispatch"
                    );
                    return;
                }
            }
        }

        for rule in self.table.rules() {
            if !rule.applies_to(root.role) || !select(rule) {
                continue;
            }
            if !self.table.matches(rule, path, kind) {
                continue;
            }
            tracing::debug!(
                rule = rule.name,
                path = %path.display(),
                event = kind.as_str(),
                "Rule matched"
            );
            if let Flow::Relocated = self.apply_rule(rule, rel, path, kind, report) {
                break;
            }
        }
    }

    fn apply_rule(
        &self,
        rule: &Rule,
        rel: &Path,
        path: &Path,
        kind: EventKind,
        report: &mut DispatchReport,
    ) -> Flow {
        match rule.kind {
            RuleKind::CommentAnnotation => {
                let name = classify::file_name(path);
                self.perform(report, rule, path, "set comment", || {
                    self.ops.set_comment(path, name)
                });
                Flow::Continue
            }
            RuleKind::PrefixRouting => self.route(report, rule, path),
            RuleKind::DirectoryTags => {
                self.add_tags(report, rule, path, self.table.directory_tags(rel));
                Flow::Continue
            }
            RuleKind::FilenameCodeTags => {
                let tags = self.table.code_tags(classify::file_name(path));
                self.add_tags(report, rule, path, tags);
                Flow::Continue
            }
            RuleKind::NamespacePromotion => {
                match self.store.tags(path) {
                    Ok(existing) => {
                        let tags = self.table.namespace_promotions(&existing);
                        self.add_tags(report, rule, path, tags);
                    }
                    Err(e) => self.fail(report, rule, path, "read tags", &e),
                }
                Flow::Continue
            }
            RuleKind::Hide => {
                self.perform(report, rule, path, "hide", || self.ops.hide(path));
                Flow::Continue
            }
            RuleKind::MirrorLink => {
                self.mirror(report, rule, path, kind);
                Flow::Continue
            }
            RuleKind::CompanionRelocation => self.relocate_companion(report, rule, path),
            RuleKind::TagCleanup => {
                match self.store.tags(path) {
                    Ok(tags) if tags.is_empty() => {
                        tracing::debug!(rule = rule.name, path = %path.display(), "No tags to drop");
                    }
                    Ok(tags) => {
                        let tags: Vec<Tag> = tags.into_iter().collect();
                        let action = format!("remove {} tags", tags.len());
                        self.perform(report, rule, path, &action, || {
                            self.store.remove_tags(path, &tags).map(|_| ())
                        });
                    }
                    Err(e) => self.fail(report, rule, path, "read tags", &e),
                }
                Flow::Continue
            }
        }
    }

    /// Run `op` unless this is a dry run, logging and recording the outcome.
    fn perform<T>(
        &self,
        report: &mut DispatchReport,
        rule: &Rule,
        path: &Path,
        action: &str,
        op: impl FnOnce() -> Result<T>,
    ) -> Option<T> {
        self.perform_counted(report, rule, path, action, 1, op)
    }

    /// [`Self::perform`] for an action that covers `count` changes.
    fn perform_counted<T>(
        &self,
        report: &mut DispatchReport,
        rule: &Rule,
        path: &Path,
        action: &str,
        count: usize,
        op: impl FnOnce() -> Result<T>,
    ) -> Option<T> {
        if self.dry_run {
            tracing::info!(rule = rule.name, path = %path.display(), action, "Dry run: action not performed");
            for _ in 0..count {
                report.record(rule, path, Outcome::DryRun, action);
            }
            return None;
        }
        match op() {
            Ok(value) => {
                tracing::info!(rule = rule.name, path = %path.display(), action, "Action applied");
                for _ in 0..count {
                    report.record(rule, path, Outcome::Applied, action);
                }
                Some(value)
            }
            Err(e) => {
                self.fail(report, rule, path, action, &e);
                None
            }
        }
    }

    fn fail(&self, report: &mut DispatchReport, rule: &Rule, path: &Path, action: &str, err: &ShelverError) {
        tracing::warn!(
            rule = rule.name,
            path = %path.display(),
            action,
            error = %err,
            "Action failed"
        );
        report.record(rule, path, Outcome::Failed, format!("{action}: {err}"));
    }

    fn skip(&self, report: &mut DispatchReport, rule: &Rule, path: &Path, reason: String) {
        tracing::warn!(rule = rule.name, path = %path.display(), reason = %reason, "Action skipped");
        report.record(rule, path, Outcome::Skipped, reason);
    }

    /// Add the tags `path` does not carry yet, in a single store write.
    fn add_tags(&self, report: &mut DispatchReport, rule: &Rule, path: &Path, tags: Vec<Tag>) {
        let mut missing: Vec<Tag> = Vec::with_capacity(tags.len());
        for tag in tags {
            match self.store.contains_tag(path, &tag) {
                Ok(true) => {
                    tracing::debug!(rule = rule.name, path = %path.display(), tag = %tag, "Tag already present");
                }
                Ok(false) if !missing.contains(&tag) => missing.push(tag),
                Ok(false) => {}
                Err(e) => self.fail(report, rule, path, "check tag", &e),
            }
        }
        if missing.is_empty() {
            return;
        }
        let names: Vec<&str> = missing.iter().map(Tag::as_str).collect();
        let action = format!("add tags {}", names.join(", "));
        self.perform_counted(report, rule, path, &action, missing.len(), || {
            self.store.add_tags(path, &missing).map(|_| ())
        });
    }

    /// Strip the `[code] ` token and move the file into the route's
    /// destination. Nothing is touched unless every precondition holds.
    fn route(&self, report: &mut DispatchReport, rule: &Rule, path: &Path) -> Flow {
        let name = classify::file_name(path);
        let Some((route, stripped)) = self.table.route_for(name) else {
            return Flow::Continue;
        };
        let dest = &route.destination;
        if !dest.is_dir() {
            self.skip(
                report,
                rule,
                path,
                format!("destination directory does not exist: {}", dest.display()),
            );
            return Flow::Continue;
        }
        let target = dest.join(stripped);
        if fs::symlink_metadata(&target).is_ok() {
            self.skip(
                report,
                rule,
                path,
                format!("destination already holds {}", target.display()),
            );
            return Flow::Continue;
        }
        let renamed = path.with_file_name(stripped);
        if fs::symlink_metadata(&renamed).is_ok() {
            self.skip(
                report,
                rule,
                path,
                format!("cannot strip prefix, {} exists", renamed.display()),
            );
            return Flow::Continue;
        }

        let action = format!("route to {}", target.display());
        let moved = self.perform(report, rule, path, &action, || {
            self.ops.rename(path, &renamed)?;
            match self.ops.move_to_dir(&renamed, dest) {
                Ok(moved) => Ok(moved),
                Err(e) => {
                    if let Err(rollback) = self.ops.rename(&renamed, path) {
                        tracing::error!(
                            path = %renamed.display(),
                            error = %rollback,
                            "Could not restore routing prefix after failed move"
                        );
                    }
                    Err(e)
                }
            }
        });
        match moved {
            Some(moved) => {
                self.relocate_tags(report, rule, path, &moved);
                Flow::Relocated
            }
            None => Flow::Continue,
        }
    }

    /// Carry tags keyed by `from` over to `to`.
    fn relocate_tags(&self, report: &mut DispatchReport, rule: &Rule, from: &Path, to: &Path) {
        let tags: Vec<Tag> = match self.store.tags(from) {
            Ok(tags) => tags.into_iter().collect(),
            Err(e) => return self.fail(report, rule, from, "read tags", &e),
        };
        if tags.is_empty() {
            return;
        }
        let moved = self
            .store
            .add_tags(to, &tags)
            .and_then(|_| self.store.remove_tags(from, &tags));
        match moved {
            Ok(_) => tracing::debug!(
                from = %from.display(),
                to = %to.display(),
                count = tags.len(),
                "Tags moved with file"
            ),
            Err(e) => self.fail(report, rule, from, "move tags", &e),
        }
    }

    fn mirror(&self, report: &mut DispatchReport, rule: &Rule, path: &Path, kind: EventKind) {
        let Some(mirror_dir) = self.config.mirror_dir() else {
            tracing::debug!(path = %path.display(), "No mirror directory configured");
            return;
        };
        let plan = match kind {
            EventKind::Deleted => mirror::plan_unlink(mirror_dir, path),
            EventKind::Added | EventKind::Modified => mirror::plan_link(mirror_dir, path),
        };
        match plan {
            Ok(None) => {}
            Ok(Some(MirrorPlan::Noop { reason, .. })) => {
                tracing::debug!(rule = rule.name, path = %path.display(), reason, "Mirror up to date");
            }
            Ok(Some(MirrorPlan::Link { entry, replaces })) => {
                if let Some(previous) = &replaces {
                    tracing::debug!(
                        entry = %entry.display(),
                        previous = %previous.display(),
                        "Mirror entry will be repointed"
                    );
                }
                let action = format!("link {}", entry.display());
                self.perform(report, rule, path, &action, || self.ops.symlink(path, &entry));
            }
            Ok(Some(MirrorPlan::Unlink { entry })) => {
                let action = format!("unlink {}", entry.display());
                self.perform(report, rule, path, &action, || self.ops.unlink(&entry));
            }
            Ok(Some(MirrorPlan::Conflict { entry })) => {
                self.skip(
                    report,
                    rule,
                    path,
                    format!("mirror entry is not a symlink: {}", entry.display()),
                );
            }
            Err(e) => self.fail(report, rule, path, "inspect mirror", &e),
        }
    }

    fn relocate_companion(&self, report: &mut DispatchReport, rule: &Rule, path: &Path) -> Flow {
        let Some(samples) = self.config.samples_root() else {
            return Flow::Continue;
        };
        let primary_name = self.table.primary_name_for(classify::file_name(path));
        let plan = companion::plan(path, &primary_name, &samples.path, self.table.ignore());
        match plan {
            Ok(CompanionPlan::AlreadyLinked) => {
                tracing::debug!(rule = rule.name, path = %path.display(), "Companion already relocated");
                Flow::Continue
            }
            Ok(CompanionPlan::Unresolved { primary_name }) => {
                self.skip(
                    report,
                    rule,
                    path,
                    format!("unresolved: no primary file named {primary_name}"),
                );
                Flow::Continue
            }
            Ok(CompanionPlan::Occupied { relocated }) => {
                self.skip(
                    report,
                    rule,
                    path,
                    format!("{} already exists", relocated.display()),
                );
                Flow::Continue
            }
            Ok(CompanionPlan::Relocate {
                primary,
                dest_dir,
                relocated,
                ambiguous,
            }) => {
                if !ambiguous.is_empty() {
                    tracing::warn!(
                        rule = rule.name,
                        path = %path.display(),
                        chosen = %primary.display(),
                        others = ambiguous.len(),
                        "Several primary files match, using the first"
                    );
                }
                let action = format!("relocate to {}", relocated.display());
                let moved = self.perform(report, rule, path, &action, || {
                    let moved = self.ops.move_to_dir(path, &dest_dir)?;
                    if let Err(e) = self.ops.symlink(&moved, path) {
                        if let Some(origin) = path.parent() {
                            if let Err(rollback) = self.ops.move_to_dir(&moved, origin) {
                                tracing::error!(
                                    path = %moved.display(),
                                    error = %rollback,
                                    "Could not return companion file after failed link"
                                );
                            }
                        }
                        return Err(e);
                    }
                    Ok(moved)
                });
                match moved {
                    Some(moved) => {
                        self.relocate_tags(report, rule, path, &moved);
                        Flow::Relocated
                    }
                    None => Flow::Continue,
                }
            }
            Err(e) => {
                self.fail(report, rule, path, "find primary file", &e);
                Flow::Continue
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{DirectoryTagConfig, PrefixRouteConfig};
    use crate::ops::LocalFileOps;
    use crate::tags::MemoryTagStore;
    use crate::types::RootRole;
    use tempfile::TempDir;

    /// Fails every call.
    struct BrokenOps;

    impl FileOps for BrokenOps {
        fn rename(&self, _: &Path, _: &Path) -> Result<()> {
            Err(ShelverError::InvalidState("rename".to_string()))
        }
        fn move_to_dir(&self, _: &Path, _: &Path) -> Result<PathBuf> {
            Err(ShelverError::InvalidState("move".to_string()))
        }
        fn symlink(&self, _: &Path, _: &Path) -> Result<()> {
            Err(ShelverError::InvalidState("symlink".to_string()))
        }
        fn hide(&self, _: &Path) -> Result<()> {
            Err(ShelverError::InvalidState("hide".to_string()))
        }
        fn set_comment(&self, _: &Path, _: &str) -> Result<()> {
            Err(ShelverError::InvalidState("comment".to_string()))
        }
        fn unlink(&self, _: &Path) -> Result<()> {
            Err(ShelverError::InvalidState("unlink".to_string()))
        }
    }

    struct Fixture {
        _temp: TempDir,
        samples: WatchedRoot,
        outbox: WatchedRoot,
        mirror: PathBuf,
        config: ShelverConfig,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let samples = WatchedRoot::new(temp.path().join("samples"), RootRole::Samples);
        let outbox = WatchedRoot::new(temp.path().join("outbox"), RootRole::Outbox);
        let mirror = temp.path().join("mirror");
        for dir in [&samples.path, &outbox.path, &mirror] {
            fs::create_dir_all(dir).unwrap();
        }
        let config = ShelverConfig {
            roots: vec![
                samples.clone(),
                outbox.clone(),
                WatchedRoot::new(&mirror, RootRole::Mirror),
            ],
            directory_tags: vec![DirectoryTagConfig {
                fragment: "drums".to_string(),
                tag: None,
            }],
            prefix_routes: vec![PrefixRouteConfig {
                code: "jazz".to_string(),
                destination: PathBuf::from("jazz"),
            }],
            ..ShelverConfig::default()
        };
        Fixture {
            _temp: temp,
            samples,
            outbox,
            mirror,
            config,
        }
    }

    fn dispatcher(config: ShelverConfig, ops: Arc<dyn FileOps>) -> (Dispatcher, Arc<MemoryTagStore>) {
        let store = Arc::new(MemoryTagStore::new());
        let dispatcher = Dispatcher::new(Arc::new(config), store.clone(), ops).unwrap();
        (dispatcher, store)
    }

    fn added(root: &WatchedRoot, paths: &[&Path]) -> EventBatch {
        let mut batch = EventBatch::new(root.clone());
        for path in paths {
            batch.push(crate::types::FileEvent {
                kind: EventKind::Added,
                path: path.to_path_buf(),
            });
        }
        batch
    }

    #[test]
    fn test_dispatch_tags_and_links() {
        let f = fixture();
        let file = f.samples.path.join("drums/kick.wav");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"x").unwrap();

        let (dispatcher, store) = dispatcher(f.config.clone(), Arc::new(LocalFileOps::new()));
        let report = dispatcher.dispatch(&added(&f.samples, &[&file]));

        assert_eq!(report.failed, 0, "{:?}", report.diagnostics);
        assert!(store.contains_tag(&file, &Tag::from_canonical("drums")).unwrap());
        assert_eq!(fs::read_link(f.mirror.join("kick.wav")).unwrap(), file);
        assert_eq!(report.applied_for(RuleKind::DirectoryTags), 1);
        assert_eq!(report.applied_for(RuleKind::MirrorLink), 1);
    }

    #[test]
    fn test_failures_are_isolated_per_file() {
        let f = fixture();
        let a = f.samples.path.join("drums/a.wav");
        let b = f.samples.path.join("drums/b.wav");
        fs::create_dir_all(a.parent().unwrap()).unwrap();
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        let (dispatcher, store) = dispatcher(f.config.clone(), Arc::new(BrokenOps));
        let report = dispatcher.dispatch(&added(&f.samples, &[&a, &b]));

        // Mirror links fail for both files, tagging still happens.
        assert_eq!(report.failed, 2);
        assert!(report.diagnostics.iter().all(|d| d.rule == "mirror symlink"));
        assert!(store.contains_tag(&a, &Tag::from_canonical("drums")).unwrap());
        assert!(store.contains_tag(&b, &Tag::from_canonical("drums")).unwrap());
    }

    #[test]
    fn test_dry_run_performs_nothing() {
        let f = fixture();
        let mut config = f.config.clone();
        config.dry_run = true;
        fs::create_dir_all(f.samples.path.join("jazz")).unwrap();
        let file = f.outbox.path.join("[jazz] take.wav");
        fs::write(&file, b"x").unwrap();

        let (dispatcher, _) = dispatcher(config, Arc::new(BrokenOps));
        let report = dispatcher.dispatch(&added(&f.outbox, &[&file]));

        assert_eq!(report.dry_run, 1);
        assert_eq!(report.failed, 0);
        assert!(file.exists());
    }

    #[test]
    fn test_failed_move_restores_name() {
        struct NoMove(LocalFileOps);
        impl FileOps for NoMove {
            fn rename(&self, from: &Path, to: &Path) -> Result<()> {
                self.0.rename(from, to)
            }
            fn move_to_dir(&self, _: &Path, dest: &Path) -> Result<PathBuf> {
                Err(ShelverError::DestinationMissing(dest.to_path_buf()))
            }
            fn symlink(&self, t: &Path, l: &Path) -> Result<()> {
                self.0.symlink(t, l)
            }
            fn hide(&self, p: &Path) -> Result<()> {
                self.0.hide(p)
            }
            fn set_comment(&self, p: &Path, t: &str) -> Result<()> {
                self.0.set_comment(p, t)
            }
            fn unlink(&self, p: &Path) -> Result<()> {
                self.0.unlink(p)
            }
        }

        let f = fixture();
        fs::create_dir_all(f.samples.path.join("jazz")).unwrap();
        let file = f.outbox.path.join("[jazz] take.wav");
        fs::write(&file, b"x").unwrap();

        let (dispatcher, _) = dispatcher(f.config.clone(), Arc::new(NoMove(LocalFileOps::new())));
        let report = dispatcher.dispatch(&added(&f.outbox, &[&file]));

        assert_eq!(report.failed, 1);
        assert!(file.exists());
        assert!(!f.outbox.path.join("take.wav").exists());
    }

    #[test]
    fn test_vanished_and_ignored_paths_are_dropped() {
        let f = fixture();
        let mut config = f.config.clone();
        config.ignore_patterns = vec!["*.tmp".to_string()];
        let ghost = f.samples.path.join("drums/ghost.wav");
        let scratch = f.samples.path.join("scratch.tmp");
        fs::write(&scratch, b"x").unwrap();

        let (dispatcher, store) = dispatcher(config, Arc::new(BrokenOps));
        let report = dispatcher.dispatch(&added(&f.samples, &[&ghost, &scratch]));

        assert_eq!(report.events, 2);
        assert_eq!(report.applied + report.failed + report.skipped, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_rule_tags_are_written_together() {
        use std::collections::BTreeSet;
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Default)]
        struct CountingStore {
            inner: MemoryTagStore,
            writes: AtomicUsize,
        }

        impl TagStore for CountingStore {
            fn tags(&self, path: &Path) -> Result<BTreeSet<Tag>> {
                self.inner.tags(path)
            }
            fn add_tag(&self, path: &Path, tag: &Tag) -> Result<bool> {
                self.writes.fetch_add(1, Ordering::SeqCst);
                self.inner.add_tag(path, tag)
            }
            fn remove_tag(&self, path: &Path, tag: &Tag) -> Result<bool> {
                self.inner.remove_tag(path, tag)
            }
            fn add_tags(&self, path: &Path, tags: &[Tag]) -> Result<usize> {
                self.writes.fetch_add(1, Ordering::SeqCst);
                self.inner.add_tags(path, tags)
            }
        }

        let f = fixture();
        let mut config = f.config.clone();
        config.directory_tags.push(DirectoryTagConfig {
            fragment: "drums/kick".to_string(),
            tag: None,
        });
        let file = f.samples.path.join("drums/kick/909.wav");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"x").unwrap();

        let store = Arc::new(CountingStore::default());
        let dispatcher =
            Dispatcher::new(Arc::new(config), store.clone(), Arc::new(LocalFileOps::new()))
                .unwrap();
        let report = dispatcher.dispatch(&added(&f.samples, &[&file]));

        assert_eq!(report.applied_for(RuleKind::DirectoryTags), 2);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.tags(&file).unwrap().len(), 2);

        dispatcher.dispatch(&added(&f.samples, &[&file]));
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }
}
