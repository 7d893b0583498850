//! Filesystem watch adapter.
//!
//! Turns debounced `notify` events into one [`EventBatch`] per watched root
//! and hands each batch to that root's channel. The rule engine never sees
//! `notify` types.

use crate::error::Result;
use crate::types::{EventBatch, EventKind, FileEvent, WatchedRoot};
use notify::event::{ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Translate one `notify` event into file events.
///
/// A rename that carries both paths becomes a delete of the old path and
/// an add of the new one. Directories are dropped from adds and modifies.
pub fn convert_event(event: &notify::Event) -> Vec<FileEvent> {
    use notify::EventKind as Kind;

    let file = |kind: EventKind, path: &PathBuf| -> Option<FileEvent> {
        if kind != EventKind::Deleted && path.is_dir() {
            return None;
        }
        Some(FileEvent {
            kind,
            path: path.clone(),
        })
    };

    let mut out = Vec::new();
    match &event.kind {
        Kind::Create(_) => out.extend(event.paths.iter().filter_map(|p| file(EventKind::Added, p))),
        Kind::Remove(_) => {
            out.extend(event.paths.iter().filter_map(|p| file(EventKind::Deleted, p)))
        }
        Kind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() >= 2 => {
            out.extend(file(EventKind::Deleted, &event.paths[0]));
            out.extend(file(EventKind::Added, &event.paths[1]));
        }
        Kind::Modify(ModifyKind::Name(RenameMode::From)) => {
            out.extend(event.paths.iter().filter_map(|p| file(EventKind::Deleted, p)))
        }
        Kind::Modify(ModifyKind::Name(RenameMode::To)) => {
            out.extend(event.paths.iter().filter_map(|p| file(EventKind::Added, p)))
        }
        Kind::Modify(ModifyKind::Name(_)) => {
            // Direction unknown: trust what is on disk now.
            for path in &event.paths {
                let kind = if path.exists() {
                    EventKind::Added
                } else {
                    EventKind::Deleted
                };
                out.extend(file(kind, path));
            }
        }
        Kind::Modify(_) => {
            out.extend(event.paths.iter().filter_map(|p| file(EventKind::Modified, p)))
        }
        Kind::Access(_) | Kind::Any | Kind::Other => {}
    }
    out
}

/// Group events by root. The result is aligned with `roots`; a path under
/// several (nested) roots lands in each of their batches.
pub fn batches_for_roots<I>(roots: &[WatchedRoot], events: I) -> Vec<EventBatch>
where
    I: IntoIterator<Item = FileEvent>,
{
    let mut batches: Vec<EventBatch> = roots.iter().cloned().map(EventBatch::new).collect();
    for event in events {
        for batch in batches.iter_mut() {
            if batch.root.covers(&event.path) {
                batch.push(event.clone());
            }
        }
    }
    batches
}

/// Keeps the OS watches alive; dropping it stops delivery.
pub struct RootWatcher {
    _debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
}

impl RootWatcher {
    /// Watch every root in `routes` and send its batches on the paired
    /// channel.
    pub fn start(
        routes: Vec<(WatchedRoot, mpsc::Sender<EventBatch>)>,
        debounce: Duration,
    ) -> Result<Self> {
        let roots: Vec<WatchedRoot> = routes.iter().map(|(root, _)| root.clone()).collect();
        let senders: Vec<mpsc::Sender<EventBatch>> =
            routes.into_iter().map(|(_, tx)| tx).collect();
        let callback_roots = roots.clone();

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let file_events = events.iter().flat_map(|e| convert_event(&e.event));
                    let batches = batches_for_roots(&callback_roots, file_events);
                    for (batch, tx) in batches.into_iter().zip(&senders) {
                        if batch.is_empty() {
                            continue;
                        }
                        tracing::debug!(
                            root = %batch.root.path.display(),
                            events = batch.len(),
                            "Delivering batch"
                        );
                        if tx.blocking_send(batch).is_err() {
                            tracing::warn!("Batch channel closed");
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::error!(error = %error, "Watch error");
                    }
                }
            }
        })?;

        for root in &roots {
            let mode = if root.recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            debouncer.watcher().watch(&root.path, mode)?;
            debouncer.cache().add_root(&root.path, mode);
            tracing::info!(root = %root.path.display(), role = %root.role, "Watching");
        }

        Ok(Self {
            _debouncer: debouncer,
        })
    }
}
