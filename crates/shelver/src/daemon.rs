//! Long-running service: one dispatch task per watched root plus the
//! reconciliation schedule.
//!
//! Batches for a root are handled strictly one after another; different
//! roots run concurrently. Dispatch itself is blocking filesystem work and
//! runs on the blocking pool.

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::reconcile::Reconciler;
use crate::types::{EventBatch, WatchedRoot};
use crate::watch::RootWatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Pending batches per root before the watcher thread blocks.
const ROOT_CHANNEL_CAPACITY: usize = 64;

pub struct Daemon {
    dispatcher: Arc<Dispatcher>,
    reconciler: Arc<Reconciler>,
}

impl Daemon {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let reconciler = Arc::new(Reconciler::new(dispatcher.clone()));
        Self {
            dispatcher,
            reconciler,
        }
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let config = self.dispatcher.config();
        let debounce = Duration::from_millis(config.debounce_ms);
        let period = Duration::from_secs(config.reconcile_interval_secs.max(1));

        let mut routes = Vec::new();
        let mut root_tasks = Vec::new();
        for root in config.watched_roots() {
            let (tx, rx) = mpsc::channel(ROOT_CHANNEL_CAPACITY);
            routes.push((root.clone(), tx));
            root_tasks.push(spawn_root_task(self.dispatcher.clone(), root.clone(), rx));
        }
        let watcher = RootWatcher::start(routes, debounce)?;

        let reconcile = tokio::spawn(run_reconcile_loop(
            self.reconciler.clone(),
            period,
            shutdown.clone(),
        ));

        tracing::info!(
            roots = root_tasks.len(),
            reconcile_every_secs = period.as_secs(),
            dry_run = self.dispatcher.dry_run(),
            "Shelver running"
        );

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        tracing::info!("Shutting down");

        // Dropping the watcher closes every root channel.
        drop(watcher);
        for task in root_tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Root task failed");
            }
        }
        if let Err(e) = reconcile.await {
            tracing::error!(error = %e, "Reconcile loop failed");
        }
        Ok(())
    }
}

/// Consume batches for `root` until the channel closes. Returns the number
/// of batches dispatched.
pub fn spawn_root_task(
    dispatcher: Arc<Dispatcher>,
    root: WatchedRoot,
    mut rx: mpsc::Receiver<EventBatch>,
) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut dispatched = 0u64;
        while let Some(batch) = rx.recv().await {
            let dispatcher = dispatcher.clone();
            match tokio::task::spawn_blocking(move || dispatcher.dispatch(&batch)).await {
                Ok(report) => {
                    dispatched += 1;
                    if report.failed > 0 || report.skipped > 0 {
                        tracing::info!(
                            root = %root.path.display(),
                            applied = report.applied,
                            skipped = report.skipped,
                            failed = report.failed,
                            "Batch finished with diagnostics"
                        );
                    }
                }
                // A panic inside one batch must not end the root's loop.
                Err(e) => {
                    tracing::error!(root = %root.path.display(), error = %e, "Dispatch panicked");
                }
            }
        }
        tracing::debug!(root = %root.path.display(), dispatched, "Root task stopped");
        dispatched
    })
}

/// Run a reconciliation pass every `period` until shutdown. The first pass
/// happens one period after start. Returns the number of passes started.
pub async fn run_reconcile_loop(
    reconciler: Arc<Reconciler>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut passes = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                passes += 1;
                let reconciler = reconciler.clone();
                match tokio::task::spawn_blocking(move || reconciler.run_once()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "Reconciliation pass failed"),
                    Err(e) => tracing::error!(error = %e, "Reconciliation pass panicked"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    passes
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{DirectoryTagConfig, ShelverConfig};
    use crate::ops::LocalFileOps;
    use crate::tags::{MemoryTagStore, Tag, TagStore};
    use crate::types::{EventKind, FileEvent, RootRole};
    use std::fs;
    use tempfile::TempDir;

    fn dispatcher(temp: &TempDir) -> (Arc<Dispatcher>, Arc<MemoryTagStore>) {
        let samples = temp.path().join("samples");
        fs::create_dir_all(samples.join("loops")).unwrap();
        let config = ShelverConfig {
            roots: vec![WatchedRoot::new(&samples, RootRole::Samples)],
            directory_tags: vec![DirectoryTagConfig {
                fragment: "loops".to_string(),
                tag: None,
            }],
            ..ShelverConfig::default()
        };
        let store = Arc::new(MemoryTagStore::new());
        let dispatcher =
            Dispatcher::new(Arc::new(config), store.clone(), Arc::new(LocalFileOps::new()))
                .unwrap();
        (Arc::new(dispatcher), store)
    }

    #[tokio::test]
    async fn test_root_task_drains_channel() {
        let temp = TempDir::new().unwrap();
        let (dispatcher, store) = dispatcher(&temp);
        let root = dispatcher.config().roots[0].clone();
        let file = root.path.join("loops/l1.wav");
        fs::write(&file, b"x").unwrap();

        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_root_task(dispatcher, root.clone(), rx);

        let mut batch = EventBatch::new(root);
        batch.push(FileEvent {
            kind: EventKind::Added,
            path: file.clone(),
        });
        tx.send(batch.clone()).await.unwrap();
        tx.send(batch).await.unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap(), 2);
        assert_eq!(
            store.tags(&file).unwrap().into_iter().collect::<Vec<_>>(),
            vec![Tag::from_canonical("loops")]
        );
    }

    #[tokio::test]
    async fn test_reconcile_loop_runs_and_stops() {
        let temp = TempDir::new().unwrap();
        let (dispatcher, store) = dispatcher(&temp);
        let file = temp.path().join("samples/loops/missed.wav");
        fs::write(&file, b"x").unwrap();

        let reconciler = Arc::new(Reconciler::new(dispatcher));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_reconcile_loop(
            reconciler,
            Duration::from_millis(20),
            shutdown_rx,
        ));

        let tag = Tag::from_canonical("loops");
        for _ in 0..250 {
            if store.contains_tag(&file, &tag).unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(store.contains_tag(&file, &tag).unwrap());

        shutdown_tx.send(true).unwrap();
        let passes = handle.await.unwrap();
        assert!(passes >= 1);
    }
}
