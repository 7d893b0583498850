//! Test Harness for Integration Testing
//!
//! Lays out a throwaway library in a temp directory (inbox, processing,
//! outbox, samples, mirror, device export), builds a configuration that
//! points at it, and wires a dispatcher to a [`RecordingOps`] so tests can
//! see every side effect.
//!
//! # Example
//!
//! ```ignore
//! let env = TestEnv::new();
//! let file = env.touch(&env.samples.join("src/kick.wav"));
//! let (dispatcher, store, ops) = env.dispatcher(env.config());
//! let report = dispatcher.dispatch(&env.batch(RootRole::Samples, EventKind::Added, &[&file]));
//! ```

#![allow(dead_code)]

use shelver::config::{DirectoryTagConfig, FilenameCodeConfig, PrefixRouteConfig};
use shelver::{
    Dispatcher, EventBatch, EventKind, FileEvent, FileOps, LocalFileOps, MemoryTagStore,
    RootRole, ShelverConfig, WatchedRoot,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// One collaborator call seen by [`RecordingOps`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub path: PathBuf,
    pub detail: String,
}

/// Performs real renames, moves, links and unlinks; records hide and
/// comment calls without touching platform metadata.
#[derive(Default)]
pub struct RecordingOps {
    inner: LocalFileOps,
    calls: Mutex<Vec<Call>>,
}

impl RecordingOps {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, op: &'static str, path: &Path, detail: impl Into<String>) {
        self.calls.lock().unwrap().push(Call {
            op,
            path: path.to_path_buf(),
            detail: detail.into(),
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, op: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }
}

impl FileOps for RecordingOps {
    fn rename(&self, from: &Path, to: &Path) -> shelver::Result<()> {
        self.record("rename", from, to.display().to_string());
        self.inner.rename(from, to)
    }

    fn move_to_dir(&self, path: &Path, dest_dir: &Path) -> shelver::Result<PathBuf> {
        self.record("move", path, dest_dir.display().to_string());
        self.inner.move_to_dir(path, dest_dir)
    }

    fn symlink(&self, target: &Path, link: &Path) -> shelver::Result<()> {
        self.record("symlink", link, target.display().to_string());
        self.inner.symlink(target, link)
    }

    fn hide(&self, path: &Path) -> shelver::Result<()> {
        self.record("hide", path, "");
        Ok(())
    }

    fn set_comment(&self, path: &Path, text: &str) -> shelver::Result<()> {
        self.record("comment", path, text);
        Ok(())
    }

    fn unlink(&self, path: &Path) -> shelver::Result<()> {
        self.record("unlink", path, "");
        self.inner.unlink(path)
    }
}

/// Temp directory tree shaped like a real sample library.
pub struct TestEnv {
    pub temp: TempDir,
    pub inbox: PathBuf,
    pub processing: PathBuf,
    pub outbox: PathBuf,
    pub samples: PathBuf,
    pub mirror: PathBuf,
    pub export: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let base = temp.path().to_path_buf();
        let env = Self {
            inbox: base.join("inbox"),
            processing: base.join("processing"),
            outbox: base.join("outbox"),
            samples: base.join("library/samples"),
            mirror: base.join("staging/all"),
            export: base.join("device/export"),
            temp,
        };
        for dir in [
            &env.inbox,
            &env.processing,
            &env.outbox,
            &env.samples,
            &env.mirror,
            &env.export,
        ] {
            fs::create_dir_all(dir).expect("create root");
        }
        env
    }

    pub fn root(&self, role: RootRole) -> WatchedRoot {
        let path = match role {
            RootRole::Inbox => &self.inbox,
            RootRole::Processing => &self.processing,
            RootRole::Outbox => &self.outbox,
            RootRole::Samples => &self.samples,
            RootRole::Mirror => &self.mirror,
            RootRole::DeviceExport => &self.export,
        };
        WatchedRoot::new(path, role)
    }

    /// Configuration used by most tests.
    ///
    /// Routes: `jazz` → `src/music/jazz`, `movie` → `src/movies` (never
    /// created by the harness). Tags carry the `s.` prefix.
    pub fn config(&self) -> ShelverConfig {
        let binding = |fragment: &str, tag: Option<&str>| DirectoryTagConfig {
            fragment: fragment.to_string(),
            tag: tag.map(str::to_string),
        };
        ShelverConfig {
            tag_prefix: "s.".to_string(),
            tag_store: self.temp.path().join("tags.json"),
            roots: [
                RootRole::Inbox,
                RootRole::Processing,
                RootRole::Outbox,
                RootRole::Samples,
                RootRole::Mirror,
                RootRole::DeviceExport,
            ]
            .into_iter()
            .map(|role| self.root(role))
            .collect(),
            directory_tags: vec![
                binding("src", None),
                binding("src/music/jazz", None),
                binding("src/music/orch", Some("orch")),
                binding("perc/shaker", None),
            ],
            prefix_routes: vec![
                PrefixRouteConfig {
                    code: "jazz".to_string(),
                    destination: PathBuf::from("src/music/jazz"),
                },
                PrefixRouteConfig {
                    code: "movie".to_string(),
                    destination: PathBuf::from("src/movies"),
                },
            ],
            filename_codes: vec![
                FilenameCodeConfig {
                    code: "Jz".to_string(),
                    tag: "src/music/jazz".to_string(),
                },
                FilenameCodeConfig {
                    code: "Shk".to_string(),
                    tag: "perc/shaker".to_string(),
                },
            ],
            allowed_namespaces: vec!["perc".to_string()],
            comment_markers: vec!["[yt]".to_string()],
            ignore_patterns: vec![".DS_Store".to_string()],
            ..ShelverConfig::default()
        }
    }

    /// Create `path` (and its parents) with a little content.
    pub fn touch(&self, path: &Path) -> PathBuf {
        fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        fs::write(path, b"RIFF").expect("write file");
        path.to_path_buf()
    }

    pub fn batch(&self, role: RootRole, kind: EventKind, paths: &[&Path]) -> EventBatch {
        let mut batch = EventBatch::new(self.root(role));
        for path in paths {
            batch.push(FileEvent {
                kind,
                path: path.to_path_buf(),
            });
        }
        batch
    }

    pub fn dispatcher(
        &self,
        config: ShelverConfig,
    ) -> (Arc<Dispatcher>, Arc<MemoryTagStore>, Arc<RecordingOps>) {
        let store = Arc::new(MemoryTagStore::new());
        let ops = Arc::new(RecordingOps::new());
        let dispatcher = Dispatcher::new(Arc::new(config), store.clone(), ops.clone())
            .expect("build dispatcher");
        (Arc::new(dispatcher), store, ops)
    }
}
