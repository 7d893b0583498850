//! Logging setup for Shelver binaries.
//!
//! Every rule action is reported through `tracing`; this crate decides where
//! those lines end up: a size-rotated file under `~/.shelver/logs` and stderr.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "shelver=info";
const VERBOSE_LOG_FILTER: &str = "shelver=debug";
const KEEP_LOG_FILES: usize = 5;
const ROLL_AT_BYTES: u64 = 10 * 1024 * 1024;

/// Logging options for a Shelver binary.
pub struct LogConfig<'a> {
    /// Base name of the log file (`<app_name>.log`).
    pub app_name: &'a str,
    /// Print debug output on stderr.
    pub verbose: bool,
    /// Directory for log files; defaults to [`logs_dir`].
    pub log_dir: Option<PathBuf>,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the defaults for both layers.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let dir = match config.log_dir {
        Some(dir) => dir,
        None => logs_dir(),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let writer = SharedLogFile::open(&dir, config.app_name)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let stderr_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if config.verbose => EnvFilter::new(VERBOSE_LOG_FILTER),
        Err(_) => EnvFilter::new(DEFAULT_LOG_FILTER),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(stderr_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Shelver home directory: `$SHELVER_HOME` or `~/.shelver`.
pub fn shelver_home() -> PathBuf {
    if let Ok(home) = std::env::var("SHELVER_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|home| home.join(".shelver"))
        .unwrap_or_else(|| PathBuf::from(".shelver"))
}

/// Default log directory: `<shelver_home>/logs`.
pub fn logs_dir() -> PathBuf {
    shelver_home().join("logs")
}

/// Log file that rolls over to `<name>.log.1 .. <name>.log.N` once it grows
/// past `roll_at` bytes.
struct RollingLog {
    dir: PathBuf,
    name: String,
    keep: usize,
    roll_at: u64,
    file: Option<File>,
    written: u64,
}

impl RollingLog {
    fn open(dir: &Path, name: &str, keep: usize, roll_at: u64) -> io::Result<Self> {
        let mut log = Self {
            dir: dir.to_path_buf(),
            name: file_stem_for(name),
            keep: keep.max(1),
            roll_at,
            file: None,
            written: 0,
        };
        log.reopen()?;
        if log.written > log.roll_at {
            log.roll()?;
        }
        Ok(log)
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.name))
    }

    fn archived_path(&self, generation: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.name, generation))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let last = self.keep - 1;
        if last > 0 {
            let oldest = self.archived_path(last);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for generation in (1..last).rev() {
                let from = self.archived_path(generation);
                if from.exists() {
                    fs::rename(&from, self.archived_path(generation + 1))?;
                }
            }
            let active = self.active_path();
            if active.exists() {
                fs::rename(&active, self.archived_path(1))?;
            }
        } else {
            // Single-file mode: truncate in place.
            File::create(self.active_path())?;
        }

        self.reopen()
    }
}

impl Write for RollingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.roll_at {
            self.roll()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file is closed"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
struct SharedLogFile {
    inner: Arc<Mutex<RollingLog>>,
}

impl SharedLogFile {
    fn open(dir: &Path, app_name: &str) -> io::Result<Self> {
        let log = RollingLog::open(dir, app_name, KEEP_LOG_FILES, ROLL_AT_BYTES)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(log)),
        })
    }
}

struct SharedLogHandle {
    inner: Arc<Mutex<RollingLog>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogFile {
    type Writer = SharedLogHandle;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLogHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedLogHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))?
            .flush()
    }
}

fn file_stem_for(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => ch,
            _ => '_',
        })
        .collect()
}
