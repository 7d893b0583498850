//! Side-effecting file operations.
//!
//! The dispatcher never touches the filesystem directly; every mutation goes
//! through a [`FileOps`] so that dry runs, tests and alternative platforms can
//! swap the implementation.

use crate::error::{Result, ShelverError};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Pluggable filesystem/process operations.
///
/// Each call reports success or failure through its `Result`; none of them
/// panic, so one failing file never takes down a batch.
pub trait FileOps: Send + Sync {
    /// Rename within the same directory. Fails if `to` exists.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Move `path` into `dest_dir`, keeping its name. Returns the new path.
    fn move_to_dir(&self, path: &Path, dest_dir: &Path) -> Result<PathBuf>;

    /// Create `link` pointing at `target`, replacing an existing link or file.
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;

    /// Hide the file in the platform file browser.
    fn hide(&self, path: &Path) -> Result<()>;

    /// Write `text` into the file's comment metadata.
    fn set_comment(&self, path: &Path, text: &str) -> Result<()>;

    /// Remove a directory entry without following symlinks.
    fn unlink(&self, path: &Path) -> Result<()>;
}

/// [`FileOps`] backed by `std::fs` and the platform's command-line tools.
#[derive(Debug, Default)]
pub struct LocalFileOps {
    _private: (),
}

impl LocalFileOps {
    pub fn new() -> Self {
        Self::default()
    }
}

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_LINK: i32 = 18;

static TEMP_LINK_COUNTER: AtomicU64 = AtomicU64::new(0);

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn run_command(program: &str, args: &[&OsStr]) -> Result<()> {
    debug!(program, ?args, "Running command");
    let output = Command::new(program).args(args).output()?;
    if output.status.success() {
        return Ok(());
    }
    Err(ShelverError::Command {
        program: program.to_string(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

impl FileOps for LocalFileOps {
    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if exists_no_follow(to) {
            return Err(ShelverError::AlreadyExists(to.to_path_buf()));
        }
        fs::rename(from, to)?;
        Ok(())
    }

    fn move_to_dir(&self, path: &Path, dest_dir: &Path) -> Result<PathBuf> {
        if !dest_dir.is_dir() {
            return Err(ShelverError::DestinationMissing(dest_dir.to_path_buf()));
        }
        let name = path
            .file_name()
            .ok_or_else(|| ShelverError::InvalidState(format!("no file name: {}", path.display())))?;
        let target = dest_dir.join(name);
        if exists_no_follow(&target) {
            return Err(ShelverError::AlreadyExists(target));
        }

        match fs::rename(path, &target) {
            Ok(()) => {}
            Err(err) if err.raw_os_error() == Some(CROSS_DEVICE_LINK) => {
                fs::copy(path, &target)?;
                fs::remove_file(path)?;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(target)
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        if let Ok(meta) = fs::symlink_metadata(link) {
            if meta.is_dir() {
                return Err(ShelverError::AlreadyExists(link.to_path_buf()));
            }
        }

        // Build the link next to its final location, then rename it over
        // whatever is there: the entry is never observed missing.
        let name = link
            .file_name()
            .ok_or_else(|| ShelverError::InvalidState(format!("no file name: {}", link.display())))?;
        let tmp = link.with_file_name(format!(
            ".{}.{}-{}.tmp",
            name.to_string_lossy(),
            std::process::id(),
            TEMP_LINK_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::os::unix::fs::symlink(target, &tmp)?;
        if let Err(err) = fs::rename(&tmp, link) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn symlink(&self, _target: &Path, link: &Path) -> Result<()> {
        Err(ShelverError::Unsupported(format!(
            "symlink {}",
            link.display()
        )))
    }

    fn hide(&self, path: &Path) -> Result<()> {
        if cfg!(target_os = "macos") {
            run_command("chflags", &[OsStr::new("hidden"), path.as_os_str()])
        } else {
            Err(ShelverError::Unsupported(format!("hide {}", path.display())))
        }
    }

    fn set_comment(&self, path: &Path, text: &str) -> Result<()> {
        if cfg!(target_os = "macos") {
            run_command(
                "osascript",
                &[
                    OsStr::new("-e"),
                    OsStr::new("on run {f, c}"),
                    OsStr::new("-e"),
                    OsStr::new("tell app \"Finder\" to set comment of (POSIX file f as alias) to c"),
                    OsStr::new("-e"),
                    OsStr::new("end"),
                    path.as_os_str(),
                    OsStr::new(text),
                ],
            )
        } else if cfg!(target_os = "linux") {
            run_command(
                "setfattr",
                &[
                    OsStr::new("-n"),
                    OsStr::new("user.xdg.comment"),
                    OsStr::new("-v"),
                    OsStr::new(text),
                    path.as_os_str(),
                ],
            )
        } else {
            Err(ShelverError::Unsupported(format!(
                "comment on {}",
                path.display()
            )))
        }
    }

    fn unlink(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }
}
