//! Companion (sidecar) file relocation.
//!
//! A hardware sampler exports `take1.ot` next to nothing; the sample it
//! describes, `take1.wav`, lives somewhere in the library. The sidecar is
//! moved next to its primary file and a symlink is left where it was found.
//! The pairing is recomputed from file names every time, never stored.

use crate::classify;
use crate::error::Result;
use crate::patterns::IgnoreSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Outcome of looking up a sidecar's primary file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionPlan {
    /// Sidecar is already a symlink (it was relocated before).
    AlreadyLinked,
    /// No primary file with the expected name exists yet.
    Unresolved { primary_name: String },
    /// Move the sidecar into `dest_dir`, then link `relocated` back.
    Relocate {
        primary: PathBuf,
        dest_dir: PathBuf,
        relocated: PathBuf,
        /// Other candidates that were passed over
        ambiguous: Vec<PathBuf>,
    },
    /// A file with the sidecar's name already sits next to the primary.
    Occupied { relocated: PathBuf },
}

/// Regular files named `name` under `root`, in sorted walk order.
pub fn find_by_name(root: &Path, name: &str, ignore: &IgnoreSet) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.path()
                .strip_prefix(root)
                .map(|rel| rel.as_os_str().is_empty() || !ignore.is_ignored(rel))
                .unwrap_or(true)
        })
    {
        let entry = entry?;
        if entry.file_type().is_file() && entry.file_name().to_str() == Some(name) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// Decide what to do with `sidecar`, searching `samples_root` for
/// `primary_name`.
pub fn plan(
    sidecar: &Path,
    primary_name: &str,
    samples_root: &Path,
    ignore: &IgnoreSet,
) -> Result<CompanionPlan> {
    if fs::symlink_metadata(sidecar)?.file_type().is_symlink() {
        return Ok(CompanionPlan::AlreadyLinked);
    }

    let mut candidates = find_by_name(samples_root, primary_name, ignore)?.into_iter();
    let Some(primary) = candidates.next() else {
        return Ok(CompanionPlan::Unresolved {
            primary_name: primary_name.to_string(),
        });
    };

    let dest_dir = match primary.parent() {
        Some(parent) => parent.to_path_buf(),
        None => samples_root.to_path_buf(),
    };
    let relocated = dest_dir.join(classify::file_name(sidecar));
    if relocated == sidecar {
        return Ok(CompanionPlan::AlreadyLinked);
    }
    if fs::symlink_metadata(&relocated).is_ok() {
        return Ok(CompanionPlan::Occupied { relocated });
    }

    Ok(CompanionPlan::Relocate {
        primary,
        dest_dir,
        relocated,
        ambiguous: candidates.collect(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_plan_relocates_to_primary_directory() {
        let temp = TempDir::new().unwrap();
        let samples = temp.path().join("samples");
        let sidecar = temp.path().join("device/take1.ot");
        touch(&samples.join("src/music/jazz/take1.wav"));
        touch(&sidecar);

        let plan = plan(&sidecar, "take1.wav", &samples, &IgnoreSet::empty()).unwrap();
        assert_eq!(
            plan,
            CompanionPlan::Relocate {
                primary: samples.join("src/music/jazz/take1.wav"),
                dest_dir: samples.join("src/music/jazz"),
                relocated: samples.join("src/music/jazz/take1.ot"),
                ambiguous: vec![],
            }
        );
    }

    #[test]
    fn test_plan_unresolved_without_primary() {
        let temp = TempDir::new().unwrap();
        let samples = temp.path().join("samples");
        fs::create_dir_all(&samples).unwrap();
        let sidecar = temp.path().join("device/take9.ot");
        touch(&sidecar);

        let plan = plan(&sidecar, "take9.wav", &samples, &IgnoreSet::empty()).unwrap();
        assert_eq!(
            plan,
            CompanionPlan::Unresolved {
                primary_name: "take9.wav".to_string()
            }
        );
    }

    #[test]
    fn test_plan_skips_symlinked_sidecar() {
        let temp = TempDir::new().unwrap();
        let samples = temp.path().join("samples");
        let primary_dir = samples.join("field");
        touch(&primary_dir.join("take1.wav"));
        touch(&primary_dir.join("take1.ot"));
        let sidecar = temp.path().join("device/take1.ot");
        fs::create_dir_all(sidecar.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(primary_dir.join("take1.ot"), &sidecar).unwrap();

        let plan = plan(&sidecar, "take1.wav", &samples, &IgnoreSet::empty()).unwrap();
        assert_eq!(plan, CompanionPlan::AlreadyLinked);
    }

    #[test]
    fn test_plan_reports_ambiguity_and_occupied() {
        let temp = TempDir::new().unwrap();
        let samples = temp.path().join("samples");
        touch(&samples.join("a/take1.wav"));
        touch(&samples.join("b/take1.wav"));
        let sidecar = temp.path().join("device/take1.ot");
        touch(&sidecar);

        match plan(&sidecar, "take1.wav", &samples, &IgnoreSet::empty()).unwrap() {
            CompanionPlan::Relocate {
                primary, ambiguous, ..
            } => {
                assert_eq!(primary, samples.join("a/take1.wav"));
                assert_eq!(ambiguous, vec![samples.join("b/take1.wav")]);
            }
            other => panic!("unexpected plan: {:?}", other),
        }

        touch(&samples.join("a/take1.ot"));
        let plan = plan(&sidecar, "take1.wav", &samples, &IgnoreSet::empty()).unwrap();
        assert!(matches!(plan, CompanionPlan::Occupied { .. }));
    }

    #[test]
    fn test_find_by_name_honors_ignore() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(&root.join("keep/take1.wav"));
        touch(&root.join("trash/take1.wav"));

        let ignore = IgnoreSet::new(&["trash/**"]).unwrap();
        let found = find_by_name(root, "take1.wav", &ignore).unwrap();
        assert_eq!(found, vec![root.join("keep/take1.wav")]);
    }
}
