//! Ignore-pattern normalization and matching.

use crate::error::{Result, ShelverError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Normalize a glob pattern for matching against root-relative paths.
///
/// Rules:
/// - Leading slashes are stripped (relative matching)
/// - Patterns without a path separator get a "**/" prefix
pub fn normalize_glob_pattern(raw: &str) -> String {
    let pattern = raw.trim().trim_start_matches('/');
    if pattern.is_empty() {
        return String::new();
    }
    if !pattern.contains('/') && !pattern.starts_with("**/") {
        return format!("**/{}", pattern);
    }
    pattern.to_string()
}

/// Compiled set of ignore patterns.
#[derive(Debug, Clone)]
pub struct IgnoreSet {
    set: GlobSet,
    len: usize,
}

impl IgnoreSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut len = 0;
        for raw in patterns {
            let normalized = normalize_glob_pattern(raw.as_ref());
            if normalized.is_empty() {
                continue;
            }
            let glob = Glob::new(&normalized)
                .map_err(|e| ShelverError::Pattern(format!("{}: {}", raw.as_ref(), e)))?;
            builder.add(glob);
            len += 1;
        }
        let set = builder
            .build()
            .map_err(|e| ShelverError::Pattern(e.to_string()))?;
        Ok(Self { set, len })
    }

    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            len: 0,
        }
    }

    /// Whether a root-relative path is ignored.
    pub fn is_ignored(&self, rel_path: &Path) -> bool {
        self.len > 0 && self.set.is_match(rel_path)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_basics() {
        assert_eq!(normalize_glob_pattern(""), "");
        assert_eq!(normalize_glob_pattern(".DS_Store"), "**/.DS_Store");
        assert_eq!(normalize_glob_pattern("*.tmp"), "**/*.tmp");
        assert_eq!(normalize_glob_pattern("/bounce/*.wav"), "bounce/*.wav");
        assert_eq!(normalize_glob_pattern("**/x"), "**/x");
    }

    #[test]
    fn ignore_matches_relative_paths() {
        let set = IgnoreSet::new(&[".DS_Store", "*.tmp", "bounce/*.wav"]).unwrap();
        assert!(set.is_ignored(Path::new(".DS_Store")));
        assert!(set.is_ignored(Path::new("src/music/.DS_Store")));
        assert!(set.is_ignored(Path::new("a/b/c.tmp")));
        assert!(set.is_ignored(Path::new("bounce/take.wav")));
        assert!(!set.is_ignored(Path::new("src/bounce/take.wav")));
        assert!(!set.is_ignored(Path::new("src/take.wav")));
    }

    #[test]
    fn empty_set_ignores_nothing() {
        let set = IgnoreSet::empty();
        assert!(!set.is_ignored(Path::new("anything")));
        assert!(set.is_empty());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = IgnoreSet::new(&["a[b"]).unwrap_err();
        assert!(matches!(err, ShelverError::Pattern(_)));
    }
}
