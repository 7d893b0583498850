//! Path classification
//!
//! Pure, path-only helpers. Nothing here touches the filesystem, so every
//! rule predicate built on top of them stays cheap.

use std::collections::BTreeSet;
use std::path::Path;

/// Extension of `path` without the leading dot, or `""` if it has none.
///
/// Dotfiles such as `.DS_Store` have no extension.
pub fn extension(path: &Path) -> &str {
    path.extension().and_then(|ext| ext.to_str()).unwrap_or("")
}

/// Final component of `path` as UTF-8, or `""`.
pub fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|name| name.to_str()).unwrap_or("")
}

/// Case-sensitive set of extensions (stored without the leading dot).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    extensions: BTreeSet<String>,
}

impl ExtensionSet {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_string())
                .filter(|ext| !ext.is_empty())
                .collect(),
        }
    }

    /// True iff the extension of `path` is a member of the set.
    /// Paths without an extension are never allowed.
    pub fn allows(&self, path: &Path) -> bool {
        let ext = extension(path);
        !ext.is_empty() && self.contains(ext)
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.extensions.contains(ext)
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}

/// `name` with its extension replaced by `new_ext`.
///
/// `take1.ot` with `wav` becomes `take1.wav`. Names without an extension get
/// one appended.
pub fn with_extension(name: &str, new_ext: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name);
    format!("{}.{}", stem, new_ext)
}
