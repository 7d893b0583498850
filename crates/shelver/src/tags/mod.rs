//! Tags: dotted, namespace-structured labels attached to files.
//!
//! `s.src.music.orch` has the namespace ancestors `s`, `s.src` and
//! `s.src.music`. Segments never contain `-`, `/` or `+`; every tag goes
//! through [`TagSanitizer::sanitize`] before it reaches a [`TagStore`].

mod store;

pub use store::{JsonTagStore, MemoryTagStore, TagStore};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A sanitized, dotted tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// Wrap a string that is already in canonical form.
    ///
    /// Use [`TagSanitizer::sanitize`] for anything that came from
    /// configuration or a path.
    pub fn from_canonical(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Turns raw tag strings (path fragments, config values) into [`Tag`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSanitizer {
    prefix: String,
}

impl TagSanitizer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Drop `-`, map `/` to `.`, map `+` to `n`, then prepend the prefix.
    ///
    /// `src/music/r+b-core` becomes `<prefix>src.music.rnbcore`.
    pub fn sanitize(&self, raw: &str) -> Tag {
        let mut tag = String::with_capacity(self.prefix.len() + raw.len());
        tag.push_str(&self.prefix);
        for ch in raw.chars() {
            match ch {
                '-' => {}
                '/' => tag.push('.'),
                '+' => tag.push('n'),
                other => tag.push(other),
            }
        }
        Tag(tag)
    }

    /// The part of `tag` after the configured prefix.
    pub fn strip_prefix<'a>(&self, tag: &'a Tag) -> &'a str {
        tag.as_str()
            .strip_prefix(self.prefix.as_str())
            .unwrap_or(tag.as_str())
    }
}

/// `a.b.c` → `a`, `a.b`, `a.b.c` (ancestors first, the tag itself last).
pub fn expand_namespace(tag: &str) -> Vec<Tag> {
    let mut expanded = Vec::new();
    for (idx, ch) in tag.char_indices() {
        if ch == '.' && idx > 0 {
            expanded.push(Tag(tag[..idx].to_string()));
        }
    }
    if !tag.is_empty() {
        expanded.push(Tag(tag.to_string()));
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_reserved_characters() {
        let sanitizer = TagSanitizer::new("");
        assert_eq!(
            sanitizer.sanitize("src/music/r+b-core").as_str(),
            "src.music.rnbcore"
        );
    }

    #[test]
    fn test_sanitize_prepends_prefix() {
        let sanitizer = TagSanitizer::new("s.");
        assert_eq!(
            sanitizer.sanitize("src/music/r+b-core").as_str(),
            "s.src.music.rnbcore"
        );
        assert_eq!(sanitizer.sanitize("orch").as_str(), "s.orch");
    }

    #[test]
    fn test_sanitize_is_total() {
        let sanitizer = TagSanitizer::new("");
        assert_eq!(sanitizer.sanitize("").as_str(), "");
        assert_eq!(sanitizer.sanitize("---").as_str(), "");
        assert_eq!(sanitizer.sanitize("+/+").as_str(), "n.n");
    }

    #[test]
    fn test_sanitize_is_stable_on_canonical_input() {
        let sanitizer = TagSanitizer::new("");
        let once = sanitizer.sanitize("field/hi-hat+");
        let twice = sanitizer.sanitize(once.as_str());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_expand_namespace() {
        let expanded: Vec<String> = expand_namespace("s.src.music.orch")
            .into_iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(expanded, vec!["s", "s.src", "s.src.music", "s.src.music.orch"]);
    }

    #[test]
    fn test_expand_namespace_single_segment() {
        let expanded = expand_namespace("perc");
        assert_eq!(expanded, vec![Tag::from_canonical("perc")]);
        assert!(expand_namespace("").is_empty());
    }

    #[test]
    fn test_strip_prefix() {
        let sanitizer = TagSanitizer::new("s.");
        let tag = sanitizer.sanitize("perc/shaker");
        assert_eq!(sanitizer.strip_prefix(&tag), "perc.shaker");

        let foreign = Tag::from_canonical("vox.chop");
        assert_eq!(sanitizer.strip_prefix(&foreign), "vox.chop");
    }
}
