//! Rule table
//!
//! The ordered, immutable set of classification rules, compiled once from the
//! configuration. Every predicate here is a function of the path (and, for
//! namespace promotion, of the file's current tag set); nothing reads file
//! contents.

use crate::classify::{self, ExtensionSet};
use crate::config::ShelverConfig;
use crate::error::{Result, ShelverError};
use crate::patterns::IgnoreSet;
use crate::tags::{expand_namespace, Tag, TagSanitizer};
use crate::types::{EventKind, EventMask, RootRole};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Rule classes, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    CommentAnnotation,
    PrefixRouting,
    DirectoryTags,
    FilenameCodeTags,
    NamespacePromotion,
    Hide,
    MirrorLink,
    CompanionRelocation,
    TagCleanup,
}

/// A named predicate/action pair. Immutable once the table is built.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: &'static str,
    pub kind: RuleKind,
    pub roles: &'static [RootRole],
    pub events: EventMask,
    /// Skip files whose extension is not in the allow-list
    pub extension_gate: bool,
}

impl Rule {
    pub fn applies_to(&self, role: RootRole) -> bool {
        self.roles.contains(&role)
    }
}

const RULES: &[Rule] = &[
    Rule {
        name: "copy filename to comment",
        kind: RuleKind::CommentAnnotation,
        roles: &[RootRole::Processing],
        events: EventMask::CHANGED,
        extension_gate: true,
    },
    Rule {
        name: "route by filename prefix",
        kind: RuleKind::PrefixRouting,
        roles: &[RootRole::Outbox],
        events: EventMask::CHANGED,
        extension_gate: true,
    },
    Rule {
        name: "tag from directory",
        kind: RuleKind::DirectoryTags,
        roles: &[RootRole::Samples],
        events: EventMask::CHANGED,
        extension_gate: false,
    },
    Rule {
        name: "tag from filename codes",
        kind: RuleKind::FilenameCodeTags,
        roles: &[RootRole::Samples],
        events: EventMask::CHANGED,
        extension_gate: false,
    },
    // After every other tagging rule, so one pass reaches the fixed point.
    Rule {
        name: "promote tag namespaces",
        kind: RuleKind::NamespacePromotion,
        roles: &[RootRole::Samples],
        events: EventMask::CHANGED,
        extension_gate: false,
    },
    Rule {
        name: "hide sidecar files",
        kind: RuleKind::Hide,
        roles: &[RootRole::Inbox, RootRole::Samples],
        events: EventMask::ADDED,
        extension_gate: false,
    },
    Rule {
        name: "mirror symlink",
        kind: RuleKind::MirrorLink,
        roles: &[RootRole::Samples],
        events: EventMask::ALL,
        extension_gate: true,
    },
    Rule {
        name: "relocate companion file",
        kind: RuleKind::CompanionRelocation,
        roles: &[RootRole::DeviceExport],
        events: EventMask::ADDED,
        extension_gate: false,
    },
    Rule {
        name: "drop tags of deleted file",
        kind: RuleKind::TagCleanup,
        roles: &[RootRole::Samples],
        events: EventMask::DELETED,
        extension_gate: false,
    },
];

/// A directory fragment bound to a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryBinding {
    pub fragment: String,
    segments: Vec<String>,
    pub tag: Tag,
}

impl DirectoryBinding {
    /// Whether the file at `rel_path` (relative to the samples root) lives
    /// under this fragment. Whole segments only: `src/music` does not match
    /// `src/musicals/x.wav`.
    pub fn matches(&self, rel_path: &Path) -> bool {
        let Some(dir) = rel_path.parent() else {
            return false;
        };
        let mut dir_segments = dir.components().filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        });
        self.segments
            .iter()
            .all(|segment| dir_segments.next() == Some(segment.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRoute {
    pub code: String,
    /// `"[code] "`
    pub token: String,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameCode {
    pub code: String,
    pub tag: Tag,
}

/// The compiled rule table.
#[derive(Debug, Clone)]
pub struct RuleTable {
    extensions: ExtensionSet,
    hide_extensions: ExtensionSet,
    sanitizer: TagSanitizer,
    directory_bindings: Vec<DirectoryBinding>,
    prefix_routes: Vec<PrefixRoute>,
    filename_codes: Vec<FilenameCode>,
    allowed_namespaces: BTreeSet<String>,
    comment_markers: Vec<String>,
    sidecar_extension: String,
    primary_extension: String,
    ignore: IgnoreSet,
}

impl RuleTable {
    pub fn from_config(config: &ShelverConfig) -> Result<Self> {
        let sanitizer = TagSanitizer::new(config.tag_prefix.clone());

        let directory_bindings = config
            .directory_tags
            .iter()
            .map(|binding| {
                let fragment = binding.fragment.trim_matches('/').to_string();
                let segments: Vec<String> = fragment
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                if segments.is_empty() {
                    return Err(ShelverError::Config(format!(
                        "directory tag fragment is empty: {:?}",
                        binding.fragment
                    )));
                }
                let raw_tag = binding.tag.as_deref().unwrap_or(fragment.as_str());
                let tag = sanitizer.sanitize(raw_tag);
                Ok(DirectoryBinding {
                    fragment,
                    segments,
                    tag,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let prefix_routes = config
            .prefix_routes
            .iter()
            .map(|route| PrefixRoute {
                code: route.code.clone(),
                token: format!("[{}] ", route.code),
                destination: config.resolve_destination(&route.destination),
            })
            .collect();

        let mut filename_codes: Vec<FilenameCode> = config
            .filename_codes
            .iter()
            .map(|code| FilenameCode {
                code: code.code.clone(),
                tag: sanitizer.sanitize(&code.tag),
            })
            .collect();
        // Longest first; stable sort keeps declaration order among equals.
        filename_codes.sort_by(|a, b| b.code.len().cmp(&a.code.len()));

        Ok(Self {
            extensions: ExtensionSet::new(&config.extensions),
            hide_extensions: ExtensionSet::new(&config.hide_extensions),
            sanitizer,
            directory_bindings,
            prefix_routes,
            filename_codes,
            allowed_namespaces: config.allowed_namespaces.iter().cloned().collect(),
            comment_markers: config.comment_markers.clone(),
            sidecar_extension: config.companion.sidecar_extension.clone(),
            primary_extension: config.companion.primary_extension.clone(),
            ignore: IgnoreSet::new(&config.ignore_patterns)?,
        })
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &'static [Rule] {
        RULES
    }

    pub fn sanitizer(&self) -> &TagSanitizer {
        &self.sanitizer
    }

    pub fn directory_bindings(&self) -> &[DirectoryBinding] {
        &self.directory_bindings
    }

    pub fn prefix_routes(&self) -> &[PrefixRoute] {
        &self.prefix_routes
    }

    pub fn filename_codes(&self) -> &[FilenameCode] {
        &self.filename_codes
    }

    /// Rule 1: the extension gate.
    pub fn allowed_extension(&self, path: &Path) -> bool {
        self.extensions.allows(path)
    }

    pub fn is_ignored(&self, rel_path: &Path) -> bool {
        self.ignore.is_ignored(rel_path)
    }

    pub fn ignore(&self) -> &IgnoreSet {
        &self.ignore
    }

    /// The rule predicate: cheap, path-only.
    pub fn matches(&self, rule: &Rule, path: &Path, kind: EventKind) -> bool {
        if !rule.events.contains(kind) {
            return false;
        }
        if rule.extension_gate && !self.allowed_extension(path) {
            return false;
        }
        let name = classify::file_name(path);
        match rule.kind {
            RuleKind::CommentAnnotation => self.wants_comment(name),
            RuleKind::PrefixRouting => self.route_for(name).is_some(),
            RuleKind::Hide => self.hide_extensions.allows(path),
            RuleKind::CompanionRelocation => self.is_sidecar(path),
            RuleKind::DirectoryTags
            | RuleKind::FilenameCodeTags
            | RuleKind::NamespacePromotion
            | RuleKind::MirrorLink
            | RuleKind::TagCleanup => true,
        }
    }

    /// Lowercase names, or names starting with a configured marker.
    pub fn wants_comment(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        name == name.to_lowercase()
            || self
                .comment_markers
                .iter()
                .any(|marker| name.starts_with(marker.as_str()))
    }

    /// First route whose `[code] ` token starts `name`, with the name that
    /// remains once the token is stripped.
    pub fn route_for<'a>(&self, name: &'a str) -> Option<(&PrefixRoute, &'a str)> {
        self.prefix_routes.iter().find_map(|route| {
            name.strip_prefix(route.token.as_str())
                .filter(|rest| !rest.is_empty())
                .map(|rest| (route, rest))
        })
    }

    /// Tags of every binding whose fragment contains the file, in
    /// declaration order.
    pub fn directory_tags(&self, rel_path: &Path) -> Vec<Tag> {
        let mut tags: Vec<Tag> = Vec::new();
        for binding in &self.directory_bindings {
            if binding.matches(rel_path) && !tags.contains(&binding.tag) {
                tags.push(binding.tag.clone());
            }
        }
        tags
    }

    /// Tags of every code found in `name`.
    ///
    /// Longer codes are checked first and claim the bytes they match; a
    /// shorter code only fires on an occurrence outside every claimed span.
    pub fn code_tags(&self, name: &str) -> Vec<Tag> {
        let mut claimed = vec![false; name.len()];
        let mut tags: Vec<Tag> = Vec::new();
        for code in &self.filename_codes {
            let mut fired = false;
            for (start, matched) in name.match_indices(code.code.as_str()) {
                let span = start..start + matched.len();
                if claimed[span.clone()].iter().any(|c| *c) {
                    continue;
                }
                claimed[span].iter_mut().for_each(|c| *c = true);
                fired = true;
            }
            if fired && !tags.contains(&code.tag) {
                tags.push(code.tag.clone());
            }
        }
        tags
    }

    /// Ancestor tags licensed by `existing` that are not yet present.
    ///
    /// A tag qualifies when its namespace root (first segment after the tag
    /// prefix) is an allowed namespace; every strict ancestor is returned.
    pub fn namespace_promotions(&self, existing: &BTreeSet<Tag>) -> Vec<Tag> {
        let mut promoted: Vec<Tag> = Vec::new();
        for tag in existing {
            let bare = self.sanitizer.strip_prefix(tag);
            let root = bare.split('.').next().unwrap_or("");
            if !self.allowed_namespaces.contains(root) {
                continue;
            }
            let mut ancestors = expand_namespace(bare);
            ancestors.pop();
            for ancestor in ancestors {
                let candidate = self.sanitizer.sanitize(ancestor.as_str());
                if !existing.contains(&candidate) && !promoted.contains(&candidate) {
                    promoted.push(candidate);
                }
            }
        }
        promoted
    }

    pub fn is_sidecar(&self, path: &Path) -> bool {
        classify::extension(path) == self.sidecar_extension
    }

    /// `take1.ot` → `take1.wav`
    pub fn primary_name_for(&self, sidecar_name: &str) -> String {
        classify::with_extension(sidecar_name, &self.primary_extension)
    }
}

impl fmt::Display for RuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rules (evaluation order):")?;
        for (idx, rule) in RULES.iter().enumerate() {
            let roles: Vec<&str> = rule.roles.iter().map(|r| r.as_str()).collect();
            writeln!(
                f,
                "  {:>2}. {:<28} roles={} gate={}",
                idx + 1,
                rule.name,
                roles.join(","),
                rule.extension_gate
            )?;
        }
        let exts: Vec<&str> = self.extensions.iter().collect();
        writeln!(f, "Allowed extensions: {}", exts.join(", "))?;
        writeln!(f, "Directory tags:")?;
        for binding in &self.directory_bindings {
            writeln!(f, "  {} -> {}", binding.fragment, binding.tag)?;
        }
        writeln!(f, "Prefix routes:")?;
        for route in &self.prefix_routes {
            writeln!(f, "  {:?} -> {}", route.token, route.destination.display())?;
        }
        writeln!(f, "Filename codes (match order):")?;
        for code in &self.filename_codes {
            writeln!(f, "  {} -> {}", code.code, code.tag)?;
        }
        Ok(())
    }
}
