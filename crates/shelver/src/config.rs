//! Configuration for Shelver
//!
//! Loaded once from TOML at startup, validated, then shared read-only
//! (`Arc<ShelverConfig>`) by the dispatcher, the reconciler and the daemon.

use crate::error::{Result, ShelverError};
use crate::patterns::IgnoreSet;
use crate::types::{RootRole, WatchedRoot};
use serde::{Deserialize, Serialize};
use shelver_logging::shelver_home;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Main configuration for Shelver
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShelverConfig {
    /// Prepended to every sanitized tag (e.g. `"s."`)
    #[serde(default)]
    pub tag_prefix: String,

    /// Seconds between reconciliation passes
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Debounce window for filesystem events, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Log every action but perform none
    #[serde(default)]
    pub dry_run: bool,

    /// Location of the JSON tag store
    #[serde(default = "default_tag_store_path")]
    pub tag_store: PathBuf,

    /// Extensions (without dot) that rules with the extension gate act on
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Extensions of files that get hidden when they appear
    #[serde(default = "default_hide_extensions")]
    pub hide_extensions: Vec<String>,

    /// Namespace roots that leaf tags may promote
    #[serde(default)]
    pub allowed_namespaces: Vec<String>,

    /// Literal filename prefixes that qualify a name for comment annotation
    /// even when it contains uppercase letters
    #[serde(default)]
    pub comment_markers: Vec<String>,

    /// Globs (relative to a root) that no rule ever touches
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Sidecar relinking for device exports
    #[serde(default)]
    pub companion: CompanionConfig,

    /// Watched directories
    #[serde(default)]
    pub roots: Vec<WatchedRoot>,

    /// Directory fragment → tag bindings, in evaluation order
    #[serde(default)]
    pub directory_tags: Vec<DirectoryTagConfig>,

    /// `[code] ` filename prefix → destination directory
    #[serde(default)]
    pub prefix_routes: Vec<PrefixRouteConfig>,

    /// Code embedded in a filename → tag
    #[serde(default)]
    pub filename_codes: Vec<FilenameCodeConfig>,
}

/// Binding of a directory fragment (relative to the samples root) to a tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryTagConfig {
    /// e.g. `src/music/orch`
    pub fragment: String,
    /// Explicit tag; derived from the fragment when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrefixRouteConfig {
    /// Lowercase code, written as `[code] ` at the start of a filename
    pub code: String,
    /// Destination directory; relative paths resolve against the samples root
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilenameCodeConfig {
    /// Case-sensitive substring, e.g. `Jz`
    pub code: String,
    /// Raw tag, sanitized before use, e.g. `src/music/jazz`
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompanionConfig {
    #[serde(default = "default_sidecar_extension")]
    pub sidecar_extension: String,
    #[serde(default = "default_primary_extension")]
    pub primary_extension: String,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            sidecar_extension: default_sidecar_extension(),
            primary_extension: default_primary_extension(),
        }
    }
}

fn default_reconcile_interval() -> u64 {
    12 * 60 * 60
}

fn default_debounce_ms() -> u64 {
    2_000
}

fn default_extensions() -> Vec<String> {
    vec!["wav".to_string()]
}

fn default_hide_extensions() -> Vec<String> {
    vec!["pkf".to_string(), "asd".to_string()]
}

fn default_sidecar_extension() -> String {
    "ot".to_string()
}

fn default_primary_extension() -> String {
    "wav".to_string()
}

fn default_tag_store_path() -> PathBuf {
    shelver_home().join("tags.json")
}

/// `~/.shelver/shelver.toml`, or `$SHELVER_HOME/shelver.toml`.
pub fn default_config_path() -> PathBuf {
    shelver_home().join("shelver.toml")
}

impl Default for ShelverConfig {
    fn default() -> Self {
        Self {
            tag_prefix: String::new(),
            reconcile_interval_secs: default_reconcile_interval(),
            debounce_ms: default_debounce_ms(),
            dry_run: false,
            tag_store: default_tag_store_path(),
            extensions: default_extensions(),
            hide_extensions: default_hide_extensions(),
            allowed_namespaces: Vec::new(),
            comment_markers: Vec::new(),
            ignore_patterns: Vec::new(),
            companion: CompanionConfig::default(),
            roots: Vec::new(),
            directory_tags: Vec::new(),
            prefix_routes: Vec::new(),
            filename_codes: Vec::new(),
        }
    }
}

impl ShelverConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ShelverConfig =
            toml::from_str(content).map_err(|e| ShelverError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ShelverError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.extensions.iter().all(|e| e.trim_start_matches('.').is_empty()) {
            return Err(ShelverError::Config(
                "at least one allowed extension is required".to_string(),
            ));
        }

        if self.roots_with(RootRole::Samples).next().is_none() {
            return Err(ShelverError::Config(
                "a root with role \"samples\" is required".to_string(),
            ));
        }

        for root in &self.roots {
            if !root.path.is_absolute() {
                return Err(ShelverError::Config(format!(
                    "root path must be absolute: {}",
                    root.path.display()
                )));
            }
        }

        let mut codes = HashSet::new();
        for route in &self.prefix_routes {
            if route.code.is_empty() {
                return Err(ShelverError::Config("prefix route with empty code".to_string()));
            }
            if route.code.contains(['[', ']']) {
                return Err(ShelverError::Config(format!(
                    "prefix route code must not contain brackets: {}",
                    route.code
                )));
            }
            if !codes.insert(route.code.as_str()) {
                return Err(ShelverError::Config(format!(
                    "duplicate prefix route code: {}",
                    route.code
                )));
            }
        }

        for code in &self.filename_codes {
            if code.code.is_empty() {
                return Err(ShelverError::Config(format!(
                    "filename code for tag {} is empty",
                    code.tag
                )));
            }
        }

        for binding in &self.directory_tags {
            if binding.fragment.trim_matches('/').is_empty() {
                return Err(ShelverError::Config(
                    "directory tag with empty fragment".to_string(),
                ));
            }
        }

        IgnoreSet::new(&self.ignore_patterns)?;
        Ok(())
    }

    pub fn roots_with(&self, role: RootRole) -> impl Iterator<Item = &WatchedRoot> {
        self.roots.iter().filter(move |r| r.role == role)
    }

    /// First root with `role`.
    pub fn root(&self, role: RootRole) -> Option<&WatchedRoot> {
        self.roots_with(role).next()
    }

    /// The sample library. Present after [`validate`](Self::validate).
    pub fn samples_root(&self) -> Option<&WatchedRoot> {
        self.root(RootRole::Samples)
    }

    pub fn mirror_dir(&self) -> Option<&Path> {
        self.root(RootRole::Mirror).map(|r| r.path.as_path())
    }

    /// Destination of a prefix route, resolved against the samples root.
    pub fn resolve_destination(&self, destination: &Path) -> PathBuf {
        if destination.is_absolute() {
            return destination.to_path_buf();
        }
        match self.samples_root() {
            Some(samples) => samples.path.join(destination),
            None => destination.to_path_buf(),
        }
    }

    /// Roots the watch adapter should observe.
    pub fn watched_roots(&self) -> impl Iterator<Item = &WatchedRoot> {
        self.roots.iter().filter(|r| r.role.is_watched())
    }
}
