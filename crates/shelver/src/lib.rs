//! Shelver - Rule-Driven Sample Library Organizer
//!
//! Shelver watches a handful of directories and, for every file that shows up,
//! changes or disappears, runs an ordered table of classification rules:
//! comment annotation, `[code] ` prefix routing, directory and filename-code
//! tagging, namespace promotion, hiding, a flat symlink mirror and companion
//! (sidecar) relocation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   notify    │     │  per-root   │     │  Dispatcher  │     │  TagStore /  │
//! │  (watch.rs) │────▶│    task     │────▶│ (rule table) │────▶│   FileOps    │
//! │             │     │ (daemon.rs) │     │              │     │              │
//! └─────────────┘     └─────────────┘     └──────────────┘     └──────────────┘
//!                                                ▲
//!                                         ┌──────┴───────┐
//!                                         │  Reconciler  │
//!                                         │ (full rescan)│
//!                                         └──────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **WatchedRoot**: a directory with a role (inbox, outbox, samples, ...)
//! - **EventBatch**: added/modified/deleted paths for one root
//! - **Rule**: path-only predicate plus action, evaluated in fixed order
//! - **Tag**: dotted namespace label kept in a [`TagStore`]
//! - **Reconciliation**: periodic idempotent re-application of the tagging
//!   and mirror rules

pub mod classify;
pub mod companion;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod mirror;
pub mod ops;
pub mod patterns;
pub mod reconcile;
pub mod rules;
pub mod tags;
pub mod types;
pub mod watch;

// Re-exports for convenience
pub use config::ShelverConfig;
pub use daemon::Daemon;
pub use dispatch::{Diagnostic, DispatchReport, Dispatcher, Outcome};
pub use error::{Result, ShelverError};
pub use ops::{FileOps, LocalFileOps};
pub use reconcile::{PurgeStats, ReconcileStats, Reconciler};
pub use rules::{Rule, RuleKind, RuleTable};
pub use tags::{expand_namespace, JsonTagStore, MemoryTagStore, Tag, TagSanitizer, TagStore};
pub use types::{EventBatch, EventKind, FileEvent, RootRole, WatchedRoot};
