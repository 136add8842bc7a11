//! Error types for session operations.
//!
//! [`HistoryError`] is the single error type returned by [`Session`](crate::session::Session)
//! operations, the output parsers, and the store layer. Recoverable store
//! states (an unborn history, an ambiguous ref, nothing to commit) never
//! reach this type: the store layer turns them into `None` or a no-op
//! outcome before they can propagate.

use std::path::PathBuf;

use thiserror::Error;

use crate::git::ProcessError;
use crate::model::types::{IdParseError, SnapshotId};
use crate::queue::QueueError;

/// Errors returned by session, parser, and store operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A git subprocess failed for a reason that is not recoverable.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Command output did not match the format the parser expects.
    ///
    /// This means an assumption about the store's output format was violated;
    /// the offending line is carried verbatim.
    #[error("parse error on line {line_number} (expected {expected}): {line:?}")]
    Parse {
        /// 1-based line number within the parsed output.
        line_number: usize,
        /// The offending line.
        line: String,
        /// What the parser was looking for.
        expected: &'static str,
    },

    /// The in-memory projection and the store disagree.
    ///
    /// Never retried: the projection must be rebuilt from the store.
    #[error("internal consistency error: {context} (snapshot {id})")]
    InternalConsistency {
        /// The snapshot that was expected but absent (or `HEAD`).
        id: String,
        /// What the operation was doing when it noticed.
        context: String,
    },

    /// The caller named a snapshot the session does not know about.
    #[error("unknown snapshot `{id}`")]
    UnknownSnapshot {
        /// The id or prefix as supplied.
        id: String,
    },

    /// An abbreviated id matched more than one snapshot.
    #[error("snapshot prefix `{prefix}` is ambiguous ({matches} matches)")]
    AmbiguousPrefix {
        /// The prefix as supplied.
        prefix: String,
        /// How many snapshots it matched.
        matches: usize,
    },

    /// The caller named a timeline that does not exist in the store.
    #[error("unknown branch `{name}`")]
    UnknownBranch {
        /// The branch name as supplied.
        name: String,
    },

    /// A fork was requested under a timeline name that is already taken.
    #[error("branch `{name}` already exists")]
    BranchExists {
        /// The branch name as supplied.
        name: String,
    },

    /// The working directory is checked out on a different timeline than
    /// the one the session was configured for.
    #[error(
        "HEAD is on branch `{checked_out}`, not timeline `{timeline}`; \
         switch to it or set session.checkout_existing_branch"
    )]
    ForeignCheckout {
        /// The configured timeline.
        timeline: String,
        /// The branch HEAD is attached to.
        checked_out: String,
    },

    /// A section label has no characters usable in a marker name.
    #[error("section label {label:?} has no letters or digits")]
    InvalidLabel {
        /// The label as supplied.
        label: String,
    },

    /// The operation requires an initialized session.
    #[error("session is not initialized")]
    NotInitialized,

    /// A snapshot id could not be parsed.
    #[error(transparent)]
    InvalidId(#[from] IdParseError),

    /// The configuration file could not be read or parsed.
    #[error("config error in {}: {detail}", path.display())]
    Config {
        /// Path to the configuration file.
        path: PathBuf,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// The pre-save hook failed; nothing was committed.
    #[error("pre-save hook failed: {message}")]
    Hook {
        /// Description from the hook.
        message: String,
    },

    /// A job never produced a result.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// An I/O error (spawning git, writing captured output, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HistoryError {
    /// Build an [`HistoryError::InternalConsistency`] for a snapshot that
    /// should have been present in the ordered timeline.
    pub(crate) fn missing_from_timeline(id: &SnapshotId, context: &str) -> Self {
        Self::InternalConsistency {
            id: id.to_string(),
            context: format!("{context}: snapshot not in ordered timeline"),
        }
    }

    /// Whether this error means the projection can no longer be trusted.
    #[must_use]
    pub const fn is_divergence(&self) -> bool {
        matches!(self, Self::InternalConsistency { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = HistoryError> = std::result::Result<T, E>;
