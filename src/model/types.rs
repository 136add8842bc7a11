//! Core session types.
//!
//! Snapshots, changed-file entries, section annotations, and the text
//! positions produced by the change-range calculator. Everything here is
//! immutable once constructed; the [`Projection`](super::projection::Projection)
//! owns collections of these values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SnapshotId
// ---------------------------------------------------------------------------

/// A validated content hash identifying one snapshot (a git commit id).
///
/// Accepts 40 (SHA-1) or 64 (SHA-256) lowercase hex characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Create a new `SnapshotId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not 40 or 64 lowercase hex characters.
    pub fn new(s: &str) -> Result<Self, IdParseError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the full hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The abbreviated form used in human-facing output.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }

    fn validate(s: &str) -> Result<(), IdParseError> {
        if s.len() != 40 && s.len() != 64 {
            return Err(IdParseError {
                value: s.to_owned(),
                reason: format!("expected 40 or 64 hex characters, got {}", s.len()),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(IdParseError {
                value: s.to_owned(),
                reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SnapshotId {
    type Err = IdParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SnapshotId {
    type Error = IdParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<SnapshotId> for String {
    fn from(id: SnapshotId) -> Self {
        id.0
    }
}

/// Error from parsing a string into a [`SnapshotId`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid snapshot id {value:?}: {reason}")]
pub struct IdParseError {
    /// The raw value that failed.
    pub value: String,
    /// Why it failed.
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// How a file entry in a compact summary was marked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    /// Plain modification (no marker).
    #[default]
    Modified,
    /// The file was created by this snapshot (`(new)` marker).
    New,
    /// The file was removed by this snapshot (`(gone)` marker).
    Gone,
}

impl ChangeKind {
    /// The compact-summary suffix for this kind, if any.
    #[must_use]
    pub const fn marker(self) -> Option<&'static str> {
        match self {
            Self::Modified => None,
            Self::New => Some("(new)"),
            Self::Gone => Some("(gone)"),
        }
    }
}

/// One `<path> | <detail>` line of a compact summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Path relative to the session root, with any marker suffix stripped.
    pub file_name: String,
    /// The change detail column, e.g. `3 ++-`.
    pub change_detail: String,
    /// Marker that followed the path.
    #[serde(default)]
    pub kind: ChangeKind,
}

/// An immutable record of working-directory state at one point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub author: String,
    pub message: String,
    /// The date exactly as the store printed it.
    pub timestamp: String,
    /// The `N files changed, ...` line, empty for snapshots without changes.
    pub change_summary: String,
    pub changed_files: Vec<ChangedFile>,
}

// ---------------------------------------------------------------------------
// Annotation
// ---------------------------------------------------------------------------

/// A named section marker attached to one snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Slugified label, also the marker name in the store.
    pub name: String,
    /// The label as the user typed it.
    pub human_label: String,
    pub snapshot_id: SnapshotId,
}

/// Derive a filesystem-safe marker name from a free-form label.
///
/// Lower-cases ASCII letters, collapses every run of characters that are not
/// ASCII alphanumeric into a single `-`, and trims leading/trailing hyphens.
/// Returns `None` when nothing alphanumeric remains.
#[must_use]
pub fn slugify(label: &str) -> Option<String> {
    let mut slug = String::with_capacity(label.len());
    let mut pending_hyphen = false;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    if slug.is_empty() { None } else { Some(slug) }
}

// ---------------------------------------------------------------------------
// Change ranges
// ---------------------------------------------------------------------------

/// A 1-based (line, character) text position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    #[must_use]
    pub const fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.character)
    }
}

/// A span between two positions. `start == end` means a caret, not a selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    #[must_use]
    pub const fn point(at: Position) -> Self {
        Self { start: at, end: at }
    }

    /// Whether the span collapses to a single caret position.
    #[must_use]
    pub fn is_point(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_point() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Where the most recent change sits in the old and new file text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeRange {
    pub before: Span,
    pub after: Span,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
