//! The backing-store command catalog.
//!
//! [`HistoryStore`] is the only interface the session state machine uses to
//! read or mutate the store. [`GitStore`] implements it with one `git`
//! subprocess per call and converts the recoverable failure patterns into
//! `None` (unborn history, missing ref) or `false` (nothing to commit).

use std::path::Path;

use tracing::{debug, warn};

use crate::error::{HistoryError, Result};
use crate::git::cli::{FailureKind, GitCli};
use crate::model::types::{Annotation, Snapshot, SnapshotId};
use crate::parse::marker::MARKER_FORMAT;
use crate::parse::{parse_commit_log, parse_marker, parse_marker_list};
use crate::range::diff_after_index_line;

/// Marker line in `status` output that signals uncommitted edits.
const MODIFIED_MARKER: &str = "modified:";

/// Read and mutate a snapshot store rooted at one directory.
///
/// Implementations must be usable from the session's job thread.
pub trait HistoryStore: Send + Sync + 'static {
    /// The session root.
    fn root(&self) -> &Path;

    /// Whether a store exists at the root.
    fn exists(&self) -> bool;

    /// Create an empty store at the root.
    fn create(&self) -> Result<()>;

    /// Plain-text status of the working directory.
    fn status(&self) -> Result<String>;

    /// Resolve `HEAD` or a timeline name to an id; `None` when unborn or missing.
    fn resolve_ref(&self, name: &str) -> Result<Option<SnapshotId>>;

    /// The timeline `HEAD` is attached to; `None` when detached.
    fn checked_out_timeline(&self) -> Result<Option<String>>;

    /// Every snapshot reachable from `branch`, oldest first.
    fn log(&self, branch: &str) -> Result<Vec<Snapshot>>;

    /// One snapshot record.
    fn show(&self, id: &SnapshotId) -> Result<Snapshot>;

    /// Ids reachable from `branch`, oldest first.
    fn ordered_ids(&self, branch: &str) -> Result<Vec<SnapshotId>>;

    /// The unified diff `id` introduced, starting at its first file header.
    fn diff(&self, id: &SnapshotId) -> Result<String>;

    /// Create timeline `name` at the current position and switch to it.
    fn create_timeline(&self, name: &str) -> Result<()>;

    /// Point an unborn `HEAD` at timeline `name`.
    fn create_unborn_timeline(&self, name: &str) -> Result<()>;

    /// Check out an existing timeline, keeping uncommitted edits.
    fn switch_timeline(&self, name: &str) -> Result<()>;

    /// Force-checkout a timeline tip, discarding uncommitted edits.
    fn checkout_branch(&self, name: &str) -> Result<()>;

    /// Force-checkout `id` detached, discarding uncommitted edits.
    fn checkout_detached(&self, id: &SnapshotId) -> Result<()>;

    /// Move the checked-out timeline's tip to `id`, discarding everything after.
    fn reset_hard(&self, id: &SnapshotId) -> Result<()>;

    /// Stage everything and commit. Returns `false` when there was nothing
    /// to commit.
    fn commit_all(&self, message: &str) -> Result<bool>;

    /// Create an annotated marker `name` on `target`.
    fn create_marker(&self, name: &str, target: &SnapshotId, text: &str) -> Result<()>;

    /// Names of all markers, oldest first.
    fn list_markers(&self) -> Result<Vec<String>>;

    /// Read one marker; `None` for lightweight tags.
    fn show_marker(&self, name: &str) -> Result<Option<Annotation>>;
}

/// [`HistoryStore`] backed by the `git` command line.
#[derive(Clone, Debug)]
pub struct GitStore {
    git: GitCli,
}

impl GitStore {
    #[must_use]
    pub const fn new(git: GitCli) -> Self {
        Self { git }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        Ok(self.git.run(args)?)
    }

    /// Run a read that yields nothing on an unborn history or missing ref.
    fn run_optional(&self, args: &[&str]) -> Result<Option<String>> {
        match self.git.run(args) {
            Ok(out) => Ok(Some(out)),
            Err(e) if e.classify() == FailureKind::AmbiguousArgument => {
                debug!(command = %e.command, "ref not resolvable; treating as empty");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether `status` output reports modified tracked files.
#[must_use]
pub fn has_modifications(status: &str) -> bool {
    status
        .lines()
        .any(|line| line.trim_start().starts_with(MODIFIED_MARKER))
}

fn parse_id_line(line_number: usize, line: &str) -> Result<SnapshotId> {
    SnapshotId::new(line.trim()).map_err(|_| HistoryError::Parse {
        line_number,
        line: line.to_owned(),
        expected: "object id",
    })
}

impl HistoryStore for GitStore {
    fn root(&self) -> &Path {
        self.git.root()
    }

    fn exists(&self) -> bool {
        self.git.root().join(".git").exists()
    }

    fn create(&self) -> Result<()> {
        std::fs::create_dir_all(self.git.root())?;
        self.run(&["init", "--quiet"])?;
        Ok(())
    }

    fn status(&self) -> Result<String> {
        self.run(&["status"])
    }

    fn resolve_ref(&self, name: &str) -> Result<Option<SnapshotId>> {
        let Some(out) = self.run_optional(&["rev-parse", name, "--"])? else {
            return Ok(None);
        };
        let line = out.lines().next().unwrap_or_default();
        parse_id_line(1, line).map(Some)
    }

    fn checked_out_timeline(&self) -> Result<Option<String>> {
        match self.git.run(&["symbolic-ref", "--quiet", "--short", "HEAD"]) {
            Ok(out) => Ok(Some(out.trim().to_owned())),
            // --quiet: a detached HEAD exits 1 without a message.
            Err(e) if e.exit_code == Some(1) && e.stderr.trim().is_empty() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn log(&self, branch: &str) -> Result<Vec<Snapshot>> {
        match self.run_optional(&["log", "--compact-summary", "--no-color", branch, "--"])? {
            Some(out) => parse_commit_log(&out),
            None => Ok(Vec::new()),
        }
    }

    fn show(&self, id: &SnapshotId) -> Result<Snapshot> {
        let out = self.run(&["show", "--compact-summary", "--no-color", id.as_str(), "--"])?;
        let mut records = parse_commit_log(&out)?;
        match records.pop() {
            Some(snapshot) if records.is_empty() && snapshot.id == *id => Ok(snapshot),
            _ => Err(HistoryError::InternalConsistency {
                id: id.to_string(),
                context: "show did not return exactly the requested snapshot".to_owned(),
            }),
        }
    }

    fn ordered_ids(&self, branch: &str) -> Result<Vec<SnapshotId>> {
        let Some(out) = self.run_optional(&["log", "--format=%H", branch, "--"])? else {
            return Ok(Vec::new());
        };
        let mut ids = out
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| parse_id_line(idx + 1, line))
            .collect::<Result<Vec<_>>>()?;
        ids.reverse();
        Ok(ids)
    }

    fn diff(&self, id: &SnapshotId) -> Result<String> {
        let out = self.run(&["show", "--no-color", id.as_str(), "--"])?;
        Ok(diff_after_index_line(&out).to_owned())
    }

    fn create_timeline(&self, name: &str) -> Result<()> {
        self.run(&["checkout", "-b", name])?;
        Ok(())
    }

    fn create_unborn_timeline(&self, name: &str) -> Result<()> {
        self.run(&["symbolic-ref", "HEAD", &format!("refs/heads/{name}")])?;
        Ok(())
    }

    fn switch_timeline(&self, name: &str) -> Result<()> {
        self.run(&["checkout", name])?;
        Ok(())
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        self.run(&["checkout", "-f", name])?;
        Ok(())
    }

    fn checkout_detached(&self, id: &SnapshotId) -> Result<()> {
        self.run(&["checkout", "-f", "--detach", id.as_str()])?;
        Ok(())
    }

    fn reset_hard(&self, id: &SnapshotId) -> Result<()> {
        self.run(&["reset", "--hard", id.as_str()])?;
        Ok(())
    }

    fn commit_all(&self, message: &str) -> Result<bool> {
        self.run(&["add", "--all"])?;
        match self.git.run(&["commit", "--quiet", "-m", message]) {
            Ok(_) => Ok(true),
            Err(e) if e.classify() == FailureKind::NothingToCommit => {
                debug!("nothing to commit");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create_marker(&self, name: &str, target: &SnapshotId, text: &str) -> Result<()> {
        self.run(&["tag", "-a", name, target.as_str(), "-m", text])?;
        Ok(())
    }

    fn list_markers(&self) -> Result<Vec<String>> {
        let out = self.run(&["tag", "--list", "--sort=creatordate"])?;
        Ok(parse_marker_list(&out))
    }

    fn show_marker(&self, name: &str) -> Result<Option<Annotation>> {
        let refname = format!("refs/tags/{name}");
        let out = self.run(&["for-each-ref", MARKER_FORMAT, &refname])?;
        let parsed = parse_marker(name, &out)?;
        if parsed.is_none() {
            warn!(marker = name, "skipping marker without annotation");
        }
        Ok(parsed)
    }
}
