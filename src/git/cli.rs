//! Subprocess runner for the `git` command line.
//!
//! Every store interaction goes through [`GitCli::run`], which spawns exactly
//! one `git` process in the session root and waits for it to exit. Failures
//! come back as a [`ProcessError`] carrying both output streams; callers use
//! [`ProcessError::classify`] to pick out the recoverable cases.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, trace};

use crate::config::IdentityConfig;

// ---------------------------------------------------------------------------
// ProcessError
// ---------------------------------------------------------------------------

/// A git subprocess that could not be spawned or exited non-zero.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("`{command}` failed: {message}")]
pub struct ProcessError {
    /// The command line that was run (e.g. `"git checkout -f main"`).
    pub command: String,
    /// Short description: trimmed stderr, or stdout when stderr is empty.
    pub message: String,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Process exit code, if the process ran and exited normally.
    pub exit_code: Option<i32>,
}

/// How a failed command should be treated by its caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// An unborn history or a ref that does not exist. Maps to "no id".
    ///
    /// Git words this "ambiguous argument" for a bare revision and
    /// "bad revision" when the revision is followed by `--`.
    AmbiguousArgument,
    /// `commit` found no staged changes. Maps to a no-op save.
    NothingToCommit,
    /// Anything else. Surfaced to the user unchanged.
    Fatal,
}

impl ProcessError {
    /// Classify the failure by the two recognized non-fatal text patterns.
    #[must_use]
    pub fn classify(&self) -> FailureKind {
        let combined = self.combined_output();
        if combined.contains("nothing to commit") {
            FailureKind::NothingToCommit
        } else if combined.contains("both revision and filename") {
            // The ref exists; a path with the same name shadows it.
            FailureKind::Fatal
        } else if combined.contains("ambiguous argument") || combined.contains("bad revision") {
            FailureKind::AmbiguousArgument
        } else {
            FailureKind::Fatal
        }
    }

    /// Stdout followed by stderr, for diagnostics.
    #[must_use]
    pub fn combined_output(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_owned(),
            (out, "") => out.to_owned(),
            (out, err) => format!("{out}\n{err}"),
        }
    }

    fn spawn_failed(command: String, err: &std::io::Error) -> Self {
        Self {
            command,
            message: format!("could not spawn git: {err}"),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
        }
    }
}

// ---------------------------------------------------------------------------
// GitCli
// ---------------------------------------------------------------------------

/// Runs `git` subcommands with the session root as working directory.
#[derive(Clone, Debug)]
pub struct GitCli {
    root: PathBuf,
    identity: Option<IdentityConfig>,
}

impl GitCli {
    /// Create a runner rooted at `root`.
    ///
    /// When `identity` is set, every command is issued with
    /// `-c user.name=… -c user.email=…` so commits and markers work without a
    /// global git identity.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, identity: Option<IdentityConfig>) -> Self {
        Self {
            root: root.into(),
            identity,
        }
    }

    /// The session root every command runs in.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `git <args>` and return its stdout.
    ///
    /// Output is forced to the C locale so the recoverable-failure patterns
    /// match regardless of the user's language settings.
    ///
    /// # Errors
    /// Returns a [`ProcessError`] if git cannot be spawned or exits non-zero.
    pub fn run(&self, args: &[&str]) -> Result<String, ProcessError> {
        let command = format!("git {}", args.join(" "));
        debug!(command = %command, root = %self.root.display(), "running git");

        let mut cmd = Command::new("git");
        if let Some(identity) = &self.identity {
            cmd.arg("-c")
                .arg(format!("user.name={}", identity.name))
                .arg("-c")
                .arg(format!("user.email={}", identity.email));
        }
        let output = cmd
            .args(args)
            .current_dir(&self.root)
            .env("LC_ALL", "C")
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| ProcessError::spawn_failed(command.clone(), &e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            trace!(command = %command, bytes = stdout.len(), "git succeeded");
            return Ok(stdout);
        }

        let message = if stderr.trim().is_empty() {
            stdout.trim().to_owned()
        } else {
            stderr.trim().to_owned()
        };
        Err(ProcessError {
            command,
            message,
            stdout,
            stderr,
            exit_code: output.status.code(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
