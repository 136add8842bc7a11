//! Shared test helpers for stepwise integration tests.
//!
//! All tests use temp directories, never the real repo.
//! Each test gets its own git repo via [`TestSession::new`].

#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};

use stepwise::config::{IdentityConfig, SessionConfig, StepwiseConfig};
use stepwise::{SaveOutcome, Session, SnapshotId};
use tempfile::TempDir;

pub const BRANCH: &str = "demo";
pub const NOTES: &str = "notes.txt";

fn test_config() -> StepwiseConfig {
    StepwiseConfig {
        session: SessionConfig {
            branch: BRANCH.to_owned(),
            ..SessionConfig::default()
        },
        identity: Some(IdentityConfig {
            name: "Test Presenter".to_owned(),
            email: "presenter@example.com".to_owned(),
        }),
        ..StepwiseConfig::default()
    }
}

/// An initialized session over a fresh git repo in a temp directory.
pub struct TestSession {
    dir: TempDir,
    pub session: Session,
}

impl TestSession {
    /// `git init` a temp dir (signing off, identity set) and initialize a
    /// session on the `demo` timeline.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        git_init(dir.path());
        let session = Session::open(dir.path(), &test_config());
        session.initialize().expect("initialize failed");
        Self { dir, session }
    }

    /// A session with `count` snapshots, each appending one line to `notes.txt`.
    pub fn with_snapshots(count: usize) -> (Self, Vec<SnapshotId>) {
        let ts = Self::new();
        let ids = (0..count).map(|i| ts.append_and_save(&format!("step {i}"))).collect();
        (ts, ids)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel_path: &str, content: &str) {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    /// Read a file from the working directory. Returns None if it doesn't exist.
    pub fn read(&self, rel_path: &str) -> Option<String> {
        std::fs::read_to_string(self.dir.path().join(rel_path)).ok()
    }

    /// Append `line` to `notes.txt` and save; panics unless a snapshot was recorded.
    pub fn append_and_save(&self, line: &str) -> SnapshotId {
        let mut notes = self.read(NOTES).unwrap_or_default();
        notes.push_str(line);
        notes.push('\n');
        self.write(NOTES, &notes);
        match self.session.save(None).expect("save failed") {
            SaveOutcome::Saved(id) => id,
            other => panic!("expected a snapshot, got {other:?}"),
        }
    }

    /// Run git in the session root. Panics on failure.
    pub fn git(&self, args: &[&str]) -> String {
        run_git(self.dir.path(), args)
    }

    /// A second session over the same directory, as a fresh process would open it.
    pub fn reopen(&self) -> Session {
        let session = Session::open(self.dir.path(), &test_config());
        session.initialize().expect("re-initialize failed");
        session
    }
}

/// `git init` with identity and signing configured for tests.
pub fn git_init(dir: &Path) {
    run_git(dir, &["init", "--quiet"]);
    configure_repo(dir);
}

pub fn configure_repo(dir: &Path) {
    run_git(dir, &["config", "user.name", "Test Presenter"]);
    run_git(dir, &["config", "user.email", "presenter@example.com"]);
    run_git(dir, &["config", "commit.gpgsign", "false"]);
    run_git(dir, &["config", "tag.gpgsign", "false"]);
}

/// Run a git command in the given directory. Panics on failure.
pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {}: {e}", args.join(" ")));
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "git {} failed:\nstdout: {stdout}\nstderr: {stderr}",
        args.join(" "),
    );
    stdout.to_string()
}

/// Run stepwise with the given args in the given directory.
pub fn stepwise_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stepwise"))
        .args(args)
        .current_dir(dir)
        .env("STEPWISE_BRANCH", BRANCH)
        .env_remove("STEPWISE_LOG")
        .env_remove("STEPWISE_LOG_FORMAT")
        .output()
        .expect("failed to execute stepwise")
}

/// Run stepwise and assert it succeeds. Returns stdout as string.
pub fn stepwise_ok(dir: &Path, args: &[&str]) -> String {
    let out = stepwise_in(dir, args);
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "stepwise {} failed:\nstdout: {stdout}\nstderr: {stderr}",
        args.join(" "),
    );
    stdout.to_string()
}

/// Run stepwise and assert it fails. Returns stderr as string.
pub fn stepwise_fails(dir: &Path, args: &[&str]) -> String {
    let out = stepwise_in(dir, args);
    assert!(
        !out.status.success(),
        "Expected stepwise {} to fail, but it succeeded.\nstdout: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
    );
    String::from_utf8_lossy(&out.stderr).to_string()
}
