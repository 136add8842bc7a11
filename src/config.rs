//! Session configuration (`.stepwise.toml`).
//!
//! Defines the typed configuration read from the session root. Missing
//! fields use defaults; a missing file means all defaults (no error);
//! unknown fields are rejected so typos surface instead of being ignored.
//!
//! ```toml
//! [session]
//! branch = "demo"
//! checkout_existing_branch = false
//! commit_message = "snapshot"
//!
//! [identity]
//! name = "Ada"
//! email = "ada@example.com"
//!
//! [replay]
//! step_delay_ms = 250
//!
//! [capture]
//! file = ".terminal_output"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::HistoryError;

/// File name looked up in the session root when no explicit path is given.
pub const CONFIG_FILE: &str = ".stepwise.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepwiseConfig {
    #[serde(default)]
    pub session: SessionConfig,

    /// Commit identity. When absent, git's own configuration is used.
    #[serde(default)]
    pub identity: Option<IdentityConfig>,

    #[serde(default)]
    pub replay: ReplayConfig,

    #[serde(default)]
    pub capture: CaptureConfig,
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Timeline to record on (default: `"main"`).
    #[serde(default = "default_branch")]
    pub branch: String,

    /// When the timeline already exists at initialization, check it out
    /// (`true`) or trust whatever is currently checked out (`false`).
    #[serde(default)]
    pub checkout_existing_branch: bool,

    /// Message used for every snapshot commit.
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            checkout_existing_branch: false,
            commit_message: default_commit_message(),
        }
    }
}

fn default_branch() -> String {
    "main".to_owned()
}

fn default_commit_message() -> String {
    "snapshot".to_owned()
}

// ---------------------------------------------------------------------------
// IdentityConfig
// ---------------------------------------------------------------------------

/// Author identity passed to git as `-c user.name=… -c user.email=…`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    pub name: String,
    pub email: String,
}

// ---------------------------------------------------------------------------
// ReplayConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayConfig {
    /// Pause between replay steps, in milliseconds.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
        }
    }
}

impl ReplayConfig {
    #[must_use]
    pub const fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

const fn default_step_delay_ms() -> u64 {
    250
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    /// Tracked file (relative to the session root) that buffered terminal
    /// output is appended to before each save.
    #[serde(default = "default_capture_file")]
    pub file: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            file: default_capture_file(),
        }
    }
}

fn default_capture_file() -> PathBuf {
    PathBuf::from(".terminal_output")
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl StepwiseConfig {
    /// Load `<root>/.stepwise.toml`.
    ///
    /// # Errors
    /// See [`StepwiseConfig::load`].
    pub fn load_from_root(root: &Path) -> Result<Self, HistoryError> {
        Self::load(&root.join(CONFIG_FILE))
    }

    /// Load configuration from `path`. A missing file yields defaults.
    ///
    /// # Errors
    /// Returns [`HistoryError::Config`] if the file exists but cannot be read,
    /// is not valid TOML, or contains unknown fields.
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(HistoryError::Config {
                    path: path.to_owned(),
                    detail: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|detail| HistoryError::Config {
            path: path.to_owned(),
            detail,
        })
    }

    /// Parse configuration from a TOML string. Errors carry the line number.
    ///
    /// # Errors
    /// Returns a human-readable message on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| {
            let message = e.message().to_owned();
            match e.span() {
                Some(span) => {
                    let line = toml_str[..span.start]
                        .chars()
                        .filter(|&c| c == '\n')
                        .count()
                        + 1;
                    format!("line {line}: {message}")
                }
                None => message,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_all_defaults() {
        let cfg = StepwiseConfig::parse("").unwrap();
        assert_eq!(cfg, StepwiseConfig::default());
        assert_eq!(cfg.session.branch, "main");
        assert!(!cfg.session.checkout_existing_branch);
        assert_eq!(cfg.session.commit_message, "snapshot");
        assert_eq!(cfg.identity, None);
        assert_eq!(cfg.replay.step_delay(), Duration::from_millis(250));
        assert_eq!(cfg.capture.file, PathBuf::from(".terminal_output"));
    }

    #[test]
    fn full_config_parses() {
        let cfg = StepwiseConfig::parse(
            r#"
[session]
branch = "demo"
checkout_existing_branch = true
commit_message = "step"

[identity]
name = "Ada"
email = "ada@example.com"

[replay]
step_delay_ms = 0

[capture]
file = "logs/term.txt"
"#,
        )
        .unwrap();
        assert_eq!(cfg.session.branch, "demo");
        assert!(cfg.session.checkout_existing_branch);
        assert_eq!(cfg.session.commit_message, "step");
        assert_eq!(
            cfg.identity,
            Some(IdentityConfig {
                name: "Ada".to_owned(),
                email: "ada@example.com".to_owned(),
            })
        );
        assert_eq!(cfg.replay.step_delay_ms, 0);
        assert_eq!(cfg.capture.file, PathBuf::from("logs/term.txt"));
    }

    #[test]
    fn unknown_field_is_rejected_with_line() {
        let err = StepwiseConfig::parse("[session]\nbranch = \"x\"\nbrnch = \"y\"\n").unwrap_err();
        assert!(err.contains("line 3"), "got: {err}");
        assert!(err.contains("brnch"), "got: {err}");
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = StepwiseConfig::load(Path::new("/nonexistent/.stepwise.toml")).unwrap();
        assert_eq!(cfg, StepwiseConfig::default());
    }

    #[test]
    fn load_from_root_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[session]\nbranch = \"talk\"\n").unwrap();
        let cfg = StepwiseConfig::load_from_root(dir.path()).unwrap();
        assert_eq!(cfg.session.branch, "talk");
    }

    #[test]
    fn load_invalid_file_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid [[[toml").unwrap();
        match StepwiseConfig::load(&path).unwrap_err() {
            HistoryError::Config { path: p, detail } => {
                assert_eq!(p, path);
                assert!(!detail.is_empty());
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }
}
