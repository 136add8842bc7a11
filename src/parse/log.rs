//! Parser for `git log --compact-summary --no-color` output.
//!
//! The log is read line by line through an explicit state machine:
//!
//! ```text
//! Begin ──commit──▶ Author ──Author:──▶ Date ──Date:──▶ MessageBegin
//!   ▲                 │ (Merge: skipped)                    │ blank
//!   │                 ▼                                     ▼
//!  End ◀──summary── Fileset ◀──────────blank────────── MessageMiddle
//!   │                 │ commit (no summary line): accept, restart at Author
//!   └──blank: accept──┘
//! ```
//!
//! Records are discovered newest first (the log's own order) and the result
//! is reversed so callers always get oldest first. Any line that does not fit
//! the current state is a [`HistoryError::Parse`], never silently skipped.

use std::fmt::Write as _;

use crate::error::{HistoryError, Result};
use crate::model::types::{ChangeKind, ChangedFile, Snapshot, SnapshotId};

const HEADER: &str = "commit ";
const MERGE: &str = "Merge:";
const AUTHOR: &str = "Author:";
const DATE: &str = "Date:";
const MESSAGE_INDENT: &str = "    ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Begin,
    Author,
    Date,
    MessageBegin,
    MessageMiddle,
    Fileset,
    End,
}

impl State {
    const fn expected(self) -> &'static str {
        match self {
            Self::Begin => "`commit <id>` header",
            Self::Author => "`Author:` line",
            Self::Date => "`Date:` line",
            Self::MessageBegin => "blank line before message",
            Self::MessageMiddle => "indented message line or blank line",
            Self::Fileset => "`<path> | <detail>` line, summary line, or header",
            Self::End => "blank line or header",
        }
    }
}

/// A record under construction.
#[derive(Default)]
struct Partial {
    id: Option<SnapshotId>,
    author: String,
    timestamp: String,
    message: Vec<String>,
    change_summary: String,
    changed_files: Vec<ChangedFile>,
}

impl Partial {
    fn finish(self) -> Option<Snapshot> {
        Some(Snapshot {
            id: self.id?,
            author: self.author,
            message: self.message.join("\n"),
            timestamp: self.timestamp,
            change_summary: self.change_summary,
            changed_files: self.changed_files,
        })
    }
}

struct Parser {
    state: State,
    current: Partial,
    /// Newest first, as discovered.
    records: Vec<Snapshot>,
}

impl Parser {
    fn new() -> Self {
        Self {
            state: State::Begin,
            current: Partial::default(),
            records: Vec::new(),
        }
    }

    fn accept(&mut self) {
        if let Some(snapshot) = std::mem::take(&mut self.current).finish() {
            self.records.push(snapshot);
        }
    }

    fn error(&self, line_number: usize, line: &str) -> HistoryError {
        HistoryError::Parse {
            line_number,
            line: line.to_owned(),
            expected: self.state.expected(),
        }
    }

    fn start_record(&mut self, line_number: usize, line: &str) -> Result<()> {
        let id = parse_header(line).ok_or_else(|| self.error(line_number, line))?;
        self.current = Partial {
            id: Some(id),
            ..Partial::default()
        };
        self.state = State::Author;
        Ok(())
    }

    fn feed(&mut self, line_number: usize, line: &str) -> Result<()> {
        match self.state {
            State::Begin => self.start_record(line_number, line)?,
            State::Author => {
                if line.starts_with(MERGE) {
                    return Ok(());
                }
                let author = line
                    .strip_prefix(AUTHOR)
                    .ok_or_else(|| self.error(line_number, line))?;
                self.current.author = author.trim().to_owned();
                self.state = State::Date;
            }
            State::Date => {
                let date = line
                    .strip_prefix(DATE)
                    .ok_or_else(|| self.error(line_number, line))?;
                self.current.timestamp = date.trim().to_owned();
                self.state = State::MessageBegin;
            }
            State::MessageBegin => {
                if !line.trim().is_empty() {
                    return Err(self.error(line_number, line));
                }
                self.state = State::MessageMiddle;
            }
            State::MessageMiddle => {
                if line.trim().is_empty() {
                    self.state = State::Fileset;
                } else {
                    let text = line
                        .strip_prefix(MESSAGE_INDENT)
                        .ok_or_else(|| self.error(line_number, line))?;
                    self.current.message.push(text.to_owned());
                }
            }
            State::Fileset => self.feed_fileset(line_number, line)?,
            State::End => {
                if line.trim().is_empty() {
                    self.accept();
                    self.state = State::Begin;
                } else if line.starts_with(HEADER) {
                    self.accept();
                    self.start_record(line_number, line)?;
                } else {
                    return Err(self.error(line_number, line));
                }
            }
        }
        Ok(())
    }

    fn feed_fileset(&mut self, line_number: usize, line: &str) -> Result<()> {
        let files_seen = !self.current.changed_files.is_empty();

        if line.starts_with(HEADER) {
            // No summary line: the previous record ends here.
            self.accept();
            return self.start_record(line_number, line);
        }
        if line.trim().is_empty() {
            if files_seen {
                self.accept();
                self.state = State::Begin;
            }
            return Ok(());
        }
        if !files_seen {
            // A further message paragraph after a blank line.
            if let Some(text) = line.strip_prefix(MESSAGE_INDENT) {
                self.current.message.push(String::new());
                self.current.message.push(text.to_owned());
                return Ok(());
            }
        }
        if is_summary_line(line) {
            self.current.change_summary = line.trim().to_owned();
            self.state = State::End;
            return Ok(());
        }
        let file = parse_file_line(line).ok_or_else(|| self.error(line_number, line))?;
        self.current.changed_files.push(file);
        Ok(())
    }

    fn finish(mut self, last_line_number: usize) -> Result<Vec<Snapshot>> {
        match self.state {
            State::Begin => {}
            State::MessageMiddle | State::Fileset | State::End => self.accept(),
            State::Author | State::Date | State::MessageBegin => {
                return Err(HistoryError::Parse {
                    line_number: last_line_number + 1,
                    line: String::new(),
                    expected: self.state.expected(),
                });
            }
        }
        self.records.reverse();
        Ok(self.records)
    }
}

/// `commit <id>` with optional trailing decorations.
fn parse_header(line: &str) -> Option<SnapshotId> {
    let rest = line.strip_prefix(HEADER)?;
    let id = rest.split_whitespace().next()?;
    SnapshotId::new(id).ok()
}

/// ` 3 files changed, 10 insertions(+), 2 deletions(-)`
fn is_summary_line(line: &str) -> bool {
    let mut words = line.split_whitespace();
    let count_ok = words
        .next()
        .is_some_and(|w| w.chars().all(|c| c.is_ascii_digit()));
    let noun_ok = words.next().is_some_and(|w| w == "file" || w == "files");
    let verb_ok = words.next().is_some_and(|w| w.starts_with("changed"));
    count_ok && noun_ok && verb_ok
}

/// Split git's trailing status marker off a compact-summary path:
/// `(new)`, `(gone)`, `(new +x)`, `(new +l)`, `(mode +x)`, `(mode -x)`.
fn split_status_marker(path: &str) -> (&str, ChangeKind) {
    let Some((name, marker)) = path
        .strip_suffix(')')
        .and_then(|p| p.rsplit_once(" ("))
    else {
        return (path, ChangeKind::Modified);
    };
    let kind = match marker.split_whitespace().next() {
        Some("new") => ChangeKind::New,
        Some("gone") => ChangeKind::Gone,
        Some("mode") => ChangeKind::Modified,
        // A parenthesis that belongs to the file name.
        _ => return (path, ChangeKind::Modified),
    };
    (name.trim_end(), kind)
}

/// ` src/lib.rs (new) | 12 ++++`
fn parse_file_line(line: &str) -> Option<ChangedFile> {
    let (path, detail) = line.split_once(" | ")?;
    let (file_name, kind) = split_status_marker(path.trim());
    if file_name.is_empty() {
        return None;
    }
    Some(ChangedFile {
        file_name: file_name.to_owned(),
        change_detail: detail.trim().to_owned(),
        kind,
    })
}

/// Parse compact-summary log output into snapshots, oldest first.
///
/// # Errors
/// Returns [`HistoryError::Parse`] on the first line that does not fit the
/// expected format, or if the output ends in the middle of a record header.
pub fn parse_commit_log(raw: &str) -> Result<Vec<Snapshot>> {
    let mut parser = Parser::new();
    let mut last = 0;
    for (idx, line) in raw.lines().enumerate() {
        last = idx + 1;
        parser.feed(last, line)?;
    }
    parser.finish(last)
}

/// Serialize snapshots back into compact-summary log format.
///
/// `snapshots` is oldest first; output is newest first, like `git log`.
#[must_use]
pub fn render(snapshots: &[Snapshot]) -> String {
    let mut out = String::new();
    for snapshot in snapshots.iter().rev() {
        let _ = writeln!(out, "{HEADER}{}", snapshot.id);
        let _ = writeln!(out, "{AUTHOR} {}", snapshot.author);
        let _ = writeln!(out, "{DATE}   {}", snapshot.timestamp);
        out.push('\n');
        for line in snapshot.message.lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                let _ = writeln!(out, "{MESSAGE_INDENT}{line}");
            }
        }
        out.push('\n');
        for file in &snapshot.changed_files {
            match file.kind.marker() {
                Some(marker) => {
                    let _ = writeln!(out, " {} {marker} | {}", file.file_name, file.change_detail);
                }
                None => {
                    let _ = writeln!(out, " {} | {}", file.file_name, file.change_detail);
                }
            }
        }
        if !snapshot.change_summary.is_empty() {
            let _ = writeln!(out, " {}", snapshot.change_summary);
        }
        if !snapshot.changed_files.is_empty() || !snapshot.change_summary.is_empty() {
            out.push('\n');
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_id() -> impl Strategy<Value = SnapshotId> {
        "[0-9a-f]{40}".prop_map(|s| SnapshotId::new(&s).unwrap())
    }

    fn arb_word() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_.]{1,12}"
    }

    fn arb_file() -> impl Strategy<Value = ChangedFile> {
        (
            prop::collection::vec(arb_word(), 1..4),
            1u32..500,
            prop_oneof![
                Just(ChangeKind::Modified),
                Just(ChangeKind::New),
                Just(ChangeKind::Gone)
            ],
        )
            .prop_map(|(parts, n, kind)| ChangedFile {
                file_name: parts.join("/"),
                change_detail: format!("{n} +-"),
                kind,
            })
    }

    fn arb_snapshot() -> impl Strategy<Value = Snapshot> {
        (
            arb_id(),
            (arb_word(), arb_word()),
            prop::collection::vec(prop::collection::vec(arb_word(), 1..5), 1..3),
            prop::collection::vec(arb_file(), 0..4),
        )
            .prop_map(|(id, (name, host), paragraphs, changed_files)| {
                let message = paragraphs
                    .iter()
                    .map(|words| words.join(" "))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let change_summary = if changed_files.is_empty() {
                    String::new()
                } else {
                    format!(
                        "{} file{} changed",
                        changed_files.len(),
                        if changed_files.len() == 1 { "" } else { "s" }
                    )
                };
                Snapshot {
                    id,
                    author: format!("{name} <{name}@{host}>"),
                    message,
                    timestamp: "Sat Oct 18 12:00:00 2026 +0000".to_owned(),
                    change_summary,
                    changed_files,
                }
            })
    }

    proptest! {
        #[test]
        fn prop_render_parse_round_trip(snapshots in prop::collection::vec(arb_snapshot(), 0..6)) {
            let parsed = parse_commit_log(&render(&snapshots)).unwrap();
            prop_assert_eq!(parsed, snapshots);
        }
    }
}
