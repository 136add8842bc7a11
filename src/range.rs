//! Change-range calculation from a unified diff.
//!
//! Given the diff one snapshot introduced, [`compute_change_ranges`] reports
//! where the last change sits in the old text (`before`) and in the new text
//! (`after`). Replay uses `after` to highlight freshly inserted text and
//! `before` to place the caret when stepping backwards.
//!
//! Positions are 1-based. Spans are half-open: `end.character` is one past
//! the last character of the last line. A side with nothing to highlight (no
//! additions for `after`, no deletions for `before`) collapses to a caret.

use crate::error::{HistoryError, Result};
use crate::model::types::{ChangeRange, Position, Span};

const NO_NEWLINE_MARKER: char = '\\';

// ---------------------------------------------------------------------------
// Unified diff
// ---------------------------------------------------------------------------

/// Which side(s) of the diff a hunk line belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Addition,
    Deletion,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HunkLine {
    pub kind: LineKind,
    pub text: String,
}

/// One `@@ -a,b +c,d @@` block. `\ No newline at end of file` lines are
/// dropped while parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
}

/// Parse the hunks of a unified diff.
///
/// File headers and any text between hunks are skipped. Inside a hunk, lines
/// are consumed until the header's old/new line counts are used up, so a
/// following `--- a/...` file header is never mistaken for a deletion.
///
/// # Errors
/// Returns [`HistoryError::Parse`] for a malformed `@@` header or a hunk body
/// line with an unknown prefix.
pub fn parse_unified_diff(diff: &str) -> Result<Vec<Hunk>> {
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut remaining_old = 0usize;
    let mut remaining_new = 0usize;

    for (idx, line) in diff.lines().enumerate() {
        let line_number = idx + 1;
        let in_hunk = remaining_old > 0 || remaining_new > 0;

        if !in_hunk {
            if line.starts_with("@@") {
                let hunk = parse_hunk_header(line).ok_or_else(|| HistoryError::Parse {
                    line_number,
                    line: line.to_owned(),
                    expected: "`@@ -a,b +c,d @@` hunk header",
                })?;
                remaining_old = hunk.old_len;
                remaining_new = hunk.new_len;
                hunks.push(hunk);
            }
            // A trailing no-newline marker belongs to the hunk just finished.
            continue;
        }

        let Some(hunk) = hunks.last_mut() else {
            continue;
        };
        let (kind, text) = match line.chars().next() {
            Some(' ') => (LineKind::Context, &line[1..]),
            None => (LineKind::Context, ""),
            Some('+') => (LineKind::Addition, &line[1..]),
            Some('-') => (LineKind::Deletion, &line[1..]),
            Some(NO_NEWLINE_MARKER) => continue,
            Some(_) => {
                return Err(HistoryError::Parse {
                    line_number,
                    line: line.to_owned(),
                    expected: "hunk line starting with ' ', '+', '-' or '\\'",
                });
            }
        };
        match kind {
            LineKind::Context => {
                remaining_old = remaining_old.saturating_sub(1);
                remaining_new = remaining_new.saturating_sub(1);
            }
            LineKind::Addition => remaining_new = remaining_new.saturating_sub(1),
            LineKind::Deletion => remaining_old = remaining_old.saturating_sub(1),
        }
        hunk.lines.push(HunkLine {
            kind,
            text: text.to_owned(),
        });
    }

    Ok(hunks)
}

/// `@@ -12,3 +12,4 @@ fn context()`
fn parse_hunk_header(line: &str) -> Option<Hunk> {
    let rest = line.strip_prefix("@@ ")?;
    let (ranges, _) = rest.split_once(" @@")?;
    let (old, new) = ranges.split_once(' ')?;
    let (old_start, old_len) = parse_range(old.strip_prefix('-')?)?;
    let (new_start, new_len) = parse_range(new.strip_prefix('+')?)?;
    Some(Hunk {
        old_start,
        old_len,
        new_start,
        new_len,
        lines: Vec::new(),
    })
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

// ---------------------------------------------------------------------------
// Change ranges
// ---------------------------------------------------------------------------

/// A line as seen from one side of the diff, with its line number there.
struct SideLine<'a> {
    /// Index into the hunk's full line list.
    hunk_index: usize,
    line: usize,
    text: &'a str,
    changed: bool,
}

fn side<'a>(hunk: &'a Hunk, start: usize, skip: LineKind, changed: LineKind) -> Vec<SideLine<'a>> {
    hunk.lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.kind != skip)
        .enumerate()
        .map(|(offset, (hunk_index, l))| SideLine {
            hunk_index,
            line: start + offset,
            text: &l.text,
            changed: l.kind == changed,
        })
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// The range of changed lines on one side, or a caret where the change
/// happened on the other side.
fn side_span(hunk: &Hunk, lines: &[SideLine<'_>], start: usize, other: LineKind) -> Span {
    let mut changed = lines.iter().filter(|l| l.changed);
    if let Some(first) = changed.next() {
        let last = changed.last().unwrap_or(first);
        return Span {
            start: Position::new(first.line, 1),
            end: Position::new(last.line, char_len(last.text) + 1),
        };
    }

    // Nothing changed on this side: place a caret after the line preceding
    // the first change on the other side.
    let first_other = hunk.lines.iter().position(|l| l.kind == other);
    let preceding = first_other.and_then(|at| lines.iter().rev().find(|l| l.hunk_index < at));
    match preceding {
        Some(prev) => Span::point(Position::new(prev.line, char_len(prev.text) + 1)),
        None => Span::point(Position::new(start.max(1), 1)),
    }
}

/// Compute `before`/`after` spans for the last hunk of `diff`.
///
/// Returns `Ok(None)` when the diff has no hunks (binary files, mode-only
/// changes, empty snapshots).
///
/// # Errors
/// Propagates [`parse_unified_diff`] errors.
pub fn compute_change_ranges(diff: &str) -> Result<Option<ChangeRange>> {
    let hunks = parse_unified_diff(diff)?;
    let Some(hunk) = hunks.last() else {
        return Ok(None);
    };

    let new_side = side(hunk, hunk.new_start, LineKind::Deletion, LineKind::Addition);
    let old_side = side(hunk, hunk.old_start, LineKind::Addition, LineKind::Deletion);

    Ok(Some(ChangeRange {
        before: side_span(hunk, &old_side, hunk.old_start, LineKind::Addition),
        after: side_span(hunk, &new_side, hunk.new_start, LineKind::Deletion),
    }))
}

/// Everything after the first `index ...` line of `git show` output.
///
/// Returns an empty string when there is no such line (empty snapshot,
/// rename without content change).
#[must_use]
pub fn diff_after_index_line(show_output: &str) -> &str {
    let mut offset = 0;
    for line in show_output.split_inclusive('\n') {
        offset += line.len();
        if line.starts_with("index ") {
            return &show_output[offset..];
        }
    }
    ""
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
