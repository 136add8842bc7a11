//! Parser for section marker records.
//!
//! A marker is read back from the store in a fixed layout: the target object
//! id on the first line, one blank line, then the annotation text up to the
//! next blank line (or end of output).

use crate::error::{HistoryError, Result};
use crate::model::types::{Annotation, SnapshotId};

/// The `for-each-ref` format string that produces the layout parsed here.
pub const MARKER_FORMAT: &str = "--format=%(object)%0a%0a%(contents)";

/// Parse one marker record named `name`.
///
/// Returns `Ok(None)` when the output is empty (no such marker) or when the
/// object line is empty, which is how lightweight tags render: they carry no
/// annotation and are not section markers.
///
/// # Errors
/// Returns [`HistoryError::Parse`] if the object line is not a valid id or
/// the blank separator line is missing.
pub fn parse_marker(name: &str, raw: &str) -> Result<Option<Annotation>> {
    let mut lines = raw.lines();

    let Some(object_line) = lines.next() else {
        return Ok(None);
    };
    let object = object_line.trim();
    if object.is_empty() {
        return Ok(None);
    }
    let snapshot_id = SnapshotId::new(object).map_err(|_| HistoryError::Parse {
        line_number: 1,
        line: object_line.to_owned(),
        expected: "marker object id",
    })?;

    match lines.next() {
        Some(blank) if blank.trim().is_empty() => {}
        Some(other) => {
            return Err(HistoryError::Parse {
                line_number: 2,
                line: other.to_owned(),
                expected: "blank line after marker object id",
            });
        }
        None => {
            return Err(HistoryError::Parse {
                line_number: 2,
                line: String::new(),
                expected: "blank line after marker object id",
            });
        }
    }

    let body: Vec<&str> = lines.take_while(|line| !line.trim().is_empty()).collect();

    Ok(Some(Annotation {
        name: name.to_owned(),
        human_label: body.join("\n"),
        snapshot_id,
    }))
}

/// Split `tag --list` output into marker names.
#[must_use]
pub fn parse_marker_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "4444444444444444444444444444444444444444";

    #[test]
    fn parses_object_and_label() {
        let raw = format!("{ID}\n\nSetting up the DB\n");
        let annotation = parse_marker("setting-up-the-db", &raw).unwrap().unwrap();
        assert_eq!(annotation.name, "setting-up-the-db");
        assert_eq!(annotation.human_label, "Setting up the DB");
        assert_eq!(annotation.snapshot_id.as_str(), ID);
    }

    #[test]
    fn body_stops_at_blank_line() {
        let raw = format!("{ID}\n\nIntro\nsecond line\n\n-----BEGIN PGP SIGNATURE-----\n");
        let annotation = parse_marker("intro", &raw).unwrap().unwrap();
        assert_eq!(annotation.human_label, "Intro\nsecond line");
    }

    #[test]
    fn lightweight_tag_is_not_a_marker() {
        assert_eq!(parse_marker("v1", "\n\n\n").unwrap(), None);
        assert_eq!(parse_marker("v1", "").unwrap(), None);
    }

    #[test]
    fn missing_blank_line_is_fatal() {
        let raw = format!("{ID}\nIntro\n");
        assert!(matches!(
            parse_marker("intro", &raw),
            Err(HistoryError::Parse { line_number: 2, .. })
        ));
    }

    #[test]
    fn bad_object_id_is_fatal() {
        assert!(matches!(
            parse_marker("intro", "not-an-id\n\nIntro\n"),
            Err(HistoryError::Parse { line_number: 1, .. })
        ));
    }

    #[test]
    fn list_skips_blank_lines() {
        assert_eq!(
            parse_marker_list("intro\n\nstep-2\n"),
            vec!["intro".to_owned(), "step-2".to_owned()]
        );
    }
}
