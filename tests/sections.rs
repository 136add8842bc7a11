//! Integration tests for section markers.

mod common;

use common::TestSession;
use stepwise::HistoryError;

#[test]
fn annotation_creates_marker_and_section() {
    let (ts, ids) = TestSession::with_snapshots(4);

    let annotation = ts.session.create_annotation(&ids[1], "Wiring the Parser!").unwrap();
    assert_eq!(annotation.name, "wiring-the-parser");
    assert_eq!(annotation.human_label, "Wiring the Parser!");
    assert_eq!(annotation.snapshot_id, ids[1]);

    let tags = ts.git(&["tag", "--list"]);
    assert!(tags.lines().any(|t| t == "wiring-the-parser"), "tags: {tags}");
    let target = ts.git(&["rev-parse", "wiring-the-parser^{commit}"]);
    assert_eq!(target.trim(), ids[1].as_str());

    let sections = ts.session.sections();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].start_index, 1);
    assert_eq!(sections[0].commit_count, 3);
}

#[test]
fn section_queries_follow_head() {
    let (ts, ids) = TestSession::with_snapshots(6);
    ts.session.create_annotation(&ids[0], "Intro").unwrap();
    ts.session.create_annotation(&ids[3], "Main part").unwrap();

    assert_eq!(ts.session.section_commit_count(&ids[0]), 3);
    assert_eq!(ts.session.section_commit_count(&ids[3]), 3);
    assert_eq!(ts.session.section_commit_count(&ids[1]), 0);
    assert_eq!(ts.session.section_start(&ids[4]), Some(ids[3].clone()));
    assert_eq!(ts.session.section_start(&ids[2]), Some(ids[0].clone()));

    // Head is at the tip (ids[5]).
    assert!(ts.session.is_head_in_section(&ids[3]));
    assert!(!ts.session.is_head_in_section(&ids[0]));
    assert_eq!(ts.session.step_number_of_head(&ids[3]), Some(3));

    ts.session.restore(&ids[1]).unwrap();
    assert!(ts.session.is_head_in_section(&ids[0]));
    assert_eq!(ts.session.step_number_of_head(&ids[0]), Some(2));
    assert_eq!(ts.session.step_number_of_head(&ids[3]), None);
}

#[test]
fn annotations_survive_reopen() {
    let (ts, ids) = TestSession::with_snapshots(3);
    ts.session.create_annotation(&ids[2], "Wrap up").unwrap();

    let reopened = ts.reopen();
    let projection = reopened.projection();
    let annotation = projection.annotations.get(&ids[2]).unwrap();
    assert_eq!(annotation.name, "wrap-up");
    assert_eq!(annotation.human_label, "Wrap up");
}

#[test]
fn published_annotation_matches_reloaded_marker() {
    let (ts, ids) = TestSession::with_snapshots(2);
    let annotation = ts.session.create_annotation(&ids[0], "  Setup  ").unwrap();
    assert_eq!(annotation.name, "setup");
    assert_eq!(annotation.human_label.trim(), "Setup");
    assert_eq!(ts.session.projection().annotations.get(&ids[0]), Some(&annotation));

    let reopened = ts.reopen();
    assert_eq!(reopened.projection().annotations, ts.session.projection().annotations);
}

#[test]
fn later_marker_on_same_snapshot_wins() {
    let (ts, ids) = TestSession::with_snapshots(2);
    ts.session.create_annotation(&ids[0], "First name").unwrap();
    ts.session.create_annotation(&ids[0], "Second name").unwrap();

    assert_eq!(ts.session.projection().annotations[&ids[0]].human_label, "Second name");
    assert_eq!(ts.session.sections().len(), 1);
}

#[test]
fn lightweight_tags_are_ignored() {
    let (ts, ids) = TestSession::with_snapshots(2);
    ts.git(&["tag", "plain", ids[0].as_str()]);

    let reopened = ts.reopen();
    assert!(reopened.projection().annotations.is_empty());
}

#[test]
fn label_without_letters_is_rejected() {
    let (ts, ids) = TestSession::with_snapshots(1);
    let err = ts.session.create_annotation(&ids[0], "!!! ---").unwrap_err();
    assert!(matches!(err, HistoryError::InvalidLabel { .. }), "got {err:?}");
    assert!(ts.git(&["tag", "--list"]).trim().is_empty());
}

#[test]
fn section_on_forked_away_snapshot_does_not_count() {
    let (ts, ids) = TestSession::with_snapshots(4);
    ts.session.create_annotation(&ids[3], "Late").unwrap();
    ts.session.branch_from(&ids[1], "alt").unwrap();

    assert!(ts.session.sections().is_empty());
    assert_eq!(ts.session.section_commit_count(&ids[3]), 0);
}
