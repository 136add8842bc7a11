//! Integration tests for change notifications and replay.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{NOTES, TestSession};
use parking_lot::Mutex;
use stepwise::{ChangedEntry, Notification, PlayDirection, Replayer};

fn record(ts: &TestSession) -> Arc<Mutex<Vec<Notification>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    ts.session.subscribe(move |_, notification| sink.lock().push(notification.clone()));
    seen
}

#[test]
fn late_subscriber_gets_invalidate_first() {
    let (ts, _) = TestSession::with_snapshots(1);
    let seen = record(&ts);
    assert_eq!(*seen.lock(), vec![Notification::Invalidate]);
}

#[test]
fn save_publishes_snapshot_and_head_entries() {
    let (ts, ids) = TestSession::with_snapshots(1);
    let seen = record(&ts);

    let id = ts.append_and_save("more");

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[1],
        Notification::Changed(vec![
            ChangedEntry::Snapshot { id: id.clone() },
            ChangedEntry::Head {
                previous: Some(ids[0].clone()),
                current: id,
            },
        ])
    );
}

#[test]
fn structural_changes_publish_invalidate() {
    let (ts, ids) = TestSession::with_snapshots(3);
    let seen = record(&ts);

    ts.session.branch_from(&ids[0], "alt").unwrap();
    ts.session.switch_branch(common::BRANCH).unwrap();
    ts.session.revert_to(&ids[1]).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|n| *n == Notification::Invalidate));
}

#[test]
fn failed_operation_publishes_nothing() {
    let (ts, ids) = TestSession::with_snapshots(1);
    let seen = record(&ts);

    assert!(ts.session.create_annotation(&ids[0], "???").is_err());
    assert!(ts.session.switch_branch("missing").is_err());
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn subscriber_sees_published_projection() {
    let (ts, ids) = TestSession::with_snapshots(2);
    let heads = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&heads);
    let sub = ts
        .session
        .subscribe(move |projection, _| sink.lock().push(projection.head.clone()));

    ts.session.previous().unwrap();
    assert!(ts.session.unsubscribe(sub));
    ts.session.next().unwrap();

    assert_eq!(
        *heads.lock(),
        vec![Some(ids[1].clone()), Some(ids[0].clone())]
    );
}

#[test]
fn concurrent_saves_are_serialized() {
    let ts = TestSession::new();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let session = ts.session.clone();
            let root = ts.root().to_owned();
            thread::spawn(move || {
                std::fs::write(root.join(format!("file-{i}.txt")), format!("{i}\n")).unwrap();
                session.save(None).unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let projection = ts.session.projection();
    projection.check_invariants().unwrap();
    assert!(!projection.ordered_ids.is_empty());
    assert_eq!(projection.head, projection.branch_head);
    let on_disk = ts.git(&["rev-list", "--count", common::BRANCH]);
    assert_eq!(on_disk.trim(), projection.ordered_ids.len().to_string());
}

#[test]
fn replay_forward_visits_every_step() {
    let (ts, ids) = TestSession::with_snapshots(4);
    ts.session.restore(&ids[0]).unwrap();

    let mut visited = Vec::new();
    let summary = Replayer::new(ts.session.clone())
        .run(|step| visited.push((step.head.clone(), step.index, step.range.is_some())))
        .unwrap();

    assert_eq!(summary.steps, 3);
    assert!(!summary.stopped);
    assert_eq!(
        visited,
        vec![
            (ids[1].clone(), 1, true),
            (ids[2].clone(), 2, true),
            (ids[3].clone(), 3, true),
        ]
    );
    assert_eq!(ts.read(NOTES).unwrap(), "step 0\nstep 1\nstep 2\nstep 3\n");
}

#[test]
fn replay_backward_reports_undone_snapshot() {
    let (ts, ids) = TestSession::with_snapshots(3);

    let mut crossed = Vec::new();
    let summary = Replayer::new(ts.session.clone())
        .direction(PlayDirection::Backward)
        .run(|step| crossed.push(step.crossed.clone()))
        .unwrap();

    assert_eq!(summary.steps, 2);
    assert_eq!(crossed, vec![ids[2].clone(), ids[1].clone()]);
    assert_eq!(ts.session.head().as_ref(), Some(&ids[0]));
}

#[test]
fn step_limit_is_checked_before_each_step() {
    let (ts, ids) = TestSession::with_snapshots(4);
    ts.session.restore(&ids[0]).unwrap();

    let summary = Replayer::new(ts.session.clone())
        .limit(Some(0))
        .run(|step| panic!("unexpected step to {}", step.head))
        .unwrap();
    assert_eq!(summary.steps, 0);
    assert!(summary.stopped);
    assert_eq!(ts.session.head().as_ref(), Some(&ids[0]));

    let mut heads = Vec::new();
    let summary = Replayer::new(ts.session.clone())
        .limit(Some(2))
        .delay(Duration::from_secs(60))
        .run(|step| heads.push(step.head.clone()))
        .unwrap();
    assert_eq!(summary.steps, 2);
    assert!(summary.stopped);
    assert_eq!(heads, vec![ids[1].clone(), ids[2].clone()]);
    assert_eq!(ts.session.head().as_ref(), Some(&ids[2]));
}

#[test]
fn stop_flag_halts_without_rolling_back() {
    let (ts, ids) = TestSession::with_snapshots(5);
    ts.session.restore(&ids[0]).unwrap();

    let replayer = Replayer::new(ts.session.clone());
    let stop = replayer.stop_flag();
    let mut steps = 0;
    let summary = replayer
        .run(|_| {
            steps += 1;
            if steps == 2 {
                stop.raise();
            }
        })
        .unwrap();

    assert!(summary.stopped);
    assert_eq!(summary.steps, 2);
    assert_eq!(ts.session.head().as_ref(), Some(&ids[2]));
}

#[test]
fn stop_flag_interrupts_delay_from_another_thread() {
    let (ts, ids) = TestSession::with_snapshots(3);
    ts.session.restore(&ids[0]).unwrap();

    let replayer = Replayer::new(ts.session.clone()).delay(Duration::from_secs(60));
    let stop = replayer.stop_flag();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        stop.raise();
    });

    let summary = replayer.run(|_| {}).unwrap();
    stopper.join().unwrap();

    assert!(summary.stopped);
    assert_eq!(summary.steps, 1);
    assert_eq!(ts.session.head().as_ref(), Some(&ids[1]));
}
