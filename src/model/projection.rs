//! The in-memory projection of a session repository.
//!
//! A [`Projection`] is a read-optimized cache of the store: every snapshot
//! seen so far (keyed globally by id, shared across timelines), the active
//! timeline's ordered ids, where `HEAD` is, the active timeline's tip, and
//! the section annotations. Only [`Session`](crate::session::Session) jobs
//! build new projections; everyone else reads published copies.
//!
//! Section queries are pure functions of the projection and never touch the
//! store.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{HistoryError, Result};
use crate::model::types::{Annotation, Snapshot, SnapshotId};

/// Cached, serializable view of one session repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Projection {
    /// Every snapshot fetched so far. Append-only.
    pub snapshots: HashMap<SnapshotId, Snapshot>,
    /// The active timeline, parent before child.
    pub ordered_ids: Vec<SnapshotId>,
    /// The checked-out snapshot, `None` for an empty store.
    pub head: Option<SnapshotId>,
    /// The newest snapshot on the active timeline.
    pub branch_head: Option<SnapshotId>,
    /// Name of the active timeline.
    pub branch: String,
    /// Section markers keyed by the snapshot they annotate.
    pub annotations: HashMap<SnapshotId, Annotation>,
}

/// One section of the active timeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Section {
    pub annotation: Annotation,
    /// Index of the annotated snapshot in `ordered_ids`.
    pub start_index: usize,
    /// Snapshots from the start up to the next section or the timeline's end.
    pub commit_count: usize,
}

impl Projection {
    /// An empty projection on `branch`.
    #[must_use]
    pub fn empty(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..Self::default()
        }
    }

    /// Index of `id` on the active timeline.
    #[must_use]
    pub fn index_of(&self, id: &SnapshotId) -> Option<usize> {
        self.ordered_ids.iter().position(|candidate| candidate == id)
    }

    /// Index of head on the active timeline, `None` for an empty store.
    ///
    /// # Errors
    /// Returns [`HistoryError::InternalConsistency`] if head is set but not on
    /// the timeline.
    pub fn head_index(&self) -> Result<Option<usize>> {
        let Some(head) = &self.head else {
            return Ok(None);
        };
        self.index_of(head)
            .map(Some)
            .ok_or_else(|| HistoryError::missing_from_timeline(head, "locating head"))
    }

    /// Whether head is at the active timeline's tip (not looking at history).
    #[must_use]
    pub fn is_at_tip(&self) -> bool {
        self.head == self.branch_head
    }

    /// The snapshot record for `id`, if cached.
    #[must_use]
    pub fn snapshot(&self, id: &SnapshotId) -> Option<&Snapshot> {
        self.snapshots.get(id)
    }

    /// Snapshots of the active timeline in order.
    pub fn timeline(&self) -> impl Iterator<Item = &Snapshot> {
        self.ordered_ids.iter().filter_map(|id| self.snapshots.get(id))
    }

    /// Resolve a full or abbreviated id against the cached snapshots.
    ///
    /// # Errors
    /// - [`HistoryError::UnknownSnapshot`] when nothing matches.
    /// - [`HistoryError::AmbiguousPrefix`] when several snapshots match.
    pub fn resolve(&self, prefix: &str) -> Result<SnapshotId> {
        let prefix = prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return Err(HistoryError::UnknownSnapshot { id: prefix });
        }
        let mut matches = self
            .snapshots
            .keys()
            .filter(|id| id.as_str().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id.clone()),
            (None, _) => Err(HistoryError::UnknownSnapshot { id: prefix }),
            (Some(_), Some(_)) => Err(HistoryError::AmbiguousPrefix {
                matches: self
                    .snapshots
                    .keys()
                    .filter(|id| id.as_str().starts_with(&prefix))
                    .count(),
                prefix,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Section queries
    // -----------------------------------------------------------------------

    fn is_annotated_at(&self, index: usize) -> bool {
        self.ordered_ids
            .get(index)
            .is_some_and(|id| self.annotations.contains_key(id))
    }

    /// Index of the first annotated snapshot strictly after `index`, or the
    /// timeline length.
    fn next_section_index(&self, index: usize) -> usize {
        (index + 1..self.ordered_ids.len())
            .find(|&i| self.is_annotated_at(i))
            .unwrap_or(self.ordered_ids.len())
    }

    /// The nearest annotated snapshot at or before `id` on the timeline.
    #[must_use]
    pub fn section_start(&self, id: &SnapshotId) -> Option<&SnapshotId> {
        let index = self.index_of(id)?;
        (0..=index)
            .rev()
            .find(|&i| self.is_annotated_at(i))
            .map(|i| &self.ordered_ids[i])
    }

    /// How many snapshots the section starting at `id` spans.
    ///
    /// Zero when `id` is not annotated or not on the active timeline.
    #[must_use]
    pub fn section_commit_count(&self, id: &SnapshotId) -> usize {
        if !self.annotations.contains_key(id) {
            return 0;
        }
        self.index_of(id)
            .map_or(0, |index| self.next_section_index(index) - index)
    }

    /// Whether head falls in `[id, next section start)`.
    #[must_use]
    pub fn is_head_in_section(&self, id: &SnapshotId) -> bool {
        let (Some(head), Some(start)) = (self.head.as_ref(), self.index_of(id)) else {
            return false;
        };
        let Some(head_index) = self.index_of(head) else {
            return false;
        };
        head_index >= start && head_index < self.next_section_index(start)
    }

    /// 1-based offset of head within the section starting at `id`, or `None`
    /// when head is outside that section.
    #[must_use]
    pub fn step_number_of_head(&self, id: &SnapshotId) -> Option<usize> {
        if !self.is_head_in_section(id) {
            return None;
        }
        let start = self.index_of(id)?;
        let head_index = self.index_of(self.head.as_ref()?)?;
        Some(head_index - start + 1)
    }

    /// All sections on the active timeline, in timeline order.
    #[must_use]
    pub fn sections(&self) -> Vec<Section> {
        self.ordered_ids
            .iter()
            .enumerate()
            .filter_map(|(index, id)| {
                let annotation = self.annotations.get(id)?;
                Some(Section {
                    annotation: annotation.clone(),
                    start_index: index,
                    commit_count: self.next_section_index(index) - index,
                })
            })
            .collect()
    }

    /// Verify the structural invariants: head and branch head, when set, are on
    /// the timeline and every ordered id is cached.
    ///
    /// # Errors
    /// Returns [`HistoryError::InternalConsistency`] naming the first violation.
    pub fn check_invariants(&self) -> Result<()> {
        if let Some(head) = &self.head {
            if self.index_of(head).is_none() {
                return Err(HistoryError::missing_from_timeline(head, "head"));
            }
        }
        if let Some(tip) = &self.branch_head {
            if self.index_of(tip).is_none() {
                return Err(HistoryError::missing_from_timeline(tip, "branch head"));
            }
        }
        if let Some(missing) = self
            .ordered_ids
            .iter()
            .find(|id| !self.snapshots.contains_key(*id))
        {
            return Err(HistoryError::InternalConsistency {
                id: missing.to_string(),
                context: "ordered id has no cached snapshot".to_owned(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn id(n: usize) -> SnapshotId {
        SnapshotId::new(&format!("{n:040x}")).unwrap()
    }

    fn snapshot(n: usize) -> Snapshot {
        Snapshot {
            id: id(n),
            author: "Test <test@localhost>".to_owned(),
            message: "snapshot".to_owned(),
            timestamp: "Sat Oct 18 12:00:00 2026 +0000".to_owned(),
            change_summary: String::new(),
            changed_files: Vec::new(),
        }
    }

    /// A timeline of `len` snapshots with sections at `sections`.
    pub(crate) fn timeline(len: usize, sections: &[usize]) -> Projection {
        let mut projection = Projection::empty("demo");
        for n in 0..len {
            projection.snapshots.insert(id(n), snapshot(n));
            projection.ordered_ids.push(id(n));
        }
        for &n in sections {
            projection.annotations.insert(
                id(n),
                Annotation {
                    name: format!("section-{n}"),
                    human_label: format!("Section {n}"),
                    snapshot_id: id(n),
                },
            );
        }
        projection.branch_head = projection.ordered_ids.last().cloned();
        projection.head.clone_from(&projection.branch_head);
        projection
    }

    #[test]
    fn section_commit_counts() {
        let p = timeline(12, &[2, 5, 9]);
        assert_eq!(p.section_commit_count(&id(2)), 3);
        assert_eq!(p.section_commit_count(&id(5)), 4);
        assert_eq!(p.section_commit_count(&id(9)), 3);
    }

    #[test]
    fn section_commit_count_of_unannotated_is_zero() {
        let p = timeline(12, &[2, 5, 9]);
        assert_eq!(p.section_commit_count(&id(3)), 0);
        assert_eq!(p.section_commit_count(&id(99)), 0);
    }

    #[test]
    fn section_start_finds_nearest_preceding_marker() {
        let p = timeline(12, &[2, 5, 9]);
        assert_eq!(p.section_start(&id(0)), None);
        assert_eq!(p.section_start(&id(2)), Some(&id(2)));
        assert_eq!(p.section_start(&id(4)), Some(&id(2)));
        assert_eq!(p.section_start(&id(8)), Some(&id(5)));
        assert_eq!(p.section_start(&id(11)), Some(&id(9)));
    }

    #[test]
    fn head_in_section_and_step_number_agree() {
        let mut p = timeline(12, &[2, 5, 9]);
        p.head = Some(id(6));
        assert!(p.is_head_in_section(&id(5)));
        assert!(!p.is_head_in_section(&id(2)));
        assert!(!p.is_head_in_section(&id(9)));
        assert_eq!(p.step_number_of_head(&id(5)), Some(2));
        assert_eq!(p.step_number_of_head(&id(2)), None);
    }

    #[test]
    fn head_at_section_boundaries() {
        let mut p = timeline(12, &[2, 5, 9]);
        p.head = Some(id(5));
        assert_eq!(p.step_number_of_head(&id(5)), Some(1));
        p.head = Some(id(4));
        assert_eq!(p.step_number_of_head(&id(2)), Some(3));
        p.head = Some(id(11));
        assert_eq!(p.step_number_of_head(&id(9)), Some(3));
    }

    #[test]
    fn no_head_is_in_no_section() {
        let mut p = timeline(3, &[0]);
        p.head = None;
        assert!(!p.is_head_in_section(&id(0)));
        assert_eq!(p.step_number_of_head(&id(0)), None);
    }

    #[test]
    fn sections_lists_in_timeline_order() {
        let p = timeline(12, &[9, 2, 5]);
        let sections = p.sections();
        let starts: Vec<usize> = sections.iter().map(|s| s.start_index).collect();
        let counts: Vec<usize> = sections.iter().map(|s| s.commit_count).collect();
        assert_eq!(starts, vec![2, 5, 9]);
        assert_eq!(counts, vec![3, 4, 3]);
    }

    #[test]
    fn head_index_reports_divergence() {
        let mut p = timeline(3, &[]);
        assert_eq!(p.head_index().unwrap(), Some(2));
        p.head = Some(id(42));
        assert!(p.head_index().unwrap_err().is_divergence());
        p.head = None;
        assert_eq!(p.head_index().unwrap(), None);
    }

    #[test]
    fn resolve_prefixes() {
        let p = timeline(3, &[]);
        let full = id(2);
        assert_eq!(p.resolve(full.as_str()).unwrap(), full);
        assert!(p.resolve(&full.as_str()[30..]).is_err());
        assert!(matches!(
            p.resolve("0000"),
            Err(HistoryError::AmbiguousPrefix { matches: 3, .. })
        ));
        assert!(matches!(
            p.resolve("ffff"),
            Err(HistoryError::UnknownSnapshot { .. })
        ));
        assert!(p.resolve("").is_err());
    }

    #[test]
    fn invariants_hold_for_well_formed_timeline() {
        let p = timeline(5, &[1]);
        assert!(p.check_invariants().is_ok());
        let mut broken = p.clone();
        broken.branch_head = Some(id(77));
        assert!(broken.check_invariants().is_err());
        let mut uncached = p;
        uncached.snapshots.remove(&id(3));
        assert!(uncached.check_invariants().is_err());
    }
}
