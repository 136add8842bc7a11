//! The session state machine.
//!
//! A [`Session`] owns the cached [`Projection`] of one store and applies every
//! mutation as a single job on its [`JobQueue`]. Each job reads the published
//! projection, runs the store commands it needs, builds the next projection on
//! a private copy and publishes it only after every command succeeded. A job
//! that fails leaves the published projection untouched.
//!
//! Subscriber callbacks run on the job thread. They must not call back into
//! mutating [`Session`] methods; doing so would wait on the job that is
//! running the callback.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, info_span, warn};

use crate::config::{SessionConfig, StepwiseConfig};
use crate::error::{HistoryError, Result};
use crate::git::{GitCli, GitStore, HistoryStore, has_modifications};
use crate::model::projection::{Projection, Section};
use crate::model::types::{Annotation, ChangeRange, SnapshotId, slugify};
use crate::notify::{ChangedEntry, Notification, Notifier, SubscriptionId};
use crate::queue::JobQueue;
use crate::range::compute_change_ranges;

/// Work run in the session root right before a save stages files.
pub type SaveHook = Box<dyn FnOnce(&Path) -> Result<()> + Send + 'static>;

/// What [`Session::save`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new snapshot was recorded and head moved to it.
    Saved(SnapshotId),
    /// The working directory matched head; nothing was recorded.
    NothingToCommit,
    /// Head is behind the timeline tip; saving is disabled while looking at history.
    NotAtTip,
}

impl SaveOutcome {
    #[must_use]
    pub const fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// A recording session over one store.
///
/// Cloning is cheap; clones share the projection, the queue, and the subscribers.
pub struct Session<S: HistoryStore = GitStore> {
    inner: Arc<Inner<S>>,
    queue: JobQueue,
}

impl<S: HistoryStore> Clone for Session<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            queue: self.queue.clone(),
        }
    }
}

struct Inner<S> {
    store: S,
    notifier: Notifier,
    settings: SessionConfig,
    ready: AtomicBool,
}

impl Session<GitStore> {
    /// A git-backed session rooted at `root`.
    #[must_use]
    pub fn open(root: &Path, config: &StepwiseConfig) -> Self {
        let git = GitCli::new(root, config.identity.clone());
        Self::new(GitStore::new(git), config.session.clone())
    }
}

impl<S: HistoryStore> Session<S> {
    /// A session over `store`. Nothing touches the store until [`Session::initialize`].
    #[must_use]
    pub fn new(store: S, settings: SessionConfig) -> Self {
        let initial = Projection::empty(settings.branch.clone());
        Self {
            inner: Arc::new(Inner {
                store,
                notifier: Notifier::new(initial),
                settings,
                ready: AtomicBool::new(false),
            }),
            queue: JobQueue::new(),
        }
    }

    /// The session root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.inner.store.root()
    }

    /// Whether [`Session::initialize`] has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// The last published projection.
    #[must_use]
    pub fn projection(&self) -> Arc<Projection> {
        self.inner.notifier.current()
    }

    /// Current head, `None` before the first save.
    #[must_use]
    pub fn head(&self) -> Option<SnapshotId> {
        self.projection().head.clone()
    }

    /// Register a change listener. It is called right away with
    /// [`Notification::Invalidate`].
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Projection, &Notification) + Send + Sync + 'static,
    {
        self.inner.notifier.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.notifier.unsubscribe(id)
    }

    fn job<T, F>(&self, name: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner<S>) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.queue.run(name, move || f(inner.as_ref()))?
    }

    /// Open (creating if needed) the store and load the projection for the
    /// configured timeline.
    ///
    /// # Errors
    /// [`HistoryError::ForeignCheckout`] if the timeline exists but `HEAD` is
    /// attached to another branch and `checkout_existing_branch` is off.
    /// Otherwise fails if a store command fails or the loaded history is
    /// inconsistent.
    pub fn initialize(&self) -> Result<()> {
        self.job("initialize", |inner| inner.initialize())
    }

    /// Rebuild the projection from the store, discarding the cached one.
    ///
    /// This is the recovery path after an internal consistency error.
    ///
    /// # Errors
    /// Same as [`Session::initialize`].
    pub fn reload(&self) -> Result<()> {
        self.job("reload", |inner| {
            inner.ensure_ready()?;
            let branch = inner.notifier.current().branch.clone();
            let projection = inner.load_projection(&branch)?;
            inner.notifier.publish(projection, &Notification::Invalidate);
            Ok(())
        })
    }

    /// Record the working directory as a new snapshot at the tip.
    ///
    /// `hook` runs in the session root before files are staged; if it fails
    /// nothing is committed.
    ///
    /// # Errors
    /// Fails on a hook error or a store failure other than "nothing to commit",
    /// and with [`HistoryError::InternalConsistency`] when `HEAD` is not
    /// attached to the active timeline.
    pub fn save(&self, hook: Option<SaveHook>) -> Result<SaveOutcome> {
        self.job("save", move |inner| inner.save(hook))
    }

    /// Check out `id`. Checking out the timeline tip re-attaches head to the
    /// timeline; any other snapshot is checked out detached.
    ///
    /// # Errors
    /// [`HistoryError::UnknownSnapshot`] if `id` is not on the active timeline.
    pub fn restore(&self, id: &SnapshotId) -> Result<()> {
        let id = id.clone();
        self.job("restore", move |inner| inner.restore(&id))
    }

    /// Step head one snapshot toward the tip. `None` when already there.
    ///
    /// # Errors
    /// [`HistoryError::InternalConsistency`] if head is not on the timeline.
    pub fn next(&self) -> Result<Option<SnapshotId>> {
        self.job("restore_to_next", |inner| inner.step(Direction::Forward))
    }

    /// Step head one snapshot back. `None` at the first snapshot.
    ///
    /// # Errors
    /// [`HistoryError::InternalConsistency`] if head is not on the timeline.
    pub fn previous(&self) -> Result<Option<SnapshotId>> {
        self.job("restore_to_previous", |inner| inner.step(Direction::Backward))
    }

    /// Fork a new timeline `name` at `id` and make it active.
    ///
    /// # Errors
    /// [`HistoryError::UnknownSnapshot`], [`HistoryError::BranchExists`], or a
    /// store failure.
    pub fn branch_from(&self, id: &SnapshotId, name: &str) -> Result<()> {
        let id = id.clone();
        let name = name.to_owned();
        self.job("create_branch", move |inner| inner.branch_from(&id, &name))
    }

    /// Make an existing timeline active.
    ///
    /// # Errors
    /// [`HistoryError::UnknownBranch`] if `name` does not exist.
    pub fn switch_branch(&self, name: &str) -> Result<()> {
        let name = name.to_owned();
        self.job("switch_branch", move |inner| inner.switch_branch(&name))
    }

    /// Discard every snapshot after `id` on the active timeline.
    ///
    /// # Errors
    /// [`HistoryError::UnknownSnapshot`] if `id` is not on the active timeline.
    pub fn revert_to(&self, id: &SnapshotId) -> Result<()> {
        let id = id.clone();
        self.job("revert_to_commit", move |inner| inner.revert_to(&id))
    }

    /// Start a section at `id` labelled `label`.
    ///
    /// # Errors
    /// [`HistoryError::InvalidLabel`] if the label has no usable characters.
    pub fn create_annotation(&self, id: &SnapshotId, label: &str) -> Result<Annotation> {
        let id = id.clone();
        let label = label.to_owned();
        self.job("create_annotation", move |inner| {
            inner.create_annotation(&id, &label)
        })
    }

    /// Where the last hunk of `id`'s diff lands in the old and new text.
    ///
    /// # Errors
    /// Fails if `id` is unknown or its diff does not parse.
    pub fn change_range(&self, id: &SnapshotId) -> Result<Option<ChangeRange>> {
        let id = id.clone();
        self.job("change_range", move |inner| {
            inner.ensure_ready()?;
            if !inner.notifier.current().snapshots.contains_key(&id) {
                return Err(unknown(&id));
            }
            let diff = inner.store.diff(&id)?;
            compute_change_ranges(&diff)
        })
    }

    /// Whether tracked files were edited since head.
    ///
    /// # Errors
    /// Fails if the status command fails.
    pub fn has_unsaved_changes(&self) -> Result<bool> {
        self.job("status", |inner| {
            let status = inner.store.status()?;
            Ok(has_modifications(&status))
        })
    }

    /// First snapshot of the section containing `id`.
    #[must_use]
    pub fn section_start(&self, id: &SnapshotId) -> Option<SnapshotId> {
        self.projection().section_start(id).cloned()
    }

    #[must_use]
    pub fn section_commit_count(&self, id: &SnapshotId) -> usize {
        self.projection().section_commit_count(id)
    }

    #[must_use]
    pub fn is_head_in_section(&self, id: &SnapshotId) -> bool {
        self.projection().is_head_in_section(id)
    }

    #[must_use]
    pub fn step_number_of_head(&self, id: &SnapshotId) -> Option<usize> {
        self.projection().step_number_of_head(id)
    }

    #[must_use]
    pub fn sections(&self) -> Vec<Section> {
        self.projection().sections()
    }
}

#[derive(Clone, Copy, Debug)]
enum Direction {
    Forward,
    Backward,
}

fn unknown(id: &SnapshotId) -> HistoryError {
    HistoryError::UnknownSnapshot { id: id.to_string() }
}

impl<S: HistoryStore> Inner<S> {
    fn ensure_ready(&self) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(HistoryError::NotInitialized)
        }
    }

    fn initialize(&self) -> Result<()> {
        let branch = self.settings.branch.as_str();
        let _span = info_span!("initialize", branch).entered();

        if !self.store.exists() {
            info!(root = %self.store.root().display(), "creating store");
            self.store.create()?;
        }

        match self.store.resolve_ref(branch)? {
            None if self.store.resolve_ref("HEAD")?.is_none() => {
                debug!("unborn history; pointing HEAD at the timeline");
                self.store.create_unborn_timeline(branch)?;
            }
            None => {
                info!("creating timeline at current head");
                self.store.create_timeline(branch)?;
            }
            Some(_) if self.settings.checkout_existing_branch => {
                self.store.switch_timeline(branch)?;
            }
            Some(_) => match self.store.checked_out_timeline()? {
                Some(other) if other != branch => {
                    return Err(HistoryError::ForeignCheckout {
                        timeline: branch.to_owned(),
                        checked_out: other,
                    });
                }
                _ => debug!("trusting current checkout"),
            },
        }

        let projection = self.load_projection(branch)?;
        info!(
            snapshots = projection.ordered_ids.len(),
            sections = projection.annotations.len(),
            "session loaded"
        );
        self.ready.store(true, Ordering::Release);
        self.notifier.publish(projection, &Notification::Invalidate);
        Ok(())
    }

    fn load_projection(&self, branch: &str) -> Result<Projection> {
        let head = self.store.resolve_ref("HEAD")?;
        let branch_head = self.store.resolve_ref(branch)?;
        let snapshots = self
            .store
            .log(branch)?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        let ordered_ids = self.store.ordered_ids(branch)?;
        let projection = Projection {
            snapshots,
            ordered_ids,
            head,
            branch_head,
            branch: branch.to_owned(),
            annotations: self.load_annotations()?,
        };
        projection.check_invariants()?;
        Ok(projection)
    }

    /// Markers are listed oldest first, so a later marker on the same
    /// snapshot replaces an earlier one.
    fn load_annotations(&self) -> Result<HashMap<SnapshotId, Annotation>> {
        let mut annotations = HashMap::new();
        for name in self.store.list_markers()? {
            if let Some(annotation) = self.store.show_marker(&name)? {
                annotations.insert(annotation.snapshot_id.clone(), annotation);
            }
        }
        Ok(annotations)
    }

    fn save(&self, hook: Option<SaveHook>) -> Result<SaveOutcome> {
        self.ensure_ready()?;
        let current = self.notifier.current();
        if !current.is_at_tip() {
            info!("head is behind the timeline tip; not saving");
            return Ok(SaveOutcome::NotAtTip);
        }
        // A commit only extends the timeline when HEAD is attached to it.
        if self.store.checked_out_timeline()?.as_deref() != Some(current.branch.as_str()) {
            return Err(HistoryError::InternalConsistency {
                id: "HEAD".to_owned(),
                context: format!("HEAD is not attached to timeline `{}`", current.branch),
            });
        }
        if let Some(hook) = hook {
            hook(self.store.root())?;
        }
        if !self.store.commit_all(&self.settings.commit_message)? {
            return Ok(SaveOutcome::NothingToCommit);
        }

        let id = self
            .store
            .resolve_ref("HEAD")?
            .ok_or_else(|| HistoryError::InternalConsistency {
                id: "HEAD".to_owned(),
                context: "HEAD unresolvable after commit".to_owned(),
            })?;
        if self.store.resolve_ref(&current.branch)?.as_ref() != Some(&id) {
            return Err(HistoryError::InternalConsistency {
                id: id.to_string(),
                context: format!("timeline `{}` did not move to the new snapshot", current.branch),
            });
        }
        let snapshot = self.store.show(&id)?;

        let mut next = (*current).clone();
        next.snapshots.insert(id.clone(), snapshot);
        next.ordered_ids.push(id.clone());
        let previous = next.head.replace(id.clone());
        next.branch_head = Some(id.clone());

        info!(id = %id.short(), step = next.ordered_ids.len(), "snapshot saved");
        self.notifier.publish(
            next,
            &Notification::Changed(vec![
                ChangedEntry::Snapshot { id: id.clone() },
                ChangedEntry::Head {
                    previous,
                    current: id.clone(),
                },
            ]),
        );
        Ok(SaveOutcome::Saved(id))
    }

    fn restore(&self, id: &SnapshotId) -> Result<()> {
        self.ensure_ready()?;
        let current = self.notifier.current();
        if current.index_of(id).is_none() {
            return Err(unknown(id));
        }
        if current.branch_head.as_ref() == Some(id) {
            self.store.checkout_branch(&current.branch)?;
        } else {
            self.store.checkout_detached(id)?;
        }

        let mut next = (*current).clone();
        let previous = next.head.replace(id.clone());
        debug!(id = %id.short(), "head restored");
        self.notifier.publish(
            next,
            &Notification::Changed(vec![ChangedEntry::Head {
                previous,
                current: id.clone(),
            }]),
        );
        Ok(())
    }

    fn step(&self, direction: Direction) -> Result<Option<SnapshotId>> {
        self.ensure_ready()?;
        let current = self.notifier.current();
        let Some(index) = current.head_index()? else {
            return Ok(None);
        };
        let target = match direction {
            Direction::Forward => current.ordered_ids.get(index + 1),
            Direction::Backward => index
                .checked_sub(1)
                .and_then(|i| current.ordered_ids.get(i)),
        };
        let Some(target) = target.cloned() else {
            debug!(?direction, "already at the end of the timeline");
            return Ok(None);
        };
        self.restore(&target)?;
        Ok(Some(target))
    }

    fn branch_from(&self, id: &SnapshotId, name: &str) -> Result<()> {
        self.ensure_ready()?;
        let current = self.notifier.current();
        let index = current.index_of(id).ok_or_else(|| unknown(id))?;
        if self.store.resolve_ref(name)?.is_some() {
            return Err(HistoryError::BranchExists {
                name: name.to_owned(),
            });
        }
        self.store.checkout_detached(id)?;
        self.store.create_timeline(name)?;

        let mut next = (*current).clone();
        next.ordered_ids.truncate(index + 1);
        next.head = Some(id.clone());
        next.branch_head = Some(id.clone());
        next.branch = name.to_owned();
        info!(branch = name, at = %id.short(), "timeline forked");
        self.notifier.publish(next, &Notification::Invalidate);
        Ok(())
    }

    fn switch_branch(&self, name: &str) -> Result<()> {
        self.ensure_ready()?;
        let tip = self
            .store
            .resolve_ref(name)?
            .ok_or_else(|| HistoryError::UnknownBranch {
                name: name.to_owned(),
            })?;
        self.store.switch_timeline(name)?;

        let current = self.notifier.current();
        let mut next = (*current).clone();
        let ordered_ids = self.store.ordered_ids(name)?;
        if ordered_ids.iter().any(|id| !next.snapshots.contains_key(id)) {
            for snapshot in self.store.log(name)? {
                next.snapshots.entry(snapshot.id.clone()).or_insert(snapshot);
            }
        }
        next.ordered_ids = ordered_ids;
        next.head = self.store.resolve_ref("HEAD")?;
        next.branch_head = Some(tip);
        next.branch = name.to_owned();
        next.check_invariants()?;

        info!(branch = name, snapshots = next.ordered_ids.len(), "timeline switched");
        self.notifier.publish(next, &Notification::Invalidate);
        Ok(())
    }

    fn revert_to(&self, id: &SnapshotId) -> Result<()> {
        self.ensure_ready()?;
        let current = self.notifier.current();
        let index = current.index_of(id).ok_or_else(|| unknown(id))?;
        // reset moves whatever HEAD points at; attach it to the timeline first.
        self.store.checkout_branch(&current.branch)?;
        self.store.reset_hard(id)?;

        let mut next = (*current).clone();
        let dropped = next.ordered_ids.len() - (index + 1);
        next.ordered_ids.truncate(index + 1);
        next.head = Some(id.clone());
        next.branch_head = Some(id.clone());
        if dropped > 0 {
            warn!(dropped, to = %id.short(), "discarded snapshots after revert");
        }
        self.notifier.publish(next, &Notification::Invalidate);
        Ok(())
    }

    fn create_annotation(&self, id: &SnapshotId, label: &str) -> Result<Annotation> {
        self.ensure_ready()?;
        let current = self.notifier.current();
        if !current.snapshots.contains_key(id) {
            return Err(unknown(id));
        }
        let name = slugify(label).ok_or_else(|| HistoryError::InvalidLabel {
            label: label.to_owned(),
        })?;
        self.store.create_marker(&name, id, label)?;
        // git normalizes the message; keep what it stored.
        let annotation = self
            .store
            .show_marker(&name)?
            .filter(|annotation| annotation.snapshot_id == *id)
            .ok_or_else(|| HistoryError::InternalConsistency {
                id: id.to_string(),
                context: format!("marker `{name}` does not point at the annotated snapshot"),
            })?;
        let mut next = (*current).clone();
        next.annotations.insert(id.clone(), annotation.clone());
        info!(marker = %annotation.name, at = %id.short(), "section started");
        self.notifier.publish(
            next,
            &Notification::Changed(vec![ChangedEntry::Annotation { id: id.clone() }]),
        );
        Ok(annotation)
    }
}
