//! Step-by-step playback of a timeline.
//!
//! A [`Replayer`] moves head one snapshot at a time, each move being its own
//! session job, and hands every step to a callback together with the change
//! range of the snapshot that step crosses. Raising the [`StopFlag`] or
//! reaching the step limit halts playback before the next step; steps already
//! taken stay taken.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{HistoryError, Result};
use crate::git::{GitStore, HistoryStore};
use crate::model::types::{ChangeRange, SnapshotId};
use crate::session::Session;

/// Granularity at which a sleeping replay re-checks its stop flag.
const STOP_POLL: Duration = Duration::from_millis(10);

/// Shared cancellation flag for a running replay.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Which way playback walks the timeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayDirection {
    #[default]
    Forward,
    Backward,
}

/// One completed replay step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Step {
    /// Head after the step.
    pub head: SnapshotId,
    /// 0-based position of head on the timeline.
    pub index: usize,
    /// The snapshot whose change this step applied (forward) or undid (backward).
    pub crossed: SnapshotId,
    /// Where that change sits, when its diff has a hunk.
    pub range: Option<ChangeRange>,
}

/// How a replay ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub steps: usize,
    /// `true` if the stop flag or the step limit ended playback, `false` if it
    /// ran off the timeline end.
    pub stopped: bool,
}

/// Drives a [`Session`] through its timeline.
pub struct Replayer<S: HistoryStore = GitStore> {
    session: Session<S>,
    direction: PlayDirection,
    delay: Duration,
    limit: Option<usize>,
    stop: StopFlag,
}

impl<S: HistoryStore> Replayer<S> {
    #[must_use]
    pub fn new(session: Session<S>) -> Self {
        Self {
            session,
            direction: PlayDirection::Forward,
            delay: Duration::ZERO,
            limit: None,
            stop: StopFlag::new(),
        }
    }

    #[must_use]
    pub const fn direction(mut self, direction: PlayDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Pause between steps.
    #[must_use]
    pub const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Take at most `limit` steps. `Some(0)` takes none.
    #[must_use]
    pub const fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// A handle that stops this replay when raised from any thread.
    #[must_use]
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Play until the timeline end or until the stop flag is raised.
    ///
    /// # Errors
    /// Returns the first session error; steps taken before it remain applied.
    pub fn run<F>(&self, mut on_step: F) -> Result<ReplaySummary>
    where
        F: FnMut(&Step),
    {
        let mut steps = 0;
        info!(direction = ?self.direction, "replay started");
        loop {
            if self.stop.is_raised() || self.limit.is_some_and(|limit| steps >= limit) {
                info!(steps, "replay stopped");
                return Ok(ReplaySummary {
                    steps,
                    stopped: true,
                });
            }

            let before = self.session.head();
            let moved = match self.direction {
                PlayDirection::Forward => self.session.next()?,
                PlayDirection::Backward => self.session.previous()?,
            };
            let Some(head) = moved else {
                info!(steps, "replay reached the end of the timeline");
                return Ok(ReplaySummary {
                    steps,
                    stopped: false,
                });
            };

            let crossed = match (self.direction, before) {
                (PlayDirection::Backward, Some(left)) => left,
                _ => head.clone(),
            };
            let range = self.session.change_range(&crossed)?;
            let index = self
                .session
                .projection()
                .index_of(&head)
                .ok_or_else(|| HistoryError::missing_from_timeline(&head, "replay step"))?;
            let step = Step {
                head,
                index,
                crossed,
                range,
            };
            debug!(index, head = %step.head.short(), "replay step");
            on_step(&step);
            steps += 1;

            if self.limit.is_none_or(|limit| steps < limit) {
                self.pause();
            }
        }
    }

    fn pause(&self) {
        let deadline = Instant::now() + self.delay;
        loop {
            let now = Instant::now();
            if now >= deadline || self.stop.is_raised() {
                return;
            }
            thread::sleep(STOP_POLL.min(deadline - now));
        }
    }
}
