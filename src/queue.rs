//! Serialized job execution.
//!
//! A [`JobQueue`] guarantees that at most one job body runs at a time and
//! that jobs run in submission order. It holds a pending list and a single
//! `running` flag: enqueueing on an idle queue starts a drain thread that
//! runs jobs until the pending list is empty, then returns the queue to idle.
//!
//! A failing job does not stop the queue. Its error (or panic) goes to the
//! caller holding that job's [`JobHandle`]; the next job runs regardless.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a job produced no result.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The job body panicked. The queue kept going.
    #[error("job `{name}` panicked: {message}")]
    Panicked {
        /// The name the job was enqueued under.
        name: String,
        /// The panic payload, if it was a string.
        message: String,
    },
    /// The drain thread could not be started.
    #[error("could not start job runner: {0}")]
    Spawn(String),
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<(String, Job)>,
    running: bool,
}

/// FIFO queue that runs one job at a time on a background drain thread.
#[derive(Clone, Default)]
pub struct JobQueue {
    state: Arc<Mutex<QueueState>>,
}

/// Receives the result of one enqueued job.
#[must_use = "a job's result is only observable through its handle"]
pub struct JobHandle<T> {
    name: String,
    rx: Receiver<Result<T, QueueError>>,
}

impl<T> JobHandle<T> {
    /// Block until the job has run and return its result.
    ///
    /// # Errors
    /// Returns [`QueueError::Panicked`] if the job panicked before producing
    /// a value.
    pub fn wait(self) -> Result<T, QueueError> {
        self.rx.recv().unwrap_or_else(|_| {
            Err(QueueError::Panicked {
                name: self.name,
                message: "job dropped without a result".to_owned(),
            })
        })
    }
}

impl JobQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a drain loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Number of jobs waiting behind the one currently running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Submit `job` under `name`. It runs after every previously submitted job.
    pub fn enqueue<T, F>(&self, name: &str, job: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx): (Sender<Result<T, QueueError>>, _) = bounded(1);
        let job_name = name.to_owned();
        let wrapped: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(job)).map_err(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_owned());
                error!(job = %job_name, %message, "job panicked");
                QueueError::Panicked {
                    name: job_name.clone(),
                    message,
                }
            });
            // The caller may have dropped its handle; the job still ran.
            let _ = tx.send(outcome);
        });

        let start_drain = {
            let mut state = self.state.lock();
            state.pending.push_back((name.to_owned(), wrapped));
            trace!(job = name, pending = state.pending.len(), "job enqueued");
            !std::mem::replace(&mut state.running, true)
        };

        if start_drain {
            let state = Arc::clone(&self.state);
            let spawned = thread::Builder::new()
                .name("stepwise-jobs".to_owned())
                .spawn(move || drain(&state));
            if let Err(e) = spawned {
                // Nothing is draining: fail every pending job instead of
                // leaving its caller blocked.
                let failed = {
                    let mut state = self.state.lock();
                    state.running = false;
                    std::mem::take(&mut state.pending)
                };
                error!(error = %e, jobs = failed.len(), "could not start job runner");
                drop(failed);
                return JobHandle {
                    name: name.to_owned(),
                    rx: closed_with(QueueError::Spawn(e.to_string())),
                };
            }
        }

        JobHandle {
            name: name.to_owned(),
            rx,
        }
    }

    /// Submit `job` and block until it has run.
    ///
    /// # Errors
    /// See [`JobHandle::wait`].
    pub fn run<T, F>(&self, name: &str, job: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.enqueue(name, job).wait()
    }
}

fn closed_with<T>(err: QueueError) -> Receiver<Result<T, QueueError>> {
    let (tx, rx) = bounded(1);
    let _ = tx.send(Err(err));
    rx
}

/// Run pending jobs one at a time until the list is empty.
fn drain(state: &Mutex<QueueState>) {
    loop {
        let next = {
            let mut guard = state.lock();
            if let Some(job) = guard.pending.pop_front() {
                job
            } else {
                guard.running = false;
                return;
            }
        };
        let (name, job) = next;
        debug!(job = %name, "job started");
        job();
        debug!(job = %name, "job finished");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
