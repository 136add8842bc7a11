//! stepwise library crate.
//!
//! Records a live-coding session as a linear timeline of snapshots in a git
//! repository and replays it step by step. The `stepwise` binary is a thin
//! adapter over [`Session`]; integration tests drive the library directly.

pub mod capture;
pub mod config;
pub mod error;
pub mod git;
pub mod model;
pub mod notify;
pub mod parse;
pub mod queue;
pub mod range;
pub mod replay;
pub mod session;
pub mod telemetry;

pub use capture::OutputCapture;
pub use config::StepwiseConfig;
pub use error::{HistoryError, Result};
pub use model::projection::{Projection, Section};
pub use model::types::{Annotation, ChangeRange, Position, Snapshot, SnapshotId, Span};
pub use notify::{ChangedEntry, Notification, SubscriptionId};
pub use replay::{PlayDirection, Replayer, StopFlag};
pub use session::{SaveHook, SaveOutcome, Session};
