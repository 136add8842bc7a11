//! Process layer and command catalog for the git backing store.
//!
//! - [`cli`] spawns `git` and classifies failures ([`ProcessError`], [`FailureKind`]).
//! - [`store`] defines the [`HistoryStore`] trait and its [`GitStore`] implementation.

pub mod cli;
pub mod store;

pub use cli::{FailureKind, GitCli, ProcessError};
pub use store::{GitStore, HistoryStore, has_modifications};
