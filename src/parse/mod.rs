//! Parsers that turn raw store output into domain records.

pub mod log;
pub mod marker;

pub use log::{parse_commit_log, render};
pub use marker::{parse_marker, parse_marker_list};
