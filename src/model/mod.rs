//! Session data model: snapshot records and the cached projection.

pub mod projection;
pub mod types;
