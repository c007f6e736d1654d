//! Shared domain types for the quantdash client.
//!
//! Zero internal dependencies: every other workspace crate depends on
//! this one, never the other way round.

pub mod error;
pub mod job;
pub mod job_events;
pub mod types;
