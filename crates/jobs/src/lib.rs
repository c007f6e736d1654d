//! Client-side job registry and tracking.
//!
//! - [`JobRegistry`] -- the session's store of analysis jobs, mutated by
//!   push-channel messages and observable through a broadcast channel.
//! - [`AnalysisApi`] -- HTTP client for starting jobs.
//! - [`JobTracker`] -- starts a job, registers it, and wires its
//!   progress subscription into the registry.

pub mod api;
pub mod registry;
pub mod tracker;

pub use api::{AnalysisApi, AnalysisApiError, JobStarter, StartJobResponse};
pub use registry::{ApplyOutcome, JobRegistry, RegistryEvent};
pub use tracker::{JobTracker, TrackerError};
