//! Composition root for the quantdash client.
//!
//! [`config`] reads the environment; [`app`] wires the channel manager,
//! job tracker and notification store together.

pub mod app;
pub mod config;
