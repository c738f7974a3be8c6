//! Core domain types
//!
//! These types are shared between the orchestrator (which persists job
//! records and serves clients) and the runner (which executes jobs).

pub mod artifact;
pub mod job;
pub mod params;
