//! Scheduler layer for the runner
//!
//! This layer leases jobs from the queue one at a time and drives each one
//! through the execution pipeline with the worker's model, from lease to
//! report.

mod backoff;
pub mod worker;

pub use backoff::Backoff;
pub use worker::Worker;
