//! Repository layer
//!
//! Repositories abstract the worker's side of the queue protocol. They carry
//! no business logic: the retry decision stays with the queue, and errors are
//! only classified as worth retrying or not.
//!
//! All repositories are trait-based to enable testing and mocking.

mod jobs;

pub use jobs::{HttpJobRepository, JobRepository, RepositoryError};

#[cfg(test)]
pub(crate) use jobs::LocalJobRepository;
