//! Service Layer
//!
//! Business logic between the HTTP handlers and the queue.

pub mod job;
pub mod retention;
pub mod worker;
