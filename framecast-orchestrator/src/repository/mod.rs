//! Repository Layer
//!
//! Durable queue backend. The in-memory backend lives in `framecast-core`.

pub mod job;

pub use job::PgJobQueue;
