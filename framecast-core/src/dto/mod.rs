//! Data Transfer Objects for inter-service communication
//!
//! DTOs exchanged between the orchestrator, the runner and API clients.

pub mod health;
pub mod job;
pub mod worker;
