//! Framecast Core
//!
//! Core types and abstractions for the Framecast image-to-video service.
//!
//! This crate contains:
//! - Domain types: the job record, its state machine and artifact locators
//! - DTOs: Data transfer objects for inter-service communication
//! - Queue: the `JobQueue` contract and an in-memory implementation
//! - Metrics: job lifecycle counters, gauge and histogram

pub mod domain;
pub mod dto;
pub mod metrics;
pub mod queue;
