//! In-memory job queue
//!
//! Used by tests and by single-node deployments without a database. All
//! state sits behind one mutex, which makes every operation atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use super::{JobQueue, NewJob, QueueError, lease_deadline};
use crate::domain::job::{FailureOutcome, JobFailure, JobOutput, JobRecord};

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, JobRecord>,
    /// Pending jobs ordered by position
    pending: BTreeMap<i64, Uuid>,
    /// Last position drawn by each live job, kept while it is leased
    positions: HashMap<Uuid, i64>,
    next_position: i64,
}

impl State {
    /// Draws a fresh position at the tail
    fn push_back(&mut self, id: Uuid) {
        let position = self.next_position;
        self.next_position += 1;
        self.positions.insert(id, position);
        self.pending.insert(position, id);
    }

    /// Puts a job back at the position it last drew
    fn restore(&mut self, id: Uuid) {
        match self.positions.get(&id) {
            Some(&position) => {
                self.pending.insert(position, id);
            }
            None => self.push_back(id),
        }
    }

    fn job_mut(&mut self, id: Uuid) -> Result<&mut JobRecord, QueueError> {
        self.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))
    }
}

/// Queue backed by process memory
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of jobs waiting to be leased
    pub fn pending_len(&self) -> usize {
        self.state().pending.len()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: NewJob) -> Result<JobRecord, QueueError> {
        let mut state = self.state();
        if state.jobs.contains_key(&job.id) {
            return Err(QueueError::Duplicate(job.id));
        }

        let record = JobRecord::new(
            job.id,
            job.input_ref,
            job.output_ref,
            job.original_filename,
            job.max_retries,
            Utc::now(),
        );
        state.jobs.insert(record.id, record.clone());
        state.push_back(record.id);
        Ok(record)
    }

    async fn lease(
        &self,
        worker_id: &str,
        lease_for: Duration,
    ) -> Result<Option<JobRecord>, QueueError> {
        let mut state = self.state();
        let Some((_, id)) = state.pending.pop_first() else {
            return Ok(None);
        };

        let now = Utc::now();
        let job = state.job_mut(id)?;
        job.start(worker_id, lease_deadline(now, lease_for), now)?;
        Ok(Some(job.clone()))
    }

    async fn renew(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_for: Duration,
    ) -> Result<JobRecord, QueueError> {
        let mut state = self.state();
        let job = state.job_mut(job_id)?;
        job.ensure_held_by(worker_id)?;
        job.renew(lease_deadline(Utc::now(), lease_for))?;
        Ok(job.clone())
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        output: JobOutput,
    ) -> Result<JobRecord, QueueError> {
        let mut state = self.state();
        let job = state.job_mut(job_id)?;
        job.ensure_held_by(worker_id)?;
        job.succeed(output, Utc::now())?;
        Ok(job.clone())
    }

    async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        failure: JobFailure,
    ) -> Result<JobRecord, QueueError> {
        let mut state = self.state();
        let job = state.job_mut(job_id)?;
        job.ensure_held_by(worker_id)?;
        let outcome = job.record_failure(&failure, Utc::now())?;
        let record = job.clone();

        if let FailureOutcome::Requeued { .. } = outcome {
            state.push_back(job_id);
        }
        Ok(record)
    }

    async fn release(&self, job_id: Uuid, worker_id: &str) -> Result<JobRecord, QueueError> {
        let mut state = self.state();
        let job = state.job_mut(job_id)?;
        job.ensure_held_by(worker_id)?;
        job.release()?;
        let record = job.clone();

        // A released job keeps its turn
        state.restore(job_id);
        Ok(record)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>, QueueError> {
        Ok(self.state().jobs.get(&job_id).cloned())
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>, QueueError> {
        let mut state = self.state();
        let expired: Vec<Uuid> = state
            .jobs
            .values()
            .filter(|job| job.lease_expired(now))
            .map(|job| job.id)
            .collect();

        let mut reclaimed = Vec::with_capacity(expired.len());
        for id in expired {
            let job = state.job_mut(id)?;
            let outcome = job.record_failure(&JobFailure::lease_expired(), now)?;
            reclaimed.push(job.clone());
            if let FailureOutcome::Requeued { .. } = outcome {
                state.push_back(id);
            }
        }
        Ok(reclaimed)
    }

    async fn purge_terminal(&self, before: DateTime<Utc>) -> Result<Vec<JobRecord>, QueueError> {
        let mut state = self.state();
        let purgeable: Vec<Uuid> = state
            .jobs
            .values()
            .filter(|job| {
                job.status.is_terminal() && job.completed_at.is_some_and(|at| at < before)
            })
            .map(|job| job.id)
            .collect();

        Ok(purgeable
            .into_iter()
            .filter_map(|id| {
                state.positions.remove(&id);
                state.jobs.remove(&id)
            })
            .collect())
    }
}

#[cfg(test)]
impl MemoryQueue {
    /// Ids of jobs in the given status, in no particular order
    pub fn ids_with_status(&self, status: crate::domain::job::JobStatus) -> Vec<Uuid> {
        self.state()
            .jobs
            .values()
            .filter(|job| job.status == status)
            .map(|job| job.id)
            .collect()
    }
}
