//! Job groups: batches of jobs sharing one background worker thread.
//!
//! [`execute_job_set`] packs jobs into groups bounded by a per-thread cost
//! budget. Sorting ascending by cost (not descending) deliberately packs
//! several cheap jobs together before a bucket closes, keeping thread count
//! roughly proportional to total cost rather than to job count.
//!
//! A group owns its jobs outright for its lifetime. If the host environment
//! cannot spawn a background thread, the group executes its jobs
//! synchronously on the calling thread instead of failing.

use crate::id::JobId;
use crate::job::Job;
use crate::pipeline::Pipeline;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

// ---------------------------------------------------------------------------
// JobGroup
// ---------------------------------------------------------------------------

/// A batch of jobs assigned to run sequentially on one worker thread.
#[derive(Debug)]
pub struct JobGroup {
    /// Background thread handle; `None` after the join (or when the group
    /// ran synchronously).
    handle: Option<JoinHandle<Vec<(JobId, Job)>>>,
    /// The jobs, available once the thread has been joined (immediately for
    /// the synchronous fallback).
    finished: Vec<(JobId, Job)>,
    /// Job IDs owned by this group, in execution order.
    members: Vec<JobId>,
}

impl JobGroup {
    /// Start a group: spawn a worker thread running the jobs sequentially,
    /// or run them synchronously if thread creation is unavailable.
    ///
    /// The jobs travel through a shared slot rather than being moved into
    /// the closure directly, so the spawn-failure path can reclaim them for
    /// the synchronous fallback.
    pub fn launch(jobs: Vec<(JobId, Job)>, pipeline: Arc<Pipeline>) -> Self {
        let members: Vec<JobId> = jobs.iter().map(|(id, _)| *id).collect();
        let slot = Arc::new(Mutex::new(Some(jobs)));
        let builder = thread::Builder::new().name("freightnet-worker".into());
        let spawned = builder.spawn({
            let slot = Arc::clone(&slot);
            let pipeline = Arc::clone(&pipeline);
            move || {
                let jobs = take_slot(&slot);
                run_jobs(jobs, &pipeline)
            }
        });
        match spawned {
            Ok(handle) => Self {
                handle: Some(handle),
                finished: Vec::new(),
                members,
            },
            Err(_spawn_failed) => {
                // Synchronous fallback on the calling thread.
                let jobs = take_slot(&slot);
                Self {
                    handle: None,
                    finished: run_jobs(jobs, &pipeline),
                    members,
                }
            }
        }
    }

    /// Launch, but force the synchronous path (also used when thread spawn
    /// fails). Jobs are finished by the time this returns.
    pub fn launch_synchronous(jobs: Vec<(JobId, Job)>, pipeline: &Pipeline) -> Self {
        let members: Vec<JobId> = jobs.iter().map(|(id, _)| *id).collect();
        Self {
            handle: None,
            finished: run_jobs(jobs, pipeline),
            members,
        }
    }

    pub fn members(&self) -> &[JobId] {
        &self.members
    }

    /// Blocking join of the worker thread. Idempotent: later calls (for the
    /// remaining jobs of the same group) find the thread already joined.
    /// A panicking worker is re-raised here -- loud failure over silently
    /// dropping a component's demand.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(jobs) => self.finished = jobs,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
    }

    /// Take one finished job out of the group. Only valid after [`join`].
    ///
    /// [`join`]: JobGroup::join
    pub fn take_job(&mut self, id: JobId) -> Option<Job> {
        debug_assert!(self.handle.is_none(), "take_job before join");
        let index = self.finished.iter().position(|(jid, _)| *jid == id)?;
        Some(self.finished.swap_remove(index).1)
    }

    /// True once every job has been taken out.
    pub fn is_drained(&self) -> bool {
        self.handle.is_none() && self.finished.is_empty()
    }
}

/// Empty the launch slot. Exactly one of the worker thread and the
/// spawn-failure path gets here, so the slot is always still full.
fn take_slot(slot: &Mutex<Option<Vec<(JobId, Job)>>>) -> Vec<(JobId, Job)> {
    slot.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
        .unwrap_or_default()
}

/// Worker entry point: run each job's pipeline strictly sequentially.
fn run_jobs(mut jobs: Vec<(JobId, Job)>, pipeline: &Pipeline) -> Vec<(JobId, Job)> {
    for (_, job) in &mut jobs {
        job.run_pipeline(pipeline);
    }
    jobs
}

// ---------------------------------------------------------------------------
// Bucketing
// ---------------------------------------------------------------------------

/// Pack (job, cost) pairs into buckets bounded by the per-thread cost
/// budget: sort ascending by cost, accumulate until adding the next job
/// would exceed the budget, flush, continue; flush the remainder. A single
/// job dearer than the whole budget gets a bucket of its own.
pub(crate) fn bucket_by_cost(
    mut jobs: Vec<(JobId, Job, u64)>,
    cost_budget: u64,
) -> Vec<Vec<(JobId, Job)>> {
    jobs.sort_by_key(|&(_, _, cost)| cost);
    let mut buckets: Vec<Vec<(JobId, Job)>> = Vec::new();
    let mut bucket: Vec<(JobId, Job)> = Vec::new();
    let mut used: u64 = 0;
    for (id, job, cost) in jobs {
        if !bucket.is_empty() && used + cost > cost_budget {
            buckets.push(std::mem::take(&mut bucket));
            used = 0;
        }
        used += cost;
        bucket.push((id, job));
    }
    if !bucket.is_empty() {
        buckets.push(bucket);
    }
    buckets
}

/// Bucket a batch of new jobs and launch one [`JobGroup`] per bucket.
pub fn execute_job_set(
    jobs: Vec<(JobId, Job, u64)>,
    pipeline: &Arc<Pipeline>,
    cost_budget: u64,
) -> Vec<JobGroup> {
    bucket_by_cost(jobs, cost_budget)
        .into_iter()
        .map(|bucket| JobGroup::launch(bucket, Arc::clone(pipeline)))
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================
