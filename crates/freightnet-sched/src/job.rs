//! Jobs: the mutable state of one component's in-flight recomputation.
//!
//! A [`Job`] owns its component for the whole run. Its shared [`JobFlags`]
//! are the only state visible to the control thread while the job is on a
//! worker: an atomic completion flag read as a **non-blocking hint** (the
//! authoritative hand-off is the blocking thread join), and an abort flag
//! the control thread may set at any time, polled between pipeline stages.

use crate::pipeline::{Pipeline, StageContext};
use freightnet_core::component::LinkComponent;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Completion and abort flags shared between a job and the scheduler.
///
/// Relaxed ordering is intentional: these flags never transfer data, they
/// only avoid unnecessary blocking. All real synchronization happens through
/// the one blocking `JoinHandle::join` call.
#[derive(Debug, Default)]
pub struct JobFlags {
    completed: AtomicBool,
    aborted: AtomicBool,
}

impl JobFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set by the worker thread once every stage has run (or been skipped
    /// after an abort).
    pub fn complete(&self) {
        self.completed.store(true, Ordering::Relaxed);
    }

    /// Non-blocking completion hint.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Relaxed)
    }

    /// Request cancellation. Running stages exit between sub-steps; the job
    /// must still be joined, but its component will not be re-queued.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// The raw abort flag, for stages that poll it between sub-steps.
    pub fn abort_flag(&self) -> &AtomicBool {
        &self.aborted
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One component's in-flight recomputation. Owns the component from spawn
/// until the scheduler takes it back after the join.
#[derive(Debug)]
pub struct Job {
    component: LinkComponent,
    flags: Arc<JobFlags>,
    /// Index of the next stage to run. Diagnostic only.
    next_stage: usize,
}

impl Job {
    pub fn new(component: LinkComponent) -> Self {
        Self {
            component,
            flags: Arc::new(JobFlags::new()),
            next_stage: 0,
        }
    }

    /// The flags shared with the scheduler's bookkeeping.
    pub fn flags(&self) -> &Arc<JobFlags> {
        &self.flags
    }

    pub fn component(&self) -> &LinkComponent {
        &self.component
    }

    /// Index of the next stage to run (equals the pipeline length once the
    /// job ran to completion).
    pub fn next_stage(&self) -> usize {
        self.next_stage
    }

    /// Hand the component back after the job has been joined.
    pub fn into_component(self) -> LinkComponent {
        self.component
    }

    /// Run all pipeline stages in order, polling the abort flag between
    /// stages, then mark the job completed. Executed on a worker thread
    /// (or on the control thread in the synchronous fallback).
    pub fn run_pipeline(&mut self, pipeline: &Pipeline) {
        for stage in pipeline.stages() {
            if self.flags.is_aborted() {
                break;
            }
            stage.run(&mut StageContext {
                component: &mut self.component,
                abort: self.flags.abort_flag(),
            });
            self.next_stage += 1;
        }
        self.flags.complete();
    }
}

// ===========================================================================
// Tests
// ===========================================================================
