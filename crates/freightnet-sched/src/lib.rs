//! Freightnet Sched -- budgeted, multi-threaded recomputation of the
//! cargo-distribution demand engine.
//!
//! The scheduler owns a set of graph components and periodically recomputes
//! each one's demand assignment on background worker threads:
//!
//! 1. **Spawn** -- [`scheduler::Scheduler::spawn_next`] estimates a cost per
//!    pending component, picks as many as fit into a logarithmically scaled
//!    budget for this tick, and wraps each in a [`job::Job`] with a duration
//!    budget derived from its share of the total workload.
//! 2. **Bucket** -- [`group::execute_job_set`] packs the new jobs, sorted
//!    ascending by cost, into [`group::JobGroup`]s bounded by a per-thread
//!    cost budget, and starts one background thread per group (falling back
//!    to synchronous execution if thread spawn fails).
//! 3. **Run** -- each group's thread runs its jobs strictly sequentially
//!    through the fixed pipeline (Init, Demand, Flow-1, Flow-map, Flow-2,
//!    Flow-map), polling the abort flag between stages. The Demand stage
//!    invokes [`freightnet_core::demand::DemandCalculator`].
//! 4. **Join** -- [`scheduler::Scheduler::join_next`] detects finished jobs
//!    via a non-blocking atomic hint, performs the one blocking thread join,
//!    and re-queues surviving components as pending.
//!
//! One control thread drives spawn/join; pipeline stages execute only on
//! worker threads. A component is exclusively owned by at most one in-flight
//! job at a time, enforced by moving it into the job on spawn and back out
//! after the join.

pub mod group;
pub mod id;
pub mod job;
pub mod pipeline;
pub mod scheduler;
