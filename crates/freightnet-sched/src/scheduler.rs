//! The scheduler: decides which pending components to recompute each tick,
//! budgets their execution, and later joins the finished jobs.
//!
//! The scheduler is an explicitly constructed, explicitly passed instance --
//! dependency-injected into the host's tick loop -- with [`Scheduler::clear`]
//! as the reset path. There is no hidden global state; "exactly one active
//! schedule" is an ownership property.
//!
//! An external per-tick caller decides when to invoke
//! [`Scheduler::spawn_next`] vs [`Scheduler::join_next`] (typically on
//! alternating halves of the recompute interval); that trigger logic lives
//! outside this crate.

use crate::group::{JobGroup, execute_job_set};
use crate::id::{ComponentId, GroupId, JobId};
use crate::job::{Job, JobFlags};
use crate::pipeline::Pipeline;
use freightnet_core::component::LinkComponent;
use freightnet_core::settings::{DistributionSettings, SettingsError, Ticks};
use slotmap::SlotMap;
use std::collections::VecDeque;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Errors and reports
// ---------------------------------------------------------------------------

/// Errors produced by the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The job pool is exhausted. Fatal by design: there is no backpressure
    /// path for job-object exhaustion, so this indicates a configuration
    /// error (pool too small), not a recoverable condition.
    #[error("job pool exhausted: {running} jobs in flight, capacity {capacity}")]
    JobPoolExhausted { running: usize, capacity: usize },
}

/// What one [`Scheduler::spawn_next`] call did, for host-side diagnostics.
#[derive(Debug, Clone, Default)]
pub struct SpawnReport {
    /// Jobs created this tick.
    pub jobs_started: usize,
    /// Job groups (worker threads) started this tick.
    pub groups_spawned: usize,
    /// The cost budget granted for this tick.
    pub cost_budget: u64,
    /// The cost actually consumed. May overshoot the budget by at most the
    /// cost of the single component that crossed the threshold.
    pub used_budget: u64,
    /// Components too small to schedule, recycled to the back of the queue.
    pub recycled_small: usize,
}

// ---------------------------------------------------------------------------
// Cost model
// ---------------------------------------------------------------------------

/// Estimated recomputation cost of a component: super-linear in the node
/// count (`n^2 * (1 + floor(log2 n))`), so a handful of huge components
/// dominates any flood of cheap ones.
pub fn component_cost(node_count: usize) -> u64 {
    let n = node_count as u64;
    if n == 0 {
        return 0;
    }
    n * n * (1 + n.ilog2() as u64)
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Control-thread bookkeeping for one in-flight job.
#[derive(Debug)]
struct JobHandle {
    /// Flags shared with the worker-side job.
    flags: Arc<JobFlags>,
    /// The group whose thread runs this job. Set right after bucketing.
    group: Option<GroupId>,
    /// Tick after which this job is expected to be joinable.
    join_due: Ticks,
    /// The cost estimate the job was scheduled under.
    cost: u64,
}

/// Owns the pending components and the running jobs, and drives the
/// spawn/join cycle. `spawn_next` and `join_next` execute only on the
/// control thread; pipeline stages execute only on worker threads.
#[derive(Debug)]
pub struct Scheduler {
    settings: Arc<DistributionSettings>,
    pipeline: Arc<Pipeline>,
    /// Components not currently owned by a job.
    components: SlotMap<ComponentId, LinkComponent>,
    /// Pending queue, front = next to schedule.
    pending: VecDeque<ComponentId>,
    /// In-flight jobs.
    jobs: SlotMap<JobId, JobHandle>,
    /// Live job groups (one worker thread each).
    groups: SlotMap<GroupId, JobGroup>,
    /// Running jobs ordered ascending by `join_due`, so only the front needs
    /// inspection for completion checks.
    running: VecDeque<JobId>,
}

impl Scheduler {
    /// Construct a scheduler with the standard pipeline.
    pub fn new(settings: DistributionSettings) -> Result<Self, SettingsError> {
        let settings = Arc::new(settings);
        let pipeline = Arc::new(Pipeline::standard(Arc::clone(&settings)));
        Self::with_pipeline_arc(settings, pipeline)
    }

    /// Construct a scheduler with a custom pipeline (hosts that supply a
    /// real flow solver).
    pub fn with_pipeline(
        settings: DistributionSettings,
        pipeline: Pipeline,
    ) -> Result<Self, SettingsError> {
        Self::with_pipeline_arc(Arc::new(settings), Arc::new(pipeline))
    }

    fn with_pipeline_arc(
        settings: Arc<DistributionSettings>,
        pipeline: Arc<Pipeline>,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self {
            settings,
            pipeline,
            components: SlotMap::with_key(),
            pending: VecDeque::new(),
            jobs: SlotMap::with_key(),
            groups: SlotMap::with_key(),
            running: VecDeque::new(),
        })
    }

    pub fn settings(&self) -> &DistributionSettings {
        &self.settings
    }

    /// Enqueue a component for recomputation.
    pub fn queue_component(&mut self, component: LinkComponent) -> ComponentId {
        let id = self.components.insert(component);
        self.pending.push_back(id);
        id
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    /// The pending components in queue order.
    pub fn pending_components(&self) -> impl Iterator<Item = &LinkComponent> {
        self.pending.iter().map(|&id| &self.components[id])
    }

    // -----------------------------------------------------------------------
    // Spawn
    // -----------------------------------------------------------------------

    /// Start as many pending components as fit into this tick's cost budget.
    ///
    /// The budget is `total_cost / (1 + floor(log2 total_cost))` over all
    /// pending and running work: without it, a flood of cheap components
    /// could starve a huge one indefinitely, or a huge component could
    /// monopolize every tick. The loop may overshoot the budget by at most
    /// one component's cost.
    ///
    /// On [`SchedulerError::JobPoolExhausted`] the scheduler state is not
    /// rolled back; the error is fatal by policy.
    pub fn spawn_next(&mut self, now: Ticks) -> Result<SpawnReport, SchedulerError> {
        let mut report = SpawnReport::default();

        // Partition pending into too-small (recycled untouched) and real.
        let mut small: Vec<ComponentId> = Vec::new();
        let mut real: Vec<(ComponentId, u64)> = Vec::new();
        while let Some(id) = self.pending.pop_front() {
            let size = self.components[id].size();
            if size < 2 {
                small.push(id);
            } else {
                real.push((id, component_cost(size)));
            }
        }

        let running_cost: u64 = self.running.iter().map(|&j| self.jobs[j].cost).sum();
        let total_cost = real.iter().map(|&(_, c)| c).sum::<u64>() + running_cost;

        let mut batch: Vec<(JobId, Job, u64)> = Vec::new();
        if total_cost > 0 && !real.is_empty() {
            let scaling = 1 + total_cost.ilog2() as u64;
            let cost_budget = total_cost / scaling;
            report.cost_budget = cost_budget;

            let mut used: u64 = 0;
            let mut index = 0;
            while index < real.len() && used < cost_budget {
                let (id, cost) = real[index];
                index += 1;
                used += cost;

                if self.jobs.len() >= self.settings.max_jobs {
                    return Err(SchedulerError::JobPoolExhausted {
                        running: self.jobs.len(),
                        capacity: self.settings.max_jobs,
                    });
                }

                let component = self
                    .components
                    .remove(id)
                    .expect("pending component missing from arena");
                let job = Job::new(component);
                let flags = Arc::clone(job.flags());

                // How many tick-intervals this job is nominally allowed to
                // run: its share of the total workload, scaled.
                let duration = (scaling * cost).div_ceil(total_cost);
                let join_due = now + duration * self.settings.recompute_interval;

                let job_id = self.jobs.insert(JobHandle {
                    flags,
                    group: None,
                    join_due,
                    cost,
                });
                self.insert_running(job_id, join_due);
                batch.push((job_id, job, cost));
            }
            report.used_budget = used;

            // Components that did not fit return to the front region of the
            // queue, in order.
            for &(id, _) in &real[index..] {
                self.pending.push_back(id);
            }
        } else {
            for (id, _) in real {
                self.pending.push_back(id);
            }
        }

        // Too-small components go to the end of the queue, untouched.
        report.recycled_small = small.len();
        for id in small {
            self.pending.push_back(id);
        }

        report.jobs_started = batch.len();
        if !batch.is_empty() {
            let groups = execute_job_set(batch, &self.pipeline, self.settings.thread_cost_budget);
            report.groups_spawned = groups.len();
            for group in groups {
                let members = group.members().to_vec();
                let group_id = self.groups.insert(group);
                for job_id in members {
                    self.jobs[job_id].group = Some(group_id);
                }
            }
        }
        Ok(report)
    }

    /// Insert into `running` keeping ascending `join_due` order, so the
    /// front-of-queue completion checks stay cheap.
    fn insert_running(&mut self, job_id: JobId, join_due: Ticks) {
        let position = self
            .running
            .iter()
            .position(|&j| self.jobs[j].join_due > join_due)
            .unwrap_or(self.running.len());
        self.running.insert(position, job_id);
    }

    // -----------------------------------------------------------------------
    // Join
    // -----------------------------------------------------------------------

    /// Non-blocking hint: would joining now have to wait on an unfinished
    /// job that is already past its due tick? Used by the host to pause the
    /// wider simulation loop rather than stall it. Best-effort only; the
    /// join can still briefly block if the completion signal and the actual
    /// thread exit race.
    pub fn is_join_with_unfinished_job_due(&self, now: Ticks) -> bool {
        for &job_id in &self.running {
            let job = &self.jobs[job_id];
            if job.join_due > now {
                // `running` is sorted: nothing further is due either.
                return false;
            }
            if !job.flags.is_completed() {
                return true;
            }
        }
        false
    }

    /// Join every finished job at the front of the running list: blocking
    /// thread join, then re-queue the component as pending (unless the job
    /// was aborted or the component shrank below two nodes). Returns the
    /// number of jobs joined.
    pub fn join_next(&mut self) -> usize {
        let mut joined = 0;
        while let Some(&front) = self.running.front() {
            if !self.jobs[front].flags.is_completed() {
                break;
            }
            self.running.pop_front();
            let handle = self
                .jobs
                .remove(front)
                .expect("running job missing from arena");
            let group_id = handle.group.expect("running job was never grouped");

            let job = {
                let group = self.groups.get_mut(group_id).expect("job group missing");
                // First joined job of a group reaps the thread; the rest of
                // the group finds it already joined.
                group.join();
                let job = group.take_job(front).expect("joined group lost a job");
                if group.is_drained() {
                    self.groups.remove(group_id);
                }
                job
            };
            joined += 1;

            // An aborted job is joined like any other, but its component is
            // dropped rather than re-queued.
            let component = job.into_component();
            if !handle.flags.is_aborted() && component.size() >= 2 {
                // Fresh insertion: the recycled component gets a new ID, so
                // it can never be double-scheduled.
                let id = self.components.insert(component);
                self.pending.push_back(id);
            }
        }
        joined
    }

    // -----------------------------------------------------------------------
    // Reset
    // -----------------------------------------------------------------------

    /// Request cancellation of every running job without waiting for them.
    /// The jobs still complete (quickly, skipping remaining stages) and must
    /// still be joined; their components will not be re-queued.
    pub fn abort_all(&mut self) {
        for (_, job) in &self.jobs {
            job.flags.abort();
        }
    }

    /// Abort all running jobs, reap every worker thread, and empty both
    /// lists. Used on world reset/load.
    pub fn clear(&mut self) {
        self.abort_all();
        for (_, group) in self.groups.iter_mut() {
            group.join();
        }
        self.groups.clear();
        self.jobs.clear();
        self.running.clear();
        self.pending.clear();
        self.components.clear();
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineStage, StageContext};
    use freightnet_core::id::NodeIndex;
    use freightnet_core::settings::CargoClass;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn settings() -> DistributionSettings {
        DistributionSettings {
            accuracy: 1,
            ..Default::default()
        }
    }

    fn simple_component(supply: u32, demand: u32) -> LinkComponent {
        let mut comp = LinkComponent::new(CargoClass::Freight);
        comp.add_node(supply, 0, (0, 0));
        comp.add_node(0, demand, (10, 0));
        comp
    }

    fn sized_component(nodes: usize) -> LinkComponent {
        let mut comp = LinkComponent::new(CargoClass::Freight);
        for i in 0..nodes {
            comp.add_node(5, 5, (i as i32, 0));
        }
        comp
    }

    /// Spins until `open` is raised, polling the abort flag so `clear()`
    /// can get through.
    #[derive(Debug)]
    struct GateStage {
        open: Arc<AtomicBool>,
    }

    impl PipelineStage for GateStage {
        fn name(&self) -> &'static str {
            "gate"
        }

        fn run(&self, ctx: &mut StageContext<'_>) {
            while !self.open.load(Ordering::Relaxed) {
                if ctx.abort.load(Ordering::Relaxed) {
                    return;
                }
                std::thread::yield_now();
            }
        }
    }

    fn gated_scheduler() -> (Scheduler, Arc<AtomicBool>) {
        let open = Arc::new(AtomicBool::new(false));
        let pipeline = Pipeline::new(vec![Box::new(GateStage {
            open: Arc::clone(&open),
        })]);
        let scheduler = Scheduler::with_pipeline(settings(), pipeline).unwrap();
        (scheduler, open)
    }

    /// Poll `join_next` until it reaps something, with a generous timeout.
    fn join_eventually(scheduler: &mut Scheduler) -> usize {
        for _ in 0..2000 {
            let joined = scheduler.join_next();
            if joined > 0 {
                return joined;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("job never became joinable");
    }

    // -----------------------------------------------------------------------
    // Cost model
    // -----------------------------------------------------------------------

    #[test]
    fn cost_is_superlinear() {
        assert_eq!(component_cost(0), 0);
        assert_eq!(component_cost(2), 4 * 2);
        assert!(component_cost(8) > 4 * component_cost(4) / 2);
        assert!(component_cost(100) > 50 * component_cost(2));
    }

    // -----------------------------------------------------------------------
    // Spawn
    // -----------------------------------------------------------------------

    #[test]
    fn too_small_components_are_recycled_untouched() {
        let mut scheduler = Scheduler::new(settings()).unwrap();
        let mut lone = LinkComponent::new(CargoClass::Freight);
        lone.add_node(10, 10, (0, 0));
        scheduler.queue_component(lone);

        let report = scheduler.spawn_next(0).unwrap();

        assert_eq!(report.jobs_started, 0);
        assert_eq!(report.recycled_small, 1);
        assert_eq!(scheduler.pending_len(), 1);
        assert_eq!(scheduler.running_len(), 0);
    }

    #[test]
    fn budget_overshoot_is_bounded_by_one_component() {
        let (mut scheduler, open) = gated_scheduler();
        let sizes = [4usize, 7, 12, 3, 20, 5, 9, 16, 2, 11];
        for &size in &sizes {
            scheduler.queue_component(sized_component(size));
        }

        let report = scheduler.spawn_next(0).unwrap();

        assert!(report.jobs_started > 0);
        let max_cost = sizes.iter().map(|&s| component_cost(s)).max().unwrap();
        assert!(
            report.used_budget.saturating_sub(report.cost_budget) < max_cost,
            "overshoot {} vs budget {} exceeds the largest single cost {}",
            report.used_budget,
            report.cost_budget,
            max_cost
        );
        // Not everything fits into one tick's budget.
        assert!(scheduler.pending_len() > 0);

        open.store(true, Ordering::Relaxed);
        scheduler.clear();
    }

    #[test]
    fn job_pool_exhaustion_is_an_error() {
        let mut config = settings();
        config.max_jobs = 2;
        let mut scheduler = Scheduler::new(config).unwrap();
        for _ in 0..20 {
            scheduler.queue_component(sized_component(2));
        }

        let result = scheduler.spawn_next(0);
        assert!(matches!(
            result,
            Err(SchedulerError::JobPoolExhausted { capacity: 2, .. })
        ));
        scheduler.clear();
    }

    // -----------------------------------------------------------------------
    // End-to-end: spawn, run, join, re-queue
    // -----------------------------------------------------------------------

    #[test]
    fn single_pair_component_round_trip() {
        let mut scheduler = Scheduler::new(settings()).unwrap();
        scheduler.queue_component(simple_component(100, 100));

        let report = scheduler.spawn_next(0).unwrap();
        assert_eq!(report.jobs_started, 1);
        assert_eq!(report.groups_spawned, 1);
        assert_eq!(scheduler.running_len(), 1);
        assert_eq!(scheduler.pending_len(), 0);

        assert_eq!(join_eventually(&mut scheduler), 1);
        assert_eq!(scheduler.running_len(), 0);
        assert_eq!(scheduler.pending_len(), 1);

        let comp = scheduler.pending_components().next().unwrap();
        let (a, b) = (NodeIndex(0), NodeIndex(1));
        assert_eq!(comp.node(a).demand_links()[&b], 100);
        assert_eq!(comp.node(a).undelivered_supply(), 0);
    }

    #[test]
    fn rejoined_component_can_be_scheduled_again() {
        let mut scheduler = Scheduler::new(settings()).unwrap();
        scheduler.queue_component(simple_component(50, 50));

        scheduler.spawn_next(0).unwrap();
        join_eventually(&mut scheduler);

        // Second cycle on the recycled component.
        let report = scheduler.spawn_next(100).unwrap();
        assert_eq!(report.jobs_started, 1);
        join_eventually(&mut scheduler);
        assert_eq!(scheduler.pending_len(), 1);
    }

    // -----------------------------------------------------------------------
    // Join hint
    // -----------------------------------------------------------------------

    #[test]
    fn join_hint_tracks_due_and_completion() {
        let (mut scheduler, open) = gated_scheduler();
        scheduler.queue_component(simple_component(10, 10));
        scheduler.spawn_next(0).unwrap();

        // Not due yet: the hint stays quiet even though the job is running.
        assert!(!scheduler.is_join_with_unfinished_job_due(0));

        // Well past due and still gated: the hint fires.
        let far_future = 1_000_000;
        assert!(scheduler.is_join_with_unfinished_job_due(far_future));

        // Once the job finishes, the hint clears again.
        open.store(true, Ordering::Relaxed);
        for _ in 0..2000 {
            if !scheduler.is_join_with_unfinished_job_due(far_future) {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!scheduler.is_join_with_unfinished_job_due(far_future));

        assert_eq!(scheduler.join_next(), 1);
    }

    // -----------------------------------------------------------------------
    // Abort and reset
    // -----------------------------------------------------------------------

    #[test]
    fn aborted_job_is_joined_but_not_requeued() {
        let (mut scheduler, _open) = gated_scheduler();
        scheduler.queue_component(simple_component(10, 10));
        scheduler.spawn_next(0).unwrap();

        // The gate is never opened; the abort is what lets the job finish.
        scheduler.abort_all();
        assert_eq!(join_eventually(&mut scheduler), 1);
        assert_eq!(scheduler.pending_len(), 0);
        assert_eq!(scheduler.running_len(), 0);
    }

    #[test]
    fn clear_reaps_threads_and_empties_everything() {
        let (mut scheduler, _open) = gated_scheduler();
        scheduler.queue_component(simple_component(10, 10));
        scheduler.queue_component(simple_component(20, 20));
        scheduler.spawn_next(0).unwrap();

        scheduler.clear();

        assert_eq!(scheduler.pending_len(), 0);
        assert_eq!(scheduler.running_len(), 0);
    }

    #[test]
    fn invalid_settings_rejected_at_construction() {
        let config = DistributionSettings {
            accuracy: 0,
            ..Default::default()
        };
        assert!(Scheduler::new(config).is_err());
    }
}
