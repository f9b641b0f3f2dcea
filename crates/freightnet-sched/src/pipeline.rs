//! The recomputation pipeline: a fixed, ordered list of stages run against
//! one component's in-flight job.
//!
//! Stages hook in via the [`PipelineStage`] trait and receive a
//! [`StageContext`] with mutable access to the job's component. This crate
//! supplies the Init and Demand stages; the flow stages stand in for the
//! host's multi-commodity-flow solver and are consumed as opaque
//! collaborators -- hosts with a real solver build a custom pipeline via
//! [`Pipeline::new`].
//!
//! Stage order is fixed at construction and total within one job:
//! Init, Demand, Flow-pass-1, Flow-map, Flow-pass-2, Flow-map. Across
//! different jobs there is no ordering guarantee.

use freightnet_core::component::LinkComponent;
use freightnet_core::demand::DemandCalculator;
use freightnet_core::settings::DistributionSettings;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

// ---------------------------------------------------------------------------
// Stage trait
// ---------------------------------------------------------------------------

/// Mutable context passed to a stage. Stages that iterate (like the demand
/// calculator) poll `abort` between sub-steps and exit early without
/// committing partial results.
pub struct StageContext<'a> {
    /// The component owned by the running job.
    pub component: &'a mut LinkComponent,
    /// The job's abort flag.
    pub abort: &'a AtomicBool,
}

/// One stage of the recomputation pipeline. Stages run on worker threads,
/// strictly sequentially within a job.
pub trait PipelineStage: Send + Sync + std::fmt::Debug {
    /// Human-readable stage name, used for lookup and debugging.
    fn name(&self) -> &'static str;

    /// Execute this stage against the job's component.
    fn run(&self, ctx: &mut StageContext<'_>);
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The ordered stage list, constructed once and shared (read-only) by every
/// worker thread.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Pipeline {
    /// Build a pipeline from an explicit stage list.
    pub fn new(stages: Vec<Box<dyn PipelineStage>>) -> Self {
        Self { stages }
    }

    /// The standard six-stage pipeline with placeholder flow stages.
    pub fn standard(settings: Arc<DistributionSettings>) -> Self {
        Self::new(vec![
            Box::new(InitStage),
            Box::new(DemandStage::new(settings)),
            Box::new(FlowPassStage { pass: 1 }),
            Box::new(FlowMapStage),
            Box::new(FlowPassStage { pass: 2 }),
            Box::new(FlowMapStage),
        ])
    }

    pub fn stages(&self) -> &[Box<dyn PipelineStage>] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Concrete stages
// ---------------------------------------------------------------------------

/// Resets the component's pass-scoped counters and annotations so a
/// re-queued component always recomputes from a clean slate.
#[derive(Debug)]
pub struct InitStage;

impl PipelineStage for InitStage {
    fn name(&self) -> &'static str {
        "init"
    }

    fn run(&self, ctx: &mut StageContext<'_>) {
        ctx.component.reset_pass();
    }
}

/// Runs the demand calculator under the policy configured for the
/// component's cargo class.
#[derive(Debug)]
pub struct DemandStage {
    settings: Arc<DistributionSettings>,
}

impl DemandStage {
    pub fn new(settings: Arc<DistributionSettings>) -> Self {
        Self { settings }
    }
}

impl PipelineStage for DemandStage {
    fn name(&self) -> &'static str {
        "demand"
    }

    fn run(&self, ctx: &mut StageContext<'_>) {
        let policy = self.settings.policy_for(ctx.component.cargo());
        DemandCalculator::new(&self.settings, policy).run(ctx.component, ctx.abort);
    }
}

/// Placeholder for one pass of the host's multi-commodity-flow solver.
#[derive(Debug)]
pub struct FlowPassStage {
    pub pass: u8,
}

impl PipelineStage for FlowPassStage {
    fn name(&self) -> &'static str {
        match self.pass {
            1 => "flow_pass_1",
            _ => "flow_pass_2",
        }
    }

    fn run(&self, _ctx: &mut StageContext<'_>) {}
}

/// Placeholder for mapping solved flow back onto graph edges.
#[derive(Debug)]
pub struct FlowMapStage;

impl PipelineStage for FlowMapStage {
    fn name(&self) -> &'static str {
        "flow_map"
    }

    fn run(&self, _ctx: &mut StageContext<'_>) {}
}

// ===========================================================================
// Tests
// ===========================================================================
