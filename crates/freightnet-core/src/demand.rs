//! Demand calculation: one full assignment pass over one component.
//!
//! Two algorithms share the scaler contract:
//!
//! - **Iterative probe** (symmetric, plain asymmetric): FIFO queues of
//!   supply and demand nodes, probing pairs round-robin. Near,
//!   well-supplied pairs are assigned immediately; far pairs are skipped
//!   until a global retry counter triggers the starvation fallback, so no
//!   reachable demand node is skipped indefinitely. This is a
//!   bounded-iteration heuristic, not an optimal assignment.
//! - **Minimized distance** (equalized, nearest): every `from != to` pair
//!   is enumerated, sorted ascending by `(distance, from, to)`, and walked
//!   once greedily. The index tie-break makes the total order -- and hence
//!   the output -- fully deterministic, which the equalized policy's
//!   fairness depends on (nearer pairs must be processed first).
//!
//! The pass-scoped [`DemandMatrix`] is exclusively owned by one calculator
//! invocation. It is converted to sparse per-node annotations only when the
//! pass runs to completion; an aborted pass commits nothing.

use crate::component::LinkComponent;
use crate::id::NodeIndex;
use crate::scaler::Scaler;
use crate::settings::{DistributionPolicy, DistributionSettings};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

// ---------------------------------------------------------------------------
// Demand matrix
// ---------------------------------------------------------------------------

/// Dense `size x size` quantity matrix for one calculation pass.
#[derive(Debug, Clone)]
pub struct DemandMatrix {
    size: usize,
    cells: Vec<u32>,
    nonzero: usize,
}

impl DemandMatrix {
    /// Create a zeroed matrix for a component of `size` nodes.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![0; size * size],
            nonzero: 0,
        }
    }

    /// Accumulate a quantity for a pair. Zero quantities are ignored.
    pub fn add(&mut self, from: NodeIndex, to: NodeIndex, quantity: u32) {
        if quantity == 0 {
            return;
        }
        let cell = &mut self.cells[from.index() * self.size + to.index()];
        if *cell == 0 {
            self.nonzero += 1;
        }
        *cell += quantity;
    }

    pub fn get(&self, from: NodeIndex, to: NodeIndex) -> u32 {
        self.cells[from.index() * self.size + to.index()]
    }

    /// Number of nonzero entries.
    pub fn nonzero_count(&self) -> usize {
        self.nonzero
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Orchestrates one demand-assignment pass over one component.
pub struct DemandCalculator<'a> {
    settings: &'a DistributionSettings,
    policy: DistributionPolicy,
}

impl<'a> DemandCalculator<'a> {
    pub fn new(settings: &'a DistributionSettings, policy: DistributionPolicy) -> Self {
        Self { settings, policy }
    }

    /// Run a full pass. Polls `abort` between iterations; an aborted pass
    /// leaves the component's annotations untouched.
    pub fn run(&self, component: &mut LinkComponent, abort: &AtomicBool) {
        let mut scaler = Scaler::for_policy(self.policy, self.settings);
        let matrix = match self.policy {
            DistributionPolicy::Symmetric | DistributionPolicy::Asymmetric => {
                self.probe(component, &mut scaler, abort)
            }
            DistributionPolicy::AsymmetricEqualized | DistributionPolicy::AsymmetricNearest => {
                self.minimized_distance(component, &mut scaler, abort)
            }
        };
        if let Some(matrix) = matrix {
            commit(component, &matrix);
        }
    }

    /// Distance-scaled divisor for the probe algorithm. Grows with distance,
    /// shrinks as the (boosted) distance modifier rises, and is clamped to a
    /// minimum of 1 -- a required invariant: a zero divisor would break the
    /// progress guarantee of the probe loop.
    fn divisor(&self, distance: u32, max_distance: u32) -> u32 {
        let mod_dist = self.settings.boosted_demand_distance().max(1) as u64;
        let scaled = distance as u64 * 100 / mod_dist;
        let accuracy = self.settings.accuracy.max(1) as u64;
        (accuracy * scaled / max_distance.max(1) as u64).max(1) as u32
    }

    // -----------------------------------------------------------------------
    // Iterative probe algorithm
    // -----------------------------------------------------------------------

    fn probe(
        &self,
        component: &mut LinkComponent,
        scaler: &mut Scaler,
        abort: &AtomicBool,
    ) -> Option<DemandMatrix> {
        let mut supplies: VecDeque<NodeIndex> = VecDeque::new();
        let mut demands: VecDeque<NodeIndex> = VecDeque::new();
        for index in component.node_indices() {
            scaler.add_node(component, index);
            if component.node(index).supply() > 0 {
                supplies.push_back(index);
            }
            if component.node(index).demand() > 0 {
                demands.push_back(index);
            }
        }
        if supplies.is_empty() || demands.is_empty() {
            return None;
        }

        let mut num_supplies = supplies.len() as u32;
        let mut num_demands = demands.len() as u32;
        scaler.set_demand_per_node(num_demands);

        let accuracy = self.settings.accuracy.max(1);
        let max_distance = component.max_distance();
        let mut matrix = DemandMatrix::new(component.size());
        let mut chance: u64 = 0;

        'outer: while !supplies.is_empty() && !demands.is_empty() {
            if abort.load(Ordering::Relaxed) {
                return None;
            }
            let Some(from) = supplies.pop_front() else {
                break;
            };
            for _ in 0..num_demands {
                let Some(to) = demands.pop_front() else {
                    break;
                };
                if to == from {
                    if supplies.is_empty() && demands.is_empty() {
                        // A lone node can supply and demand itself without
                        // an actual transfer.
                        break 'outer;
                    }
                    demands.push_back(to);
                    continue;
                }

                let supply = scaler.effective_supply(component, from, to);
                debug_assert!(supply > 0, "scaler returned zero effective supply");
                let divisor = self.divisor(component.distance(from, to), max_distance);

                let mut amount = if divisor <= supply {
                    // Near and well-supplied pairs are assigned immediately.
                    supply / divisor
                } else {
                    // Starvation fallback: once enough probes have come up
                    // empty, hand out a minimal unit so no demand node is
                    // skipped forever.
                    chance += 1;
                    if chance > accuracy as u64 * num_demands as u64 * num_supplies as u64 {
                        1
                    } else {
                        0
                    }
                };
                amount = amount.min(component.node(from).undelivered_supply());
                scaler.set_demands(component, &mut matrix, from, to, amount);

                if scaler.has_demand_left(component, to) {
                    demands.push_back(to);
                } else {
                    num_demands -= 1;
                }
                if component.node(from).undelivered_supply() == 0 {
                    break;
                }
            }
            if component.node(from).undelivered_supply() > 0 {
                supplies.push_back(from);
            } else {
                num_supplies -= 1;
            }
        }
        Some(matrix)
    }

    // -----------------------------------------------------------------------
    // Minimized-distance algorithm
    // -----------------------------------------------------------------------

    fn minimized_distance(
        &self,
        component: &mut LinkComponent,
        scaler: &mut Scaler,
        abort: &AtomicBool,
    ) -> Option<DemandMatrix> {
        let mut supplies: Vec<NodeIndex> = Vec::new();
        let mut demands: Vec<NodeIndex> = Vec::new();
        for index in component.node_indices() {
            scaler.add_node(component, index);
            if component.node(index).supply() > 0 {
                supplies.push(index);
            }
            if component.node(index).demand() > 0 {
                demands.push(index);
            }
        }
        if supplies.is_empty() || demands.is_empty() {
            return None;
        }

        scaler.set_demand_per_node(demands.len() as u32);
        scaler.adjust_demand_nodes(component, &demands);

        // Total order with index tie-break, so reruns are byte-identical.
        let mut pairs: Vec<(u32, NodeIndex, NodeIndex)> = Vec::new();
        for &from in &supplies {
            for &to in &demands {
                if from != to {
                    pairs.push((component.distance(from, to), from, to));
                }
            }
        }
        pairs.sort_unstable();

        let mut matrix = DemandMatrix::new(component.size());
        for (_, from, to) in pairs {
            if abort.load(Ordering::Relaxed) {
                return None;
            }
            if component.node(from).undelivered_supply() == 0 {
                continue;
            }
            if !scaler.has_demand_left(component, to) {
                continue;
            }
            let amount = component
                .node(from)
                .undelivered_supply()
                .min(scaler.effective_supply(component, from, to));
            scaler.set_demands(component, &mut matrix, from, to, amount);
        }
        Some(matrix)
    }
}

/// Convert the dense pass matrix into sparse per-node annotations.
fn commit(component: &mut LinkComponent, matrix: &DemandMatrix) {
    let size = component.size();
    for from in 0..size {
        for to in 0..size {
            let from = NodeIndex(from as u16);
            let to = NodeIndex(to as u16);
            let quantity = matrix.get(from, to);
            if quantity > 0 {
                component.add_demand_link(from, to, quantity);
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
