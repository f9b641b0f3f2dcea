//! Connected components of the transport graph, as seen by the demand engine.
//!
//! A [`LinkComponent`] is a flat arena of [`LinkNode`]s. Edges are irrelevant
//! here: the component is connected by construction, and the only geometric
//! input the algorithms need is each node's coordinate (for Manhattan
//! distances). Per-node supply/demand scalars are immutable for the duration
//! of one calculation pass; the mutable counters (`undelivered_supply`,
//! `received_demand`) and the sparse demand annotations are reset by
//! [`LinkComponent::reset_pass`] at the start of every pass.

use crate::id::NodeIndex;
use crate::settings::CargoClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// One node of a component: a station or stop with supply and demand for a
/// single cargo class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkNode {
    /// Total quantity originating here. Immutable during a pass.
    supply: u32,
    /// Total quantity this node wants to receive. Immutable during a pass.
    demand: u32,
    /// Supply not yet assigned to a destination. Starts at `supply`,
    /// monotonically decreases during a pass.
    undelivered_supply: u32,
    /// Demand already satisfied by assignments made so far in this pass.
    /// Starts at 0, monotonically increases. Only the equalized policy
    /// reads it.
    received_demand: u32,
    /// Map coordinate, used for distance computation only.
    xy: (i32, i32),
    /// Output of a calculator pass: destination -> assigned quantity.
    demand_links: BTreeMap<NodeIndex, u32>,
}

impl LinkNode {
    pub fn supply(&self) -> u32 {
        self.supply
    }

    pub fn demand(&self) -> u32 {
        self.demand
    }

    pub fn undelivered_supply(&self) -> u32 {
        self.undelivered_supply
    }

    pub fn received_demand(&self) -> u32 {
        self.received_demand
    }

    pub fn xy(&self) -> (i32, i32) {
        self.xy
    }

    /// The sparse demand annotations committed by the last completed pass.
    pub fn demand_links(&self) -> &BTreeMap<NodeIndex, u32> {
        &self.demand_links
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// One connected component of the transport graph for one cargo class.
///
/// Exclusively owned by at most one in-flight job at a time: the scheduler
/// moves a component into its job when spawned and only gets it back after
/// the job is fully joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkComponent {
    cargo: CargoClass,
    nodes: Vec<LinkNode>,
}

impl LinkComponent {
    /// Create a new, empty component for the given cargo class.
    pub fn new(cargo: CargoClass) -> Self {
        Self {
            cargo,
            nodes: Vec::new(),
        }
    }

    /// Add a node. Returns its dense, component-local index.
    pub fn add_node(&mut self, supply: u32, demand: u32, xy: (i32, i32)) -> NodeIndex {
        let index = NodeIndex(self.nodes.len() as u16);
        self.nodes.push(LinkNode {
            supply,
            demand,
            undelivered_supply: supply,
            received_demand: 0,
            xy,
            demand_links: BTreeMap::new(),
        });
        index
    }

    pub fn cargo(&self) -> CargoClass {
        self.cargo
    }

    /// Number of nodes in this component.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: NodeIndex) -> &LinkNode {
        &self.nodes[index.index()]
    }

    /// Ascending iteration over all node indices. All algorithms use this
    /// order when building queues and pair lists, which pins their
    /// otherwise insertion-order-dependent tie-breaks.
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        (0..self.nodes.len()).map(|i| NodeIndex(i as u16))
    }

    /// Total supply over all nodes.
    pub fn total_supply(&self) -> u64 {
        self.nodes.iter().map(|n| n.supply as u64).sum()
    }

    /// Manhattan distance between two nodes.
    pub fn distance(&self, a: NodeIndex, b: NodeIndex) -> u32 {
        let (ax, ay) = self.node(a).xy;
        let (bx, by) = self.node(b).xy;
        (ax.abs_diff(bx) + ay.abs_diff(by)) as u32
    }

    /// Upper bound on any pairwise distance in this component: the Manhattan
    /// span of the bounding box. Always >= 1 so it can serve as a divisor.
    pub fn max_distance(&self) -> u32 {
        let mut min_x = i32::MAX;
        let mut max_x = i32::MIN;
        let mut min_y = i32::MAX;
        let mut max_y = i32::MIN;
        for node in &self.nodes {
            let (x, y) = node.xy;
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        if self.nodes.is_empty() {
            return 1;
        }
        (min_x.abs_diff(max_x) + min_y.abs_diff(max_y)).max(1) as u32
    }

    // -----------------------------------------------------------------------
    // Pass-scoped mutation
    // -----------------------------------------------------------------------

    /// Restore the pass-scoped counters and clear the annotations. Run at the
    /// start of every recomputation pass so a re-queued component always
    /// computes from a clean slate.
    pub fn reset_pass(&mut self) {
        for node in &mut self.nodes {
            node.undelivered_supply = node.supply;
            node.received_demand = 0;
            node.demand_links.clear();
        }
    }

    /// Consume `quantity` of the node's undelivered supply.
    ///
    /// Callers clamp assignments to the undelivered supply first; exceeding
    /// it is a policy violation, defended with a debug assertion.
    pub fn deliver_supply(&mut self, from: NodeIndex, quantity: u32) {
        let node = &mut self.nodes[from.index()];
        debug_assert!(
            quantity <= node.undelivered_supply,
            "assignment exceeds undelivered supply"
        );
        node.undelivered_supply = node.undelivered_supply.saturating_sub(quantity);
    }

    /// Record `quantity` of the node's demand as satisfied.
    pub fn receive_demand(&mut self, to: NodeIndex, quantity: u32) {
        self.nodes[to.index()].received_demand += quantity;
    }

    /// Commit a sparse demand annotation: `from` supplies `quantity` to `to`.
    pub fn add_demand_link(&mut self, from: NodeIndex, to: NodeIndex, quantity: u32) {
        if quantity == 0 {
            return;
        }
        *self.nodes[from.index()]
            .demand_links
            .entry(to)
            .or_insert(0) += quantity;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
