//! Scaling policies for demand distribution.
//!
//! A scaler decides, for a pair of nodes, how much supply is effectively
//! transferable and whether the receiving node still has unmet demand, and it
//! commits assignments into the pass-scoped demand matrix. The system uses
//! **enum dispatch** (not trait objects): sized inline storage and
//! predictable branching in the calculator's hot loops.
//!
//! # Variants
//!
//! - [`SymmetricScaler`] — scales by both endpoints' supply and commits a
//!   return assignment alongside every forward assignment.
//! - [`AsymmetricScaler`] — raw one-way supply; also used by the
//!   nearest-destination policy, which differs only in the assignment
//!   algorithm, not in the scaling rules.
//! - [`EqualizedScaler`] — caps every receiver at an equal share of the
//!   total supply, with the rounding surplus absorbed up front.

use crate::component::LinkComponent;
use crate::demand::DemandMatrix;
use crate::id::NodeIndex;
use crate::settings::{DistributionPolicy, DistributionSettings};

// ---------------------------------------------------------------------------
// Scaler enum
// ---------------------------------------------------------------------------

/// Distribution policy state for one calculation pass.
#[derive(Debug, Clone)]
pub enum Scaler {
    Symmetric(SymmetricScaler),
    Asymmetric(AsymmetricScaler),
    Equalized(EqualizedScaler),
}

impl Scaler {
    /// Build the scaler for a policy. `AsymmetricNearest` shares the
    /// asymmetric scaling rules; the calculator picks the minimized-distance
    /// algorithm for it separately.
    pub fn for_policy(policy: DistributionPolicy, settings: &DistributionSettings) -> Self {
        match policy {
            DistributionPolicy::Symmetric => Scaler::Symmetric(SymmetricScaler {
                mod_size: settings.demand_size,
                supply_sum: 0,
                demand_per_node: 1,
            }),
            DistributionPolicy::Asymmetric | DistributionPolicy::AsymmetricNearest => {
                Scaler::Asymmetric(AsymmetricScaler)
            }
            DistributionPolicy::AsymmetricEqualized => Scaler::Equalized(EqualizedScaler {
                supply_sum: 0,
                demand_per_node: 1,
            }),
        }
    }

    /// Accumulate pass-wide statistics. Called once per reachable node
    /// before assignment begins.
    pub fn add_node(&mut self, component: &LinkComponent, node: NodeIndex) {
        let supply = component.node(node).supply() as u64;
        match self {
            Scaler::Symmetric(s) => s.supply_sum += supply,
            Scaler::Asymmetric(_) => {}
            Scaler::Equalized(s) => s.supply_sum += supply,
        }
    }

    /// Finalize the pass-wide fair-share baseline once the number of demand
    /// nodes is known.
    pub fn set_demand_per_node(&mut self, num_demand_nodes: u32) {
        debug_assert!(num_demand_nodes > 0);
        match self {
            Scaler::Symmetric(s) => {
                s.demand_per_node = ((s.supply_sum / num_demand_nodes as u64).max(1)) as u32;
            }
            Scaler::Asymmetric(_) => {}
            Scaler::Equalized(s) => {
                s.demand_per_node = s.supply_sum.div_ceil(num_demand_nodes as u64) as u32;
            }
        }
    }

    /// Absorb the equal-share rounding surplus: the first
    /// `demand_per_node * num - total_supply` demand nodes are granted one
    /// pre-received unit. No-op for the other policies.
    pub fn adjust_demand_nodes(&self, component: &mut LinkComponent, demand_nodes: &[NodeIndex]) {
        let Scaler::Equalized(s) = self else {
            return;
        };
        let granted = s.demand_per_node as u64 * demand_nodes.len() as u64;
        let surplus = granted.saturating_sub(s.supply_sum);
        for &node in demand_nodes.iter().take(surplus as usize) {
            component.receive_demand(node, 1);
        }
    }

    /// Effective transferable supply for a node pair. Always >= 1 whenever
    /// `from` has any undelivered supply.
    pub fn effective_supply(
        &self,
        component: &LinkComponent,
        from: NodeIndex,
        to: NodeIndex,
    ) -> u32 {
        match self {
            Scaler::Symmetric(s) => {
                let from_supply = component.node(from).supply() as u64;
                let to_supply = (component.node(to).supply() as u64).max(1);
                let scaled =
                    from_supply * to_supply * s.mod_size as u64 / 100 / s.demand_per_node as u64;
                scaled.max(1) as u32
            }
            Scaler::Asymmetric(_) => component.node(from).supply(),
            Scaler::Equalized(s) => {
                let undelivered = component.node(from).undelivered_supply();
                let share = s
                    .demand_per_node
                    .saturating_sub(component.node(to).received_demand());
                undelivered.min(share).max(1)
            }
        }
    }

    /// Whether the receiving node still has unmet demand under this policy.
    pub fn has_demand_left(&self, component: &LinkComponent, to: NodeIndex) -> bool {
        let node = component.node(to);
        match self {
            // Symmetric traffic requires both directions: a receiver with
            // no undelivered supply of its own is excluded.
            Scaler::Symmetric(_) => node.demand() > 0 && node.undelivered_supply() > 0,
            Scaler::Asymmetric(_) => node.demand() > 0,
            Scaler::Equalized(s) => node.demand() > 0 && node.received_demand() < s.demand_per_node,
        }
    }

    /// Commit a forward assignment, clamped by the caller to the sender's
    /// undelivered supply. Zero-quantity commits are no-ops.
    pub fn set_demands(
        &mut self,
        component: &mut LinkComponent,
        matrix: &mut DemandMatrix,
        from: NodeIndex,
        to: NodeIndex,
        forward: u32,
    ) {
        match self {
            Scaler::Symmetric(s) => {
                // The return assignment, scaled by the size modifier and
                // clamped to the receiver's undelivered supply.
                if component.node(from).demand() > 0 {
                    let back = (forward as u64 * s.mod_size as u64 / 100) as u32;
                    let back = back.min(component.node(to).undelivered_supply());
                    commit(component, matrix, to, from, back);
                }
                commit(component, matrix, from, to, forward);
            }
            Scaler::Asymmetric(_) => commit(component, matrix, from, to, forward),
            Scaler::Equalized(_) => {
                commit(component, matrix, from, to, forward);
                component.receive_demand(to, forward);
            }
        }
    }
}

/// Base commit shared by all policies: record the quantity in the matrix and
/// consume the sender's undelivered supply.
fn commit(
    component: &mut LinkComponent,
    matrix: &mut DemandMatrix,
    from: NodeIndex,
    to: NodeIndex,
    quantity: u32,
) {
    if quantity == 0 {
        return;
    }
    matrix.add(from, to, quantity);
    component.deliver_supply(from, quantity);
}

// ---------------------------------------------------------------------------
// Per-variant state
// ---------------------------------------------------------------------------

/// State for [`Scaler::Symmetric`].
#[derive(Debug, Clone)]
pub struct SymmetricScaler {
    /// Size modifier in percent, applied to both the effective supply and
    /// the return assignment.
    mod_size: u32,
    /// Sum of all node supplies, accumulated by `add_node`.
    supply_sum: u64,
    /// Fair-share baseline: `max(1, supply_sum / num_demand_nodes)`.
    demand_per_node: u32,
}

/// State for [`Scaler::Asymmetric`]. No pass-wide statistics needed.
#[derive(Debug, Clone)]
pub struct AsymmetricScaler;

/// State for [`Scaler::Equalized`].
#[derive(Debug, Clone)]
pub struct EqualizedScaler {
    /// Sum of all node supplies, accumulated by `add_node`.
    supply_sum: u64,
    /// Equal share per demand node: `ceil(supply_sum / num_demand_nodes)`.
    demand_per_node: u32,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CargoClass;

    fn settings() -> DistributionSettings {
        DistributionSettings::default()
    }

    fn symmetric_pair() -> (LinkComponent, NodeIndex, NodeIndex) {
        let mut comp = LinkComponent::new(CargoClass::Passengers);
        let a = comp.add_node(80, 80, (0, 0));
        let b = comp.add_node(40, 40, (10, 0));
        (comp, a, b)
    }

    // -----------------------------------------------------------------------
    // Symmetric
    // -----------------------------------------------------------------------

    #[test]
    fn symmetric_reciprocity_on_commit() {
        let (mut comp, a, b) = symmetric_pair();
        let mut scaler = Scaler::for_policy(DistributionPolicy::Symmetric, &settings());
        for n in comp.node_indices() {
            scaler.add_node(&comp, n);
        }
        scaler.set_demand_per_node(2);

        let mut matrix = DemandMatrix::new(comp.size());
        scaler.set_demands(&mut comp, &mut matrix, a, b, 20);

        // Forward committed in full, return committed at mod_size percent
        // (100% by default), clamped to b's undelivered supply.
        assert_eq!(matrix.get(a, b), 20);
        assert_eq!(matrix.get(b, a), 20);
        assert_eq!(comp.node(a).undelivered_supply(), 60);
        assert_eq!(comp.node(b).undelivered_supply(), 20);
    }

    #[test]
    fn symmetric_return_clamped_to_undelivered() {
        let (mut comp, a, b) = symmetric_pair();
        let mut scaler = Scaler::for_policy(DistributionPolicy::Symmetric, &settings());
        for n in comp.node_indices() {
            scaler.add_node(&comp, n);
        }
        scaler.set_demand_per_node(2);

        let mut matrix = DemandMatrix::new(comp.size());
        scaler.set_demands(&mut comp, &mut matrix, a, b, 60);

        assert_eq!(matrix.get(a, b), 60);
        // b only had 40 undelivered.
        assert_eq!(matrix.get(b, a), 40);
        assert_eq!(comp.node(b).undelivered_supply(), 0);
    }

    #[test]
    fn symmetric_no_return_without_forward_demand() {
        let mut comp = LinkComponent::new(CargoClass::Passengers);
        let a = comp.add_node(80, 0, (0, 0)); // supplies but demands nothing
        let b = comp.add_node(40, 40, (10, 0));
        let mut scaler = Scaler::for_policy(DistributionPolicy::Symmetric, &settings());
        for n in comp.node_indices() {
            scaler.add_node(&comp, n);
        }
        scaler.set_demand_per_node(1);

        let mut matrix = DemandMatrix::new(comp.size());
        scaler.set_demands(&mut comp, &mut matrix, a, b, 20);

        assert_eq!(matrix.get(a, b), 20);
        assert_eq!(matrix.get(b, a), 0);
        assert_eq!(comp.node(b).undelivered_supply(), 40);
    }

    #[test]
    fn symmetric_excludes_exhausted_receivers() {
        let (mut comp, _, b) = symmetric_pair();
        let scaler = Scaler::for_policy(DistributionPolicy::Symmetric, &settings());
        assert!(scaler.has_demand_left(&comp, b));
        comp.deliver_supply(b, 40);
        assert!(!scaler.has_demand_left(&comp, b));
    }

    #[test]
    fn symmetric_effective_supply_at_least_one() {
        let mut comp = LinkComponent::new(CargoClass::Passengers);
        let a = comp.add_node(1, 1, (0, 0));
        let b = comp.add_node(1, 1, (1, 0));
        let mut scaler = Scaler::for_policy(DistributionPolicy::Symmetric, &settings());
        for n in comp.node_indices() {
            scaler.add_node(&comp, n);
        }
        scaler.set_demand_per_node(2);
        assert!(scaler.effective_supply(&comp, a, b) >= 1);
    }

    // -----------------------------------------------------------------------
    // Asymmetric
    // -----------------------------------------------------------------------

    #[test]
    fn asymmetric_effective_supply_is_raw_supply() {
        let mut comp = LinkComponent::new(CargoClass::Freight);
        let a = comp.add_node(100, 0, (0, 0));
        let b = comp.add_node(0, 100, (5, 0));
        let scaler = Scaler::for_policy(DistributionPolicy::Asymmetric, &settings());
        assert_eq!(scaler.effective_supply(&comp, a, b), 100);
        assert!(scaler.has_demand_left(&comp, b));
        assert!(!scaler.has_demand_left(&comp, a));
    }

    #[test]
    fn nearest_policy_uses_asymmetric_rules() {
        let scaler = Scaler::for_policy(DistributionPolicy::AsymmetricNearest, &settings());
        assert!(matches!(scaler, Scaler::Asymmetric(_)));
    }

    // -----------------------------------------------------------------------
    // Equalized
    // -----------------------------------------------------------------------

    #[test]
    fn equalized_share_is_ceiling() {
        let mut comp = LinkComponent::new(CargoClass::Freight);
        comp.add_node(10, 0, (0, 0));
        let mut scaler = Scaler::for_policy(DistributionPolicy::AsymmetricEqualized, &settings());
        for n in comp.node_indices() {
            scaler.add_node(&comp, n);
        }
        scaler.set_demand_per_node(3);
        let Scaler::Equalized(ref s) = scaler else {
            panic!("wrong variant");
        };
        assert_eq!(s.demand_per_node, 4); // ceil(10 / 3)
    }

    #[test]
    fn equalized_adjust_absorbs_rounding_surplus() {
        let mut comp = LinkComponent::new(CargoClass::Freight);
        let s = comp.add_node(10, 0, (0, 0));
        let d1 = comp.add_node(0, 5, (1, 0));
        let d2 = comp.add_node(0, 5, (2, 0));
        let d3 = comp.add_node(0, 5, (3, 0));
        let mut scaler = Scaler::for_policy(DistributionPolicy::AsymmetricEqualized, &settings());
        for n in comp.node_indices() {
            scaler.add_node(&comp, n);
        }
        scaler.set_demand_per_node(3);
        scaler.adjust_demand_nodes(&mut comp, &[d1, d2, d3]);

        // share = ceil(10/3) = 4; surplus = 4*3 - 10 = 2 granted units.
        assert_eq!(comp.node(d1).received_demand(), 1);
        assert_eq!(comp.node(d2).received_demand(), 1);
        assert_eq!(comp.node(d3).received_demand(), 0);
        assert_eq!(comp.node(s).received_demand(), 0);
    }

    #[test]
    fn equalized_commit_tracks_received_demand() {
        let mut comp = LinkComponent::new(CargoClass::Freight);
        let a = comp.add_node(10, 0, (0, 0));
        let b = comp.add_node(0, 10, (1, 0));
        let mut scaler = Scaler::for_policy(DistributionPolicy::AsymmetricEqualized, &settings());
        for n in comp.node_indices() {
            scaler.add_node(&comp, n);
        }
        scaler.set_demand_per_node(1);

        let mut matrix = DemandMatrix::new(comp.size());
        scaler.set_demands(&mut comp, &mut matrix, a, b, 6);

        assert_eq!(comp.node(b).received_demand(), 6);
        assert_eq!(comp.node(a).undelivered_supply(), 4);
        assert!(scaler.has_demand_left(&comp, b)); // 6 < share of 10
        scaler.set_demands(&mut comp, &mut matrix, a, b, 4);
        assert!(!scaler.has_demand_left(&comp, b));
    }
}
