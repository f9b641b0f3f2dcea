//! Freightnet Core -- the cargo-distribution demand engine.
//!
//! This crate provides the data model and pure algorithms for deciding, per
//! connected component of a weighted transport graph, how much supply at each
//! node should flow toward which demand nodes. The companion crate
//! `freightnet-sched` wraps these algorithms in a budgeted, multi-threaded
//! recomputation pipeline.
//!
//! # Distribution Policies
//!
//! Each cargo class is distributed under one of four policies:
//!
//! - **Symmetric** -- traffic flows both ways; a forward assignment commits a
//!   scaled return assignment in the same step (passenger-style traffic).
//! - **Asymmetric** -- plain one-way distribution by raw supply.
//! - **AsymmetricEqualized** -- every demand node ends up receiving as close
//!   as possible to an equal share of the total supply.
//! - **AsymmetricNearest** -- one-way distribution that strictly prefers the
//!   nearest destinations.
//!
//! # Key Types
//!
//! - [`component::LinkComponent`] -- one connected component: nodes with
//!   supply/demand scalars, coordinates, and sparse demand annotations.
//! - [`scaler::Scaler`] -- the four policies as enum dispatch.
//! - [`demand::DemandCalculator`] -- one full demand-assignment pass over one
//!   component, using either the iterative probe algorithm or the
//!   minimized-distance algorithm depending on the policy.
//! - [`settings::DistributionSettings`] -- tunables (accuracy, distance and
//!   size modifiers, scheduling budgets) plus the per-cargo policy table.

pub mod component;
pub mod demand;
pub mod id;
pub mod scaler;
pub mod settings;
