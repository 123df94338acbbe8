//! Activation-checkpointing support for Tessera.
//!
//! [`CheckpointSolverBase`] snapshots a profiled graph and turns it into a list of
//! regions, either with the [`linearize`](linearize::linearize) pass or one node per
//! region. Concrete planners implement [`CheckpointSolver`] on top of it.

pub mod linearize;
pub mod solver;

pub use linearize::{linearize, Linearization, Region};
pub use solver::{CheckpointSolver, CheckpointSolverBase, SolverConfig};

#[cfg(test)]
mod solver_test;
