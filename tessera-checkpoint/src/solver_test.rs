use std::sync::Arc;

use approx::assert_relative_eq;
use tessera_core::{Graph, MetaValue, NodeId, OwningModule, TesseraError};

use crate::solver::{CheckpointSolver, CheckpointSolverBase, SolverConfig};

/// Marks every region but the last for recomputation whenever a budget is set.
struct CheckpointAllButLast {
    base: CheckpointSolverBase,
}

impl CheckpointSolver for CheckpointAllButLast {
    type Plan = Vec<usize>;

    fn base(&self) -> &CheckpointSolverBase {
        &self.base
    }

    fn solve(&mut self) -> Result<Vec<usize>, TesseraError> {
        let regions = self.base.node_list().len();
        match self.base.memory_budget() {
            Some(_) => Ok((0..regions.saturating_sub(1)).collect()),
            None => Ok(Vec::new()),
        }
    }
}

fn profiled_graph() -> Result<(Graph, Vec<NodeId>), TesseraError> {
    let module = Arc::new(OwningModule::new("mlp").with_submodule("act", true));
    let mut g = Graph::with_owning_module(module);
    let x = g.placeholder("x")?;
    let fc1 = g.call_module("fc1", "fc1", &[x])?;
    let act = g.call_module("act", "act", &[fc1])?;
    let fc2 = g.call_module("fc2", "fc2", &[act])?;
    let out = g.output(&[fc2])?;
    let ids = vec![x, fc1, act, fc2, out];
    for &id in &ids {
        g.set_meta(id, "fwd_mem_out", MetaValue::Int(64))?;
    }
    Ok((g, ids))
}

#[test]
fn test_missing_metadata_is_fatal() -> Result<(), TesseraError> {
    let mut g = Graph::new();
    let x = g.placeholder("x")?;
    let a = g.call_function("a", "neg", &[x])?;
    g.output(&[a])?;
    g.set_meta(x, "fwd_mem_out", MetaValue::Int(4))?;

    let result = CheckpointSolverBase::new(&g, SolverConfig::default());
    assert_eq!(
        result.err(),
        Some(TesseraError::PreconditionError {
            nodes: vec!["a".to_string(), "output".to_string()]
        })
    );
    Ok(())
}

#[test]
fn test_solver_works_on_a_snapshot() -> Result<(), TesseraError> {
    let (g, ids) = profiled_graph()?;
    let mut base = CheckpointSolverBase::new(&g, SolverConfig::default())?;

    let owner = base.graph().owning_module().cloned();
    assert!(matches!(
        (owner, g.owning_module()),
        (Some(a), Some(b)) if Arc::ptr_eq(&a, b)
    ));
    assert_eq!(
        base.graph().node(ids[4]).meta().get("fwd_mem_out"),
        Some(&MetaValue::Int(64))
    );

    base.graph_mut()
        .set_meta(ids[1], "checkpoint", MetaValue::Bool(true))?;
    assert!(g.node(ids[1]).meta().get("checkpoint").is_none());
    Ok(())
}

#[test]
fn test_region_list_selection() -> Result<(), TesseraError> {
    let (g, ids) = profiled_graph()?;

    let trivial = CheckpointSolverBase::new(&g, SolverConfig::default())?;
    assert_eq!(trivial.node_list().len(), g.len());
    assert!(!trivial.requires_linearize());

    let linear = CheckpointSolverBase::new(&g, SolverConfig::default().with_linearize(true))?;
    // `act` is in place, so `fc1` cannot close a region.
    assert_eq!(linear.region_names(0), Some(vec!["fc1", "act"]));
    assert_eq!(linear.region_names(1), Some(vec!["fc2"]));
    assert_eq!(linear.region_of(ids[3]), Some(1));
    assert_eq!(linear.region_of(ids[0]), None);
    Ok(())
}

#[test]
fn test_common_nodes_are_validated_and_extended() -> Result<(), TesseraError> {
    let (g, _) = profiled_graph()?;

    let bad = CheckpointSolverBase::new(
        &g,
        SolverConfig::default()
            .with_linearize(true)
            .with_common_nodes(["fc1"]),
    );
    assert!(matches!(bad, Err(TesseraError::ConfigurationError(msg)) if msg.contains("fc1")));

    let ok = CheckpointSolverBase::new(
        &g,
        SolverConfig::default()
            .with_linearize(true)
            .with_common_nodes(["x"]),
    )?;
    // Every node downstream of `x` only depends on common nodes.
    assert_eq!(ok.common_nodes(), &["x", "fc1", "act", "fc2"]);
    Ok(())
}

#[test]
fn test_solve_through_the_capability_trait() -> Result<(), TesseraError> {
    let (g, _) = profiled_graph()?;

    let config = SolverConfig::default()
        .with_linearize(true)
        .with_memory_budget(1024.0)
        .with_parameter_size(256.0);
    let mut solver = CheckpointAllButLast {
        base: CheckpointSolverBase::new(&g, config)?,
    };
    assert_relative_eq!(solver.base().memory_budget().unwrap_or(-1.0), 1024.0);
    assert_relative_eq!(solver.base().parameter_size(), 256.0);
    assert_eq!(solver.solve()?, vec![0]);

    let mut unconstrained = CheckpointAllButLast {
        base: CheckpointSolverBase::new(&g, SolverConfig::default().with_linearize(true))?,
    };
    assert_eq!(unconstrained.base().memory_budget(), None);
    assert!(unconstrained.solve()?.is_empty());
    Ok(())
}

#[test]
fn test_non_finite_budget_is_unconstrained() -> Result<(), TesseraError> {
    let (g, _) = profiled_graph()?;
    for budget in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -1.0] {
        let base = CheckpointSolverBase::new(&g, SolverConfig::default().with_memory_budget(budget))?;
        assert_eq!(base.memory_budget(), None, "budget {}", budget);
    }
    let zero = CheckpointSolverBase::new(&g, SolverConfig::default().with_memory_budget(0.0))?;
    assert_eq!(zero.memory_budget(), Some(0.0));
    Ok(())
}
