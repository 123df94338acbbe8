use log::{debug, info};
use tessera_core::{Graph, NodeId, TesseraError};

use crate::linearize::{linearize, node_per_region, Region};

/// Construction options shared by every checkpoint solver.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverConfig {
    /// Memory constraint for the solution. Negative or non-finite means unconstrained.
    pub memory_budget: f64,
    /// Memory taken by the model parameters.
    pub parameter_size: f64,
    /// Whether to linearize the graph into regions, or use one region per node.
    pub requires_linearize: bool,
    /// Placeholder names to treat as common nodes (e.g. an attention mask).
    pub common_nodes: Vec<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            memory_budget: -1.0,
            parameter_size: 0.0,
            requires_linearize: false,
            common_nodes: Vec::new(),
        }
    }
}

impl SolverConfig {
    pub fn with_memory_budget(mut self, memory_budget: f64) -> Self {
        self.memory_budget = memory_budget;
        self
    }

    pub fn with_parameter_size(mut self, parameter_size: f64) -> Self {
        self.parameter_size = parameter_size;
        self
    }

    pub fn with_linearize(mut self, requires_linearize: bool) -> Self {
        self.requires_linearize = requires_linearize;
        self
    }

    pub fn with_common_nodes<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.common_nodes = names.into_iter().map(Into::into).collect();
        self
    }
}

/// State shared by the concrete checkpoint solvers.
///
/// The base owns a snapshot of the caller's graph, so solvers are free to mutate
/// it; the caller's graph is left as it was.
#[derive(Debug)]
pub struct CheckpointSolverBase {
    graph: Graph,
    memory_budget: f64,
    parameter_size: f64,
    requires_linearize: bool,
    /// Names of the common nodes. After linearization this also holds the
    /// promoted nodes.
    common_nodes: Vec<String>,
    node_list: Vec<Region>,
}

impl CheckpointSolverBase {
    /// Snapshots `graph` and prepares the region list.
    ///
    /// The profiling pass must have run on `graph` before the solver is built:
    /// without per-node metadata there is nothing to estimate memory or time from.
    ///
    /// # Errors
    /// - `TesseraError::PreconditionError` if any node has empty metadata.
    /// - `TesseraError::ConfigurationError` if a common-node name is unknown or not
    ///   a placeholder (only checked when linearizing).
    pub fn new(graph: &Graph, config: SolverConfig) -> Result<Self, TesseraError> {
        let mut snapshot = graph.snapshot();
        snapshot.set_owning_module(graph.owning_module().cloned());
        snapshot.graft_output_meta(graph);

        let missing: Vec<String> = snapshot
            .nodes()
            .filter(|n| n.meta().is_empty())
            .map(|n| n.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(TesseraError::PreconditionError { nodes: missing });
        }

        let SolverConfig {
            memory_budget,
            parameter_size,
            requires_linearize,
            mut common_nodes,
        } = config;

        let node_list = if requires_linearize {
            let linearization = linearize(&snapshot, &common_nodes)?;
            common_nodes = linearization
                .common_nodes
                .iter()
                .map(|&id| snapshot.node(id).name().to_string())
                .collect();
            linearization.regions
        } else {
            node_per_region(&snapshot)
        };

        info!(
            "checkpoint solver: {} node(s), {} region(s), budget {}",
            snapshot.len(),
            node_list.len(),
            if !memory_budget.is_finite() || memory_budget < 0.0 {
                "unconstrained".to_string()
            } else {
                memory_budget.to_string()
            }
        );
        debug!("checkpoint solver: common nodes {:?}", common_nodes);

        Ok(CheckpointSolverBase {
            graph: snapshot,
            memory_budget,
            parameter_size,
            requires_linearize,
            common_nodes,
            node_list,
        })
    }

    /// The solver's private graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Gives the private graph back, e.g. once a solver has annotated it.
    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// The memory budget, or `None` when unconstrained (negative or not finite).
    pub fn memory_budget(&self) -> Option<f64> {
        if !self.memory_budget.is_finite() || self.memory_budget < 0.0 {
            None
        } else {
            Some(self.memory_budget)
        }
    }

    pub fn parameter_size(&self) -> f64 {
        self.parameter_size
    }

    pub fn requires_linearize(&self) -> bool {
        self.requires_linearize
    }

    pub fn common_nodes(&self) -> &[String] {
        &self.common_nodes
    }

    /// The regions the solver plans over.
    pub fn node_list(&self) -> &[Region] {
        &self.node_list
    }

    /// Names of the nodes of region `index`, for logging and plan reports.
    pub fn region_names(&self, index: usize) -> Option<Vec<&str>> {
        self.node_list
            .get(index)
            .map(|region| region.iter().map(|&id| self.graph.node(id).name()).collect())
    }

    /// Index of the region containing `id`.
    pub fn region_of(&self, id: NodeId) -> Option<usize> {
        self.node_list.iter().position(|region| region.contains(&id))
    }
}

/// A checkpoint planning algorithm (e.g. Chen's greedy solver, Rotor).
///
/// Implementors compose a [`CheckpointSolverBase`] and decide the shape of the
/// plan they emit.
pub trait CheckpointSolver {
    type Plan;

    fn base(&self) -> &CheckpointSolverBase;

    /// Solves the checkpointing problem over `self.base().node_list()`.
    fn solve(&mut self) -> Result<Self::Plan, TesseraError>;
}
