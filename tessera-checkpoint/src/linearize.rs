//! Graph linearization into checkpoint regions.
//!
//! A region is a run of consecutive nodes that can be dropped and recomputed as
//! one unit. The linearizer walks the graph in definition order and keeps, for
//! every visited node, the number of its consumers that have not run yet. A region
//! is sealed when no visited value is still waiting for a consumer and the last
//! node's value is not overwritten in place by one of its users.
//!
//! Common nodes (masks, attribute fetches, shapes, ...) are shared by the whole
//! model and would otherwise keep every region open; they are excluded from the
//! countdown. The set starts from the caller's whitelist of placeholders and grows
//! with every node whose inputs are all common or whose target is a common op.

use log::{debug, trace, warn};
use tessera_core::{Graph, NodeId, OpKind, TesseraError};

/// An ordered, non-empty group of nodes checkpointed as a unit.
pub type Region = Vec<NodeId>;

/// Targets whose results are treated as common nodes.
pub const COMMON_OPS: [&str; 3] = ["getattr", "getitem", "size"];

/// Whether a node target is one of the [`COMMON_OPS`].
pub fn is_common_op(target: &str) -> bool {
    COMMON_OPS.contains(&target)
}

/// Result of [`linearize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Linearization {
    /// Regions in traversal order.
    pub regions: Vec<Region>,
    /// Final common-node set: the whitelist followed by the promoted nodes in
    /// promotion order.
    pub common_nodes: Vec<NodeId>,
}

/// Checks that every whitelisted name is an existing placeholder.
///
/// # Errors
/// Returns `TesseraError::ConfigurationError` naming the first unknown or
/// non-placeholder entry.
pub fn validate_common_nodes(graph: &Graph, names: &[String]) -> Result<Vec<NodeId>, TesseraError> {
    names
        .iter()
        .map(|name| {
            let id = graph.find(name).ok_or_else(|| {
                TesseraError::ConfigurationError(format!("Common node name {} not in graph.", name))
            })?;
            if graph.node(id).op() != OpKind::Placeholder {
                return Err(TesseraError::ConfigurationError(format!(
                    "Common node {} is not an input of the model.",
                    name
                )));
            }
            Ok(id)
        })
        .collect()
}

/// Linearizes `graph` into regions.
///
/// Placeholders and the output node never belong to a region. `common_nodes` is
/// the whitelist of placeholder names to treat as common.
///
/// # Errors
/// Returns `TesseraError::ConfigurationError` for an invalid whitelist entry.
pub fn linearize(graph: &Graph, common_nodes: &[String]) -> Result<Linearization, TesseraError> {
    let whitelist = validate_common_nodes(graph, common_nodes)?;

    let mut is_common = vec![false; graph.len()];
    let mut common: Vec<NodeId> = Vec::with_capacity(whitelist.len());
    for id in whitelist {
        if !is_common[id.index()] {
            is_common[id.index()] = true;
            common.push(id);
        }
    }

    // Remaining consumers per visited, non-common node, indexed by node id.
    let mut deps: Vec<Option<usize>> = vec![None; graph.len()];
    // Sum over `deps`; the sink test looks at the whole graph, not just the open region.
    let mut outstanding: usize = 0;

    let mut regions: Vec<Region> = Vec::new();
    let mut region: Region = Vec::new();

    for node in graph.nodes() {
        if node.is_placeholder() || node.is_output() {
            continue;
        }
        let id = node.id();

        for &parent in node.inputs() {
            if graph.node(parent).is_placeholder() || is_common[parent.index()] {
                continue;
            }
            let remaining = deps[parent.index()].as_mut().ok_or_else(|| {
                TesseraError::InternalError(format!(
                    "input {} of {} has no dependency count",
                    graph.node(parent).name(),
                    node.name()
                ))
            })?;
            *remaining = remaining.checked_sub(1).ok_or_else(|| {
                TesseraError::InternalError(format!(
                    "dependency count of {} underflowed",
                    graph.node(parent).name()
                ))
            })?;
            outstanding -= 1;
        }
        region.push(id);

        let has_inplace_user = node.users().iter().any(|&user| graph.is_inplace(user));
        if outstanding == 0 && !has_inplace_user {
            trace!("linearize: sealing region of {} node(s) at {}", region.len(), node.name());
            regions.push(std::mem::take(&mut region));
        }

        let inputs_common = node.inputs().iter().all(|p| is_common[p.index()]);
        if inputs_common || is_common_op(node.target()) {
            trace!("linearize: {} promoted to common node", node.name());
            is_common[id.index()] = true;
            common.push(id);
        } else {
            let users = node
                .users()
                .iter()
                .filter(|&&user| !graph.node(user).is_output())
                .count();
            deps[id.index()] = Some(users);
            outstanding += users;
        }
    }

    // Users always follow their producer, so the last compute node has no pending
    // consumer and seals the final region. This only guards a malformed graph.
    if !region.is_empty() {
        warn!(
            "linearize: {} node(s) left unsealed after the last compute node, flushing them",
            region.len()
        );
        regions.push(region);
    }

    debug!(
        "linearize: {} node(s) -> {} region(s), {} common node(s)",
        graph.len(),
        regions.len(),
        common.len()
    );
    Ok(Linearization {
        regions,
        common_nodes: common,
    })
}

/// One region per node, every node of the graph included, in definition order.
pub fn node_per_region(graph: &Graph) -> Vec<Region> {
    graph.node_ids().map(|id| vec![id]).collect()
}
