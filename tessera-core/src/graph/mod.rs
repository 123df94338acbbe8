//! Computation graph IR consumed by the checkpoint solvers.
//!
//! Nodes live in an arena and are addressed by dense [`NodeId`]s. Nodes are
//! appended in definition order: every input of a node must already exist when the
//! node is added, which makes insertion order a valid topological order.

use std::collections::HashMap;
use std::sync::Arc;

use log::trace;

use crate::error::TesseraError;

mod node;

pub use node::{MetaValue, Node, NodeId, NodeMeta, OpKind};


/// Attributes of the module that owns a graph.
///
/// Shared between a graph and its snapshots: snapshots re-attach the same handle
/// instead of copying it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwningModule {
    pub name: String,
    /// Submodule path -> whether the submodule computes in place.
    submodules: HashMap<String, bool>,
}

impl OwningModule {
    pub fn new(name: &str) -> Self {
        OwningModule {
            name: name.to_string(),
            submodules: HashMap::new(),
        }
    }

    /// Registers a submodule reachable through `call_module` nodes.
    pub fn with_submodule(mut self, path: &str, inplace: bool) -> Self {
        self.submodules.insert(path.to_string(), inplace);
        self
    }

    /// Whether the submodule at `path` mutates its input. Unknown paths are not in place.
    pub fn submodule_is_inplace(&self, path: &str) -> bool {
        self.submodules.get(path).copied().unwrap_or(false)
    }
}

/// A computation graph.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    names: HashMap<String, NodeId>,
    output: Option<NodeId>,
    owning_module: Option<Arc<OwningModule>>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn with_owning_module(module: Arc<OwningModule>) -> Self {
        Graph {
            owning_module: Some(module),
            ..Graph::default()
        }
    }

    pub fn owning_module(&self) -> Option<&Arc<OwningModule>> {
        self.owning_module.as_ref()
    }

    pub fn set_owning_module(&mut self, module: Option<Arc<OwningModule>>) {
        self.owning_module = module;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over the nodes in definition order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    /// Returns the node with the given id.
    ///
    /// Panics if `id` does not belong to this graph (ids are only handed out by
    /// the graph itself and its snapshots).
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn output_node(&self) -> Option<NodeId> {
        self.output
    }

    /// Attaches a metadata entry to a node.
    ///
    /// # Errors
    /// Returns `TesseraError::ConfigurationError` if `id` is not a node of this graph.
    pub fn set_meta(&mut self, id: NodeId, key: &str, value: MetaValue) -> Result<(), TesseraError> {
        let node = self.nodes.get_mut(id.0).ok_or_else(|| {
            TesseraError::ConfigurationError(format!("node {} not in graph", id))
        })?;
        node.meta.insert(key.to_string(), value);
        Ok(())
    }

    /// Whether `id` mutates its input in place.
    ///
    /// Function and method calls carry the flag themselves; module calls ask the
    /// owning module about the called submodule.
    pub fn is_inplace(&self, id: NodeId) -> bool {
        let node = self.node(id);
        match node.op {
            OpKind::CallFunction | OpKind::CallMethod => node.inplace,
            OpKind::CallModule => self
                .owning_module
                .as_ref()
                .map(|m| m.submodule_is_inplace(&node.target))
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn placeholder(&mut self, name: &str) -> Result<NodeId, TesseraError> {
        self.add_node(OpKind::Placeholder, name, name, &[], false)
    }

    pub fn get_attr(&mut self, name: &str, target: &str) -> Result<NodeId, TesseraError> {
        self.add_node(OpKind::GetAttr, name, target, &[], false)
    }

    pub fn call_function(&mut self, name: &str, target: &str, inputs: &[NodeId]) -> Result<NodeId, TesseraError> {
        self.add_node(OpKind::CallFunction, name, target, inputs, false)
    }

    /// Adds a function call that overwrites its first input (e.g. `relu(x, inplace=True)`).
    pub fn call_function_inplace(&mut self, name: &str, target: &str, inputs: &[NodeId]) -> Result<NodeId, TesseraError> {
        self.add_node(OpKind::CallFunction, name, target, inputs, true)
    }

    pub fn call_method(&mut self, name: &str, target: &str, inputs: &[NodeId]) -> Result<NodeId, TesseraError> {
        self.add_node(OpKind::CallMethod, name, target, inputs, false)
    }

    pub fn call_method_inplace(&mut self, name: &str, target: &str, inputs: &[NodeId]) -> Result<NodeId, TesseraError> {
        self.add_node(OpKind::CallMethod, name, target, inputs, true)
    }

    pub fn call_module(&mut self, name: &str, target: &str, inputs: &[NodeId]) -> Result<NodeId, TesseraError> {
        self.add_node(OpKind::CallModule, name, target, inputs, false)
    }

    /// Adds the graph output. A graph has at most one output and it is the last node.
    pub fn output(&mut self, inputs: &[NodeId]) -> Result<NodeId, TesseraError> {
        self.add_node(OpKind::Output, "output", "output", inputs, false)
    }

    fn add_node(
        &mut self,
        op: OpKind,
        name: &str,
        target: &str,
        inputs: &[NodeId],
        inplace: bool,
    ) -> Result<NodeId, TesseraError> {
        if self.names.contains_key(name) {
            return Err(TesseraError::ConfigurationError(format!(
                "duplicate node name {}",
                name
            )));
        }
        if self.output.is_some() {
            return Err(TesseraError::ConfigurationError(format!(
                "cannot add node {} after the graph output",
                name
            )));
        }
        let id = NodeId(self.nodes.len());
        let mut unique_inputs: Vec<NodeId> = Vec::with_capacity(inputs.len());
        for input in inputs {
            if input.0 >= self.nodes.len() {
                return Err(TesseraError::ConfigurationError(format!(
                    "input {} of node {} is not defined before it",
                    input, name
                )));
            }
            if !unique_inputs.contains(input) {
                unique_inputs.push(*input);
            }
        }
        for input in &unique_inputs {
            self.nodes[input.0].users.push(id);
        }
        trace!("graph: add {:?} node {} ({}) <- {:?}", op, name, id, unique_inputs);
        self.nodes.push(Node {
            id,
            name: name.to_string(),
            op,
            target: target.to_string(),
            inputs: unique_inputs,
            users: Vec::new(),
            inplace,
            meta: NodeMeta::new(),
        });
        self.names.insert(name.to_string(), id);
        if op == OpKind::Output {
            self.output = Some(id);
        }
        Ok(id)
    }

    /// Returns an owned structural copy of this graph.
    ///
    /// Nodes, links and metadata are copied; nothing is shared with `self`. The
    /// owning-module handle is not carried over and must be re-attached with
    /// [`Graph::set_owning_module`]. Ids are preserved, so a `NodeId` of the original
    /// addresses the same node in the snapshot.
    pub fn snapshot(&self) -> Graph {
        Graph {
            nodes: self.nodes.clone(),
            names: self.names.clone(),
            output: self.output,
            owning_module: None,
        }
    }

    /// Copies the output node's metadata from `src` onto this graph's output node.
    ///
    /// Nodes are paired positionally, so `self` is expected to be a snapshot of `src`.
    pub fn graft_output_meta(&mut self, src: &Graph) {
        for (n_src, n_dst) in src.nodes.iter().zip(self.nodes.iter_mut()) {
            if n_src.is_output() {
                n_dst.meta = n_src.meta.clone();
            }
        }
    }
}
