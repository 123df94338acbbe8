use std::collections::BTreeMap;
use std::fmt;

/// Dense, index-stable identifier of a node inside one [`Graph`](super::Graph).
///
/// Ids are assigned in insertion order, so comparing two ids of the same graph
/// compares their definition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The position of the node in its graph's arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// The operator kind of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// A graph input.
    Placeholder,
    /// Fetch of a module attribute (e.g. a parameter).
    GetAttr,
    /// Call of a free function.
    CallFunction,
    /// Call of a method on the first input.
    CallMethod,
    /// Call of a submodule of the owning module.
    CallModule,
    /// The unique graph output.
    Output,
}

/// A single metadata value attached by the profiling pass.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Shape(Vec<usize>),
    Text(String),
}

/// Profiling metadata of a node (memory sizes, runtime estimates, ...).
pub type NodeMeta = BTreeMap<String, MetaValue>;

/// A single operation in the computation graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) op: OpKind,
    /// Function, method, module or attribute name the node applies.
    pub(crate) target: String,
    /// Input nodes, deduplicated, in first-use order.
    pub(crate) inputs: Vec<NodeId>,
    /// Consumer nodes, deduplicated, in insertion order.
    pub(crate) users: Vec<NodeId>,
    /// Set for function/method calls that mutate their first input.
    pub(crate) inplace: bool,
    pub(crate) meta: NodeMeta,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> OpKind {
        self.op
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn users(&self) -> &[NodeId] {
        &self.users
    }

    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut NodeMeta {
        &mut self.meta
    }

    pub fn is_placeholder(&self) -> bool {
        self.op == OpKind::Placeholder
    }

    pub fn is_output(&self) -> bool {
        self.op == OpKind::Output
    }
}
