//! Core types shared by the Tessera crates.
//!
//! - [`error`]: the workspace-wide [`TesseraError`].
//! - [`device`], [`types`], [`buffer`]: memory tiers, element types and
//!   device-tagged byte buffers.
//! - [`tensor`]: logical tensor handles that can be aliased into chunks.
//! - [`graph`]: the computation graph IR consumed by the checkpoint solvers.

pub mod buffer;
pub mod device;
pub mod error;
pub mod graph;
pub mod tensor;
pub mod tensor_data;
pub mod types;

// Re-exports so that downstream crates can write `tessera_core::Tensor` etc.
pub use buffer::Buffer;
pub use device::StorageDevice;
pub use error::TesseraError;
pub use graph::{Graph, MetaValue, Node, NodeId, NodeMeta, OpKind, OwningModule};
pub use tensor::Tensor;
pub use tensor_data::{ChunkSlot, TensorId};
pub use types::{DType, Element};
