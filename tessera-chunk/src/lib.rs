//! Chunk-based memory management for Tessera.
//!
//! Many small tensors are packed into fixed-size [`Chunk`]s owned by a
//! [`ChunkManager`]. Chunks are sharded across a [`ProcessGroup`], gathered on
//! access, scattered on release, and migrated between the CPU and accelerator
//! tiers while the manager keeps per-tier byte totals.

pub mod chunk;
pub mod config;
pub mod manager;
pub mod memory;
pub mod process_group;

pub use chunk::{Chunk, ChunkId, TensorInfo, TensorState};
pub use config::{ChunkGroupConfig, ChunkManagerOptions, GroupId};
pub use manager::{ChunkGroupKey, ChunkManager};
pub use memory::MemoryUsage;
pub use process_group::{LocalGroup, ProcessGroup};

#[cfg(test)]
mod chunk_test;
