use std::sync::Arc;

use tessera_core::StorageDevice;

use crate::process_group::{LocalGroup, ProcessGroup};

/// Identifier of a chunk group configuration.
pub type GroupId = u32;

/// Options of one chunk group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkGroupConfig {
    /// Capacity of every chunk of the group, in elements.
    pub chunk_size: usize,
    /// Chunks of the group stay gathered on the accelerator and never move.
    pub keep_gathered: bool,
}

impl ChunkGroupConfig {
    pub fn new(chunk_size: usize) -> Self {
        ChunkGroupConfig {
            chunk_size,
            keep_gathered: false,
        }
    }

    pub fn with_keep_gathered(mut self, keep_gathered: bool) -> Self {
        self.keep_gathered = keep_gathered;
        self
    }
}

/// Process-level options of a [`ChunkManager`](crate::ChunkManager).
#[derive(Clone, Debug)]
pub struct ChunkManagerOptions {
    /// Device where open chunks stage their tensors, and where scattered shards
    /// rest after `close_all_groups`.
    pub init_device: StorageDevice,
    /// Group the chunks are sharded over.
    pub process_group: Arc<dyn ProcessGroup>,
}

impl Default for ChunkManagerOptions {
    fn default() -> Self {
        ChunkManagerOptions {
            init_device: StorageDevice::GPU,
            process_group: Arc::new(LocalGroup),
        }
    }
}

impl ChunkManagerOptions {
    pub fn with_init_device(mut self, device: StorageDevice) -> Self {
        self.init_device = device;
        self
    }

    pub fn with_process_group(mut self, process_group: Arc<dyn ProcessGroup>) -> Self {
        self.process_group = process_group;
        self
    }
}
