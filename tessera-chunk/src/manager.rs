use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use log::{debug, info};
use tessera_core::{StorageDevice, Tensor, TensorId, TesseraError};

use crate::chunk::{Chunk, ChunkId, TensorState};
use crate::config::{ChunkGroupConfig, ChunkManagerOptions, GroupId};
use crate::memory::MemoryUsage;

/// Chunks are grouped by the role of their tensors ("param", "grad", ...) and
/// by configuration group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkGroupKey {
    pub role: String,
    pub group: GroupId,
}

impl fmt::Display for ChunkGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.role, self.group)
    }
}

/// Per-process registry of chunks.
///
/// The manager owns every chunk; tensors only keep a back-reference into it.
/// `total_mem` tracks the bytes of every buffer held by the chunks, per tier.
pub struct ChunkManager {
    config: HashMap<GroupId, ChunkGroupConfig>,
    options: ChunkManagerOptions,
    chunks: Vec<Chunk>,
    chunk_groups: BTreeMap<ChunkGroupKey, Vec<ChunkId>>,
    tensor_chunk_map: HashMap<TensorId, ChunkId>,
    total_mem: MemoryUsage,
    groups_closed: bool,
}

impl ChunkManager {
    /// Creates a manager with default options.
    ///
    /// # Errors
    /// Returns `TesseraError::ConfigurationError` if a group's chunk size is zero or
    /// does not split across the process group.
    pub fn new(config: HashMap<GroupId, ChunkGroupConfig>) -> Result<Self, TesseraError> {
        Self::with_options(config, ChunkManagerOptions::default())
    }

    pub fn with_options(
        config: HashMap<GroupId, ChunkGroupConfig>,
        options: ChunkManagerOptions,
    ) -> Result<Self, TesseraError> {
        let world_size = options.process_group.world_size();
        for (group, group_config) in &config {
            if world_size == 0 || group_config.chunk_size == 0 || group_config.chunk_size % world_size != 0 {
                return Err(TesseraError::ConfigurationError(format!(
                    "group {}: chunk size {} cannot be split across {} rank(s)",
                    group, group_config.chunk_size, world_size
                )));
            }
        }
        info!(
            "ChunkManager: {} group(s), init device {}, world size {}",
            config.len(),
            options.init_device,
            world_size
        );
        Ok(ChunkManager {
            config,
            options,
            chunks: Vec::new(),
            chunk_groups: BTreeMap::new(),
            tensor_chunk_map: HashMap::new(),
            total_mem: MemoryUsage::default(),
            groups_closed: false,
        })
    }

    pub fn options(&self) -> &ChunkManagerOptions {
        &self.options
    }

    pub fn group_config(&self, group: GroupId) -> Option<&ChunkGroupConfig> {
        self.config.get(&group)
    }

    /// Bytes held by all chunks, per tier.
    pub fn total_mem(&self) -> MemoryUsage {
        self.total_mem
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Chunk ids of one group, in creation order.
    pub fn chunk_group(&self, role: &str, group: GroupId) -> &[ChunkId] {
        let key = ChunkGroupKey {
            role: role.to_string(),
            group,
        };
        self.chunk_groups.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Registers `tensor` under `role` in configuration group `group`.
    ///
    /// The tensor goes into the group's open chunk. When it does not fit, that
    /// chunk is closed and a new one is opened, sized to the tensor if the tensor
    /// is larger than the configured chunk size.
    ///
    /// # Errors
    /// - `TesseraError::AlreadyRegistered` if the tensor already lives in a chunk.
    /// - `TesseraError::UnknownGroup` if `group` is not configured.
    /// - `TesseraError::InvalidState` after `close_all_groups`, or if the tensor is
    ///   bound into a chunk of another manager.
    /// - `TesseraError::DTypeMismatch` if the open chunk holds another dtype.
    pub fn append_tensor(
        &mut self,
        tensor: &Tensor,
        role: &str,
        group: GroupId,
        pin_memory: bool,
    ) -> Result<ChunkId, TesseraError> {
        let tensor_id = tensor.id();
        if self.tensor_chunk_map.contains_key(&tensor_id) {
            return Err(TesseraError::AlreadyRegistered { tensor: tensor_id });
        }
        // Checked before any chunk is closed, so a rejected tensor leaves the
        // manager untouched.
        if let Some(slot) = tensor.chunk_slot() {
            return Err(TesseraError::invalid_state(
                "append_tensor",
                format!("tensor {} is already aliased into chunk {}", tensor_id, slot.chunk),
            ));
        }
        let group_config = self
            .config
            .get(&group)
            .cloned()
            .ok_or(TesseraError::UnknownGroup(group))?;
        if self.groups_closed {
            return Err(TesseraError::invalid_state(
                "append_tensor",
                "all chunk groups are already closed",
            ));
        }

        let key = ChunkGroupKey {
            role: role.to_string(),
            group,
        };
        let open_chunk = self
            .chunk_groups
            .get(&key)
            .and_then(|ids| ids.last().copied())
            .filter(|&id| !self.chunks[id].is_closed());

        if let Some(chunk_id) = open_chunk {
            match self.chunks[chunk_id].append_tensor(tensor) {
                Ok(()) => {
                    self.tensor_chunk_map.insert(tensor_id, chunk_id);
                    return Ok(chunk_id);
                }
                Err(TesseraError::CapacityExceeded { .. }) => {
                    let shard_device = self.options.init_device;
                    self.transition(chunk_id, |chunk| chunk.close_chunk(shard_device))?;
                }
                Err(e) => return Err(e),
            }
        }

        let chunk_id = self.chunks.len();
        let world_size = self.options.process_group.world_size();
        let chunk_size = group_config
            .chunk_size
            .max(tensor.numel().div_ceil(world_size) * world_size);
        let mut chunk = Chunk::new(
            chunk_id,
            group,
            chunk_size,
            tensor.dtype(),
            group_config.keep_gathered,
            pin_memory,
            self.options.init_device,
            self.options.process_group.clone(),
        )?;
        chunk.append_tensor(tensor)?;

        self.total_mem.apply_delta(MemoryUsage::default(), chunk.memory_usage());
        self.chunks.push(chunk);
        self.chunk_groups.entry(key).or_default().push(chunk_id);
        self.tensor_chunk_map.insert(tensor_id, chunk_id);
        Ok(chunk_id)
    }

    /// Closes every open chunk, then recomputes the totals from the chunks.
    ///
    /// Scattered shards rest on the init device.
    pub fn close_all_groups(&mut self) -> Result<(), TesseraError> {
        let shard_device = self.options.init_device;
        for chunk in self.chunks.iter_mut().filter(|c| !c.is_closed()) {
            chunk.close_chunk(shard_device)?;
        }
        self.total_mem = self.chunks.iter().map(Chunk::memory_usage).sum();
        self.groups_closed = true;
        info!(
            "ChunkManager: closed {} chunk(s), {} B held ({})",
            self.chunks.len(),
            self.total_mem.total(),
            self.total_mem
        );
        Ok(())
    }

    /// Distinct chunks backing `tensors`, in first-encounter order.
    ///
    /// # Errors
    /// Returns `TesseraError::TensorNotRegistered` for a tensor outside any chunk.
    pub fn get_chunks(&self, tensors: &[Tensor]) -> Result<Vec<ChunkId>, TesseraError> {
        let mut seen = HashSet::new();
        let mut chunks = Vec::new();
        for tensor in tensors {
            let chunk_id = self.get_chunk(tensor)?;
            if seen.insert(chunk_id) {
                chunks.push(chunk_id);
            }
        }
        Ok(chunks)
    }

    pub fn get_chunk(&self, tensor: &Tensor) -> Result<ChunkId, TesseraError> {
        self.tensor_chunk_map
            .get(&tensor.id())
            .copied()
            .ok_or(TesseraError::TensorNotRegistered { tensor: tensor.id() })
    }

    pub fn chunk(&self, id: ChunkId) -> Result<&Chunk, TesseraError> {
        self.chunks.get(id).ok_or(TesseraError::UnknownChunk(id))
    }

    pub fn access_chunk(&mut self, id: ChunkId) -> Result<(), TesseraError> {
        self.transition(id, Chunk::access_chunk)
    }

    pub fn release_chunk(&mut self, id: ChunkId) -> Result<(), TesseraError> {
        self.transition(id, Chunk::release_chunk)
    }

    /// Migrates a chunk's shard to `device`.
    ///
    /// # Errors
    /// Returns `TesseraError::InvalidState` if the chunk is referenced or still open.
    pub fn move_chunk(&mut self, id: ChunkId, device: StorageDevice) -> Result<(), TesseraError> {
        self.transition(id, |chunk| chunk.move_to(device))
    }

    pub fn trans_tensor_state(&mut self, tensor: &Tensor, state: TensorState) -> Result<(), TesseraError> {
        let chunk_id = self.get_chunk(tensor)?;
        self.chunks[chunk_id].tensor_trans_state(tensor.id(), state)
    }

    /// Bytes of `tensor`, read from its chunk. The chunk must be open or gathered.
    pub fn tensor_data(&self, tensor: &Tensor) -> Result<Vec<u8>, TesseraError> {
        let chunk_id = self.get_chunk(tensor)?;
        self.chunks[chunk_id].tensor_bytes(tensor.id())
    }

    pub fn copy_tensor_to_chunk_slice(&mut self, tensor: &Tensor, data: &[u8]) -> Result<(), TesseraError> {
        let chunk_id = self.get_chunk(tensor)?;
        self.chunks[chunk_id].copy_tensor_to_chunk_slice(tensor.id(), data)
    }

    /// Chunks currently referenced.
    pub fn accessed_chunks(&self) -> Vec<ChunkId> {
        self.chunks
            .iter()
            .filter(|c| c.ref_count() > 0)
            .map(Chunk::id)
            .collect()
    }

    /// Bytes of the referenced chunks, gathered on the accelerator.
    pub fn accessed_mem(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.ref_count() > 0)
            .map(Chunk::chunk_mem)
            .sum()
    }

    /// Chunks whose shard sits on the accelerator and may be offloaded.
    pub fn cuda_movable_chunks(&self) -> Vec<ChunkId> {
        self.chunks
            .iter()
            .filter(|c| c.can_move() && c.device_type() == Some(StorageDevice::GPU))
            .map(Chunk::id)
            .collect()
    }

    /// Runs `op` on one chunk and replaces its old contribution to `total_mem`
    /// with the new one.
    fn transition<F>(&mut self, id: ChunkId, op: F) -> Result<(), TesseraError>
    where
        F: FnOnce(&mut Chunk) -> Result<(), TesseraError>,
    {
        let chunk = self.chunks.get_mut(id).ok_or(TesseraError::UnknownChunk(id))?;
        let before = chunk.memory_usage();
        let result = op(chunk);
        let after = chunk.memory_usage();
        self.total_mem.apply_delta(before, after);
        if before != after {
            debug!("chunk {}: usage {} -> {}, total {}", id, before, after, self.total_mem);
        }
        result
    }
}

impl fmt::Display for ChunkManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ChunkManager ({})", self.total_mem)?;
        for (key, ids) in &self.chunk_groups {
            writeln!(f, "  {}:", key)?;
            for &id in ids {
                let chunk = &self.chunks[id];
                writeln!(
                    f,
                    "    chunk {}: {}/{} x {:?}, gathered={}, ref_count={}, {}",
                    id,
                    chunk.utilized_size(),
                    chunk.chunk_size(),
                    chunk.dtype(),
                    chunk.is_gathered(),
                    chunk.ref_count(),
                    chunk.memory_usage()
                )?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkManager")
            .field("groups", &self.chunk_groups)
            .field("num_tensors", &self.tensor_chunk_map.len())
            .field("total_mem", &self.total_mem)
            .finish()
    }
}
