//! A chunk: one contiguous allocation backing several tensors.
//!
//! Life cycle of a chunk:
//!
//! 1. **open**: tensors are appended into a staging buffer on the init device.
//! 2. **closed, gathered**: the staging buffer is moved to the accelerator and
//!    becomes the full chunk buffer. `keep_gathered` chunks stay here.
//! 3. **scattered**: only this rank's shard is kept, on the accelerator or on the
//!    CPU (optionally with a pinned CPU mirror). Accessing the chunk gathers it
//!    back; releasing the last reference scatters it again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, trace};
use tessera_core::{Buffer, ChunkSlot, DType, StorageDevice, Tensor, TensorId, TesseraError};

use crate::config::GroupId;
use crate::memory::MemoryUsage;
use crate::process_group::ProcessGroup;

/// Index of a chunk in its manager's chunk arena.
pub type ChunkId = usize;

/// Life-cycle state of a tensor inside its chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorState {
    Free,
    /// The tensor is being computed on; its chunk must stay gathered.
    Compute,
    Hold,
    HoldAfterBwd,
    ReadyForReduce,
}

/// Placement of one tensor inside a chunk, in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorInfo {
    pub offset: usize,
    pub end: usize,
    pub state: TensorState,
}

pub struct Chunk {
    id: ChunkId,
    group: GroupId,
    chunk_size: usize,
    dtype: DType,
    keep_gathered: bool,
    pin_memory: bool,
    process_group: Arc<dyn ProcessGroup>,

    shard_size: usize,
    shard_begin: usize,
    utilized_size: usize,
    tensor_order: Vec<TensorId>,
    tensors_info: HashMap<TensorId, TensorInfo>,

    /// Staging buffer while the chunk is open.
    staging: Option<Buffer>,
    /// The full chunk, present while gathered.
    total: Option<Buffer>,
    /// This rank's shard on the accelerator.
    cuda_shard: Option<Buffer>,
    /// This rank's shard in host memory (pinned when `pin_memory`).
    cpu_shard: Option<Buffer>,
    is_gathered: bool,
    ref_count: usize,
}

impl Chunk {
    /// Creates an open chunk of `chunk_size` elements staged on `init_device`.
    ///
    /// # Errors
    /// Returns `TesseraError::ConfigurationError` if `chunk_size` is zero or does not
    /// split evenly across the process group.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ChunkId,
        group: GroupId,
        chunk_size: usize,
        dtype: DType,
        keep_gathered: bool,
        pin_memory: bool,
        init_device: StorageDevice,
        process_group: Arc<dyn ProcessGroup>,
    ) -> Result<Self, TesseraError> {
        let world_size = process_group.world_size();
        if chunk_size == 0 || world_size == 0 || chunk_size % world_size != 0 {
            return Err(TesseraError::ConfigurationError(format!(
                "chunk size {} cannot be split across {} rank(s)",
                chunk_size, world_size
            )));
        }
        let shard_size = chunk_size / world_size;
        let shard_begin = process_group.rank() * shard_size;
        debug!(
            "chunk {}: new, group {}, {} x {:?}, keep_gathered={}, pin_memory={}",
            id, group, chunk_size, dtype, keep_gathered, pin_memory
        );
        Ok(Chunk {
            id,
            group,
            chunk_size,
            dtype,
            keep_gathered,
            pin_memory,
            process_group,
            shard_size,
            shard_begin,
            utilized_size: 0,
            tensor_order: Vec::new(),
            tensors_info: HashMap::new(),
            staging: Some(Buffer::zeros(chunk_size * dtype.size_of(), init_device)),
            total: None,
            cuda_shard: None,
            cpu_shard: None,
            is_gathered: true,
            ref_count: 0,
        })
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Capacity in elements.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn keep_gathered(&self) -> bool {
        self.keep_gathered
    }

    pub fn pin_memory(&self) -> bool {
        self.pin_memory
    }

    /// Size of the whole chunk in bytes.
    pub fn chunk_mem(&self) -> usize {
        self.chunk_size * self.dtype.size_of()
    }

    /// Size of one shard in bytes.
    pub fn shard_mem(&self) -> usize {
        self.shard_size * self.dtype.size_of()
    }

    pub fn utilized_size(&self) -> usize {
        self.utilized_size
    }

    pub fn available_size(&self) -> usize {
        self.chunk_size - self.utilized_size
    }

    pub fn is_closed(&self) -> bool {
        self.staging.is_none()
    }

    pub fn is_gathered(&self) -> bool {
        self.is_gathered
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// Tensors of the chunk in append order.
    pub fn tensor_ids(&self) -> &[TensorId] {
        &self.tensor_order
    }

    pub fn tensor_info(&self, tensor: TensorId) -> Option<&TensorInfo> {
        self.tensors_info.get(&tensor)
    }

    /// Tier the chunk currently rests on. A gathered chunk lives on the accelerator;
    /// a scattered chunk lives where its working shard is.
    pub fn device_type(&self) -> Option<StorageDevice> {
        if let Some(staging) = &self.staging {
            return Some(staging.device());
        }
        if self.is_gathered || self.cuda_shard.is_some() {
            Some(StorageDevice::GPU)
        } else if self.cpu_shard.is_some() {
            Some(StorageDevice::CPU)
        } else {
            None
        }
    }

    /// Whether `move_to` can migrate this chunk.
    pub fn can_move(&self) -> bool {
        self.is_closed() && !self.is_gathered && self.ref_count == 0
    }

    /// Whether the chunk may scatter: no tensor is being computed on.
    pub fn can_release(&self) -> bool {
        self.tensors_info
            .values()
            .all(|info| info.state != TensorState::Compute)
    }

    /// Bytes per tier of every buffer the chunk holds.
    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = MemoryUsage::default();
        for buffer in [&self.staging, &self.total, &self.cuda_shard, &self.cpu_shard]
            .into_iter()
            .flatten()
        {
            usage.add(buffer.device(), buffer.len());
        }
        usage
    }

    /// Appends `tensor` at the next free offset and aliases its storage into the chunk.
    ///
    /// # Errors
    /// - `TesseraError::InvalidState` if the chunk is closed or the tensor is already
    ///   aliased into a chunk.
    /// - `TesseraError::DTypeMismatch` if the tensor's dtype differs from the chunk's.
    /// - `TesseraError::CapacityExceeded` if the tensor does not fit.
    pub fn append_tensor(&mut self, tensor: &Tensor) -> Result<(), TesseraError> {
        let elem_size = self.dtype.size_of();
        let available = self.available_size();
        let staging = self.staging.as_mut().ok_or_else(|| {
            TesseraError::invalid_state("append_tensor", "chunk is already closed")
        })?;
        if tensor.dtype() != self.dtype {
            return Err(TesseraError::DTypeMismatch {
                expected: self.dtype,
                actual: tensor.dtype(),
                operation: "append_tensor".to_string(),
            });
        }
        let numel = tensor.numel();
        if numel > available {
            return Err(TesseraError::CapacityExceeded {
                requested: numel,
                available,
            });
        }

        let offset = self.utilized_size;
        let bytes = tensor.bind_to_chunk(ChunkSlot {
            chunk: self.id,
            offset,
        })?;
        staging.copy_from_slice_at(offset * elem_size, &bytes)?;

        let tensor_id = tensor.id();
        self.utilized_size += numel;
        self.tensor_order.push(tensor_id);
        self.tensors_info.insert(
            tensor_id,
            TensorInfo {
                offset,
                end: offset + numel,
                state: TensorState::Hold,
            },
        );
        trace!(
            "chunk {}: tensor {} at [{}, {})",
            self.id,
            tensor_id,
            offset,
            offset + numel
        );
        Ok(())
    }

    /// Closes the chunk: no more appends. The staging buffer becomes the full
    /// chunk on the accelerator; unless the chunk keeps gathered, it is then
    /// scattered and its shard rests on `shard_device`.
    ///
    /// # Errors
    /// Returns `TesseraError::InvalidState` if the chunk is already closed.
    pub fn close_chunk(&mut self, shard_device: StorageDevice) -> Result<(), TesseraError> {
        let staging = self
            .staging
            .take()
            .ok_or_else(|| TesseraError::invalid_state("close_chunk", "chunk is already closed"))?;
        self.total = Some(match staging.device() {
            StorageDevice::GPU => staging,
            StorageDevice::CPU => staging.to_device(StorageDevice::GPU),
        });
        self.is_gathered = true;

        if self.keep_gathered {
            debug!("chunk {}: closed, kept gathered", self.id);
            return Ok(());
        }
        self.scatter()?;

        if self.pin_memory || shard_device == StorageDevice::CPU {
            let cuda_shard = self.cuda_shard.as_ref().ok_or_else(|| {
                TesseraError::InternalError(format!("chunk {} has no shard after scatter", self.id))
            })?;
            let mut cpu_shard = if self.pin_memory {
                Buffer::pinned(cuda_shard.len())
            } else {
                Buffer::zeros(cuda_shard.len(), StorageDevice::CPU)
            };
            cpu_shard.copy_from_slice_at(0, cuda_shard.as_bytes())?;
            self.cpu_shard = Some(cpu_shard);
        }
        if shard_device == StorageDevice::CPU {
            self.cuda_shard = None;
        }
        debug!("chunk {}: closed, shard on {}", self.id, shard_device);
        Ok(())
    }

    /// Takes a reference on the chunk, gathering it on the first one.
    ///
    /// # Errors
    /// Returns `TesseraError::InvalidState` if the chunk is still open.
    pub fn access_chunk(&mut self) -> Result<(), TesseraError> {
        if !self.is_closed() {
            return Err(TesseraError::invalid_state(
                "access_chunk",
                format!("chunk {} is still open", self.id),
            ));
        }
        if !self.is_gathered {
            if self.cuda_shard.is_none() {
                self.shard_move(StorageDevice::GPU)?;
            }
            self.gather()?;
        }
        self.ref_count += 1;
        trace!("chunk {}: accessed, ref_count={}", self.id, self.ref_count);
        Ok(())
    }

    /// Drops a reference on the chunk, scattering it when the last one goes away.
    ///
    /// # Errors
    /// Returns `TesseraError::InvalidState` if the chunk holds no reference, or if the
    /// last reference is dropped while a tensor is still in `Compute`.
    pub fn release_chunk(&mut self) -> Result<(), TesseraError> {
        if self.ref_count == 0 {
            return Err(TesseraError::invalid_state(
                "release_chunk",
                format!("chunk {} is not accessed", self.id),
            ));
        }
        if self.ref_count == 1 && !self.keep_gathered && !self.can_release() {
            return Err(TesseraError::invalid_state(
                "release_chunk",
                format!("chunk {} still has tensors in compute", self.id),
            ));
        }
        self.ref_count -= 1;
        if self.ref_count == 0 {
            self.scatter()?;
        }
        trace!("chunk {}: released, ref_count={}", self.id, self.ref_count);
        Ok(())
    }

    /// Migrates the chunk's shard to `device`.
    ///
    /// Gathered chunks are not moved (a keep-gathered chunk stays on the
    /// accelerator); moving to the tier the shard is already on does nothing.
    ///
    /// # Errors
    /// Returns `TesseraError::InvalidState` if the chunk is open or referenced.
    pub fn move_to(&mut self, device: StorageDevice) -> Result<(), TesseraError> {
        if !self.is_closed() {
            return Err(TesseraError::invalid_state(
                "move_to",
                format!("chunk {} is still open", self.id),
            ));
        }
        if self.ref_count > 0 {
            return Err(TesseraError::invalid_state(
                "move_to",
                format!("chunk {} is in use (ref_count={})", self.id, self.ref_count),
            ));
        }
        if self.is_gathered {
            debug!("chunk {}: gathered, not moved to {}", self.id, device);
            return Ok(());
        }
        self.shard_move(device)
    }

    /// Moves a tensor to `state`.
    ///
    /// # Errors
    /// Returns `TesseraError::TensorNotRegistered` if the tensor is not in this chunk.
    pub fn tensor_trans_state(&mut self, tensor: TensorId, state: TensorState) -> Result<(), TesseraError> {
        let info = self
            .tensors_info
            .get_mut(&tensor)
            .ok_or(TesseraError::TensorNotRegistered { tensor })?;
        trace!("chunk {}: tensor {} {:?} -> {:?}", self.id, tensor, info.state, state);
        info.state = state;
        Ok(())
    }

    /// Reads the bytes of `tensor` from the chunk.
    ///
    /// # Errors
    /// Returns `TesseraError::InvalidState` unless the chunk is open or gathered.
    pub fn tensor_bytes(&self, tensor: TensorId) -> Result<Vec<u8>, TesseraError> {
        let (start, end) = self.byte_range(tensor)?;
        let buffer = self.full_buffer().ok_or_else(|| {
            TesseraError::invalid_state("tensor_bytes", format!("chunk {} is scattered", self.id))
        })?;
        Ok(buffer.as_bytes()[start..end].to_vec())
    }

    /// Overwrites the bytes of `tensor` inside the chunk.
    ///
    /// # Errors
    /// - `TesseraError::InvalidState` unless the chunk is open or gathered.
    /// - `TesseraError::TensorCreationError` if `data` has the wrong length.
    pub fn copy_tensor_to_chunk_slice(&mut self, tensor: TensorId, data: &[u8]) -> Result<(), TesseraError> {
        let (start, end) = self.byte_range(tensor)?;
        if data.len() != end - start {
            return Err(TesseraError::TensorCreationError {
                data_len: data.len() / self.dtype.size_of(),
                shape: vec![(end - start) / self.dtype.size_of()],
            });
        }
        let id = self.id;
        let buffer = match (self.staging.as_mut(), self.total.as_mut()) {
            (Some(staging), _) => staging,
            (None, Some(total)) => total,
            (None, None) => {
                return Err(TesseraError::invalid_state(
                    "copy_tensor_to_chunk_slice",
                    format!("chunk {} is scattered", id),
                ))
            }
        };
        buffer.copy_from_slice_at(start, data)
    }

    fn byte_range(&self, tensor: TensorId) -> Result<(usize, usize), TesseraError> {
        let info = self
            .tensors_info
            .get(&tensor)
            .ok_or(TesseraError::TensorNotRegistered { tensor })?;
        let elem_size = self.dtype.size_of();
        Ok((info.offset * elem_size, info.end * elem_size))
    }

    fn full_buffer(&self) -> Option<&Buffer> {
        self.staging.as_ref().or(self.total.as_ref())
    }

    fn gather(&mut self) -> Result<(), TesseraError> {
        let shard = self.cuda_shard.take().ok_or_else(|| {
            TesseraError::InternalError(format!("chunk {} has no accelerator shard to gather", self.id))
        })?;
        let mut total = Buffer::zeros(self.chunk_mem(), StorageDevice::GPU);
        if let Err(e) = self
            .process_group
            .all_gather(shard.as_bytes(), total.as_bytes_mut())
        {
            self.cuda_shard = Some(shard);
            return Err(e);
        }
        self.total = Some(total);
        self.is_gathered = true;
        trace!("chunk {}: gathered", self.id);
        Ok(())
    }

    fn scatter(&mut self) -> Result<(), TesseraError> {
        if self.keep_gathered || !self.is_gathered {
            return Ok(());
        }
        let total = self.total.take().ok_or_else(|| {
            TesseraError::InternalError(format!("gathered chunk {} has no buffer", self.id))
        })?;
        let elem_size = self.dtype.size_of();
        let begin = self.shard_begin * elem_size;
        let shard = total.slice_to_new(begin, begin + self.shard_mem())?;
        self.cuda_shard = Some(shard);
        self.is_gathered = false;
        trace!("chunk {}: scattered", self.id);
        Ok(())
    }

    fn shard_move(&mut self, device: StorageDevice) -> Result<(), TesseraError> {
        match device {
            StorageDevice::GPU => {
                if self.cuda_shard.is_some() {
                    return Ok(());
                }
                let cpu_shard = self.cpu_shard.as_ref().ok_or_else(|| {
                    TesseraError::InternalError(format!("chunk {} has no shard to move", self.id))
                })?;
                self.cuda_shard = Some(cpu_shard.to_device(StorageDevice::GPU));
                if !self.pin_memory {
                    self.cpu_shard = None;
                }
            }
            StorageDevice::CPU => {
                let cuda_shard = match self.cuda_shard.take() {
                    Some(shard) => shard,
                    None => return Ok(()),
                };
                // A pinned mirror is reused in place.
                let mut cpu_shard = match self.cpu_shard.take() {
                    Some(pinned) if self.pin_memory => pinned,
                    _ if self.pin_memory => Buffer::pinned(cuda_shard.len()),
                    _ => Buffer::zeros(cuda_shard.len(), StorageDevice::CPU),
                };
                cpu_shard.copy_from_slice_at(0, cuda_shard.as_bytes())?;
                self.cpu_shard = Some(cpu_shard);
            }
        }
        debug!("chunk {}: shard moved to {}", self.id, device);
        Ok(())
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("chunk_size", &self.chunk_size)
            .field("dtype", &self.dtype)
            .field("utilized_size", &self.utilized_size)
            .field("is_gathered", &self.is_gathered)
            .field("ref_count", &self.ref_count)
            .field("device", &self.device_type())
            .finish()
    }
}
