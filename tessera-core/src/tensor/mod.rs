// src/tensor/mod.rs

use crate::error::TesseraError;
use crate::tensor_data::{ChunkSlot, TensorData, TensorId, TensorStorage};
use crate::types::DType;
use std::fmt;
use std::sync::{Arc, RwLock};

pub mod create;

pub use create::{f32_from_bytes, from_values, rand_uniform, zeros};

/// Handle to a logical tensor.
///
/// `Tensor` uses `Arc<RwLock<TensorData>>` internally so that cloning a handle is
/// cheap and every clone observes the same storage binding. Once a tensor is
/// appended to a chunk, its elements are aliased into the chunk and the handle only
/// keeps a [`ChunkSlot`] back-reference.
#[derive(Clone)]
pub struct Tensor {
    pub(crate) data: Arc<RwLock<TensorData>>,
}


impl Tensor {
    /// Creates a new Tensor with the given f32 data and shape.
    ///
    /// # Errors
    /// Returns `TesseraError::TensorCreationError` if `data_vec.len()` does not match
    /// the number of elements of `shape`.
    pub fn new(data_vec: Vec<f32>, shape: Vec<usize>) -> Result<Self, TesseraError> {
        from_values(&data_vec, shape)
    }

    /// Creates a new Tensor from raw native-endian bytes.
    pub fn from_bytes(bytes: Vec<u8>, shape: Vec<usize>, dtype: DType) -> Result<Self, TesseraError> {
        let tensor_data = TensorData::from_bytes(bytes, shape, dtype)?;
        Ok(Tensor {
            data: Arc::new(RwLock::new(tensor_data)),
        })
    }

    /// Acquires a read lock on the tensor's data.
    /// Panics if the RwLock is poisoned.
    pub fn read_data(&self) -> std::sync::RwLockReadGuard<'_, TensorData> {
        self.data.read().expect("RwLock poisoned")
    }

    /// Acquires a write lock on the tensor's data.
    /// Panics if the RwLock is poisoned.
    pub fn write_data(&self) -> std::sync::RwLockWriteGuard<'_, TensorData> {
        self.data.write().expect("RwLock poisoned")
    }

    pub fn id(&self) -> TensorId {
        self.read_data().id
    }

    pub fn dtype(&self) -> DType {
        self.read_data().dtype
    }

    pub fn shape(&self) -> Vec<usize> {
        self.read_data().shape.clone()
    }

    pub fn numel(&self) -> usize {
        self.read_data().numel()
    }

    pub fn nbytes(&self) -> usize {
        self.read_data().nbytes()
    }

    /// Returns the chunk slot this tensor is aliased into, if any.
    pub fn chunk_slot(&self) -> Option<ChunkSlot> {
        match self.read_data().storage {
            TensorStorage::Chunk(slot) => Some(slot),
            TensorStorage::Owned(_) => None,
        }
    }

    /// Returns a copy of the bytes owned by this tensor.
    ///
    /// # Errors
    /// Returns `TesseraError::InvalidState` if the tensor is bound to a chunk; read
    /// chunk-bound tensors through the chunk manager instead.
    pub fn owned_bytes(&self) -> Result<Vec<u8>, TesseraError> {
        match &self.read_data().storage {
            TensorStorage::Owned(bytes) => Ok(bytes.clone()),
            TensorStorage::Chunk(slot) => Err(TesseraError::invalid_state(
                "owned_bytes",
                format!("tensor is aliased into chunk {}", slot.chunk),
            )),
        }
    }

    /// Rebinds this tensor's storage to `slot`, handing its owned bytes to the caller.
    ///
    /// # Errors
    /// Returns `TesseraError::InvalidState` if the tensor is already bound to a chunk.
    pub fn bind_to_chunk(&self, slot: ChunkSlot) -> Result<Vec<u8>, TesseraError> {
        let mut guard = self.write_data();
        match std::mem::replace(&mut guard.storage, TensorStorage::Chunk(slot)) {
            TensorStorage::Owned(bytes) => Ok(bytes),
            TensorStorage::Chunk(previous) => {
                guard.storage = TensorStorage::Chunk(previous);
                Err(TesseraError::invalid_state(
                    "bind_to_chunk",
                    format!("tensor is already aliased into chunk {}", previous.chunk),
                ))
            }
        }
    }
}

impl PartialEq for Tensor {
    /// Tensors compare by identity, not by content.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for Tensor {}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.read_data();
        f.debug_struct("Tensor")
            .field("id", &guard.id)
            .field("shape", &guard.shape)
            .field("dtype", &guard.dtype)
            .field("chunk", &match guard.storage {
                TensorStorage::Chunk(slot) => Some(slot.chunk),
                TensorStorage::Owned(_) => None,
            })
            .finish()
    }
}
