// src/tensor_data.rs
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TesseraError;
use crate::types::DType;

/// Process-unique identity of a logical tensor.
///
/// Identity is assigned at creation and survives rebinding of the tensor's storage
/// into a chunk, so it is the key used by every tensor → chunk map.
pub type TensorId = u64;

static NEXT_TENSOR_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_tensor_id() -> TensorId {
    NEXT_TENSOR_ID.fetch_add(1, Ordering::Relaxed)
}

/// Back-reference from a tensor to the chunk slot holding its elements.
///
/// This is a lookup key, not ownership: the chunk manager owns the chunk and
/// resolves `chunk` against its own registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSlot {
    /// Index of the owning chunk in the manager's chunk arena.
    pub chunk: usize,
    /// Element offset of the tensor inside the chunk.
    pub offset: usize,
}

/// Where a tensor's elements currently live.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorStorage {
    /// The tensor owns its bytes (before registration in a chunk).
    Owned(Vec<u8>),
    /// The tensor's bytes are aliased into a chunk buffer.
    Chunk(ChunkSlot),
}

/// Internal storage and metadata for a Tensor.
///
/// Typically wrapped in `Arc<RwLock<TensorData>>` by the `Tensor` struct.
#[derive(Debug)]
pub struct TensorData {
    pub(crate) id: TensorId,
    pub(crate) dtype: DType,
    pub(crate) shape: Vec<usize>,
    pub(crate) storage: TensorStorage,
}

impl TensorData {
    /// Creates tensor data from raw native-endian bytes.
    ///
    /// # Errors
    /// Returns `TesseraError::TensorCreationError` if the byte length does not match
    /// `shape` and `dtype`.
    pub fn from_bytes(bytes: Vec<u8>, shape: Vec<usize>, dtype: DType) -> Result<Self, TesseraError> {
        let numel: usize = shape.iter().product();
        if bytes.len() != numel * dtype.size_of() {
            return Err(TesseraError::TensorCreationError {
                data_len: bytes.len() / dtype.size_of(),
                shape,
            });
        }
        Ok(TensorData {
            id: next_tensor_id(),
            dtype,
            shape,
            storage: TensorStorage::Owned(bytes),
        })
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Size of the tensor's elements in bytes.
    pub fn nbytes(&self) -> usize {
        self.numel() * self.dtype.size_of()
    }
}
