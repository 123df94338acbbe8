// src/tensor/create.rs

use crate::error::TesseraError;
use crate::tensor::Tensor;
use crate::types::{DType, Element};
use num_traits::ToBytes;
use rand::Rng;

/// Creates a tensor from typed values laid out in row-major order.
///
/// # Errors
/// Returns `TesseraError::TensorCreationError` if `values.len()` does not match the
/// number of elements of `shape`.
pub fn from_values<T: Element>(values: &[T], shape: Vec<usize>) -> Result<Tensor, TesseraError> {
    let numel: usize = shape.iter().product();
    if values.len() != numel {
        return Err(TesseraError::TensorCreationError {
            data_len: values.len(),
            shape,
        });
    }
    let mut bytes = Vec::with_capacity(numel * T::DTYPE.size_of());
    for value in values {
        bytes.extend_from_slice(value.to_ne_bytes().as_ref());
    }
    Tensor::from_bytes(bytes, shape, T::DTYPE)
}

/// Creates a zero-filled tensor of the given shape and dtype.
pub fn zeros(shape: Vec<usize>, dtype: DType) -> Result<Tensor, TesseraError> {
    let numel: usize = shape.iter().product();
    Tensor::from_bytes(vec![0u8; numel * dtype.size_of()], shape, dtype)
}

/// Creates an f32 tensor filled with values drawn uniformly from `[0, 1)`.
pub fn rand_uniform(shape: Vec<usize>) -> Result<Tensor, TesseraError> {
    let numel: usize = shape.iter().product();
    let mut rng = rand::thread_rng();
    let values: Vec<f32> = (0..numel).map(|_| rng.gen::<f32>()).collect();
    from_values(&values, shape)
}

/// Decodes native-endian f32 bytes (e.g. from `ChunkManager::tensor_data`).
pub fn f32_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
