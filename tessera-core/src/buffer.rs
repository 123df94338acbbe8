use std::fmt::Debug;

use crate::device::StorageDevice;
use crate::error::TesseraError;

/// A contiguous, device-tagged byte buffer.
///
/// Buffers are the unit of memory accounting: whoever holds a `Buffer` is
/// charged `len()` bytes on `device()`. Accelerator buffers are host-backed here;
/// the device tag is what the memory tiers observe, and the actual transfer is the
/// responsibility of the device layer wrapping this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    device: StorageDevice,
    /// Whether the host allocation is page-locked for fast transfers.
    /// Only meaningful for `StorageDevice::CPU`.
    pinned: bool,
    bytes: Vec<u8>,
}

impl Buffer {
    /// Allocates a zero-filled buffer of `len` bytes on `device`.
    pub fn zeros(len: usize, device: StorageDevice) -> Self {
        Buffer {
            device,
            pinned: false,
            bytes: vec![0u8; len],
        }
    }

    /// Allocates a zero-filled, pinned host buffer of `len` bytes.
    pub fn pinned(len: usize) -> Self {
        Buffer {
            device: StorageDevice::CPU,
            pinned: true,
            bytes: vec![0u8; len],
        }
    }

    /// Wraps existing bytes as a buffer on `device`.
    pub fn from_bytes(bytes: Vec<u8>, device: StorageDevice) -> Self {
        Buffer {
            device,
            pinned: false,
            bytes,
        }
    }

    pub fn device(&self) -> StorageDevice {
        self.device
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Copies this buffer into a new allocation on `device`.
    pub fn to_device(&self, device: StorageDevice) -> Buffer {
        Buffer {
            device,
            pinned: false,
            bytes: self.bytes.clone(),
        }
    }

    /// Copies the byte range `[start, end)` into a new allocation on the same device.
    ///
    /// # Errors
    /// Returns `TesseraError::InternalError` if the range is out of bounds.
    pub fn slice_to_new(&self, start: usize, end: usize) -> Result<Buffer, TesseraError> {
        let bytes = self.bytes.get(start..end).ok_or_else(|| {
            TesseraError::InternalError(format!(
                "byte range {}..{} out of bounds for buffer of {} bytes",
                start,
                end,
                self.bytes.len()
            ))
        })?;
        Ok(Buffer {
            device: self.device,
            pinned: false,
            bytes: bytes.to_vec(),
        })
    }

    /// Copies `src` into this buffer starting at byte `offset` (like `copy_` into a slice view).
    ///
    /// # Errors
    /// Returns `TesseraError::InternalError` if `src` does not fit.
    pub fn copy_from_slice_at(&mut self, offset: usize, src: &[u8]) -> Result<(), TesseraError> {
        let len = self.bytes.len();
        let dst = self
            .bytes
            .get_mut(offset..offset + src.len())
            .ok_or_else(|| {
                TesseraError::InternalError(format!(
                    "cannot copy {} bytes at offset {} into buffer of {} bytes",
                    src.len(),
                    offset,
                    len
                ))
            })?;
        dst.copy_from_slice(src);
        Ok(())
    }
}
