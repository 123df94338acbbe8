use std::sync::Arc;

use tessera_core::tensor::f32_from_bytes;
use tessera_core::{ChunkSlot, DType, StorageDevice, Tensor, TesseraError};

use crate::chunk::{Chunk, TensorState};
use crate::memory::MemoryUsage;
use crate::process_group::{LocalGroup, ProcessGroup};

/// Two-rank group where every rank holds the same shard.
#[derive(Debug)]
struct MirrorGroup;

impl ProcessGroup for MirrorGroup {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        2
    }

    fn all_gather(&self, shard: &[u8], output: &mut [u8]) -> Result<(), TesseraError> {
        for slot in output.chunks_mut(shard.len()) {
            slot.copy_from_slice(shard);
        }
        Ok(())
    }
}

fn local_chunk(size: usize, keep_gathered: bool, pin: bool) -> Result<Chunk, TesseraError> {
    Chunk::new(
        0,
        1,
        size,
        DType::F32,
        keep_gathered,
        pin,
        StorageDevice::GPU,
        Arc::new(LocalGroup),
    )
}

#[test]
fn test_new_rejects_unshardable_size() {
    let result = Chunk::new(
        0,
        1,
        7,
        DType::F32,
        false,
        false,
        StorageDevice::GPU,
        Arc::new(MirrorGroup),
    );
    assert!(matches!(result, Err(TesseraError::ConfigurationError(_))));
    assert!(local_chunk(0, false, false).is_err());
}

#[test]
fn test_append_binds_tensors_in_order() -> Result<(), TesseraError> {
    let mut chunk = local_chunk(8, false, false)?;
    let a = Tensor::new(vec![1.0, 2.0, 3.0], vec![3])?;
    let b = Tensor::new(vec![4.0, 5.0, 6.0, 7.0], vec![2, 2])?;
    chunk.append_tensor(&a)?;
    chunk.append_tensor(&b)?;

    assert_eq!(chunk.utilized_size(), 7);
    assert_eq!(chunk.available_size(), 1);
    assert_eq!(chunk.tensor_ids(), &[a.id(), b.id()]);
    assert_eq!(b.chunk_slot(), Some(ChunkSlot { chunk: 0, offset: 3 }));
    let info = chunk.tensor_info(b.id()).copied();
    assert_eq!(info.map(|i| (i.offset, i.end, i.state)), Some((3, 7, TensorState::Hold)));

    // Open chunks serve tensor data from staging.
    assert_eq!(f32_from_bytes(&chunk.tensor_bytes(b.id())?), vec![4.0, 5.0, 6.0, 7.0]);
    Ok(())
}

#[test]
fn test_append_errors() -> Result<(), TesseraError> {
    let mut chunk = local_chunk(4, false, false)?;
    let big = Tensor::new(vec![0.0; 5], vec![5])?;
    assert_eq!(
        chunk.append_tensor(&big),
        Err(TesseraError::CapacityExceeded {
            requested: 5,
            available: 4
        })
    );
    // A failed append leaves the tensor unbound.
    assert_eq!(big.chunk_slot(), None);

    let ints = tessera_core::tensor::from_values(&[1i64, 2], vec![2])?;
    assert!(matches!(
        chunk.append_tensor(&ints),
        Err(TesseraError::DTypeMismatch { .. })
    ));

    chunk.close_chunk(StorageDevice::GPU)?;
    let late = Tensor::new(vec![1.0], vec![1])?;
    assert!(matches!(
        chunk.append_tensor(&late),
        Err(TesseraError::InvalidState { .. })
    ));
    Ok(())
}

#[test]
fn test_keep_gathered_chunk_stays_on_accelerator() -> Result<(), TesseraError> {
    let mut chunk = local_chunk(4, true, true)?;
    chunk.append_tensor(&Tensor::new(vec![1.0; 4], vec![4])?)?;
    chunk.close_chunk(StorageDevice::CPU)?;

    assert!(chunk.is_gathered());
    assert_eq!(chunk.memory_usage(), MemoryUsage { cpu: 0, cuda: 16 });

    chunk.access_chunk()?;
    chunk.release_chunk()?;
    chunk.move_to(StorageDevice::CPU)?;
    assert!(chunk.is_gathered());
    assert_eq!(chunk.device_type(), Some(StorageDevice::GPU));
    assert_eq!(chunk.memory_usage(), MemoryUsage { cpu: 0, cuda: 16 });
    Ok(())
}

#[test]
fn test_scatter_and_gather_preserve_data() -> Result<(), TesseraError> {
    let mut chunk = local_chunk(8, false, false)?;
    let a = Tensor::new(vec![1.5, -2.0], vec![2])?;
    let b = Tensor::new(vec![3.25; 6], vec![2, 3])?;
    chunk.append_tensor(&a)?;
    chunk.append_tensor(&b)?;
    chunk.close_chunk(StorageDevice::GPU)?;

    assert!(!chunk.is_gathered());
    assert!(matches!(
        chunk.tensor_bytes(a.id()),
        Err(TesseraError::InvalidState { .. })
    ));

    chunk.move_to(StorageDevice::CPU)?;
    assert_eq!(chunk.device_type(), Some(StorageDevice::CPU));
    assert_eq!(chunk.memory_usage(), MemoryUsage { cpu: 32, cuda: 0 });

    chunk.access_chunk()?;
    assert_eq!(chunk.memory_usage(), MemoryUsage { cpu: 0, cuda: 32 });
    assert_eq!(f32_from_bytes(&chunk.tensor_bytes(a.id())?), vec![1.5, -2.0]);
    assert_eq!(f32_from_bytes(&chunk.tensor_bytes(b.id())?), vec![3.25; 6]);

    assert!(matches!(
        chunk.copy_tensor_to_chunk_slice(a.id(), &[0u8; 4]),
        Err(TesseraError::TensorCreationError { .. })
    ));
    let replacement: Vec<u8> = [9.0f32, 8.0].iter().flat_map(|v| v.to_ne_bytes()).collect();
    chunk.copy_tensor_to_chunk_slice(a.id(), &replacement)?;
    chunk.release_chunk()?;
    chunk.access_chunk()?;
    assert_eq!(f32_from_bytes(&chunk.tensor_bytes(a.id())?), vec![9.0, 8.0]);
    Ok(())
}

#[test]
fn test_pinned_mirror_survives_moves() -> Result<(), TesseraError> {
    let mut chunk = Chunk::new(
        3,
        2,
        8,
        DType::F32,
        false,
        true,
        StorageDevice::GPU,
        Arc::new(MirrorGroup),
    )?;
    chunk.append_tensor(&Tensor::new(vec![1.0; 8], vec![8])?)?;
    chunk.close_chunk(StorageDevice::GPU)?;
    // Shard of 4 elements on the accelerator, mirrored in pinned host memory.
    assert_eq!(chunk.shard_mem(), 16);
    assert_eq!(chunk.memory_usage(), MemoryUsage { cpu: 16, cuda: 16 });

    chunk.move_to(StorageDevice::CPU)?;
    assert_eq!(chunk.memory_usage(), MemoryUsage { cpu: 16, cuda: 0 });

    chunk.move_to(StorageDevice::GPU)?;
    assert_eq!(chunk.memory_usage(), MemoryUsage { cpu: 16, cuda: 16 });

    chunk.access_chunk()?;
    assert_eq!(chunk.memory_usage(), MemoryUsage { cpu: 16, cuda: 32 });
    Ok(())
}

#[test]
fn test_reference_counting() -> Result<(), TesseraError> {
    let mut chunk = local_chunk(4, false, false)?;
    let t = Tensor::new(vec![0.5; 4], vec![4])?;
    chunk.append_tensor(&t)?;

    assert!(matches!(chunk.access_chunk(), Err(TesseraError::InvalidState { .. })));
    chunk.close_chunk(StorageDevice::GPU)?;
    assert!(matches!(chunk.release_chunk(), Err(TesseraError::InvalidState { .. })));

    chunk.access_chunk()?;
    chunk.access_chunk()?;
    assert_eq!(chunk.ref_count(), 2);
    assert!(!chunk.can_move());
    assert!(matches!(
        chunk.move_to(StorageDevice::CPU),
        Err(TesseraError::InvalidState { .. })
    ));

    chunk.release_chunk()?;
    assert!(chunk.is_gathered());
    chunk.release_chunk()?;
    assert!(!chunk.is_gathered());
    assert!(chunk.can_move());
    Ok(())
}

#[test]
fn test_compute_tensor_blocks_scatter() -> Result<(), TesseraError> {
    let mut chunk = local_chunk(4, false, false)?;
    let t = Tensor::new(vec![0.5; 4], vec![4])?;
    chunk.append_tensor(&t)?;
    chunk.close_chunk(StorageDevice::GPU)?;

    chunk.access_chunk()?;
    chunk.tensor_trans_state(t.id(), TensorState::Compute)?;
    assert!(!chunk.can_release());
    assert!(matches!(chunk.release_chunk(), Err(TesseraError::InvalidState { .. })));
    assert_eq!(chunk.ref_count(), 1);

    chunk.tensor_trans_state(t.id(), TensorState::HoldAfterBwd)?;
    chunk.release_chunk()?;
    assert_eq!(chunk.ref_count(), 0);

    assert_eq!(
        chunk.tensor_trans_state(u64::MAX, TensorState::Free),
        Err(TesseraError::TensorNotRegistered { tensor: u64::MAX })
    );
    Ok(())
}
