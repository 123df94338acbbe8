use std::fmt::Debug;

use tessera_core::TesseraError;

/// The collective layer a chunk is sharded over.
///
/// Each rank of the group keeps one equally sized shard of every scattered chunk;
/// gathering a chunk assembles all shards in rank order. The actual transport is
/// supplied by the distributed runtime.
pub trait ProcessGroup: Debug + Send + Sync {
    /// Rank of the calling process inside the group.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn world_size(&self) -> usize;

    /// Gathers every rank's `shard` into `output`, rank-major.
    ///
    /// `output.len()` must equal `shard.len() * world_size()`.
    fn all_gather(&self, shard: &[u8], output: &mut [u8]) -> Result<(), TesseraError>;
}

/// Single-process group: the local shard is the whole chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalGroup;

impl ProcessGroup for LocalGroup {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn all_gather(&self, shard: &[u8], output: &mut [u8]) -> Result<(), TesseraError> {
        if output.len() != shard.len() {
            return Err(TesseraError::CommunicationError(format!(
                "all_gather output holds {} bytes, expected {}",
                output.len(),
                shard.len()
            )));
        }
        output.copy_from_slice(shard);
        Ok(())
    }
}
