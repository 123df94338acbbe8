use once_cell::sync::OnceCell;
use tessera_chunk::ProcessGroup;
use tessera_core::TesseraError;

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

// `RUST_LOG=tessera_chunk=debug` shows every chunk transition.
#[allow(dead_code)]
pub(crate) fn init_logger() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// In-process stand-in for a multi-rank group: gathering replicates the local
/// shard into every rank's slot.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub(crate) struct MirrorGroup {
    pub rank: usize,
    pub world_size: usize,
}

impl ProcessGroup for MirrorGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn all_gather(&self, shard: &[u8], output: &mut [u8]) -> Result<(), TesseraError> {
        if output.len() != shard.len() * self.world_size {
            return Err(TesseraError::CommunicationError(format!(
                "all_gather output holds {} bytes, expected {}",
                output.len(),
                shard.len() * self.world_size
            )));
        }
        for slot in output.chunks_mut(shard.len()) {
            slot.copy_from_slice(shard);
        }
        Ok(())
    }
}
