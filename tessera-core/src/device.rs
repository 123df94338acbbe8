use std::fmt;

/// Represents the memory tier where a buffer is stored.
///
/// Chunks migrate between these two tiers during training; memory accounting
/// is kept per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageDevice {
    /// Main system memory (RAM). This is the default device.
    #[default]
    CPU,
    /// Memory of the accelerator driven by the current worker process.
    GPU,
}

impl StorageDevice {
    /// The short tier name used in memory reports (`"cpu"` / `"cuda"`).
    pub fn tier_name(&self) -> &'static str {
        match self {
            StorageDevice::CPU => "cpu",
            StorageDevice::GPU => "cuda",
        }
    }
}

impl fmt::Display for StorageDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tier_name())
    }
}
