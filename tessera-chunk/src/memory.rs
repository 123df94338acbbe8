use std::fmt;

use tessera_core::StorageDevice;

/// Bytes held per memory tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub cpu: usize,
    pub cuda: usize,
}

impl MemoryUsage {
    pub fn get(&self, device: StorageDevice) -> usize {
        match device {
            StorageDevice::CPU => self.cpu,
            StorageDevice::GPU => self.cuda,
        }
    }

    pub fn add(&mut self, device: StorageDevice, bytes: usize) {
        match device {
            StorageDevice::CPU => self.cpu += bytes,
            StorageDevice::GPU => self.cuda += bytes,
        }
    }

    /// Bytes over both tiers.
    pub fn total(&self) -> usize {
        self.cpu + self.cuda
    }

    /// Replaces the contribution `before` of one chunk with `after`.
    pub(crate) fn apply_delta(&mut self, before: MemoryUsage, after: MemoryUsage) {
        self.cpu = self.cpu + after.cpu - before.cpu;
        self.cuda = self.cuda + after.cuda - before.cuda;
    }
}

impl std::ops::Add for MemoryUsage {
    type Output = MemoryUsage;

    fn add(self, rhs: MemoryUsage) -> MemoryUsage {
        MemoryUsage {
            cpu: self.cpu + rhs.cpu,
            cuda: self.cuda + rhs.cuda,
        }
    }
}

impl std::iter::Sum for MemoryUsage {
    fn sum<I: Iterator<Item = MemoryUsage>>(iter: I) -> MemoryUsage {
        iter.fold(MemoryUsage::default(), |acc, m| acc + m)
    }
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu: {} B, cuda: {} B", self.cpu, self.cuda)
    }
}
