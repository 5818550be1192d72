//! The destination memory interface segments are written into.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

bitflags! {
    /// RWX permissions for a segment.
    #[derive(Deserialize, Serialize)]
    pub struct MemoryPermissions: u32 {
        const NONE    = 0b000;
        const READ    = 0b001;
        const WRITE   = 0b010;
        const EXECUTE = 0b100;
        const ALL     = 0b111;
    }
}

/// A write-capable destination for image segments.
///
/// The loader performs one `write` per segment. Returning `false` rejects
/// the address range; the segment is then reported as a failure to the
/// caller. Implementations that may be shared across threads handle their
/// own synchronization.
pub trait MemorySink {
    fn write(&mut self, address: u64, bytes: &[u8]) -> bool;
}

/// A minimal sparse memory, recording writes for later read-back.
///
/// Suitable as the destination for tests and simple embedders. Writes keyed
/// by address; a write to an address already written replaces the previous
/// buffer at that address.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SparseMemory {
    regions: BTreeMap<u64, Vec<u8>>,
}

impl SparseMemory {
    /// Create a new, empty `SparseMemory`.
    pub fn new() -> SparseMemory {
        SparseMemory {
            regions: BTreeMap::new(),
        }
    }

    /// Get a buffer to as much data as possible at the given address, or
    /// `None` if no recorded region covers it.
    pub fn get(&self, address: u64) -> Option<&[u8]> {
        let (base, bytes) = self.regions.range(..=address).next_back()?;
        let offset = (address - base) as usize;
        if offset >= bytes.len() {
            return None;
        }
        Some(&bytes[offset..])
    }

    /// The recorded regions, keyed by write address.
    pub fn regions(&self) -> &BTreeMap<u64, Vec<u8>> {
        &self.regions
    }
}

impl MemorySink for SparseMemory {
    fn write(&mut self, address: u64, bytes: &[u8]) -> bool {
        self.regions.insert(address, bytes.to_vec());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        let mut memory = SparseMemory::new();
        assert!(memory.write(0x1000, &[1, 2, 3, 4]));

        assert_eq!(memory.get(0x1000).unwrap(), &[1, 2, 3, 4][..]);
        assert_eq!(memory.get(0x1002).unwrap(), &[3, 4][..]);
        assert!(memory.get(0x1004).is_none());
        assert!(memory.get(0xFFF).is_none());
    }

    #[test]
    fn later_write_replaces() {
        let mut memory = SparseMemory::new();
        memory.write(0x0, &[1, 2]);
        memory.write(0x0, &[9]);
        assert_eq!(memory.get(0x0).unwrap(), &[9][..]);
    }
}
