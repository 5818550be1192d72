//! Raw blob images without an object header.

use crate::error::Result;
use crate::loader::{MemoryPermissions, ObjectData, ObjectFile, SymbolTable};
use crate::types::{Arch, OpSys};
use std::any::Any;

/// An image for a headerless blob: unknown architecture and OS, entry point
/// 0, and a single `data` segment covering the whole buffer at base 0.
///
/// Callers position the blob with `set_load_offset` / `set_load_mask` on the
/// underlying [`ObjectData`].
#[derive(Debug)]
pub struct RawImage {
    object: ObjectData,
}

impl RawImage {
    /// Create a new `RawImage` over the given bytes.
    pub fn new<S: Into<String>>(identifier: S, bytes: Vec<u8>) -> RawImage {
        let size = bytes.len();
        let mut object = ObjectData::new(identifier, bytes, Arch::Unknown, OpSys::Unknown);
        object
            .add_segment("data", 0, 0, size, size, MemoryPermissions::ALL)
            .expect("a whole-buffer segment is always in range");
        RawImage { object }
    }
}

impl ObjectFile for RawImage {
    fn object(&self) -> &ObjectData {
        &self.object
    }

    fn object_mut(&mut self) -> &mut ObjectData {
        &mut self.object
    }

    // A blob carries no symbol information; loading it is a successful
    // no-op. Weak symbols keep the unsupported default.
    fn load_all_symbols(
        &self,
        _table: &mut dyn SymbolTable,
        _base: u64,
        _offset: u64,
        _mask: u64,
    ) -> Result<()> {
        Ok(())
    }

    fn load_global_symbols(
        &self,
        _table: &mut dyn SymbolTable,
        _base: u64,
        _offset: u64,
        _mask: u64,
    ) -> Result<()> {
        Ok(())
    }

    fn load_local_symbols(
        &self,
        _table: &mut dyn SymbolTable,
        _base: u64,
        _offset: u64,
        _mask: u64,
    ) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
