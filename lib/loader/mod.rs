//! Loading executable images into a simulated machine.
//!
//! The entry point is [`create_object_file`], which classifies raw bytes and
//! produces a parsed [`ObjectFile`]. Mapping the image into a destination
//! memory goes through [`MemorySink`], symbol-table population through
//! [`SymbolTable`], and turning a classified image into a runnable process
//! through a [`LoaderRegistry`] of [`Loader`] strategies.

pub mod elf;
pub mod memory;
pub mod process;
pub mod raw;
pub mod registry;
pub mod symbol;

pub use self::elf::Elf;
pub use self::memory::{MemoryPermissions, MemorySink, SparseMemory};
pub use self::process::{Process, ProcessParams};
pub use self::raw::RawImage;
pub use self::registry::{Loader, LoaderMatch, LoaderRegistry};
pub use self::symbol::{Symbol, SymbolTable};

use crate::error::{Error, Result};
use crate::types::{Arch, OpSys};
use goblin::Hint;
use log::debug;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// An address mask that masks nothing.
pub const MAX_ADDR: u64 = u64::MAX;

/// A named contiguous region of an image.
///
/// A segment does not own its file-backed bytes. It indexes into the byte
/// buffer of the [`ObjectData`] it belongs to, so segment data can never
/// outlive the object file. `size` may exceed the file-backed length, in
/// which case the tail is zero-filled at load time.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Segment {
    name: String,
    base: u64,
    offset: usize,
    file_size: usize,
    size: usize,
    permissions: MemoryPermissions,
}

impl Segment {
    fn new(
        name: String,
        base: u64,
        offset: usize,
        file_size: usize,
        size: usize,
        permissions: MemoryPermissions,
    ) -> Segment {
        Segment {
            name,
            base,
            offset,
            file_size,
            size,
            permissions,
        }
    }

    /// The diagnostic name of this segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The base address of this segment, before any load offset or mask is
    /// applied.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// The in-memory footprint of this segment in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// How many of this segment's bytes are backed by the image file. The
    /// remaining `size - file_size` bytes are zero-filled.
    pub fn file_size(&self) -> usize {
        self.file_size
    }

    pub fn permissions(&self) -> MemoryPermissions {
        self.permissions
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {:#x} {}", self.name, self.base, self.size)
    }
}

/// The parsed state shared by every object file format.
///
/// Concrete parsers embed an `ObjectData` and layer format-specific behavior
/// on top through the [`ObjectFile`] trait. The byte buffer is owned here and
/// outlives every [`Segment`] referencing into it.
#[derive(Debug)]
pub struct ObjectData {
    identifier: String,
    bytes: Vec<u8>,
    load_offset: u64,
    load_mask: u64,
    arch: Arch,
    op_sys: OpSys,
    entry: u64,
    segments: Vec<Segment>,
}

impl ObjectData {
    /// Create a new `ObjectData` over the given bytes with no segments, an
    /// entry point of 0, no load offset, and no load mask.
    pub fn new<S: Into<String>>(
        identifier: S,
        bytes: Vec<u8>,
        arch: Arch,
        op_sys: OpSys,
    ) -> ObjectData {
        ObjectData {
            identifier: identifier.into(),
            bytes,
            load_offset: 0,
            load_mask: MAX_ADDR,
            arch,
            op_sys,
            entry: 0,
            segments: Vec::new(),
        }
    }

    /// The path or label this image was created from. Informational only.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The full byte buffer of the image.
    pub fn data(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn op_sys(&self) -> OpSys {
        self.op_sys
    }

    /// The address execution should begin at.
    pub fn entry(&self) -> u64 {
        self.entry
    }

    pub fn set_entry(&mut self, entry: u64) {
        self.entry = entry;
    }

    /// The offset added to every loaded address.
    pub fn load_offset(&self) -> u64 {
        self.load_offset
    }

    pub fn set_load_offset(&mut self, offset: u64) {
        self.load_offset = offset;
    }

    /// The mask applied to every loaded address.
    pub fn load_mask(&self) -> u64 {
        self.load_mask
    }

    pub fn set_load_mask(&mut self, mask: u64) {
        self.load_mask = mask;
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Append a segment covering `bytes[offset..offset + file_size]` with an
    /// in-memory footprint of `size` bytes.
    ///
    /// The file range must lie within the image buffer and `size` must be at
    /// least `file_size`.
    pub fn add_segment<S: Into<String>>(
        &mut self,
        name: S,
        base: u64,
        offset: usize,
        file_size: usize,
        size: usize,
        permissions: MemoryPermissions,
    ) -> Result<()> {
        let name = name.into();
        if offset.checked_add(file_size).map_or(true, |end| end > self.bytes.len()) {
            return Err(Error::Malformed(format!(
                "segment {} file range {:#x}..{:#x} exceeds image size {:#x}",
                name,
                offset,
                offset.wrapping_add(file_size),
                self.bytes.len()
            )));
        }
        if size < file_size {
            return Err(Error::Malformed(format!(
                "segment {} memory size {} is smaller than its file size {}",
                name, size, file_size
            )));
        }
        self.segments
            .push(Segment::new(name, base, offset, file_size, size, permissions));
        Ok(())
    }

    /// The file-backed bytes of a segment.
    pub fn segment_data(&self, segment: &Segment) -> &[u8] {
        &self.bytes[segment.offset..segment.offset + segment.file_size]
    }

    /// Write every segment into `sink` at `(base + load_offset) & load_mask`.
    ///
    /// A segment the sink refuses is reported as
    /// [`Error::SegmentRejected`]; whether to abort the overall load is the
    /// caller's decision.
    pub fn load_segments(&self, sink: &mut dyn MemorySink) -> Result<()> {
        for segment in &self.segments {
            if segment.size() == 0 {
                continue;
            }
            let mut bytes = self.segment_data(segment).to_vec();
            if bytes.len() < segment.size() {
                bytes.resize(segment.size(), 0);
            }
            let address = segment.base().wrapping_add(self.load_offset) & self.load_mask;
            debug!(
                "loading segment {} at {:#x} ({} bytes)",
                segment.name(),
                address,
                bytes.len()
            );
            if !sink.write(address, &bytes) {
                return Err(Error::SegmentRejected {
                    name: segment.name().to_string(),
                    address,
                });
            }
        }
        Ok(())
    }

    /// The highest address one past the end of any segment, before the load
    /// offset and mask are applied. 0 if the image has no segments.
    pub fn max_segment_addr(&self) -> u64 {
        self.segments
            .iter()
            .map(|segment| segment.base().wrapping_add(segment.size() as u64))
            .max()
            .unwrap_or(0)
    }

    /// The lowest base address of any segment, before the load offset and
    /// mask are applied. [`MAX_ADDR`] if the image has no segments.
    pub fn min_segment_addr(&self) -> u64 {
        self.segments
            .iter()
            .map(|segment| segment.base())
            .min()
            .unwrap_or(MAX_ADDR)
    }

    /// True if `addr` falls within some segment's half-open
    /// `[base, base + size)` interval, before the load offset and mask are
    /// applied.
    pub fn contains(&self, addr: u64) -> bool {
        self.segments.iter().any(|segment| {
            addr >= segment.base() && addr < segment.base().wrapping_add(segment.size() as u64)
        })
    }

    /// Shift the entry point and every segment base by `delta`. Used by
    /// relocatable parsers when a load bias is applied.
    pub fn rebase(&mut self, delta: u64) {
        self.entry = self.entry.wrapping_add(delta);
        for segment in &mut self.segments {
            segment.base = segment.base.wrapping_add(delta);
        }
    }
}

/// One parsed executable or library image.
///
/// Concrete format parsers implement this over an embedded [`ObjectData`].
/// The relocatable family of operations (`map_size`, `update_bias`) is only
/// valid on images reporting `relocatable() == true`; calling them on
/// anything else is a caller bug and panics.
pub trait ObjectFile: fmt::Debug {
    /// The shared parsed state of this image.
    fn object(&self) -> &ObjectData;

    fn object_mut(&mut self) -> &mut ObjectData;

    /// Write every segment into `sink`, applying the load offset and mask.
    fn load_segments(&self, sink: &mut dyn MemorySink) -> Result<()> {
        self.object().load_segments(sink)
    }

    /// Insert every symbol into `table`.
    ///
    /// `base` is an additional origin applied before `offset` and `mask`,
    /// for images belonging to a library relocated at runtime.
    fn load_all_symbols(
        &self,
        table: &mut dyn SymbolTable,
        base: u64,
        offset: u64,
        mask: u64,
    ) -> Result<()>;

    /// Insert globally bound symbols into `table`.
    fn load_global_symbols(
        &self,
        table: &mut dyn SymbolTable,
        base: u64,
        offset: u64,
        mask: u64,
    ) -> Result<()>;

    /// Insert locally bound symbols into `table`.
    fn load_local_symbols(
        &self,
        table: &mut dyn SymbolTable,
        base: u64,
        offset: u64,
        mask: u64,
    ) -> Result<()>;

    /// Insert weakly bound symbols into `table`. Formats without weak
    /// binding information fail with [`Error::WeakSymbolsUnsupported`] and
    /// no side effects.
    fn load_weak_symbols(
        &self,
        _table: &mut dyn SymbolTable,
        _base: u64,
        _offset: u64,
        _mask: u64,
    ) -> Result<()> {
        Err(Error::WeakSymbolsUnsupported)
    }

    /// The nested object file for this image's requested dynamic linker, or
    /// `None` for statically linked images.
    fn interpreter(&self) -> Option<&dyn ObjectFile> {
        None
    }

    /// True for position-independent images that need a base chosen at load
    /// time.
    fn relocatable(&self) -> bool {
        false
    }

    /// The total virtual span this image needs when placed at an arbitrary
    /// base. Only valid on relocatable images.
    fn map_size(&self) -> u64 {
        panic!("map_size() is only valid for relocatable images");
    }

    /// Add `addr` to the current load bias, shifting all subsequent segment
    /// and symbol address computations. Accumulates across calls. Only valid
    /// on relocatable images.
    fn update_bias(&mut self, _addr: u64) {
        panic!("update_bias() is only valid for relocatable images");
    }

    /// The accumulated load bias.
    fn bias(&self) -> u64 {
        0
    }

    /// True if the image declares a thread-local-storage template.
    fn has_tls(&self) -> bool {
        false
    }

    /// Downcast support for format-specific APIs.
    fn as_any(&self) -> &dyn Any;

    fn identifier(&self) -> &str {
        self.object().identifier()
    }

    fn arch(&self) -> Arch {
        self.object().arch()
    }

    fn op_sys(&self) -> OpSys {
        self.object().op_sys()
    }

    fn entry_point(&self) -> u64 {
        self.object().entry()
    }

    fn segments(&self) -> &[Segment] {
        self.object().segments()
    }

    fn max_segment_addr(&self) -> u64 {
        self.object().max_segment_addr()
    }

    fn min_segment_addr(&self) -> u64 {
        self.object().min_segment_addr()
    }

    fn contains(&self, addr: u64) -> bool {
        self.object().contains(addr)
    }
}

/// The number of bytes the format classifier inspects.
const MAGIC_LEN: usize = 16;

/// Classify `bytes` and parse them into an object file.
///
/// With `raw` set, format detection is skipped and the buffer becomes a
/// [`RawImage`]: a single segment at base 0, unknown architecture and OS.
///
/// Otherwise the magic prefix selects a format in fixed priority order. A
/// matching magic commits to that format: a parse failure past this point is
/// a hard error, never a silent decline. If no magic matches the result is
/// [`Error::UnrecognizedFormat`].
pub fn create_object_file<S: Into<String>>(
    identifier: S,
    bytes: Vec<u8>,
    raw: bool,
) -> Result<Box<dyn ObjectFile>> {
    let identifier = identifier.into();

    if raw {
        return Ok(Box::new(RawImage::new(identifier, bytes)));
    }

    if bytes.len() < MAGIC_LEN {
        return Err(Error::UnrecognizedFormat(identifier));
    }
    let mut magic = [0u8; MAGIC_LEN];
    magic.copy_from_slice(&bytes[0..MAGIC_LEN]);

    match goblin::peek_bytes(&magic)? {
        Hint::Elf(_) => Ok(Box::new(Elf::new(identifier, bytes)?)),
        _ => Err(Error::UnrecognizedFormat(identifier)),
    }
}

/// Read `filename` and classify its contents with [`create_object_file`].
pub fn open_object_file<P: AsRef<Path>>(filename: P, raw: bool) -> Result<Box<dyn ObjectFile>> {
    let filename: &Path = filename.as_ref();
    let mut file = File::open(filename)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    create_object_file(filename.to_string_lossy(), bytes, raw)
}
