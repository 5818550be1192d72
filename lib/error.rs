//! Error types for image loading.

use thiserror::Error;

/// Everything that can go wrong while classifying, parsing, or loading an
/// executable image.
///
/// A loader declining an object file is not an error and never appears here;
/// see `loader::LoaderMatch`.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying binary parser rejected the image.
    #[error("error parsing object file: {0}")]
    Goblin(#[from] goblin::error::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// No known format's magic number matched the image.
    #[error("unrecognized object file format: {0}")]
    UnrecognizedFormat(String),

    /// The magic number matched, but the image body did not hold up.
    #[error("malformed image: {0}")]
    Malformed(String),

    /// The destination memory refused a segment's address range.
    #[error("memory sink rejected segment {name} at {address:#x}")]
    SegmentRejected { name: String, address: u64 },

    /// This object file format carries no weak symbol information.
    #[error("weak symbols are not supported by this object file format")]
    WeakSymbolsUnsupported,

    /// Every registered loader declined the object file.
    #[error("no compatible loader for {0}")]
    NoCompatibleLoader(String),
}

pub type Result<T> = std::result::Result<T, Error>;
