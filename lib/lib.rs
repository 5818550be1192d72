//! Kestrel loads executable images into simulated machines.
//!
//! An on-disk binary becomes a runnable process image in three steps. First,
//! [`loader::create_object_file`] classifies the raw bytes and hands back a
//! parsed [`loader::ObjectFile`]. Second, the object file materializes its
//! segments into a destination memory through the [`loader::MemorySink`]
//! interface, and populates name-to-address tables through
//! [`loader::SymbolTable`]. Third, a [`loader::LoaderRegistry`] dispatches
//! the object file over registered [`loader::Loader`] strategies, the first
//! compatible one of which constructs the process.
//!
//! Instruction semantics, the destination memory system, and process
//! internals all live with the embedding simulator. Kestrel only understands
//! the binaries.

pub mod error;
pub mod loader;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
