//! The open set of loader strategies and first-match dispatch.

use crate::error::{Error, Result};
use crate::loader::{ObjectFile, Process, ProcessParams};
use log::{debug, info};
use std::fmt;

/// The outcome of offering an object file to a single loader.
///
/// Declining is an expected, silent outcome and is distinct from the error
/// channel: a loader that returns `NoMatch` must have no observable side
/// effects, while a `Result` error means something unrelated to format
/// compatibility went wrong and aborts dispatch immediately.
#[derive(Debug)]
pub enum LoaderMatch {
    /// The loader does not understand this object file.
    NoMatch,
    /// The loader accepted the object file and constructed its process.
    Matched(Box<dyn Process>),
}

/// A strategy that turns a classified object file into a runnable process,
/// or declines.
///
/// Loaders are stateless singletons; their only state is registry
/// membership. Only an accepting loader may construct a process or call
/// into the object file's loading operations.
pub trait Loader: fmt::Debug {
    /// A diagnostic name for dispatch traces.
    fn name(&self) -> &'static str;

    /// Offer `object_file` to this loader.
    fn load(
        &self,
        params: &ProcessParams,
        object_file: &mut dyn ObjectFile,
    ) -> Result<LoaderMatch>;
}

/// An ordered, append-only collection of [`Loader`] strategies.
///
/// Dispatch is "first compatible wins", so registration order is part of
/// the contract. Populate the registry before dispatching; it does not
/// synchronize registration against concurrent dispatch.
#[derive(Debug, Default)]
pub struct LoaderRegistry {
    loaders: Vec<Box<dyn Loader>>,
}

impl LoaderRegistry {
    /// Create a new, empty `LoaderRegistry`.
    pub fn new() -> LoaderRegistry {
        LoaderRegistry {
            loaders: Vec::new(),
        }
    }

    /// Append a loader. There is no removal.
    pub fn register<L: Loader + 'static>(&mut self, loader: L) {
        self.loaders.push(Box::new(loader));
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// Offer `object_file` to every registered loader in registration order
    /// and return the first accepting loader's process.
    ///
    /// Later loaders are never invoked once one accepts. A loader error
    /// aborts dispatch immediately. If every loader declines the result is
    /// [`Error::NoCompatibleLoader`].
    pub fn try_loaders(
        &self,
        params: &ProcessParams,
        object_file: &mut dyn ObjectFile,
    ) -> Result<Box<dyn Process>> {
        for loader in &self.loaders {
            match loader.load(params, object_file)? {
                LoaderMatch::Matched(process) => {
                    info!(
                        "loader {} accepted {}",
                        loader.name(),
                        object_file.identifier()
                    );
                    return Ok(process);
                }
                LoaderMatch::NoMatch => {
                    debug!(
                        "loader {} declined {}",
                        loader.name(),
                        object_file.identifier()
                    );
                }
            }
        }
        Err(Error::NoCompatibleLoader(
            object_file.identifier().to_string(),
        ))
    }
}
