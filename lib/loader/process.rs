//! The process collaborators handed to loader strategies.

use std::fmt;

/// A runnable process constructed by an accepting [`crate::loader::Loader`].
///
/// Opaque to the loader core: construction, thread setup, and execution all
/// belong to the embedding simulator. The core only carries the object
/// between the accepting loader and the dispatch caller.
pub trait Process: fmt::Debug {}

/// Execution parameters a loader turns into a process.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProcessParams {
    executable: String,
    arguments: Vec<String>,
    environment: Vec<String>,
}

impl ProcessParams {
    pub fn new<S: Into<String>>(executable: S) -> ProcessParams {
        ProcessParams {
            executable: executable.into(),
            arguments: Vec::new(),
            environment: Vec::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<String>) -> ProcessParams {
        self.arguments = arguments;
        self
    }

    pub fn with_environment(mut self, environment: Vec<String>) -> ProcessParams {
        self.environment = environment;
        self
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn environment(&self) -> &[String] {
        &self.environment
    }
}
