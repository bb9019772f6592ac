//! Error types shared across the crate
//!
//! Failures of detached operations themselves are described by
//! [`AsyncOpError`](crate::status::AsyncOpError). The types below are the
//! application-level errors that such operations, and their hosts, produce.

use std::path::PathBuf;
use thiserror::Error;


/// Failure reported by a data-fetch collaborator
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The remote end could not be reached
    #[error("{0}")]
    Network(String),
}


/// Failure of the eager country load
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    /// Fault injected after the collection was (re)populated
    #[error("injected fault after loading {loaded} entries")]
    InjectedFault { loaded: usize },
}


/// Failure to reach a dispatch context
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatcher stopped before the job could run
    #[error("dispatch context has shut down")]
    Closed,
}


/// Failure of one refresh of the refresh controller
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}


/// Reason why a dispatch session ended abnormally
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// A detached operation failed with nobody observing it
    #[error("unhandled failure in detached operation: {0}")]
    UnhandledFailure(String),
}


/// Failure to load the demo configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
//
impl ConfigError {
    /// Path of the offending file, when there is one
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => {
                Some(path)
            }
            ConfigError::Invalid(_) => None,
        }
    }
}
