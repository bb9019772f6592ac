//! Facilities to represent the status of detached operations
//!
//! This module provides facilities to represent and reason about the status
//! of detached asynchronous operations. The model is the following: a detached
//! operation starts in a pending state when it is attached to its outcome
//! callbacks, switches to a running state once the async runtime first polls
//! it, and finally ends up in exactly one successful or unsuccessful final
//! state. Nobody is awaiting the operation directly, so this final state is the
//! only way for the rest of the application to learn what happened to it.

use std::error::Error;
use std::fmt::{self, Display};


/// Representation of a detached operation's status
///
/// Here are the possible state transitions:
///
/// - Pending -> Running / Cancelled / Error
/// - Running -> Done / Cancelled / Error
///
/// Once the operation is in either of the Done, Cancelled or Error state, its
/// state won't change anymore.
///
#[derive(Clone, Debug, PartialEq)]
pub enum AsyncOpStatus<E> {
    /// The operation has been attached, but not been polled yet
    Pending,

    /// The operation is being driven by the async runtime
    Running,

    /// The operation ran to completion
    Done,

    /// The operation settled after its continuations were invalidated
    Cancelled,

    /// The operation failed
    Error(AsyncOpError<E>),
}
//
impl<E> AsyncOpStatus<E> {
    /// Check if this status is final (i.e. won't change anymore)
    pub fn is_final(&self) -> bool {
        is_final(self)
    }
}


/// Check if an operation status is final (i.e. won't change anymore)
pub fn is_final<E>(s: &AsyncOpStatus<E>) -> bool {
    use self::AsyncOpStatus::*;
    match *s {
        Pending | Running => false,
        Done | Cancelled | Error(_) => true,
    }
}


/// Ways in which a detached operation can fail
#[derive(Clone, Debug, PartialEq)]
pub enum AsyncOpError<E> {
    /// The operation was dropped before it reached a final status, typically
    /// because the runtime driving it was shut down
    ServerKilled,

    /// The operation panicked, the payload message is kept if it had one
    Panicked(String),

    /// There was no async runtime to spawn the operation on
    NoRuntime,

    /// The operation itself returned an error
    Custom(E),
}
//
impl<E> AsyncOpError<E> {
    /// Access the application-specific error, if that is what this is
    pub fn custom(&self) -> Option<&E> {
        match self {
            AsyncOpError::Custom(e) => Some(e),
            _ => None,
        }
    }
}
//
impl<E: Display> Display for AsyncOpError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncOpError::ServerKilled => {
                write!(f, "operation was dropped before it settled")
            }
            AsyncOpError::Panicked(msg) => write!(f, "operation panicked: {msg}"),
            AsyncOpError::NoRuntime => {
                write!(f, "no async runtime available to run the operation")
            }
            AsyncOpError::Custom(e) => write!(f, "{e}"),
        }
    }
}
//
impl<E: Error + 'static> Error for AsyncOpError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AsyncOpError::Custom(e) => Some(e),
            _ => None,
        }
    }
}
