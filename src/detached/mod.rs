//! Detached operation monitoring
//!
//! A detached operation is started by something which is in no position to
//! receive its outcome: a timer tick, an object's constructor, a button
//! handler which must return right away. If such an operation fails and nobody
//! looks at its result, the failure is either silently lost or escapes to a
//! global handler which tears down the whole session.
//!
//! This submodule provides three ways to observe such operations:
//!
//! - Callbacks, through [`callback::attach`], run a success or a failure
//!   continuation exactly once when the operation settles. This is the
//!   mechanism that keeps detached failures from escaping.
//! - Completion handles let other code await the final status of an attached
//!   operation, which is how a service can gate data access on a background
//!   load.
//! - Polling publishes snapshots of frequently updated state through a triple
//!   buffer, which is what a renderer wants when refreshing UI controls.

pub mod callback;
pub mod handle;
pub mod polling;

use std::any::Any;


/// Extract a human-readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}
